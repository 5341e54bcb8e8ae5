//! CLI command implementations.

pub mod annotate;
pub mod data;
pub mod show;
pub mod sync;

use std::path::Path;
use std::sync::Arc;
use tagsync_engine::{Dispatcher, JsonFileStore, SyncError};

/// Opens the replica at `path`, creating it if needed.
pub fn open_replica(path: &Path) -> Result<Arc<Dispatcher>, Box<dyn std::error::Error>> {
    let store = JsonFileStore::open(path, true).map_err(|e| -> Box<dyn std::error::Error> {
        match e {
            SyncError::Locked => {
                format!("replica {:?} is in use by another tagsync process", path).into()
            }
            other => other.into(),
        }
    })?;
    Ok(Arc::new(Dispatcher::open(Arc::new(store))?))
}
