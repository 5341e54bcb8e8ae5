//! Replica persistence.
//!
//! The engine treats persistence as whole-blob get/set storage: each store
//! reads its JSON blob once at startup (or on an explicit reload) and
//! writes it back after every dispatch that changed it.
//!
//! ```text
//! <replica_path>/
//! ├─ LOCK                # Advisory lock for single-writer
//! ├─ app.json            # App State
//! ├─ userTags.json       # { items, tmpRemoved }
//! ├─ userAddresses.json
//! ├─ userTxs.json
//! └─ userId.json         # Stable installation user id
//! ```

use crate::error::{SyncError, SyncResult};
use fs2::FileExt;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const USER_ID_KEY: &str = "userId";

/// Keyed blob storage for replica state.
pub trait LocalStore: Send + Sync {
    /// Loads a blob, or `None` if nothing was stored under `key`.
    fn load(&self, key: &str) -> SyncResult<Option<Value>>;

    /// Stores a blob, replacing any previous one.
    fn save(&self, key: &str, value: &Value) -> SyncResult<()>;

    /// Returns the stable user id of this installation.
    ///
    /// Generated as a UUID v4 on first use and persisted.
    fn user_id(&self) -> SyncResult<String> {
        if let Some(Value::String(id)) = self.load(USER_ID_KEY)? {
            if !id.is_empty() {
                return Ok(id);
            }
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.save(USER_ID_KEY, &Value::String(id.clone()))?;
        Ok(id)
    }
}

/// In-process blob storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl LocalStore for MemoryStore {
    fn load(&self, key: &str) -> SyncResult<Option<Value>> {
        Ok(self.blobs.read().get(key).cloned())
    }

    fn save(&self, key: &str, value: &Value) -> SyncResult<()> {
        self.blobs.write().insert(key.to_string(), value.clone());
        Ok(())
    }
}

/// Directory-backed blob storage, one JSON file per key.
///
/// Holds an exclusive lock on the directory for its whole lifetime.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    _lock_file: File,
}

impl JsonFileStore {
    /// Opens or creates a replica directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory does not exist and
    /// `create_if_missing` is false, if another process holds the lock
    /// (`SyncError::Locked`), or on I/O failure.
    pub fn open(path: &Path, create_if_missing: bool) -> SyncResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(SyncError::Persistence(format!(
                    "replica directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(SyncError::Persistence(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(SyncError::Locked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the replica directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn blob_path(&self, key: &str) -> SyncResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(SyncError::Persistence(format!("invalid blob key: {key:?}")));
        }
        Ok(self.path.join(format!("{key}.json")))
    }
}

impl LocalStore for JsonFileStore {
    fn load(&self, key: &str) -> SyncResult<Option<Value>> {
        let blob_path = self.blob_path(key)?;
        if !blob_path.exists() {
            return Ok(None);
        }

        let mut data = Vec::new();
        File::open(&blob_path)?.read_to_end(&mut data)?;
        if data.is_empty() {
            return Ok(None);
        }

        Ok(Some(serde_json::from_slice(&data)?))
    }

    fn save(&self, key: &str, value: &Value) -> SyncResult<()> {
        let blob_path = self.blob_path(key)?;
        let temp_path = self.path.join(format!("{key}.json.tmp"));

        let data = serde_json::to_vec_pretty(value)?;
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &blob_path)?;
        Ok(())
    }
}
