//! Dataset import and export.

use super::open_replica;
use std::fs;
use std::path::Path;
use tagsync_engine::Action;
use tagsync_protocol::Dataset;

/// Merges (or with `replace`, resets from) a dataset file.
pub fn import(path: &Path, file: &Path, replace: bool) -> Result<(), Box<dyn std::error::Error>> {
    let text = fs::read_to_string(file)?;
    let dataset: Dataset = serde_json::from_str(&text)?;
    if dataset.is_empty() {
        println!("Dataset {:?} has no collections", file);
        return Ok(());
    }

    let dispatcher = open_replica(path)?;
    let action = if replace {
        Action::ResetFromData(dataset)
    } else {
        Action::MergeData(dataset)
    };
    let changed = dispatcher.dispatch(action);
    println!(
        "✓ {} {:?} ({} stores changed)",
        if replace { "Reset from" } else { "Merged" },
        file,
        changed.len()
    );
    Ok(())
}

/// Prints every live record as a dataset.
pub fn export(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let dispatcher = open_replica(path)?;
    let dataset = dispatcher.export_dataset();
    println!("{}", serde_json::to_string_pretty(&dataset)?);
    Ok(())
}
