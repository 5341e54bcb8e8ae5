//! Local mutation commands.

use super::open_replica;
use std::path::Path;
use tagsync_engine::Action;
use tagsync_protocol::CollectionKind;

fn report(changed: bool, done: &str) {
    if changed {
        println!("✓ {}", done);
    } else {
        println!("No change");
    }
}

/// Adds `tag` to the record `id`.
pub fn add_tag(
    path: &Path,
    target: CollectionKind,
    id: &str,
    tag: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let dispatcher = open_replica(path)?;
    let changed = dispatcher.dispatch(Action::AddTag {
        target,
        id: id.to_string(),
        tag: tag.to_string(),
    });
    report(!changed.is_empty(), &format!("Tagged {} with '{}'", id, tag));
    Ok(())
}

/// Removes `tag` from the record `id`.
pub fn remove_tag(
    path: &Path,
    target: CollectionKind,
    id: &str,
    tag: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let dispatcher = open_replica(path)?;
    let changed = dispatcher.dispatch(Action::RemoveTag {
        target,
        id: id.to_string(),
        tag: tag.to_string(),
    });
    report(!changed.is_empty(), &format!("Removed '{}' from {}", tag, id));
    Ok(())
}

/// Replaces the tags and note of the record `id`.
pub fn replace(
    path: &Path,
    target: CollectionKind,
    id: &str,
    tags: Vec<String>,
    note: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let dispatcher = open_replica(path)?;
    let changed = dispatcher.dispatch(Action::ReplaceTagsAndNote {
        target,
        id: id.to_string(),
        tags,
        note,
    });
    report(!changed.is_empty(), &format!("Updated {}", id));
    Ok(())
}

/// Tombstones the record `id`.
pub fn remove(path: &Path, target: CollectionKind, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let dispatcher = open_replica(path)?;
    let changed = dispatcher.dispatch(Action::RemoveRecord {
        target,
        id: id.to_string(),
    });
    report(
        !changed.is_empty(),
        &format!("Removed {} from {}", id, target.wire_name()),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn mutations_persist_across_opens() {
        let dir = TempDir::new().unwrap();
        add_tag(dir.path(), CollectionKind::Addresses, "bc1qabc", "cold").unwrap();
        replace(
            dir.path(),
            CollectionKind::Transactions,
            "ff00",
            vec!["rent".to_string()],
            "march".to_string(),
        )
        .unwrap();

        let dispatcher = open_replica(dir.path()).unwrap();
        dispatcher.read(|stores| {
            assert_eq!(stores.addresses.tags("bc1qabc"), ["cold".to_string()]);
            assert_eq!(stores.transactions.note("ff00"), "march");
            assert!(stores.tags.get("cold").is_some());
            assert!(stores.tags.get("rent").is_some());
        });
    }

    #[test]
    fn remove_then_list_hides_record() {
        let dir = TempDir::new().unwrap();
        add_tag(dir.path(), CollectionKind::Addresses, "bc1qabc", "cold").unwrap();
        remove(dir.path(), CollectionKind::Addresses, "bc1qabc").unwrap();

        let dispatcher = open_replica(dir.path()).unwrap();
        assert_eq!(dispatcher.read(|s| s.addresses.live_count()), 0);
    }
}
