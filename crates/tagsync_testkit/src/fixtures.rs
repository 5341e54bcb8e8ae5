//! Replica fixtures.
//!
//! Provides a dispatcher over fresh persistence with a deterministic
//! clock, plus a few prepared scenarios.

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tagsync_engine::{Action, Dispatcher, JsonFileStore, LocalStore, MemoryStore, StoreId, Stores};
use tagsync_protocol::PushBody;
use tempfile::TempDir;

/// Clock value of the first dispatched action.
pub const START_MILLIS: i64 = 1_700_000_000_000;

/// A test replica with automatic cleanup.
pub struct TestReplica {
    /// The dispatcher owning all stores.
    pub dispatcher: Arc<Dispatcher>,
    clock: AtomicI64,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestReplica {
    /// Creates a replica over in-memory persistence.
    pub fn memory() -> Self {
        Self::over(Arc::new(MemoryStore::new()), None)
    }

    /// Creates a replica persisted in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = JsonFileStore::open(temp_dir.path(), true).expect("Failed to open replica");
        Self::over(Arc::new(store), Some(temp_dir))
    }

    fn over(local: Arc<dyn LocalStore>, temp_dir: Option<TempDir>) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::open(local).expect("Failed to open dispatcher")),
            clock: AtomicI64::new(START_MILLIS),
            _temp_dir: temp_dir,
        }
    }

    /// Returns the replica directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self._temp_dir.as_ref().map(|d| d.path())
    }

    /// Dispatches `action`, advancing the clock by one second.
    pub fn dispatch(&self, action: Action) -> Vec<StoreId> {
        let now = self.clock.fetch_add(1_000, Ordering::SeqCst);
        self.dispatcher.dispatch_at(action, now)
    }

    /// Dispatches every action in order.
    pub fn dispatch_all(&self, actions: impl IntoIterator<Item = Action>) {
        for action in actions {
            self.dispatch(action);
        }
    }

    /// Returns a copy of every store.
    pub fn snapshot(&self) -> Stores {
        self.dispatcher.snapshot()
    }

    /// Returns the diff the next push would send.
    pub fn pending(&self) -> PushBody {
        self.dispatcher.pending_changes()
    }

    /// Reopens a file-based replica, reloading every store from disk.
    ///
    /// # Panics
    ///
    /// Panics if the replica is in-memory.
    pub fn reopen(self) -> Self {
        let temp_dir = self._temp_dir.expect("Only file replicas can be reopened");
        drop(self.dispatcher);
        let store = JsonFileStore::open(temp_dir.path(), false).expect("Failed to reopen replica");
        let mut reopened = Self::over(Arc::new(store), Some(temp_dir));
        reopened.clock = self.clock;
        reopened
    }
}

impl std::ops::Deref for TestReplica {
    type Target = Dispatcher;

    fn deref(&self) -> &Self::Target {
        &self.dispatcher
    }
}

/// Runs a test with a temporary in-memory replica.
pub fn with_replica<F, R>(f: F) -> R
where
    F: FnOnce(&TestReplica) -> R,
{
    let replica = TestReplica::memory();
    f(&replica)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use tagsync_protocol::{AddressPayload, ChangeSet, CollectionChanges, Record, TagPayload};

    /// Creates a replica whose addresses carry the given tags, all pending.
    pub fn tagged_replica(addresses: &[(&str, &[&str])]) -> TestReplica {
        let replica = TestReplica::memory();
        for (address, tags) in addresses {
            for tag in *tags {
                replica.dispatch(Action::add_address_tag(*address, *tag));
            }
        }
        replica
    }

    /// Creates a replica holding clean copies of `addresses` and their
    /// tags, as if just pulled from the server.
    pub fn synced_replica(addresses: &[(&str, &[&str])]) -> TestReplica {
        let replica = TestReplica::memory();
        let mut tags: Vec<Record<TagPayload>> = Vec::new();
        let mut created = Vec::new();
        for (address, labels) in addresses {
            let labels: Vec<String> = labels.iter().map(|t| t.to_string()).collect();
            for label in &labels {
                if !tags.iter().any(|t| t.payload.tag == *label) {
                    tags.push(
                        Record::new(TagPayload::new(label.clone()))
                            .with_times(START_MILLIS, START_MILLIS),
                    );
                }
            }
            created.push(
                Record::new(AddressPayload::new(*address, labels, ""))
                    .with_times(START_MILLIS, START_MILLIS),
            );
        }
        replica.dispatch(Action::SyncChanges(ChangeSet {
            tags: Some(CollectionChanges {
                created: tags,
                ..Default::default()
            }),
            addresses: Some(CollectionChanges {
                created,
                ..Default::default()
            }),
            transactions: None,
        }));
        replica
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagsync_protocol::Dirty;

    #[test]
    fn test_memory_replica() {
        let replica = TestReplica::memory();
        assert!(replica.path().is_none());
        assert!(replica.pending().is_empty());
        assert_eq!(replica.app().cursor(), 1);
    }

    #[test]
    fn test_with_replica() {
        with_replica(|replica| {
            let changed = replica.dispatch(Action::add_address_tag("1ABC", "vip"));
            assert!(changed.contains(&StoreId::Addresses));
        });
    }

    #[test]
    fn test_file_replica_reopens() {
        let replica = TestReplica::file();
        replica.dispatch(Action::add_address_tag("1ABC", "vip"));
        let replica = replica.reopen();
        let stores = replica.snapshot();
        assert_eq!(stores.addresses.tags("1abc"), ["vip".to_string()]);
        assert_eq!(
            stores.addresses.get("1abc").and_then(|r| r.dirty),
            Some(Dirty::Insert)
        );
    }

    #[test]
    fn test_synced_scenario_is_clean() {
        let replica = scenarios::synced_replica(&[("1ABC", &["vip", "cold"]), ("3xyz", &["vip"])]);
        assert!(replica.pending().is_empty());
        let stores = replica.snapshot();
        assert_eq!(stores.addresses.live_count(), 2);
        assert_eq!(stores.tags.live_count(), 2);
    }

    #[test]
    fn test_tagged_scenario_is_pending() {
        let replica = scenarios::tagged_replica(&[("1ABC", &["vip"])]);
        let pending = replica.pending();
        let addresses = pending.addresses.expect("addresses pending");
        assert_eq!(addresses.insert.len(), 1);
    }
}
