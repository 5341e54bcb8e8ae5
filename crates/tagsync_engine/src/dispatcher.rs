//! The action bus.
//!
//! Every store sees every action. Within one dispatch, stores run in a
//! dependency order computed once per action kind at construction time,
//! so a store that waits for another observes that store's post-action
//! state. Dispatches are serialized by an exclusive lock; reducers never
//! dispatch.

use crate::action::{Action, ActionKind};
use crate::app_state::{AppState, APP_STATE_KEY};
use crate::error::{SyncError, SyncResult};
use crate::persist::LocalStore;
use crate::store::{AddressStore, EntityStore, StoredPayload, TagStore, TxStore};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tagsync_protocol::{CollectionKind, Dataset, PushBody};
use tracing::{debug, warn};

/// Identifies one store on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreId {
    /// [`AppState`].
    App,
    /// Tag vocabulary.
    Tags,
    /// Address annotations.
    Addresses,
    /// Transaction annotations.
    Transactions,
}

impl StoreId {
    /// All stores, in tie-break order.
    pub const ALL: [StoreId; 4] = [
        StoreId::App,
        StoreId::Tags,
        StoreId::Addresses,
        StoreId::Transactions,
    ];

    /// Persistence key of this store's blob.
    pub fn persist_key(&self) -> &'static str {
        match self {
            StoreId::App => APP_STATE_KEY,
            StoreId::Tags => CollectionKind::Tags.store_key(),
            StoreId::Addresses => CollectionKind::Addresses.store_key(),
            StoreId::Transactions => CollectionKind::Transactions.store_key(),
        }
    }
}

impl From<CollectionKind> for StoreId {
    fn from(kind: CollectionKind) -> Self {
        match kind {
            CollectionKind::Tags => StoreId::Tags,
            CollectionKind::Addresses => StoreId::Addresses,
            CollectionKind::Transactions => StoreId::Transactions,
        }
    }
}

/// Inputs available to reducers during one dispatch.
pub struct ReduceContext<'a> {
    /// Dispatch time in epoch milliseconds.
    pub now: i64,
    /// Persistence, for reload actions.
    pub local: &'a dyn LocalStore,
}

/// A store that reacts to actions.
pub trait Reducer {
    /// Identity of the store on the bus.
    const ID: StoreId;

    /// Stores that must process `kind` before this one.
    fn wait_for(kind: ActionKind) -> &'static [StoreId];

    /// Applies an action. Returns true if the state changed.
    fn reduce(&mut self, action: &Action, ctx: &ReduceContext<'_>) -> bool;

    /// Serializes the state for persistence.
    fn to_blob(&self) -> SyncResult<serde_json::Value>;
}

/// All stores of a replica.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stores {
    /// Settings and cursors.
    pub app: AppState,
    /// Tag vocabulary.
    pub tags: TagStore,
    /// Address annotations.
    pub addresses: AddressStore,
    /// Transaction annotations.
    pub transactions: TxStore,
}

fn or_default<T: Default>(id: StoreId, loaded: SyncResult<T>) -> T {
    loaded.unwrap_or_else(|e| {
        warn!(store = ?id, error = %e, "ignoring unreadable persisted state");
        T::default()
    })
}

fn diff_into<P: StoredPayload>(store: &EntityStore<P>, body: &mut PushBody) {
    *P::push_section(body) = store.pending_diff();
}

fn export_into<P: StoredPayload>(store: &EntityStore<P>, dataset: &mut Dataset) {
    *P::export_section(dataset) = Some(store.export());
}

impl Stores {
    /// Loads every store from persistence.
    ///
    /// A blob that cannot be read or decoded is logged and replaced by
    /// the store's defaults.
    pub fn load(local: &dyn LocalStore) -> Self {
        Self {
            app: or_default(StoreId::App, AppState::load(local)),
            tags: or_default(StoreId::Tags, TagStore::load(local)),
            addresses: or_default(StoreId::Addresses, AddressStore::load(local)),
            transactions: or_default(StoreId::Transactions, TxStore::load(local)),
        }
    }

    fn wait_for(id: StoreId, kind: ActionKind) -> &'static [StoreId] {
        match id {
            StoreId::App => <AppState as Reducer>::wait_for(kind),
            StoreId::Tags => <TagStore as Reducer>::wait_for(kind),
            StoreId::Addresses => <AddressStore as Reducer>::wait_for(kind),
            StoreId::Transactions => <TxStore as Reducer>::wait_for(kind),
        }
    }

    fn reduce(&mut self, id: StoreId, action: &Action, ctx: &ReduceContext<'_>) -> bool {
        match id {
            StoreId::App => self.app.reduce(action, ctx),
            StoreId::Tags => Reducer::reduce(&mut self.tags, action, ctx),
            StoreId::Addresses => Reducer::reduce(&mut self.addresses, action, ctx),
            StoreId::Transactions => Reducer::reduce(&mut self.transactions, action, ctx),
        }
    }

    fn blob(&self, id: StoreId) -> SyncResult<serde_json::Value> {
        match id {
            StoreId::App => self.app.to_blob(),
            StoreId::Tags => Reducer::to_blob(&self.tags),
            StoreId::Addresses => Reducer::to_blob(&self.addresses),
            StoreId::Transactions => Reducer::to_blob(&self.transactions),
        }
    }

    /// Pending changes of every collection.
    pub fn pending_changes(&self) -> PushBody {
        let mut body = PushBody::default();
        diff_into(&self.tags, &mut body);
        diff_into(&self.addresses, &mut body);
        diff_into(&self.transactions, &mut body);
        body
    }

    /// Live records of every collection, markers stripped.
    pub fn export(&self) -> Dataset {
        let mut dataset = Dataset::default();
        export_into(&self.tags, &mut dataset);
        export_into(&self.addresses, &mut dataset);
        export_into(&self.transactions, &mut dataset);
        dataset
    }
}

/// Orders `StoreId::ALL` so every store follows the stores it depends on.
///
/// Kahn's algorithm; ready stores are taken in tie-break order. Returns
/// `None` if the dependencies form a cycle.
pub fn resolve_order<'a, F>(deps: F) -> Option<Vec<StoreId>>
where
    F: Fn(StoreId) -> &'a [StoreId],
{
    let mut remaining: HashMap<StoreId, BTreeSet<StoreId>> = StoreId::ALL
        .iter()
        .map(|&id| (id, deps(id).iter().copied().collect()))
        .collect();
    let mut order = Vec::with_capacity(StoreId::ALL.len());

    while !remaining.is_empty() {
        let next = StoreId::ALL
            .iter()
            .copied()
            .find(|id| remaining.get(id).is_some_and(|d| d.is_empty()))?;
        remaining.remove(&next);
        for waiting in remaining.values_mut() {
            waiting.remove(&next);
        }
        order.push(next);
    }
    Some(order)
}

/// Callback run after a dispatch that changed at least one store.
pub type Listener = Arc<dyn Fn(&Action, &[StoreId]) + Send + Sync>;

/// Serializes actions over the replica's stores and persists the results.
pub struct Dispatcher {
    stores: Mutex<Stores>,
    local: Arc<dyn LocalStore>,
    orders: HashMap<ActionKind, Vec<StoreId>>,
    listeners: RwLock<Vec<Listener>>,
}

impl Dispatcher {
    /// Opens a dispatcher over the persisted replica.
    pub fn open(local: Arc<dyn LocalStore>) -> SyncResult<Self> {
        let stores = Stores::load(&*local);
        Self::with_stores(local, stores)
    }

    /// Creates a dispatcher over already loaded stores.
    pub fn with_stores(local: Arc<dyn LocalStore>, stores: Stores) -> SyncResult<Self> {
        let mut orders = HashMap::new();
        for kind in ActionKind::ALL {
            let order = resolve_order(|id| Stores::wait_for(id, kind)).ok_or_else(|| {
                SyncError::DependencyCycle {
                    action: format!("{kind:?}"),
                }
            })?;
            orders.insert(kind, order);
        }
        Ok(Self {
            stores: Mutex::new(stores),
            local,
            orders,
            listeners: RwLock::new(Vec::new()),
        })
    }

    /// Dispatches an action stamped with the current time.
    pub fn dispatch(&self, action: Action) -> Vec<StoreId> {
        self.dispatch_at(action, crate::now_millis())
    }

    /// Dispatches an action stamped with `now`.
    ///
    /// Returns the stores that changed. Changed stores are persisted before
    /// the lock is released; listeners run after. A failed write is logged
    /// and the in-memory state stays authoritative.
    pub fn dispatch_at(&self, action: Action, now: i64) -> Vec<StoreId> {
        let kind = action.kind();
        let changed = {
            let mut stores = self.stores.lock();
            let ctx = ReduceContext {
                now,
                local: &*self.local,
            };
            let mut changed = Vec::new();
            for &id in self.order_for(kind) {
                if stores.reduce(id, &action, &ctx) {
                    changed.push(id);
                }
            }
            for &id in &changed {
                let saved = stores
                    .blob(id)
                    .and_then(|blob| self.local.save(id.persist_key(), &blob));
                if let Err(e) = saved {
                    warn!(store = ?id, error = %e, "failed to persist store");
                }
            }
            changed
        };

        debug!(action = ?kind, changed = ?changed, "dispatched");
        if !changed.is_empty() {
            let listeners = self.listeners.read().clone();
            for listener in listeners {
                listener(&action, &changed);
            }
        }
        changed
    }

    /// The resolved store order for an action kind.
    pub fn order_for(&self, kind: ActionKind) -> &[StoreId] {
        self.orders.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Registers a change listener.
    pub fn subscribe(&self, listener: Listener) {
        self.listeners.write().push(listener);
    }

    /// Runs `f` against the current stores.
    pub fn read<R>(&self, f: impl FnOnce(&Stores) -> R) -> R {
        f(&*self.stores.lock())
    }

    /// A copy of the current stores.
    pub fn snapshot(&self) -> Stores {
        self.read(Stores::clone)
    }

    /// A copy of the App State.
    pub fn app(&self) -> AppState {
        self.read(|stores| stores.app.clone())
    }

    /// Pending changes of every collection.
    pub fn pending_changes(&self) -> PushBody {
        self.read(Stores::pending_changes)
    }

    /// Live records of every collection, for backup.
    pub fn export_dataset(&self) -> Dataset {
        self.read(Stores::export)
    }

    /// The persistence backing this replica.
    pub fn local(&self) -> &Arc<dyn LocalStore> {
        &self.local
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("orders", &self.orders.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tagsync_protocol::{AddressPayload, Dirty, Items, Record, TagPayload};

    fn dispatcher() -> Dispatcher {
        Dispatcher::open(Arc::new(MemoryStore::new())).unwrap()
    }

    #[test]
    fn annotated_stores_follow_tags() {
        let bus = dispatcher();
        let order = bus.order_for(ActionKind::AddTag);
        let tags = order.iter().position(|s| *s == StoreId::Tags).unwrap();
        let addresses = order.iter().position(|s| *s == StoreId::Addresses).unwrap();
        assert!(tags < addresses);
        assert_eq!(bus.order_for(ActionKind::ClearDatabase)[0], StoreId::App);
    }

    #[test]
    fn cycle_is_detected() {
        let deps = |id: StoreId| -> &'static [StoreId] {
            match id {
                StoreId::Tags => &[StoreId::Addresses],
                StoreId::Addresses => &[StoreId::Tags],
                _ => &[],
            }
        };
        assert!(resolve_order(deps).is_none());
    }

    #[test]
    fn ties_break_in_declared_order() {
        let deps = |id: StoreId| -> &'static [StoreId] {
            match id {
                StoreId::App => &[StoreId::Transactions],
                _ => &[],
            }
        };
        assert_eq!(
            resolve_order(deps).unwrap(),
            vec![
                StoreId::Tags,
                StoreId::Addresses,
                StoreId::Transactions,
                StoreId::App
            ]
        );
    }

    #[test]
    fn add_tag_registers_tag_vocabulary() {
        let bus = dispatcher();
        let changed = bus.dispatch_at(Action::add_address_tag("1ABC", "vip"), 10);
        assert_eq!(changed, vec![StoreId::Tags, StoreId::Addresses]);

        let stores = bus.snapshot();
        assert_eq!(stores.tags.get("vip").unwrap().dirty, Some(Dirty::Insert));
        assert_eq!(stores.addresses.tags("1abc"), ["vip".to_string()]);
    }

    #[test]
    fn changed_stores_are_persisted() {
        let local = Arc::new(MemoryStore::new());
        let bus = Dispatcher::open(local.clone()).unwrap();
        bus.dispatch_at(Action::add_address_tag("a", "t"), 10);
        bus.dispatch_at(Action::UpdateLastSyncTime(55), 11);

        let reopened = Dispatcher::open(local).unwrap();
        assert_eq!(reopened.snapshot(), bus.snapshot());
        assert_eq!(reopened.app().cursor(), 55);
    }

    #[test]
    fn unchanged_dispatch_skips_listeners() {
        let bus = dispatcher();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        bus.subscribe(Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        bus.dispatch_at(Action::remove_address("nothing"), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        bus.dispatch_at(Action::add_address_tag("a", "t"), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn merge_data_reaches_every_collection() {
        let bus = dispatcher();
        bus.dispatch_at(Action::add_address_tag("x", "local"), 1);
        let dataset = Dataset {
            user_tags: Some(Items::new(vec![Record::new(TagPayload::new("imported"))])),
            user_addresses: Some(Items::new(vec![Record::new(AddressPayload::new(
                "X",
                vec!["imported".into()],
                "",
            ))])),
            ..Default::default()
        };
        let changed = bus.dispatch_at(Action::MergeData(dataset), 3);
        assert_eq!(changed, vec![StoreId::Tags, StoreId::Addresses]);

        let stores = bus.snapshot();
        assert!(stores.tags.get("imported").is_some());
        assert_eq!(
            stores.addresses.tags("x"),
            ["local".to_string(), "imported".to_string()]
        );
        assert_eq!(stores.addresses.get("x").unwrap().dirty, Some(Dirty::Update));
    }

    #[test]
    fn clear_database_wipes_everything() {
        let bus = dispatcher();
        bus.dispatch_at(Action::add_address_tag("a", "t"), 1);
        bus.dispatch_at(Action::TogglePushChanges(Some(false)), 1);
        bus.dispatch_at(Action::ClearDatabase, 2);
        assert_eq!(bus.snapshot(), Stores::default());
    }

    #[test]
    fn reset_from_store_restores_persisted_state() {
        let local = Arc::new(MemoryStore::new());
        let writer = Dispatcher::open(local.clone()).unwrap();
        let reader = Dispatcher::open(local).unwrap();
        writer.dispatch_at(Action::add_address_tag("a", "t"), 1);

        assert!(reader.snapshot().addresses.get("a").is_none());
        reader.dispatch_at(Action::ResetFromStore, 2);
        assert!(reader.snapshot().addresses.get("a").is_some());
    }

    #[test]
    fn export_strips_markers() {
        let bus = dispatcher();
        bus.dispatch_at(Action::add_address_tag("a", "t"), 1);
        bus.dispatch_at(Action::add_address_tag("b", "t"), 1);
        bus.dispatch_at(Action::remove_address("b"), 2);

        let dataset = bus.export_dataset();
        let addresses = dataset.user_addresses.unwrap().items;
        assert_eq!(addresses.len(), 1);
        assert_eq!(addresses[0].dirty, None);
    }
}
