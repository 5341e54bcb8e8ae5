//! Entity stores.
//!
//! One [`EntityStore`] per collection holds the replica's records and the
//! per-record dirty/tombstone state machine:
//!
//! ```text
//!   (absent) --mutate--> Insert --push ok--> clean --mutate--> Update
//!                          |                   |                 |
//!                       remove              remove            remove
//!                          v                   v                 v
//!                 tmpRemoved only     removed+Update in items, also in tmpRemoved
//! ```
//!
//! `items` holds every known record keyed by normalized key. `tmpRemoved`
//! holds records removed locally, whether or not the removal was pushed.

use crate::action::{Action, ActionKind};
use crate::dispatcher::{ReduceContext, Reducer, StoreId};
use crate::error::SyncResult;
use crate::persist::LocalStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tagsync_protocol::{
    dedupe_tags, AddressPayload, Annotated, ChangeSet, CollectionChanges, CollectionDiff,
    CollectionKind, Dataset, Dirty, Items, Payload, PushBody, Record, TagPayload, TxPayload,
};
use tracing::warn;

/// Binds a payload type to its sections of datasets, change sets and push
/// bodies.
pub trait StoredPayload: Payload {
    /// This collection's section of an import dataset.
    fn dataset_section(dataset: &Dataset) -> Option<&Items<Self>>;

    /// This collection's section of a change set.
    fn change_section(changes: &ChangeSet) -> Option<&CollectionChanges<Self>>;

    /// This collection's slot in a push body.
    fn push_section(body: &mut PushBody) -> &mut Option<CollectionDiff<Self>>;

    /// This collection's diff in a pushed body.
    fn pushed_section(body: &PushBody) -> Option<&CollectionDiff<Self>>;

    /// This collection's slot in an export dataset.
    fn export_section(dataset: &mut Dataset) -> &mut Option<Items<Self>>;
}

impl StoredPayload for TagPayload {
    fn dataset_section(dataset: &Dataset) -> Option<&Items<Self>> {
        dataset.user_tags.as_ref()
    }

    fn change_section(changes: &ChangeSet) -> Option<&CollectionChanges<Self>> {
        changes.tags.as_ref()
    }

    fn push_section(body: &mut PushBody) -> &mut Option<CollectionDiff<Self>> {
        &mut body.tags
    }

    fn pushed_section(body: &PushBody) -> Option<&CollectionDiff<Self>> {
        body.tags.as_ref()
    }

    fn export_section(dataset: &mut Dataset) -> &mut Option<Items<Self>> {
        &mut dataset.user_tags
    }
}

impl StoredPayload for AddressPayload {
    fn dataset_section(dataset: &Dataset) -> Option<&Items<Self>> {
        dataset.user_addresses.as_ref()
    }

    fn change_section(changes: &ChangeSet) -> Option<&CollectionChanges<Self>> {
        changes.addresses.as_ref()
    }

    fn push_section(body: &mut PushBody) -> &mut Option<CollectionDiff<Self>> {
        &mut body.addresses
    }

    fn pushed_section(body: &PushBody) -> Option<&CollectionDiff<Self>> {
        body.addresses.as_ref()
    }

    fn export_section(dataset: &mut Dataset) -> &mut Option<Items<Self>> {
        &mut dataset.user_addresses
    }
}

impl StoredPayload for TxPayload {
    fn dataset_section(dataset: &Dataset) -> Option<&Items<Self>> {
        dataset.user_txs.as_ref()
    }

    fn change_section(changes: &ChangeSet) -> Option<&CollectionChanges<Self>> {
        changes.transactions.as_ref()
    }

    fn push_section(body: &mut PushBody) -> &mut Option<CollectionDiff<Self>> {
        &mut body.transactions
    }

    fn pushed_section(body: &PushBody) -> Option<&CollectionDiff<Self>> {
        body.transactions.as_ref()
    }

    fn export_section(dataset: &mut Dataset) -> &mut Option<Items<Self>> {
        &mut dataset.user_txs
    }
}

/// Persisted shape of one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(serialize = "P: Serialize", deserialize = "P: Deserialize<'de>"))]
pub struct CollectionState<P> {
    /// Known records by normalized key.
    #[serde(default)]
    pub items: BTreeMap<String, Record<P>>,
    /// Locally removed records by normalized key.
    #[serde(default)]
    pub tmp_removed: BTreeMap<String, Record<P>>,
}

impl<P> Default for CollectionState<P> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
            tmp_removed: BTreeMap::new(),
        }
    }
}

/// The replica of one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityStore<P> {
    state: CollectionState<P>,
}

/// Store of the tag vocabulary.
pub type TagStore = EntityStore<TagPayload>;
/// Store of address annotations.
pub type AddressStore = EntityStore<AddressPayload>;
/// Store of transaction annotations.
pub type TxStore = EntityStore<TxPayload>;

impl<P> Default for EntityStore<P> {
    fn default() -> Self {
        Self {
            state: CollectionState::default(),
        }
    }
}

impl<P: StoredPayload> EntityStore<P> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing state.
    pub fn from_state(state: CollectionState<P>) -> Self {
        Self { state }
    }

    /// Loads the persisted state, or an empty store if none was saved.
    pub fn load(local: &dyn LocalStore) -> SyncResult<Self> {
        match local.load(P::KIND.store_key())? {
            Some(blob) => Ok(Self::from_state(serde_json::from_value(blob)?)),
            None => Ok(Self::new()),
        }
    }

    /// Serializes the state for persistence.
    pub fn to_blob(&self) -> SyncResult<serde_json::Value> {
        Ok(serde_json::to_value(&self.state)?)
    }

    /// The underlying state.
    pub fn state(&self) -> &CollectionState<P> {
        &self.state
    }

    fn key(id: &str) -> String {
        P::KIND.normalize_key(id)
    }

    fn live(&self, key: &str) -> Option<&Record<P>> {
        self.state.items.get(key).filter(|r| r.is_live())
    }

    /// Returns the live record for `id`.
    pub fn get(&self, id: &str) -> Option<&Record<P>> {
        self.live(&Self::key(id))
    }

    /// Live records followed by every locally removed record.
    pub fn active_records(&self) -> Vec<&Record<P>> {
        self.state
            .items
            .values()
            .filter(|r| r.is_live())
            .chain(self.state.tmp_removed.values())
            .collect()
    }

    /// Live records only.
    pub fn live_records(&self) -> impl Iterator<Item = &Record<P>> {
        self.state.items.values().filter(|r| r.is_live())
    }

    /// Number of live records.
    pub fn live_count(&self) -> usize {
        self.live_records().count()
    }

    /// Computes the changes waiting to be pushed.
    ///
    /// Tombstones go to `remove` regardless of their dirty state. Returns
    /// `None` when nothing is pending.
    pub fn pending_diff(&self) -> Option<CollectionDiff<P>> {
        let mut diff = CollectionDiff::default();
        for (key, record) in &self.state.items {
            if record.removed {
                diff.remove.push(key.clone());
                continue;
            }
            match record.dirty {
                Some(Dirty::Insert) => diff.insert.push(record.clone()),
                Some(Dirty::Update) => diff.update.push(record.clone()),
                None => {}
            }
        }
        if diff.is_empty() {
            None
        } else {
            Some(diff)
        }
    }

    /// Live records as an export section, markers stripped.
    pub fn export(&self) -> Items<P> {
        Items::new(self.live_records().map(Record::exported).collect())
    }

    fn write_live(&mut self, key: String, record: Record<P>) {
        self.state.tmp_removed.remove(&key);
        self.state.items.insert(key, record);
    }

    fn tombstone(&mut self, key: String, mut record: Record<P>) {
        record.removed = true;
        if record.dirty == Some(Dirty::Insert) {
            // Never reached the server: nothing to delete remotely.
            self.state.items.remove(&key);
        } else {
            record.dirty = Some(Dirty::Update);
            self.state.items.insert(key.clone(), record.clone());
        }
        self.state.tmp_removed.insert(key, record);
    }

    /// Tombstones a live record. No-op if absent or already removed.
    pub fn remove_record(&mut self, id: &str, now: i64) -> bool {
        let key = Self::key(id);
        let Some(mut record) = self.live(&key).cloned() else {
            return false;
        };
        record.updated_time = Some(now);
        self.tombstone(key, record);
        true
    }

    /// Unions incoming records over local ones.
    ///
    /// Known records become update-pending, new ones insert-pending. Tags
    /// are deduplicated either way.
    pub fn merge(&mut self, incoming: &[Record<P>], now: i64) -> bool {
        for record in incoming {
            let key = record.key();
            let existing = self.state.items.get(&key);
            let mut payload = record.payload.clone();
            match existing {
                Some(existing) => payload.absorb(&existing.payload),
                None => payload.absorb(&P::blank(record.payload.id())),
            }
            let dirty = existing.map(|_| Dirty::Update).unwrap_or(Dirty::Insert);
            let merged = Record {
                payload,
                created_time: Some(record.created_time.unwrap_or(now)),
                updated_time: Some(record.updated_time.unwrap_or(now)),
                removed: false,
                dirty: Some(dirty),
            };
            self.write_live(key, merged);
        }
        !incoming.is_empty()
    }

    /// Replaces the whole store with insert-pending copies of `records`.
    pub fn reset_from(&mut self, records: &[Record<P>], now: i64) {
        let mut state = CollectionState::default();
        for record in records {
            let fresh = Record {
                payload: record.payload.clone(),
                created_time: Some(record.created_time.unwrap_or(now)),
                updated_time: Some(record.updated_time.unwrap_or(now)),
                removed: false,
                dirty: Some(Dirty::Insert),
            };
            state.items.insert(record.key(), fresh);
        }
        self.state = state;
    }

    /// Empties the store.
    pub fn reset_empty(&mut self) {
        self.state = CollectionState::default();
    }

    /// Marks every record without a dirty flag insert-pending.
    pub fn mark_all_pending(&mut self) -> bool {
        let mut changed = false;
        for record in self.state.items.values_mut() {
            if record.dirty.is_none() {
                record.dirty = Some(Dirty::Insert);
                changed = true;
            }
        }
        changed
    }

    /// Moves the listed records from dirty state `from` to `to`.
    pub fn transition_dirty(&mut self, keys: &[String], from: Dirty, to: Dirty) -> bool {
        let keys: BTreeSet<String> = keys.iter().map(|k| Self::key(k)).collect();
        let mut changed = false;
        for (key, record) in self.state.items.iter_mut() {
            if keys.contains(key) && record.dirty == Some(from) {
                record.dirty = Some(to);
                changed = true;
            }
        }
        changed
    }

    /// Applies authoritative changes.
    ///
    /// Deleted keys leave `items`; created and updated records replace the
    /// local entry verbatim and leave `tmpRemoved`. Idempotent.
    pub fn reconcile(&mut self, changes: &CollectionChanges<P>) -> bool {
        for key in changes.deleted_keys() {
            self.state.items.remove(&key);
        }
        for record in changes.created.iter().chain(&changes.updated) {
            self.write_live(record.key(), record.clone());
        }
        !changes.is_empty()
    }

    /// Applies an accepted push.
    ///
    /// A pushed record still identical to the local one becomes clean. One
    /// modified in the meantime stays pending, demoted to update-pending if
    /// it was pushed as an insert. A pushed tombstone leaves `items` only if
    /// it is still a tombstone.
    pub fn confirm_push(&mut self, diff: &CollectionDiff<P>) -> bool {
        let mut changed = false;
        for pushed in diff.insert.iter().chain(&diff.update) {
            let key = pushed.key();
            let Some(current) = self.state.items.get_mut(&key) else {
                continue;
            };
            if *current == *pushed {
                current.dirty = None;
                changed = true;
            } else if current.dirty == Some(Dirty::Insert) {
                current.dirty = Some(Dirty::Update);
                changed = true;
            }
        }
        for key in &diff.remove {
            if self.state.items.get(key).is_some_and(|r| r.removed) {
                self.state.items.remove(key);
                changed = true;
            }
        }
        changed
    }

    fn reduce_common(&mut self, action: &Action, ctx: &ReduceContext<'_>) -> bool {
        match action {
            Action::RemoveRecord { target, id } if *target == P::KIND => {
                self.remove_record(id, ctx.now)
            }
            Action::MergeData(dataset) => P::dataset_section(dataset)
                .map(|section| self.merge(&section.items, ctx.now))
                .unwrap_or(false),
            Action::ResetFromData(dataset) => {
                match P::dataset_section(dataset) {
                    Some(section) => self.reset_from(&section.items, ctx.now),
                    None => self.reset_empty(),
                }
                true
            }
            Action::ResetFromStore => match Self::load(ctx.local) {
                Ok(store) => {
                    *self = store;
                    true
                }
                Err(e) => {
                    warn!(collection = %P::KIND, error = %e, "failed to reload collection");
                    false
                }
            },
            Action::ClearDatabase => {
                self.reset_empty();
                true
            }
            Action::MarkAllAsDirty => self.mark_all_pending(),
            Action::SyncChanges(changes) => P::change_section(changes)
                .map(|section| self.reconcile(section))
                .unwrap_or(false),
            Action::ConfirmPush(body) => P::pushed_section(body)
                .map(|diff| self.confirm_push(diff))
                .unwrap_or(false),
            Action::UpdateDirtyStatus {
                collection,
                keys,
                from,
                to,
            } if *collection == P::KIND => self.transition_dirty(keys, *from, *to),
            _ => false,
        }
    }
}

impl<P: StoredPayload + Annotated> EntityStore<P> {
    /// Tags of a live record, empty if absent.
    pub fn tags(&self, id: &str) -> &[String] {
        self.get(id).map(|r| r.payload.tags()).unwrap_or(&[])
    }

    /// Note of a live record, empty if absent.
    pub fn note(&self, id: &str) -> &str {
        self.get(id).map(|r| r.payload.note()).unwrap_or("")
    }

    fn write_mutation(&mut self, key: String, prev: Option<Record<P>>, payload: P, now: i64) {
        let created = prev.as_ref().and_then(|r| r.created_time).unwrap_or(now);
        let dirty = match &prev {
            Some(record) => record.dirty.unwrap_or(Dirty::Update),
            None => Dirty::Insert,
        };
        let record = Record {
            payload,
            created_time: Some(created),
            updated_time: Some(now),
            removed: false,
            dirty: Some(dirty),
        };
        self.write_live(key, record);
    }

    fn tombstone_mutation(&mut self, key: String, prev: Record<P>, payload: P, now: i64) {
        let record = Record {
            payload,
            created_time: Some(prev.created_time.unwrap_or(now)),
            updated_time: Some(now),
            removed: true,
            dirty: prev.dirty,
        };
        self.tombstone(key, record);
    }

    /// Adds a tag, creating the record if needed.
    pub fn add_tag(&mut self, id: &str, tag: &str, now: i64) -> bool {
        let tag = tag.trim();
        if tag.is_empty() {
            return false;
        }
        let key = Self::key(id);
        let prev = self.live(&key).cloned();
        let mut payload = prev
            .as_ref()
            .map(|r| r.payload.clone())
            .unwrap_or_else(|| P::blank(id));
        payload.set_id(id);
        let mut tags = payload.tags().to_vec();
        tags.push(tag.to_string());
        payload.set_tags(dedupe_tags(tags));
        self.write_mutation(key, prev, payload, now);
        true
    }

    /// Removes a tag. A record left with no tags and no note is tombstoned.
    pub fn remove_tag(&mut self, id: &str, tag: &str, now: i64) -> bool {
        let key = Self::key(id);
        let Some(prev) = self.live(&key).cloned() else {
            return false;
        };
        let tag_key = CollectionKind::Tags.normalize_key(tag);
        let mut payload = prev.payload.clone();
        payload.set_id(id);
        payload.set_tags(
            prev.payload
                .tags()
                .iter()
                .filter(|t| CollectionKind::Tags.normalize_key(t) != tag_key)
                .cloned()
                .collect(),
        );
        if payload.is_blank() {
            self.tombstone_mutation(key, prev, payload, now);
        } else {
            self.write_mutation(key, Some(prev), payload, now);
        }
        true
    }

    /// Replaces tags and note together.
    ///
    /// Blank input tombstones an existing record and is a no-op otherwise.
    pub fn replace_tags_and_note(&mut self, id: &str, tags: &[String], note: &str, now: i64) -> bool {
        let key = Self::key(id);
        let prev = self.live(&key).cloned();
        let mut payload = prev
            .as_ref()
            .map(|r| r.payload.clone())
            .unwrap_or_else(|| P::blank(id));
        payload.set_id(id);
        payload.set_tags(dedupe_tags(
            tags.iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        ));
        payload.set_note(note.to_string());
        match (payload.is_blank(), prev) {
            (true, None) => false,
            (true, Some(prev)) => {
                self.tombstone_mutation(key, prev, payload, now);
                true
            }
            (false, prev) => {
                self.write_mutation(key, prev, payload, now);
                true
            }
        }
    }

    fn reduce_annotated(&mut self, action: &Action, ctx: &ReduceContext<'_>) -> bool {
        match action {
            Action::AddTag { target, id, tag } if *target == P::KIND => {
                self.add_tag(id, tag, ctx.now)
            }
            Action::RemoveTag { target, id, tag } if *target == P::KIND => {
                self.remove_tag(id, tag, ctx.now)
            }
            Action::ReplaceTagsAndNote {
                target,
                id,
                tags,
                note,
            } if *target == P::KIND => self.replace_tags_and_note(id, tags, note, ctx.now),
            _ => self.reduce_common(action, ctx),
        }
    }
}

impl TagStore {
    /// Makes sure every tag exists as a live record.
    pub fn ensure_tags<'a>(&mut self, tags: impl IntoIterator<Item = &'a str>, now: i64) -> bool {
        let mut changed = false;
        for tag in tags {
            let tag = tag.trim();
            let key = Self::key(tag);
            if key.is_empty() || self.live(&key).is_some() {
                continue;
            }
            let known = self.state.items.get(&key).or(self.state.tmp_removed.get(&key));
            let created = known.and_then(|r| r.created_time).unwrap_or(now);
            // A tombstone still in items was pushed before: revive as update.
            let dirty = if self.state.items.contains_key(&key) {
                Dirty::Update
            } else {
                Dirty::Insert
            };
            let record = Record::new(TagPayload::new(tag))
                .with_times(created, now)
                .with_dirty(dirty);
            self.write_live(key, record);
            changed = true;
        }
        changed
    }
}

impl Reducer for TagStore {
    const ID: StoreId = StoreId::Tags;

    fn wait_for(kind: ActionKind) -> &'static [StoreId] {
        match kind {
            ActionKind::ResetFromData | ActionKind::ResetFromStore | ActionKind::ClearDatabase => {
                &[StoreId::App]
            }
            _ => &[],
        }
    }

    fn reduce(&mut self, action: &Action, ctx: &ReduceContext<'_>) -> bool {
        match action {
            Action::AddTag { tag, .. } => self.ensure_tags([tag.as_str()], ctx.now),
            Action::ReplaceTagsAndNote { tags, .. } => {
                self.ensure_tags(tags.iter().map(String::as_str), ctx.now)
            }
            _ => self.reduce_common(action, ctx),
        }
    }

    fn to_blob(&self) -> SyncResult<serde_json::Value> {
        EntityStore::to_blob(self)
    }
}

fn annotated_wait_for(kind: ActionKind) -> &'static [StoreId] {
    match kind {
        ActionKind::AddTag
        | ActionKind::ReplaceTagsAndNote
        | ActionKind::MergeData
        | ActionKind::SyncChanges
        | ActionKind::ConfirmPush => &[StoreId::Tags],
        ActionKind::ResetFromData | ActionKind::ResetFromStore | ActionKind::ClearDatabase => {
            &[StoreId::App]
        }
        _ => &[],
    }
}

impl Reducer for AddressStore {
    const ID: StoreId = StoreId::Addresses;

    fn wait_for(kind: ActionKind) -> &'static [StoreId] {
        annotated_wait_for(kind)
    }

    fn reduce(&mut self, action: &Action, ctx: &ReduceContext<'_>) -> bool {
        self.reduce_annotated(action, ctx)
    }

    fn to_blob(&self) -> SyncResult<serde_json::Value> {
        EntityStore::to_blob(self)
    }
}

impl Reducer for TxStore {
    const ID: StoreId = StoreId::Transactions;

    fn wait_for(kind: ActionKind) -> &'static [StoreId] {
        annotated_wait_for(kind)
    }

    fn reduce(&mut self, action: &Action, ctx: &ReduceContext<'_>) -> bool {
        self.reduce_annotated(action, ctx)
    }

    fn to_blob(&self) -> SyncResult<serde_json::Value> {
        EntityStore::to_blob(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryStore;
    use tagsync_protocol::DeletedRef;

    const T0: i64 = 1_000;
    const T1: i64 = 2_000;

    fn clean(address: &str, tags: &[&str]) -> Record<AddressPayload> {
        Record::new(AddressPayload::new(
            address,
            tags.iter().map(|t| t.to_string()).collect(),
            "",
        ))
        .with_times(T0, T0)
    }

    fn seeded(records: Vec<Record<AddressPayload>>) -> AddressStore {
        let mut store = AddressStore::new();
        store.reconcile(&CollectionChanges {
            created: records,
            ..Default::default()
        });
        store
    }

    #[test]
    fn add_tag_creates_insert_pending_record() {
        let mut store = AddressStore::new();
        assert!(store.add_tag("1ABC", "vip", T0));

        let record = store.get("1abc").unwrap();
        assert_eq!(record.dirty, Some(Dirty::Insert));
        assert_eq!(record.payload.address_tags, vec!["vip".to_string()]);
        assert_eq!(record.created_time, Some(T0));
        assert_eq!(store.state().items.keys().next().unwrap(), "1abc");
    }

    #[test]
    fn add_tag_dedupes_case_insensitively() {
        let mut store = AddressStore::new();
        store.add_tag("a", "VIP", T0);
        store.add_tag("a", " vip ", T1);
        assert_eq!(store.tags("a"), ["VIP".to_string()]);
        assert!(!store.add_tag("a", "   ", T1));
    }

    #[test]
    fn mutating_clean_record_marks_update() {
        let mut store = seeded(vec![clean("x", &["a"])]);
        store.add_tag("x", "b", T1);
        let record = store.get("x").unwrap();
        assert_eq!(record.dirty, Some(Dirty::Update));
        assert_eq!(record.created_time, Some(T0));
        assert_eq!(record.updated_time, Some(T1));
    }

    #[test]
    fn removing_insert_pending_record_leaves_items() {
        let mut store = AddressStore::new();
        store.add_tag("y", "t", T0);
        assert!(store.remove_record("y", T1));

        assert!(store.state().items.is_empty());
        assert!(store.state().tmp_removed.contains_key("y"));
        assert!(store.pending_diff().is_none());
    }

    #[test]
    fn removing_clean_record_keeps_tombstone() {
        let mut store = seeded(vec![clean("x", &["a"])]);
        store.remove_record("x", T1);

        let tombstone = &store.state().items["x"];
        assert!(tombstone.removed);
        assert_eq!(tombstone.dirty, Some(Dirty::Update));
        assert!(store.state().tmp_removed.contains_key("x"));

        let diff = store.pending_diff().unwrap();
        assert_eq!(diff.remove, vec!["x".to_string()]);
        assert!(diff.insert.is_empty() && diff.update.is_empty());
    }

    #[test]
    fn remove_on_absent_or_removed_is_noop() {
        let mut store = seeded(vec![clean("x", &["a"])]);
        assert!(!store.remove_record("missing", T1));
        store.remove_record("x", T1);
        let before = store.clone();
        assert!(!store.remove_record("x", T1));
        assert_eq!(store, before);
    }

    #[test]
    fn removing_last_tag_tombstones() {
        let mut store = seeded(vec![clean("x", &["a"])]);
        assert!(store.remove_tag("x", "A", T1));
        assert!(store.get("x").is_none());
        assert!(store.state().items["x"].removed);
    }

    #[test]
    fn replace_with_blank_on_absent_is_noop() {
        let mut store = AddressStore::new();
        assert!(!store.replace_tags_and_note("z", &[], "", T0));
        assert!(store.state().items.is_empty());
        assert!(store.state().tmp_removed.is_empty());
    }

    #[test]
    fn replace_sets_tags_and_note() {
        let mut store = AddressStore::new();
        let tags = vec!["a".to_string(), "A".to_string(), " ".to_string()];
        store.replace_tags_and_note("z", &tags, "memo", T0);
        assert_eq!(store.tags("z"), ["a".to_string()]);
        assert_eq!(store.note("z"), "memo");
    }

    #[test]
    fn readd_after_remove_clears_tmp_removed() {
        let mut store = AddressStore::new();
        store.add_tag("y", "t", T0);
        store.remove_record("y", T0);
        store.add_tag("y", "u", T1);
        assert!(store.state().tmp_removed.is_empty());
        assert_eq!(store.get("y").unwrap().dirty, Some(Dirty::Insert));
    }

    #[test]
    fn active_records_include_tmp_removed() {
        let mut store = seeded(vec![clean("x", &["a"]), clean("w", &["b"])]);
        store.remove_record("x", T1);
        let active = store.active_records();
        assert_eq!(active.len(), 2);
        assert_eq!(store.live_count(), 1);
    }

    #[test]
    fn reconcile_deletion_drops_tombstone() {
        let mut store = seeded(vec![clean("x", &["a"])]);
        store.remove_record("x", T1);
        store.reconcile(&CollectionChanges {
            deleted: vec![DeletedRef::Key("x".into())],
            ..Default::default()
        });
        assert!(store.state().items.is_empty());
        assert!(store.pending_diff().is_none());
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut store = AddressStore::new();
        store.add_tag("q", "t", T0);
        let changes = CollectionChanges {
            created: vec![clean("q", &["t"]), clean("r", &["s"])],
            deleted: vec![DeletedRef::Key("gone".into())],
            ..Default::default()
        };
        store.reconcile(&changes);
        let once = store.clone();
        store.reconcile(&changes);
        assert_eq!(store, once);
        assert!(store.pending_diff().is_none());
    }

    #[test]
    fn merge_unions_tags_and_marks_pending() {
        let mut store = seeded(vec![clean("x", &["a"])]);
        store.merge(&[clean("x", &["b"]), clean("n", &["c"])], T1);

        let x = store.get("x").unwrap();
        assert_eq!(x.payload.address_tags, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(x.dirty, Some(Dirty::Update));
        assert_eq!(store.get("n").unwrap().dirty, Some(Dirty::Insert));
    }

    #[test]
    fn merge_over_insert_pending_marks_update() {
        let mut store = AddressStore::new();
        store.add_tag("1abc", "local", T0);
        store.merge(&[clean("1ABC", &["imp"])], T1);

        let record = store.get("1abc").unwrap();
        assert_eq!(record.dirty, Some(Dirty::Update));
        assert_eq!(record.payload.address_tags, vec!["local".to_string(), "imp".to_string()]);
    }

    #[test]
    fn merge_dedupes_tags_of_new_records() {
        let mut store = AddressStore::new();
        store.merge(&[clean("n", &["vip", "VIP", " vip "])], T1);
        assert_eq!(store.tags("n"), ["vip".to_string()]);
    }

    #[test]
    fn collection_state_decodes_without_sections() {
        let state: CollectionState<TagPayload> = serde_json::from_value(serde_json::json!({
            "items": { "vip": { "tag": "vip", "dirty": 1 } }
        }))
        .unwrap();
        assert_eq!(state.items["vip"].dirty, Some(Dirty::Insert));
        assert!(state.tmp_removed.is_empty());
    }

    #[test]
    fn confirm_push_skips_records_edited_in_flight() {
        let mut store = seeded(vec![clean("gone", &["a"])]);
        store.add_tag("kept", "a", T0);
        store.add_tag("edited", "a", T0);
        store.remove_record("gone", T0);
        let diff = store.pending_diff().unwrap();

        store.add_tag("edited", "b", T1);
        assert!(store.confirm_push(&diff));

        assert_eq!(store.get("kept").unwrap().dirty, None);
        assert_eq!(store.get("edited").unwrap().dirty, Some(Dirty::Update));
        assert!(!store.state().items.contains_key("gone"));
        assert!(!store.confirm_push(&diff));
    }

    #[test]
    fn reset_from_marks_everything_insert() {
        let mut store = seeded(vec![clean("x", &["a"])]);
        store.reset_from(&[Record::new(AddressPayload::new("N", vec!["t".into()], ""))], T1);
        assert!(store.get("x").is_none());
        let n = store.get("n").unwrap();
        assert_eq!(n.dirty, Some(Dirty::Insert));
        assert_eq!(n.created_time, Some(T1));
    }

    #[test]
    fn mark_all_pending_skips_dirty_records() {
        let mut store = seeded(vec![clean("x", &["a"])]);
        store.add_tag("y", "t", T0);
        store.add_tag("x", "b", T1);
        store.reconcile(&CollectionChanges {
            created: vec![clean("z", &["c"])],
            ..Default::default()
        });
        assert!(store.mark_all_pending());
        assert_eq!(store.get("x").unwrap().dirty, Some(Dirty::Update));
        assert_eq!(store.get("z").unwrap().dirty, Some(Dirty::Insert));
        assert!(!store.mark_all_pending());
    }

    #[test]
    fn transition_dirty_requires_matching_state() {
        let mut store = seeded(vec![clean("x", &["a"])]);
        store.add_tag("x", "b", T1);
        store.add_tag("y", "b", T1);
        store.transition_dirty(&["X".into(), "y".into()], Dirty::Insert, Dirty::Update);
        assert_eq!(store.get("x").unwrap().dirty, Some(Dirty::Update));
        assert_eq!(store.get("y").unwrap().dirty, Some(Dirty::Update));
    }

    #[test]
    fn ensure_tags_revives_pushed_tombstone_as_update() {
        let mut tags = TagStore::new();
        tags.reconcile(&CollectionChanges {
            created: vec![Record::new(TagPayload::new("vip"))],
            ..Default::default()
        });
        tags.remove_record("vip", T0);
        assert!(tags.ensure_tags(["VIP "], T1));
        let record = tags.get("vip").unwrap();
        assert_eq!(record.dirty, Some(Dirty::Update));
        assert!(tags.state().tmp_removed.is_empty());
        assert!(!tags.ensure_tags(["vip", ""], T1));
    }

    #[test]
    fn persisted_blob_round_trips() {
        let local = MemoryStore::new();
        let mut store = seeded(vec![clean("x", &["a"])]);
        store.remove_record("x", T1);
        local.save("userAddresses", &store.to_blob().unwrap()).unwrap();

        let blob = local.load("userAddresses").unwrap().unwrap();
        assert!(blob.get("tmpRemoved").is_some());
        assert_eq!(AddressStore::load(&local).unwrap(), store);
    }
}
