//! Property-based test generators using proptest.
//!
//! Identifiers and tags are drawn from small pools with case and
//! whitespace variants, so generated sequences keep hitting the same
//! normalized keys.

use proptest::prelude::*;
use tagsync_engine::Action;
use tagsync_protocol::{
    AddressPayload, ChangeSet, CollectionChanges, CollectionKind, DeletedRef, Record,
};

/// Strategy for generating address identifiers.
pub fn address_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["1ABC", "1abc", "bc1qxyz", "BC1QXYZ", "3J98t1"]).prop_map(String::from)
}

/// Strategy for generating transaction identifiers.
pub fn txid_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["ff00", "FF00", "a1b2c3"]).prop_map(String::from)
}

/// Strategy for generating tag labels, including blank ones.
pub fn tag_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["vip", "VIP", " cold ", "rent", ""]).prop_map(String::from)
}

/// Strategy for generating notes, mostly empty.
pub fn note_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => Just(String::new()),
        1 => prop::string::string_regex("[a-z ]{1,12}").expect("Invalid regex"),
    ]
}

/// Annotated collection and an identifier drawn for it.
fn target_strategy() -> impl Strategy<Value = (CollectionKind, String)> {
    prop_oneof![
        3 => address_strategy().prop_map(|id| (CollectionKind::Addresses, id)),
        1 => txid_strategy().prop_map(|id| (CollectionKind::Transactions, id)),
    ]
}

/// A local mutation, as issued by the host.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Add a tag.
    AddTag {
        /// Annotated collection.
        target: CollectionKind,
        /// Record identifier.
        id: String,
        /// Tag label.
        tag: String,
    },
    /// Remove a tag.
    RemoveTag {
        /// Annotated collection.
        target: CollectionKind,
        /// Record identifier.
        id: String,
        /// Tag label.
        tag: String,
    },
    /// Replace tags and note.
    Replace {
        /// Annotated collection.
        target: CollectionKind,
        /// Record identifier.
        id: String,
        /// New tags.
        tags: Vec<String>,
        /// New note.
        note: String,
    },
    /// Remove a record of any collection.
    Remove {
        /// Collection.
        target: CollectionKind,
        /// Record identifier.
        id: String,
    },
}

impl Mutation {
    /// Converts to the action the host would dispatch.
    pub fn into_action(self) -> Action {
        match self {
            Mutation::AddTag { target, id, tag } => Action::AddTag { target, id, tag },
            Mutation::RemoveTag { target, id, tag } => Action::RemoveTag { target, id, tag },
            Mutation::Replace {
                target,
                id,
                tags,
                note,
            } => Action::ReplaceTagsAndNote {
                target,
                id,
                tags,
                note,
            },
            Mutation::Remove { target, id } => Action::RemoveRecord { target, id },
        }
    }
}

/// Strategy for generating local mutations.
pub fn mutation_strategy() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        4 => (target_strategy(), tag_strategy())
            .prop_map(|((target, id), tag)| Mutation::AddTag { target, id, tag }),
        2 => (target_strategy(), tag_strategy())
            .prop_map(|((target, id), tag)| Mutation::RemoveTag { target, id, tag }),
        2 => (
            target_strategy(),
            prop::collection::vec(tag_strategy(), 0..3),
            note_strategy()
        )
            .prop_map(|((target, id), tags, note)| Mutation::Replace {
                target,
                id,
                tags,
                note,
            }),
        2 => target_strategy().prop_map(|(target, id)| Mutation::Remove { target, id }),
        1 => tag_strategy().prop_map(|id| Mutation::Remove {
            target: CollectionKind::Tags,
            id,
        }),
    ]
}

/// Strategy for generating a sequence of mutations.
pub fn mutation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<Mutation>> {
    prop::collection::vec(mutation_strategy(), min_ops..max_ops)
}

/// Strategy for generating clean address records as the server sends them.
pub fn server_address_strategy() -> impl Strategy<Value = Record<AddressPayload>> {
    (
        address_strategy(),
        prop::collection::vec(tag_strategy().prop_filter("blank tag", |t| !t.trim().is_empty()), 0..3),
        note_strategy(),
        1_600_000_000_000i64..1_700_000_000_000i64,
    )
        .prop_map(|(address, tags, note, time)| {
            Record::new(AddressPayload::new(address, tags, note)).with_times(time, time)
        })
}

/// Strategy for generating pulled address change sets.
pub fn address_changes_strategy() -> impl Strategy<Value = ChangeSet> {
    (
        prop::collection::vec(server_address_strategy(), 0..3),
        prop::collection::vec(server_address_strategy(), 0..3),
        prop::collection::vec(address_strategy(), 0..2),
        any::<bool>(),
    )
        .prop_map(|(created, updated, deleted, as_objects)| {
            let deleted = deleted
                .into_iter()
                .map(|address| {
                    if as_objects {
                        let mut map = serde_json::Map::new();
                        map.insert("address".to_string(), serde_json::Value::String(address));
                        DeletedRef::Object(map)
                    } else {
                        DeletedRef::Key(address)
                    }
                })
                .collect();
            ChangeSet {
                tags: None,
                addresses: Some(CollectionChanges {
                    created,
                    updated,
                    deleted,
                }),
                transactions: None,
            }
        })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
