//! Change sets pulled from the server and diffs pushed to it.

use crate::collection::CollectionKind;
use crate::payload::{AddressPayload, Payload, TagPayload, TxPayload};
use crate::record::Record;
use serde::de::Deserializer;
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

/// Reference to a deleted record: either a bare key or an object
/// carrying the natural id field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeletedRef {
    /// A bare key.
    Key(String),
    /// An object such as `{ "address": "1abc" }`.
    Object(serde_json::Map<String, serde_json::Value>),
}

impl DeletedRef {
    /// Returns the referenced identifier, reading `id_field` from objects.
    pub fn id(&self, id_field: &str) -> Option<&str> {
        match self {
            DeletedRef::Key(key) => Some(key),
            DeletedRef::Object(map) => map.get(id_field).and_then(|v| v.as_str()),
        }
    }
}

/// Authoritative changes for one collection.
///
/// `insert`/`update`/`remove` are accepted as aliases so that a confirmed
/// push diff and a server change set share one shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "P: Serialize", deserialize = "P: Deserialize<'de>"))]
pub struct CollectionChanges<P> {
    /// Records created remotely.
    #[serde(default, alias = "insert", deserialize_with = "null_as_empty")]
    pub created: Vec<Record<P>>,
    /// Records updated remotely.
    #[serde(default, alias = "update", deserialize_with = "null_as_empty")]
    pub updated: Vec<Record<P>>,
    /// Records deleted remotely.
    #[serde(default, alias = "remove", deserialize_with = "null_as_empty")]
    pub deleted: Vec<DeletedRef>,
}

impl<P> Default for CollectionChanges<P> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

impl<P: Payload> CollectionChanges<P> {
    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Total number of referenced records.
    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    /// Normalized keys of the deleted records.
    pub fn deleted_keys(&self) -> Vec<String> {
        self.deleted
            .iter()
            .filter_map(|entry| entry.id(P::ID_FIELD))
            .map(|id| P::KIND.normalize_key(id))
            .collect()
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Authoritative changes across all collections, keyed by wire name.
///
/// Collections the client does not know are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Tag changes.
    #[serde(rename = "userTag", default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<CollectionChanges<TagPayload>>,
    /// Address changes.
    #[serde(rename = "userAddress", default, skip_serializing_if = "Option::is_none")]
    pub addresses: Option<CollectionChanges<AddressPayload>>,
    /// Transaction changes.
    #[serde(rename = "userTx", default, skip_serializing_if = "Option::is_none")]
    pub transactions: Option<CollectionChanges<TxPayload>>,
}

impl ChangeSet {
    /// Returns true if no collection carries changes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of referenced records.
    pub fn len(&self) -> usize {
        self.tags.as_ref().map_or(0, |c| c.len())
            + self.addresses.as_ref().map_or(0, |c| c.len())
            + self.transactions.as_ref().map_or(0, |c| c.len())
    }

    /// Returns the collections present in this change set.
    pub fn collections(&self) -> Vec<CollectionKind> {
        let mut kinds = Vec::new();
        if self.tags.is_some() {
            kinds.push(CollectionKind::Tags);
        }
        if self.addresses.is_some() {
            kinds.push(CollectionKind::Addresses);
        }
        if self.transactions.is_some() {
            kinds.push(CollectionKind::Transactions);
        }
        kinds
    }
}

/// A record as sent in a push body.
///
/// Client-observed timestamps are renamed so the server can keep its own
/// `createdTime`/`updatedTime` distinct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRecord<P> {
    /// Collection-specific payload.
    #[serde(flatten)]
    pub payload: P,
    /// Client-side creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_created_time: Option<i64>,
    /// Client-side modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_updated_time: Option<i64>,
}

impl<P: Payload> From<&Record<P>> for PushRecord<P> {
    fn from(record: &Record<P>) -> Self {
        Self {
            payload: record.payload.clone(),
            client_created_time: record.created_time,
            client_updated_time: record.updated_time,
        }
    }
}

/// Pending local changes of one collection.
///
/// `remove` holds normalized keys. On the wire each removal is an object
/// carrying only the natural id field.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionDiff<P> {
    /// Records never pushed.
    pub insert: Vec<Record<P>>,
    /// Records modified since the last confirmed push.
    pub update: Vec<Record<P>>,
    /// Keys of records pending remote deletion.
    pub remove: Vec<String>,
}

impl<P> Default for CollectionDiff<P> {
    fn default() -> Self {
        Self {
            insert: Vec::new(),
            update: Vec::new(),
            remove: Vec::new(),
        }
    }
}

impl<P: Payload> CollectionDiff<P> {
    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.update.is_empty() && self.remove.is_empty()
    }

    /// Total number of pending records.
    pub fn len(&self) -> usize {
        self.insert.len() + self.update.len() + self.remove.len()
    }

    /// Converts a confirmed diff into the changes it implies locally.
    ///
    /// Pushed records come back without their dirty marker.
    pub fn confirmed(&self) -> CollectionChanges<P> {
        let clean = |records: &[Record<P>]| {
            records
                .iter()
                .map(|record| Record {
                    dirty: None,
                    ..record.clone()
                })
                .collect()
        };
        CollectionChanges {
            created: clean(&self.insert),
            updated: clean(&self.update),
            deleted: self.remove.iter().cloned().map(DeletedRef::Key).collect(),
        }
    }
}

impl<P: Payload> Serialize for CollectionDiff<P> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let insert: Vec<PushRecord<P>> = self.insert.iter().map(PushRecord::from).collect();
        let update: Vec<PushRecord<P>> = self.update.iter().map(PushRecord::from).collect();
        let remove: Vec<serde_json::Map<String, serde_json::Value>> = self
            .remove
            .iter()
            .map(|key| {
                let mut entry = serde_json::Map::new();
                entry.insert(P::ID_FIELD.to_string(), serde_json::Value::from(key.as_str()));
                entry
            })
            .collect();

        let mut state = serializer.serialize_struct("CollectionDiff", 3)?;
        state.serialize_field("insert", &insert)?;
        state.serialize_field("update", &update)?;
        state.serialize_field("remove", &remove)?;
        state.end()
    }
}

/// Body of a push request, keyed by collection wire name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PushBody {
    /// Pending tag changes.
    #[serde(rename = "userTag", skip_serializing_if = "Option::is_none")]
    pub tags: Option<CollectionDiff<TagPayload>>,
    /// Pending address changes.
    #[serde(rename = "userAddress", skip_serializing_if = "Option::is_none")]
    pub addresses: Option<CollectionDiff<AddressPayload>>,
    /// Pending transaction changes.
    #[serde(rename = "userTx", skip_serializing_if = "Option::is_none")]
    pub transactions: Option<CollectionDiff<TxPayload>>,
}

impl PushBody {
    /// Returns true if no collection has pending changes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of pending records.
    pub fn len(&self) -> usize {
        self.tags.as_ref().map_or(0, |d| d.len())
            + self.addresses.as_ref().map_or(0, |d| d.len())
            + self.transactions.as_ref().map_or(0, |d| d.len())
    }

    /// The local changes implied by a confirmed push.
    pub fn confirmed(&self) -> ChangeSet {
        ChangeSet {
            tags: self.tags.as_ref().map(|d| d.confirmed()),
            addresses: self.addresses.as_ref().map(|d| d.confirmed()),
            transactions: self.transactions.as_ref().map(|d| d.confirmed()),
        }
    }
}
