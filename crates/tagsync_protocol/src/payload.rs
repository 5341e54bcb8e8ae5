//! Collection payloads.

use crate::collection::CollectionKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Debug;

/// User-facing content of a record in one collection.
pub trait Payload:
    Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Collection this payload belongs to.
    const KIND: CollectionKind;

    /// JSON field carrying the natural identifier.
    const ID_FIELD: &'static str;

    /// Returns the natural identifier (not normalized).
    fn id(&self) -> &str;

    /// Creates an empty payload for the given identifier.
    fn blank(id: &str) -> Self;

    /// Folds the locally held payload into an imported one.
    ///
    /// Called when a dataset is merged over an existing record.
    fn absorb(&mut self, _existing: &Self) {}
}

/// A payload that carries tags and a free-form note.
pub trait Annotated: Payload {
    /// Returns the tags, in insertion order.
    fn tags(&self) -> &[String];

    /// Replaces the tags.
    fn set_tags(&mut self, tags: Vec<String>);

    /// Returns the note.
    fn note(&self) -> &str;

    /// Replaces the note.
    fn set_note(&mut self, note: String);

    /// Replaces the natural identifier, keeping the key unchanged.
    fn set_id(&mut self, id: &str);

    /// Returns true if there are neither tags nor a note.
    fn is_blank(&self) -> bool {
        self.tags().is_empty() && self.note().is_empty()
    }
}

/// De-duplicates tags by their normalized tag key, keeping first occurrences.
pub fn dedupe_tags<I>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    tags.into_iter()
        .filter(|tag| seen.insert(CollectionKind::Tags.normalize_key(tag)))
        .collect()
}

/// An address with user tags and note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressPayload {
    /// The address, as entered.
    pub address: String,
    /// Tags attached to the address.
    #[serde(default)]
    pub address_tags: Vec<String>,
    /// Free-form note.
    #[serde(default)]
    pub address_user_note: String,
}

impl AddressPayload {
    /// Creates an address payload.
    pub fn new(address: impl Into<String>, tags: Vec<String>, note: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            address_tags: tags,
            address_user_note: note.into(),
        }
    }
}

impl Payload for AddressPayload {
    const KIND: CollectionKind = CollectionKind::Addresses;
    const ID_FIELD: &'static str = "address";

    fn id(&self) -> &str {
        &self.address
    }

    fn blank(id: &str) -> Self {
        Self::new(id, Vec::new(), "")
    }

    fn absorb(&mut self, existing: &Self) {
        let incoming = std::mem::take(&mut self.address_tags);
        self.address_tags = dedupe_tags(existing.address_tags.iter().cloned().chain(incoming));
    }
}

impl Annotated for AddressPayload {
    fn tags(&self) -> &[String] {
        &self.address_tags
    }

    fn set_tags(&mut self, tags: Vec<String>) {
        self.address_tags = tags;
    }

    fn note(&self) -> &str {
        &self.address_user_note
    }

    fn set_note(&mut self, note: String) {
        self.address_user_note = note;
    }

    fn set_id(&mut self, id: &str) {
        self.address = id.to_string();
    }
}

/// A transaction with user tags and note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxPayload {
    /// Transaction identifier, as entered.
    pub txid: String,
    /// Tags attached to the transaction.
    #[serde(default)]
    pub tx_tags: Vec<String>,
    /// Free-form note.
    #[serde(default)]
    pub tx_user_note: String,
}

impl TxPayload {
    /// Creates a transaction payload.
    pub fn new(txid: impl Into<String>, tags: Vec<String>, note: impl Into<String>) -> Self {
        Self {
            txid: txid.into(),
            tx_tags: tags,
            tx_user_note: note.into(),
        }
    }
}

impl Payload for TxPayload {
    const KIND: CollectionKind = CollectionKind::Transactions;
    const ID_FIELD: &'static str = "txid";

    fn id(&self) -> &str {
        &self.txid
    }

    fn blank(id: &str) -> Self {
        Self::new(id, Vec::new(), "")
    }

    fn absorb(&mut self, existing: &Self) {
        let incoming = std::mem::take(&mut self.tx_tags);
        self.tx_tags = dedupe_tags(existing.tx_tags.iter().cloned().chain(incoming));
    }
}

impl Annotated for TxPayload {
    fn tags(&self) -> &[String] {
        &self.tx_tags
    }

    fn set_tags(&mut self, tags: Vec<String>) {
        self.tx_tags = tags;
    }

    fn note(&self) -> &str {
        &self.tx_user_note
    }

    fn set_note(&mut self, note: String) {
        self.tx_user_note = note;
    }

    fn set_id(&mut self, id: &str) {
        self.txid = id.to_string();
    }
}

/// A user-defined tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPayload {
    /// Tag label, as entered.
    pub tag: String,
}

impl TagPayload {
    /// Creates a tag payload.
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

impl Payload for TagPayload {
    const KIND: CollectionKind = CollectionKind::Tags;
    const ID_FIELD: &'static str = "tag";

    fn id(&self) -> &str {
        &self.tag
    }

    fn blank(id: &str) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_keeps_first_spelling() {
        let tags = dedupe_tags(vec!["VIP".to_string(), "vip ".to_string(), "cold".to_string()]);
        assert_eq!(tags, vec!["VIP".to_string(), "cold".to_string()]);
    }

    #[test]
    fn absorb_unions_tags() {
        let existing = AddressPayload::new("a", vec!["one".into(), "two".into()], "old");
        let mut incoming = AddressPayload::new("a", vec!["TWO".into(), "three".into()], "new");
        incoming.absorb(&existing);
        assert_eq!(incoming.address_tags, vec!["one", "two", "three"]);
        assert_eq!(incoming.address_user_note, "new");
    }

    #[test]
    fn blank_detection() {
        assert!(AddressPayload::blank("x").is_blank());
        assert!(!TxPayload::new("t", vec![], "note").is_blank());
    }

    #[test]
    fn missing_annotations_default() {
        let payload: TxPayload = serde_json::from_str(r#"{"txid":"ab"}"#).unwrap();
        assert!(payload.tx_tags.is_empty());
        assert!(payload.tx_user_note.is_empty());
    }
}
