//! Duplicate-insert conflict bodies (HTTP 409).

use crate::collection::CollectionKind;
use serde::{Deserialize, Serialize};

/// What a 409 response says about the rejected push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictInfo {
    /// Wire name of the offending collection.
    pub collection: String,
    /// Keys the server says should not exist as inserts.
    pub should_not_exist: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConflictDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    should_not_exists: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    details: Option<Box<ConflictDetails>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConflictEnvelope {
    #[serde(default)]
    info: Option<ConflictDetails>,
}

impl ConflictInfo {
    /// Creates conflict info for a collection.
    pub fn new(kind: CollectionKind, should_not_exist: Vec<String>) -> Self {
        Self {
            collection: kind.wire_name().to_string(),
            should_not_exist,
        }
    }

    /// Parses a 409 body.
    ///
    /// Accepts both `{ info: { collection, shouldNotExists } }` and the
    /// nested `{ info: { details: { ... } } }` form. Returns `None` when
    /// the body does not name a collection and at least one key.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        let envelope: ConflictEnvelope = serde_json::from_slice(body).ok()?;
        let info = envelope.info?;
        let (collection, keys) = match (info.collection, info.should_not_exists) {
            (Some(collection), Some(keys)) => (collection, keys),
            _ => {
                let details = info.details?;
                (details.collection?, details.should_not_exists?)
            }
        };
        if keys.is_empty() {
            return None;
        }
        Some(Self {
            collection,
            should_not_exist: keys,
        })
    }

    /// Encodes as a 409 body.
    pub fn to_body(&self) -> Vec<u8> {
        let envelope = ConflictEnvelope {
            info: Some(ConflictDetails {
                collection: Some(self.collection.clone()),
                should_not_exists: Some(self.should_not_exist.clone()),
                details: None,
            }),
        };
        serde_json::to_vec(&envelope).unwrap_or_default()
    }

    /// Returns the collection, if known to this client.
    pub fn kind(&self) -> Option<CollectionKind> {
        CollectionKind::from_wire_name(&self.collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_form() {
        let body = br#"{"info":{"collection":"userAddress","shouldNotExists":["1abc"]}}"#;
        let info = ConflictInfo::from_body(body).unwrap();
        assert_eq!(info.kind(), Some(CollectionKind::Addresses));
        assert_eq!(info.should_not_exist, vec!["1abc"]);
    }

    #[test]
    fn parses_nested_form() {
        let body = br#"{"info":{"details":{"collection":"userTag","shouldNotExists":["vip"]}}}"#;
        let info = ConflictInfo::from_body(body).unwrap();
        assert_eq!(info.kind(), Some(CollectionKind::Tags));
    }

    #[test]
    fn rejects_incomplete_bodies() {
        assert!(ConflictInfo::from_body(b"").is_none());
        assert!(ConflictInfo::from_body(br#"{"info":{"collection":"userTag"}}"#).is_none());
        assert!(ConflictInfo::from_body(
            br#"{"info":{"collection":"userTag","shouldNotExists":[]}}"#
        )
        .is_none());
    }

    #[test]
    fn body_round_trip() {
        let info = ConflictInfo::new(CollectionKind::Transactions, vec!["ff".into()]);
        assert_eq!(ConflictInfo::from_body(&info.to_body()), Some(info));
    }
}
