//! Records and their pending-push marker.

use crate::payload::Payload;
use serde::{Deserialize, Serialize};

/// Pending-push state of a record.
///
/// A record without a marker is clean: it matches what the remote service
/// last confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Dirty {
    /// Created locally and never successfully pushed.
    Insert,
    /// Exists remotely and was modified (or removed) locally.
    Update,
}

impl Dirty {
    /// Converts to the numeric code used in persisted state.
    pub fn to_code(&self) -> u8 {
        match self {
            Dirty::Insert => 1,
            Dirty::Update => 2,
        }
    }

    /// Converts from a numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Dirty::Insert),
            2 => Some(Dirty::Update),
            _ => None,
        }
    }
}

impl From<Dirty> for u8 {
    fn from(dirty: Dirty) -> Self {
        dirty.to_code()
    }
}

impl TryFrom<u8> for Dirty {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Dirty::from_code(code).ok_or_else(|| format!("unknown dirty code {code}"))
    }
}

/// A record of one collection: a payload plus sync metadata.
///
/// Timestamps are epoch milliseconds. They are optional on input and
/// assigned client-side by the store when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record<P> {
    /// Collection-specific payload.
    #[serde(flatten)]
    pub payload: P,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<i64>,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_time: Option<i64>,
    /// Tombstone flag.
    #[serde(default, skip_serializing_if = "is_false")]
    pub removed: bool,
    /// Pending-push marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dirty: Option<Dirty>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl<P: Payload> Record<P> {
    /// Creates a clean, live record with no timestamps.
    pub fn new(payload: P) -> Self {
        Self {
            payload,
            created_time: None,
            updated_time: None,
            removed: false,
            dirty: None,
        }
    }

    /// Sets both timestamps.
    pub fn with_times(mut self, created: i64, updated: i64) -> Self {
        self.created_time = Some(created);
        self.updated_time = Some(updated);
        self
    }

    /// Sets the pending-push marker.
    pub fn with_dirty(mut self, dirty: Dirty) -> Self {
        self.dirty = Some(dirty);
        self
    }

    /// Returns the normalized key of this record.
    pub fn key(&self) -> String {
        P::KIND.normalize_key(self.payload.id())
    }

    /// Returns true if the record is not a tombstone.
    pub fn is_live(&self) -> bool {
        !self.removed
    }

    /// Returns a copy stripped of dirty/removed markers, as exported.
    pub fn exported(&self) -> Self {
        Self {
            payload: self.payload.clone(),
            created_time: self.created_time,
            updated_time: self.updated_time,
            removed: false,
            dirty: None,
        }
    }
}
