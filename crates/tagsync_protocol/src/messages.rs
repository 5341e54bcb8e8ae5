//! Protocol bodies exchanged with the sync service.
//!
//! - `PUT {syncUserApi}/{userId}` answers with a [`UserResponse`]
//! - `GET {syncApi}/{idUser}/{cursor}` answers with a [`SyncResponse`]
//! - `POST {syncApi}/{idUser}/{cursor}` takes a [`crate::PushBody`] and
//!   answers with a [`SyncResponse`] on success

use crate::changes::ChangeSet;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// Response of the "ensure user" handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    /// Server-side user identifier used in sync URLs.
    #[serde(deserialize_with = "string_or_number")]
    pub id_user: String,
    /// Notification channels registered for the user.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub notification_channels: Vec<serde_json::Value>,
}

impl UserResponse {
    /// Creates a handshake response with no notification channels.
    pub fn new(id_user: impl Into<String>) -> Self {
        Self {
            id_user: id_user.into(),
            notification_channels: Vec::new(),
        }
    }
}

/// Response of a pull, or of a successful push.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// New replication cursor.
    ///
    /// The outer `Option` tracks presence of the field, the inner one its
    /// value; an absent field is a protocol violation.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_synced_at: Option<Option<i64>>,
    /// Authoritative changes to apply locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<ChangeSet>,
}

impl SyncResponse {
    /// Creates a response carrying a cursor and no changes.
    pub fn new(cursor: i64) -> Self {
        Self {
            last_synced_at: Some(Some(cursor)),
            changes: None,
        }
    }

    /// Attaches a change set.
    pub fn with_changes(mut self, changes: ChangeSet) -> Self {
        self.changes = Some(changes);
        self
    }

    /// Returns the cursor, or `None` if the field was absent.
    ///
    /// A present but null or zero cursor means "never synced" (1).
    pub fn cursor(&self) -> Option<i64> {
        self.last_synced_at
            .map(|cursor| cursor.filter(|value| *value != 0).unwrap_or(1))
    }
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number for idUser, got {other}"
        ))),
    }
}
