//! Application-wide settings and sync bookkeeping.

use crate::action::{Action, ActionKind};
use crate::dispatcher::{ReduceContext, Reducer, StoreId};
use crate::error::SyncResult;
use crate::persist::LocalStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Persistence key of the App State blob.
pub const APP_STATE_KEY: &str = "app";

/// Settings and cursors shared by the whole replica.
///
/// Missing fields of a persisted blob take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppState {
    /// Local changes are pushed when true.
    pub push_changes: bool,
    /// Per-user opt-in for tags and notes sync.
    pub sync_tags_and_notes: bool,
    /// Whether the help dialog should be shown.
    pub show_dialog_help: bool,
    /// Server replication cursor.
    pub last_synced_at: i64,
    /// Wall-clock time of the last sync attempt.
    pub last_sync_call: i64,
    /// Channels reported by the user handshake.
    pub notification_channels: Vec<Value>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            push_changes: true,
            sync_tags_and_notes: true,
            show_dialog_help: true,
            last_synced_at: 1,
            last_sync_call: 0,
            notification_channels: Vec::new(),
        }
    }
}

impl AppState {
    /// Loads the persisted state, or defaults if none was saved.
    pub fn load(local: &dyn LocalStore) -> SyncResult<Self> {
        match local.load(APP_STATE_KEY)? {
            Some(blob) => Ok(serde_json::from_value(blob)?),
            None => Ok(Self::default()),
        }
    }

    /// The cursor to send to the server. Never below 1.
    pub fn cursor(&self) -> i64 {
        self.last_synced_at.max(1)
    }

    /// Whether pushes are enabled.
    pub fn can_push_changes(&self) -> bool {
        self.push_changes
    }

    fn set_push_changes(&mut self, requested: Option<bool>, local: &dyn LocalStore) -> bool {
        let enable = requested.unwrap_or(!self.push_changes);
        if enable == self.push_changes {
            return false;
        }
        if enable {
            // Pick up whatever another writer persisted while pushes were off.
            match Self::load(local) {
                Ok(persisted) => *self = persisted,
                Err(e) => warn!(error = %e, "failed to reload app state"),
            }
        }
        self.push_changes = enable;
        true
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

impl Reducer for AppState {
    const ID: StoreId = StoreId::App;

    fn wait_for(_kind: ActionKind) -> &'static [StoreId] {
        &[]
    }

    fn reduce(&mut self, action: &Action, ctx: &ReduceContext<'_>) -> bool {
        match action {
            Action::UpdateLastSyncTime(cursor) => replace(&mut self.last_synced_at, (*cursor).max(1)),
            Action::UpdateLastSyncCall(at) => replace(&mut self.last_sync_call, *at),
            Action::TogglePushChanges(requested) => self.set_push_changes(*requested, ctx.local),
            Action::ToggleShowDialogHelp(show) => replace(&mut self.show_dialog_help, *show),
            Action::ToggleSyncTagsAndNotes(sync) => replace(&mut self.sync_tags_and_notes, *sync),
            Action::UpdateNotificationChannels(channels) => {
                replace(&mut self.notification_channels, channels.clone())
            }
            Action::ResetFromData(_) => replace(&mut self.last_synced_at, 1),
            Action::ClearDatabase => replace(self, Self::default()),
            Action::ResetFromStore => match Self::load(ctx.local) {
                Ok(persisted) => replace(self, persisted),
                Err(e) => {
                    warn!(error = %e, "failed to reload app state");
                    false
                }
            },
            _ => false,
        }
    }

    fn to_blob(&self) -> SyncResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
