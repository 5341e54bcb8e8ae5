//! Events dispatched through the action bus.

use tagsync_protocol::{ChangeSet, CollectionKind, Dataset, Dirty, PushBody};

/// An event processed by every store in one synchronous pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Adds a tag to an annotated record, creating the record if needed.
    AddTag {
        /// Annotated collection holding the record.
        target: CollectionKind,
        /// Natural identifier of the record.
        id: String,
        /// Tag label.
        tag: String,
    },
    /// Removes a tag from an annotated record.
    RemoveTag {
        /// Annotated collection holding the record.
        target: CollectionKind,
        /// Natural identifier of the record.
        id: String,
        /// Tag label.
        tag: String,
    },
    /// Replaces all tags and the note of an annotated record.
    ReplaceTagsAndNote {
        /// Annotated collection holding the record.
        target: CollectionKind,
        /// Natural identifier of the record.
        id: String,
        /// New tags.
        tags: Vec<String>,
        /// New note.
        note: String,
    },
    /// Tombstones a record.
    RemoveRecord {
        /// Collection holding the record.
        target: CollectionKind,
        /// Natural identifier of the record.
        id: String,
    },
    /// Merges an external dataset over local state.
    MergeData(Dataset),
    /// Replaces local state with an external dataset.
    ResetFromData(Dataset),
    /// Reloads every store from persistence.
    ResetFromStore,
    /// Wipes all collections and resets App State to defaults.
    ClearDatabase,
    /// Marks every clean record insert-pending.
    MarkAllAsDirty,
    /// Applies authoritative changes.
    SyncChanges(ChangeSet),
    /// Clears the dirty marker of pushed records that were not modified
    /// while the push was in flight.
    ConfirmPush(PushBody),
    /// Moves records of one collection between dirty states.
    UpdateDirtyStatus {
        /// Collection holding the records.
        collection: CollectionKind,
        /// Natural identifiers or keys.
        keys: Vec<String>,
        /// Required current state.
        from: Dirty,
        /// New state.
        to: Dirty,
    },
    /// Advances the replication cursor.
    UpdateLastSyncTime(i64),
    /// Records the wall-clock time of a sync attempt.
    UpdateLastSyncCall(i64),
    /// Sets (`Some`) or flips (`None`) the push-enabled flag.
    TogglePushChanges(Option<bool>),
    /// Sets the help-dialog flag.
    ToggleShowDialogHelp(bool),
    /// Sets the per-user tags-and-notes opt-in.
    ToggleSyncTagsAndNotes(bool),
    /// Replaces the notification channel list.
    UpdateNotificationChannels(Vec<serde_json::Value>),
}

/// Discriminant of an [`Action`], used to key dependency orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// [`Action::AddTag`].
    AddTag,
    /// [`Action::RemoveTag`].
    RemoveTag,
    /// [`Action::ReplaceTagsAndNote`].
    ReplaceTagsAndNote,
    /// [`Action::RemoveRecord`].
    RemoveRecord,
    /// [`Action::MergeData`].
    MergeData,
    /// [`Action::ResetFromData`].
    ResetFromData,
    /// [`Action::ResetFromStore`].
    ResetFromStore,
    /// [`Action::ClearDatabase`].
    ClearDatabase,
    /// [`Action::MarkAllAsDirty`].
    MarkAllAsDirty,
    /// [`Action::SyncChanges`].
    SyncChanges,
    /// [`Action::ConfirmPush`].
    ConfirmPush,
    /// [`Action::UpdateDirtyStatus`].
    UpdateDirtyStatus,
    /// [`Action::UpdateLastSyncTime`].
    UpdateLastSyncTime,
    /// [`Action::UpdateLastSyncCall`].
    UpdateLastSyncCall,
    /// [`Action::TogglePushChanges`].
    TogglePushChanges,
    /// [`Action::ToggleShowDialogHelp`].
    ToggleShowDialogHelp,
    /// [`Action::ToggleSyncTagsAndNotes`].
    ToggleSyncTagsAndNotes,
    /// [`Action::UpdateNotificationChannels`].
    UpdateNotificationChannels,
}

impl ActionKind {
    /// Every action kind.
    pub const ALL: [ActionKind; 18] = [
        ActionKind::AddTag,
        ActionKind::RemoveTag,
        ActionKind::ReplaceTagsAndNote,
        ActionKind::RemoveRecord,
        ActionKind::MergeData,
        ActionKind::ResetFromData,
        ActionKind::ResetFromStore,
        ActionKind::ClearDatabase,
        ActionKind::MarkAllAsDirty,
        ActionKind::SyncChanges,
        ActionKind::ConfirmPush,
        ActionKind::UpdateDirtyStatus,
        ActionKind::UpdateLastSyncTime,
        ActionKind::UpdateLastSyncCall,
        ActionKind::TogglePushChanges,
        ActionKind::ToggleShowDialogHelp,
        ActionKind::ToggleSyncTagsAndNotes,
        ActionKind::UpdateNotificationChannels,
    ];
}

impl Action {
    /// Returns the kind of this action.
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::AddTag { .. } => ActionKind::AddTag,
            Action::RemoveTag { .. } => ActionKind::RemoveTag,
            Action::ReplaceTagsAndNote { .. } => ActionKind::ReplaceTagsAndNote,
            Action::RemoveRecord { .. } => ActionKind::RemoveRecord,
            Action::MergeData(_) => ActionKind::MergeData,
            Action::ResetFromData(_) => ActionKind::ResetFromData,
            Action::ResetFromStore => ActionKind::ResetFromStore,
            Action::ClearDatabase => ActionKind::ClearDatabase,
            Action::MarkAllAsDirty => ActionKind::MarkAllAsDirty,
            Action::SyncChanges(_) => ActionKind::SyncChanges,
            Action::ConfirmPush(_) => ActionKind::ConfirmPush,
            Action::UpdateDirtyStatus { .. } => ActionKind::UpdateDirtyStatus,
            Action::UpdateLastSyncTime(_) => ActionKind::UpdateLastSyncTime,
            Action::UpdateLastSyncCall(_) => ActionKind::UpdateLastSyncCall,
            Action::TogglePushChanges(_) => ActionKind::TogglePushChanges,
            Action::ToggleShowDialogHelp(_) => ActionKind::ToggleShowDialogHelp,
            Action::ToggleSyncTagsAndNotes(_) => ActionKind::ToggleSyncTagsAndNotes,
            Action::UpdateNotificationChannels(_) => ActionKind::UpdateNotificationChannels,
        }
    }

    /// Returns true for edits made on this replica, as opposed to sync
    /// bookkeeping.
    pub fn is_local_mutation(&self) -> bool {
        matches!(
            self,
            Action::AddTag { .. }
                | Action::RemoveTag { .. }
                | Action::ReplaceTagsAndNote { .. }
                | Action::RemoveRecord { .. }
                | Action::MergeData(_)
                | Action::ResetFromData(_)
        )
    }

    /// Shorthand for [`Action::AddTag`] on an address.
    pub fn add_address_tag(address: impl Into<String>, tag: impl Into<String>) -> Self {
        Action::AddTag {
            target: CollectionKind::Addresses,
            id: address.into(),
            tag: tag.into(),
        }
    }

    /// Shorthand for [`Action::RemoveTag`] on an address.
    pub fn remove_address_tag(address: impl Into<String>, tag: impl Into<String>) -> Self {
        Action::RemoveTag {
            target: CollectionKind::Addresses,
            id: address.into(),
            tag: tag.into(),
        }
    }

    /// Shorthand for [`Action::RemoveRecord`] on an address.
    pub fn remove_address(address: impl Into<String>) -> Self {
        Action::RemoveRecord {
            target: CollectionKind::Addresses,
            id: address.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for kind in ActionKind::ALL {
            assert!(seen.insert(kind));
        }
        assert_eq!(Action::ClearDatabase.kind(), ActionKind::ClearDatabase);
        assert_eq!(Action::add_address_tag("a", "b").kind(), ActionKind::AddTag);
    }

    #[test]
    fn only_edits_are_local_mutations() {
        assert!(Action::remove_address("a").is_local_mutation());
        assert!(Action::MergeData(Dataset::default()).is_local_mutation());
        assert!(!Action::SyncChanges(ChangeSet::default()).is_local_mutation());
        assert!(!Action::ConfirmPush(PushBody::default()).is_local_mutation());
        assert!(!Action::UpdateLastSyncCall(1).is_local_mutation());
    }
}
