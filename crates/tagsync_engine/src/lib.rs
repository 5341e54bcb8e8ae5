//! # Tagsync Engine
//!
//! Offline-first replica and sync engine for tagged record collections.
//!
//! This crate provides:
//! - Per-collection entity stores with a dirty/tombstone state machine
//! - App State (push toggle, tags-and-notes opt-in, replication cursor)
//! - A synchronous action bus with per-action store dependency ordering
//! - Whole-blob persistence (in-memory or a locked JSON directory)
//! - The pull-then-push sync orchestrator with bounded conflict retry
//! - A debounced single-flight scheduler and a background renewal timer
//! - HTTP transport via `reqwest`, plus a scripted mock for tests
//!
//! ## Architecture
//!
//! Every local change is an [`Action`] dispatched through the
//! [`Dispatcher`]. Stores reduce it in dependency order, changed stores are
//! persisted, then listeners run. The [`SyncEngine`] drives one attempt:
//! 1. Ensure the remote user exists
//! 2. Pull changes since the cursor and reconcile them
//! 3. Push the pending diff and reconcile the confirmation
//!
//! ## Key Invariants
//!
//! - Pull always happens before push
//! - Reconciling the same change set twice equals reconciling it once
//! - No key is live in `items` and present in `tmpRemoved` at once
//! - A 409 or 412 is retried at most once per attempt
//! - At most one attempt is in flight per scheduler

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod action;
mod app_state;
mod config;
mod dispatcher;
mod error;
mod http;
mod persist;
mod renewal;
mod scheduler;
mod state;
mod store;
mod transport;

pub use action::{Action, ActionKind};
pub use app_state::{AppState, APP_STATE_KEY};
pub use config::{RenewalBackoff, SyncConfig};
pub use dispatcher::{resolve_order, Dispatcher, Listener, ReduceContext, Reducer, StoreId, Stores};
pub use error::{SyncError, SyncResult};
pub use http::HttpTransport;
pub use persist::{JsonFileStore, LocalStore, MemoryStore};
pub use renewal::RenewalTimer;
pub use scheduler::{SyncNotice, SyncObserver, SyncScheduler};
pub use state::{SyncCycleResult, SyncEngine, SyncState, SyncStats};
pub use store::{AddressStore, CollectionState, EntityStore, StoredPayload, TagStore, TxStore};
pub use transport::{MockTransport, PushOutcome, RecordedCall, SyncTransport};

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
