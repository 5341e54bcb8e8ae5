//! Sync engine state machine.
//!
//! One attempt runs handshake, pull, then push. A 409 or 412 on push
//! restarts the attempt exactly once with conflict retries disabled.

use crate::action::Action;
use crate::config::SyncConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{SyncError, SyncResult};
use crate::transport::{PushOutcome, SyncTransport};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tagsync_protocol::{ConflictInfo, Dirty, PushBody};
use tracing::{debug, info, warn};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Engine is idle, not syncing.
    Idle,
    /// Engine is registering the remote user.
    Handshaking,
    /// Engine is pulling changes from the server.
    Pulling,
    /// Engine is pushing changes to the server.
    Pushing,
    /// Engine has completed a sync cycle.
    Synced,
    /// Engine encountered an error.
    Error,
}

impl SyncState {
    /// Returns true if the engine is in an active sync state.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Handshaking | SyncState::Pulling | SyncState::Pushing
        )
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of sync cycles completed.
    pub cycles_completed: u64,
    /// Total number of pull requests.
    pub pull_calls: u64,
    /// Total number of push requests.
    pub push_calls: u64,
    /// Total number of records received in pulls and push responses.
    pub records_pulled: u64,
    /// Total number of records confirmed by pushes.
    pub records_pushed: u64,
    /// Total number of 409/412 responses handled by a retry.
    pub conflicts_handled: u64,
    /// Last sync time.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a sync cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncCycleResult {
    /// Cursor before the cycle.
    pub cursor_before: i64,
    /// Cursor after the cycle.
    pub cursor_after: i64,
    /// Number of records received.
    pub pulled: usize,
    /// Number of records confirmed by the push.
    pub pushed: usize,
    /// Whether a push was accepted.
    pub push_attempted: bool,
    /// Conflict retries used (0 or 1).
    pub conflict_retries: u32,
    /// Duration of the sync cycle.
    pub duration: Duration,
}

impl SyncCycleResult {
    fn starting(cursor: i64) -> Self {
        Self {
            cursor_before: cursor,
            cursor_after: cursor,
            pulled: 0,
            pushed: 0,
            push_attempted: false,
            conflict_retries: 0,
            duration: Duration::ZERO,
        }
    }
}

enum Attempt {
    Done,
    Retry,
}

/// The sync engine manages synchronization with a remote server.
pub struct SyncEngine<T: SyncTransport> {
    config: SyncConfig,
    transport: Arc<T>,
    dispatcher: Arc<Dispatcher>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<T: SyncTransport> SyncEngine<T> {
    /// Creates a new sync engine.
    pub fn new(config: SyncConfig, transport: T, dispatcher: Arc<Dispatcher>) -> Self {
        Self::with_transport(config, Arc::new(transport), dispatcher)
    }

    /// Creates a sync engine over a shared transport.
    pub fn with_transport(config: SyncConfig, transport: Arc<T>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            config,
            transport,
            dispatcher,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the action bus this engine drives.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Returns the transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Performs one sync attempt: handshake, pull, then push.
    ///
    /// Pulled changes stay applied even if the push fails.
    pub async fn sync(&self) -> SyncResult<SyncCycleResult> {
        let start = Instant::now();
        let mut result = SyncCycleResult::starting(self.dispatcher.app().cursor());
        let mut allow_retry = true;

        let outcome = loop {
            match self.attempt(allow_retry, &mut result).await {
                Ok(Attempt::Done) => break Ok(()),
                Ok(Attempt::Retry) => {
                    allow_retry = false;
                    result.conflict_retries += 1;
                    self.stats.write().conflicts_handled += 1;
                }
                Err(e) => break Err(e),
            }
        };

        result.duration = start.elapsed();
        match outcome {
            Ok(()) => {
                result.cursor_after = self.dispatcher.app().cursor();
                self.set_state(SyncState::Synced);
                let mut stats = self.stats.write();
                stats.cycles_completed += 1;
                stats.records_pulled += result.pulled as u64;
                stats.records_pushed += result.pushed as u64;
                stats.last_sync_time = Some(Instant::now());
                stats.last_error = None;
                info!(
                    cursor = result.cursor_after,
                    pulled = result.pulled,
                    pushed = result.pushed,
                    "sync cycle completed"
                );
                Ok(result)
            }
            Err(e) => {
                self.handle_error(&e);
                Err(e)
            }
        }
    }

    async fn attempt(&self, allow_retry: bool, result: &mut SyncCycleResult) -> SyncResult<Attempt> {
        self.set_state(SyncState::Handshaking);
        let user_id = self.dispatcher.local().user_id()?;
        debug!(%user_id, "handshake");
        let user = self.transport.ensure_user(&user_id).await?;
        let channels = user.notification_channels;
        self.dispatcher.dispatch(Action::UpdateNotificationChannels(channels));

        self.set_state(SyncState::Pulling);
        let sent = self.dispatcher.app().cursor();
        debug!(cursor = sent, "pulling");
        let pulled = self.transport.pull(&user.id_user, sent).await;
        self.stats.write().pull_calls += 1;
        let pulled = pulled?;
        let cursor = pulled.cursor().ok_or(SyncError::MissingCursor("pull"))?;
        if cursor < sent {
            warn!(sent, received = cursor, "server cursor regressed, marking all records pending");
            self.dispatcher.dispatch(Action::MarkAllAsDirty);
        }
        if let Some(changes) = pulled.changes {
            result.pulled += changes.len();
            self.dispatcher.dispatch(Action::SyncChanges(changes));
        }
        self.dispatcher.dispatch(Action::UpdateLastSyncTime(cursor));

        let app = self.dispatcher.app();
        if !app.can_push_changes() {
            debug!("push disabled, pull-only cycle");
            return Ok(Attempt::Done);
        }
        let body = if self.config.access_tags_notes && app.sync_tags_and_notes {
            self.dispatcher.pending_changes()
        } else {
            PushBody::default()
        };
        if body.is_empty() {
            debug!("nothing to push");
            return Ok(Attempt::Done);
        }

        self.set_state(SyncState::Pushing);
        let cursor = app.cursor();
        debug!(records = body.len(), cursor, "pushing");
        let outcome = self.transport.push(&user.id_user, cursor, &body).await;
        self.stats.write().push_calls += 1;

        match outcome? {
            PushOutcome::Accepted(response) => {
                let cursor = response.cursor().ok_or(SyncError::MissingCursor("push"))?;
                result.pushed += body.len();
                result.push_attempted = true;
                self.dispatcher.dispatch(Action::ConfirmPush(body));
                if let Some(changes) = response.changes {
                    result.pulled += changes.len();
                    self.dispatcher.dispatch(Action::SyncChanges(changes));
                }
                self.dispatcher.dispatch(Action::UpdateLastSyncTime(cursor));
                Ok(Attempt::Done)
            }
            PushOutcome::DuplicateInsert(_) if !allow_retry => {
                Err(SyncError::ConflictRetryExhausted { status: 409 })
            }
            PushOutcome::DuplicateInsert(conflict) => {
                self.demote(conflict);
                Ok(Attempt::Retry)
            }
            PushOutcome::PreconditionFailed if !allow_retry => {
                Err(SyncError::ConflictRetryExhausted { status: 412 })
            }
            PushOutcome::PreconditionFailed => {
                info!("stale precondition, clearing local replica and retrying");
                self.dispatcher.dispatch(Action::ClearDatabase);
                Ok(Attempt::Retry)
            }
        }
    }

    fn demote(&self, conflict: Option<ConflictInfo>) {
        let target = conflict.and_then(|c| c.kind().map(|kind| (kind, c.should_not_exist)));
        let Some((kind, keys)) = target else {
            warn!("duplicate insert without a usable conflict body, retrying as is");
            return;
        };
        info!(collection = %kind, keys = keys.len(), "duplicate insert, demoting to update");
        self.dispatcher.dispatch(Action::UpdateDirtyStatus {
            collection: kind,
            keys,
            from: Dirty::Insert,
            to: Dirty::Update,
        });
    }

    fn handle_error(&self, error: &SyncError) {
        warn!(error = %error, "sync cycle failed");
        self.set_state(SyncState::Error);
        self.stats.write().last_error = Some(error.to_string());
    }
}

impl<T: SyncTransport> std::fmt::Debug for SyncEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
