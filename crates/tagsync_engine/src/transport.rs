//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tagsync_protocol::{ConflictInfo, PushBody, SyncResponse, UserResponse};

/// How the server answered a push.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// 2xx: the diff was applied remotely.
    Accepted(SyncResponse),
    /// 409: some inserted keys already exist remotely.
    DuplicateInsert(Option<ConflictInfo>),
    /// 412: the cursor is stale.
    PreconditionFailed,
}

/// A sync transport handles network communication with the sync server.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, mock for testing, etc.). Non-success statuses
/// other than the push conflicts surface as errors.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Registers or looks up the remote user for this installation.
    async fn ensure_user(&self, user_id: &str) -> SyncResult<UserResponse>;

    /// Pulls changes newer than `cursor`.
    async fn pull(&self, id_user: &str, cursor: i64) -> SyncResult<SyncResponse>;

    /// Pushes local changes based on `cursor`.
    async fn push(&self, id_user: &str, cursor: i64, body: &PushBody) -> SyncResult<PushOutcome>;
}

/// A request seen by [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    /// `ensure_user`.
    EnsureUser {
        /// Local user id.
        user_id: String,
    },
    /// `pull`.
    Pull {
        /// Remote user id.
        id_user: String,
        /// Cursor sent.
        cursor: i64,
    },
    /// `push`.
    Push {
        /// Remote user id.
        id_user: String,
        /// Cursor sent.
        cursor: i64,
        /// Diff sent.
        body: PushBody,
    },
}

/// A scripted transport for testing.
///
/// Responses are consumed in order. When a queue is empty, pulls and pushes
/// answer with the cursor they were sent and no changes.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    user: Mutex<UserResponse>,
    user_errors: Mutex<VecDeque<SyncError>>,
    pulls: Mutex<VecDeque<SyncResult<SyncResponse>>>,
    pushes: Mutex<VecDeque<SyncResult<PushOutcome>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a new mock transport for remote user `"1"`.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            user: Mutex::new(UserResponse::new("1")),
            user_errors: Mutex::new(VecDeque::new()),
            pulls: Mutex::new(VecDeque::new()),
            pushes: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sets the handshake response.
    pub fn set_user(&self, user: UserResponse) {
        *self.user.lock() = user;
    }

    /// Makes the next handshake fail.
    pub fn fail_next_user(&self, error: SyncError) {
        self.user_errors.lock().push_back(error);
    }

    /// Queues a pull response.
    pub fn queue_pull(&self, response: SyncResponse) {
        self.pulls.lock().push_back(Ok(response));
    }

    /// Queues a pull failure.
    pub fn queue_pull_error(&self, error: SyncError) {
        self.pulls.lock().push_back(Err(error));
    }

    /// Queues a push outcome.
    pub fn queue_push(&self, outcome: PushOutcome) {
        self.pushes.lock().push_back(Ok(outcome));
    }

    /// Queues a push failure.
    pub fn queue_push_error(&self, error: SyncError) {
        self.pushes.lock().push_back(Err(error));
    }

    /// Sets the connected state. A disconnected mock fails every call.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Every request seen so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Bodies of every push seen so far.
    pub fn pushed_bodies(&self) -> Vec<PushBody> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RecordedCall::Push { body, .. } => Some(body.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of push requests seen so far.
    pub fn push_count(&self) -> usize {
        self.pushed_bodies().len()
    }

    /// Number of pull requests seen so far.
    pub fn pull_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, RecordedCall::Pull { .. }))
            .count()
    }

    fn check_connected(&self) -> SyncResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::transport_retryable("not connected"))
        }
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn ensure_user(&self, user_id: &str) -> SyncResult<UserResponse> {
        self.calls.lock().push(RecordedCall::EnsureUser {
            user_id: user_id.to_string(),
        });
        self.check_connected()?;
        if let Some(error) = self.user_errors.lock().pop_front() {
            return Err(error);
        }
        Ok(self.user.lock().clone())
    }

    async fn pull(&self, id_user: &str, cursor: i64) -> SyncResult<SyncResponse> {
        self.calls.lock().push(RecordedCall::Pull {
            id_user: id_user.to_string(),
            cursor,
        });
        self.check_connected()?;
        let scripted = self.pulls.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(SyncResponse::new(cursor)))
    }

    async fn push(&self, id_user: &str, cursor: i64, body: &PushBody) -> SyncResult<PushOutcome> {
        self.calls.lock().push(RecordedCall::Push {
            id_user: id_user.to_string(),
            cursor,
            body: body.clone(),
        });
        self.check_connected()?;
        let scripted = self.pushes.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(PushOutcome::Accepted(SyncResponse::new(cursor))))
    }
}
