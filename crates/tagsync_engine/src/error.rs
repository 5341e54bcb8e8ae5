//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server answered with a status the protocol does not expect.
    #[error("unexpected status {status} from {endpoint}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Which call failed (handshake, pull, push).
        endpoint: &'static str,
    },

    /// A pull or push response did not carry `lastSyncedAt`.
    #[error("response from {0} is missing lastSyncedAt")]
    MissingCursor(&'static str),

    /// Protocol error (invalid message format).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A 409 or 412 came back after the single conflict retry was spent.
    #[error("conflict status {status} persisted after retry")]
    ConflictRetryExhausted {
        /// HTTP status code.
        status: u16,
    },

    /// Sync endpoints are not configured.
    #[error("sync endpoints are not configured")]
    NotConfigured,

    /// Store dependencies form a cycle for an action kind.
    #[error("store dependency cycle for action {action}")]
    DependencyCycle {
        /// Debug name of the action kind.
        action: String,
    },

    /// Replica persistence failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Another process holds the replica lock.
    #[error("replica directory is locked by another process")]
    Locked,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if a later attempt may succeed without local changes.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::UnexpectedStatus { status, .. } => *status >= 500 || *status == 429,
            SyncError::MissingCursor(_) | SyncError::ConflictRetryExhausted { .. } => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return SyncError::Protocol(err.to_string());
        }
        if err.is_builder() {
            return SyncError::transport_fatal(err.to_string());
        }
        SyncError::transport_retryable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("invalid url").is_retryable());
        assert!(SyncError::UnexpectedStatus {
            status: 503,
            endpoint: "pull"
        }
        .is_retryable());
        assert!(!SyncError::UnexpectedStatus {
            status: 400,
            endpoint: "push"
        }
        .is_retryable());
        assert!(SyncError::MissingCursor("pull").is_retryable());
        assert!(!SyncError::NotConfigured.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::ConflictRetryExhausted { status: 409 };
        assert!(err.to_string().contains("409"));

        let err = SyncError::MissingCursor("push");
        assert_eq!(err.to_string(), "response from push is missing lastSyncedAt");
    }
}
