//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for mutation log operations.
pub type LogResult<T> = Result<T, LogError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The device is offline. Guard failure: consumes no retries and marks
    /// nothing failed.
    #[error("device is offline")]
    Offline,

    /// No auth credential was available. Guard failure, like [`Self::Offline`].
    #[error("no auth token available")]
    NoAuthToken,

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The transport call timed out.
    #[error("request timed out")]
    Timeout,

    /// Token invalid or expired (HTTP 401). Never blindly retried; the token
    /// provider is consulted fresh on the next trigger.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Permission denied (HTTP 403). Terminal for the batch.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Malformed request or response. Treated as a transport failure.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server rejected the batch.
    #[error("server error: {0}")]
    Server(String),

    /// Mutation log failure.
    #[error("mutation log error: {0}")]
    Log(#[from] LogError),

    /// Local entity store failure during merge write-back.
    #[error("entity store error: {0}")]
    Store(String),

    /// The pass was cancelled by shutdown.
    #[error("sync cancelled")]
    Cancelled,
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

    /// Returns true if the pass may retry after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::Server(_) => true,
            // Malformed response is treated identically to a transport failure.
            SyncError::Protocol(_) => true,
            _ => false,
        }
    }

    /// Returns true if this is a guard failure that precedes the pass proper.
    pub fn is_guard_failure(&self) -> bool {
        matches!(self, SyncError::Offline | SyncError::NoAuthToken)
    }
}

/// Errors raised by a mutation log store.
#[derive(Error, Debug)]
pub enum LogError {
    /// Underlying I/O failure.
    #[error("log i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A journal record could not be encoded or decoded.
    #[error("corrupt log record: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// The referenced change is not in the log.
    #[error("unknown change id: {0}")]
    UnknownChange(uuid::Uuid),
}
