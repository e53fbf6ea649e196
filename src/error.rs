//! Error types for task synchronization.

use thiserror::Error;

/// Main error type for sync operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("Ordered subscription failed: {0}")]
    StreamOrderingFailure(String),

    #[error("Subscription failed: {0}")]
    StreamFatalFailure(String),

    #[error("Write failed: {0}")]
    WriteFailure(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SyncError {
    /// Whether this error is surfaced as the cache's fatal `error`.
    ///
    /// Ordering failures are recovered by the fallback subscription and only
    /// show up as a warning. Input and auth failures never reach the cache.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::StreamFatalFailure(_) | SyncError::WriteFailure(_) | SyncError::NotFound(_)
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
