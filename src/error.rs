//! Error types for the sync layer.

use crate::refs::RefKind;
use thiserror::Error;

/// Main error type for sync operations.
#[derive(Clone, Debug, Error)]
pub enum SyncError {
    /// Malformed path or a reference of the wrong kind. A programming error
    /// at the call site, never retried.
    #[error("invalid {expected} reference: {path:?}")]
    InvalidReferenceKind { expected: RefKind, path: String },

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Wrong call-signature shape (e.g. empty payload where one is required).
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Any other store-level failure, forwarded verbatim.
    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The write gateway has shut down, or a completion channel was dropped
    /// before the result arrived.
    #[error("channel closed")]
    ChannelClosed,
}

impl SyncError {
    /// Whether this error came from the remote store rather than the caller.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            SyncError::NotFound(_)
                | SyncError::PermissionDenied(_)
                | SyncError::Unavailable(_)
                | SyncError::Backend(_)
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
