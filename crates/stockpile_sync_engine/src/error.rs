//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote log could not be reached or rejected a request.
    #[error("remote error: {message}")]
    Remote {
        /// Error message.
        message: String,
        /// Whether a later cycle may succeed.
        retryable: bool,
    },

    /// Local store error.
    #[error("local store error: {0}")]
    Store(#[from] stockpile_core::StoreError),

    /// Durable state error.
    #[error("state error: {0}")]
    Storage(#[from] stockpile_storage::StorageError),

    /// Payload codec error.
    #[error("codec error: {0}")]
    Codec(#[from] stockpile_codec::CodecError),

    /// Malformed change event.
    #[error("protocol error: {0}")]
    Protocol(#[from] stockpile_sync_protocol::ProtocolError),

    /// Sync metadata could not be read or written.
    #[error("metadata error: {message}")]
    Metadata {
        /// Error message.
        message: String,
    },

    /// The operation needs sync to be enabled.
    #[error("sync is disabled")]
    Disabled,
}

impl SyncError {
    /// Creates a retryable remote error.
    pub fn remote_retryable(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable remote error.
    pub fn remote_fatal(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if a later cycle may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote { retryable, .. } => *retryable,
            SyncError::Storage(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Metadata {
            message: err.to_string(),
        }
    }
}
