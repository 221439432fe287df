//! CLI error type.

use std::path::PathBuf;
use stockpile_codec::CodecError;
use stockpile_core::{CoreError, StoreError};
use stockpile_storage::StorageError;
use stockpile_sync_engine::SyncError;
use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by the `stockpile` binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// The config file could not be read.
    #[error("failed to read config file '{}': {source}", path.display())]
    ConfigRead {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`AppConfig`](crate::config::AppConfig).
    #[error("failed to parse config file '{}': {source}", path.display())]
    ConfigParse {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// A config value is malformed.
    #[error("invalid value for {key}: {message}")]
    InvalidSetting {
        /// Setting name.
        key: String,
        /// What is wrong.
        message: String,
    },

    /// A command needs a setting that is not configured.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    /// Invalid command argument.
    #[error("{0}")]
    InvalidArgument(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backup engine error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Local store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Repository or state error.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Row decoding error.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Sync engine error.
    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl CliError {
    /// Creates an invalid setting error.
    pub fn invalid_setting(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key: key.into(),
            message: message.into(),
        }
    }
}
