//! Error types for stockpile core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Result type for local store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// One failed attempt of the decode chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeAttempt {
    /// Name of the strategy that was tried.
    pub strategy: &'static str,
    /// Why it failed.
    pub error: String,
}

fn last_attempt(attempts: &[DecodeAttempt]) -> String {
    match attempts.last() {
        Some(a) => format!("{} failed: {}", a.strategy, a.error),
        None => "no strategies configured".to_string(),
    }
}

/// Errors raised by a [`LocalStore`](crate::LocalStore) adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The table does not exist.
    #[error("table not found: {table}")]
    TableNotFound {
        /// Table name.
        table: String,
    },

    /// The column does not exist in the table.
    #[error("unknown column {column} in table {table}")]
    UnknownColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// A constraint (primary key, not null) was violated.
    #[error("constraint violated in table {table}: {message}")]
    Constraint {
        /// Table name.
        table: String,
        /// Description of the violation.
        message: String,
    },

    /// Transaction primitives were used out of order.
    #[error("transaction error: {message}")]
    Transaction {
        /// Description of the misuse.
        message: String,
    },

    /// SQLite reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A fault injected by a test double.
    #[error("injected fault during {operation}")]
    Fault {
        /// The operation that was made to fail.
        operation: String,
    },
}

impl StoreError {
    /// Creates a table-not-found error.
    pub fn table_not_found(table: impl Into<String>) -> Self {
        Self::TableNotFound {
            table: table.into(),
        }
    }

    /// Creates a transaction misuse error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }
}

/// Errors that can occur in stockpile core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Blob repository or state store error.
    #[error("storage error: {0}")]
    Storage(#[from] stockpile_storage::StorageError),

    /// Row or document codec error.
    #[error("codec error: {0}")]
    Codec(#[from] stockpile_codec::CodecError),

    /// Local store error outside a restore transaction.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// No decode strategy could read the payload.
    #[error("cannot decode snapshot: {}", last_attempt(.attempts))]
    Decode {
        /// Every attempt, in the order tried.
        attempts: Vec<DecodeAttempt>,
    },

    /// The decoded payload does not have the snapshot shape.
    #[error("invalid snapshot: {message}")]
    Schema {
        /// Description of the problem.
        message: String,
    },

    /// The restore transaction failed and was rolled back.
    #[error("restore transaction failed: {message}")]
    Transaction {
        /// Description of the failure.
        message: String,
    },

    /// The requested version is not in the ledger.
    #[error("version {version} not found")]
    VersionNotFound {
        /// Requested version.
        version: u64,
    },

    /// A rollback could not be completed.
    #[error("rollback to version {to} failed: {message}")]
    Rollback {
        /// Version that was current when the rollback started.
        from: Option<u64>,
        /// Target version.
        to: u64,
        /// Description of the failure.
        message: String,
    },

    /// Another exclusive operation holds the store.
    #[error("store is busy: {operation} in progress")]
    Busy {
        /// The operation holding the store.
        operation: String,
    },

    /// Compression or decompression failed.
    #[error("compression error: {message}")]
    Compression {
        /// Description of the failure.
        message: String,
    },

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Decryption failed (wrong key, corrupted data).
    #[error("decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Invalid encryption key size.
    #[error("invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize {
        /// Expected size.
        expected: usize,
        /// Actual size.
        actual: usize,
    },

    /// Key derivation failed.
    #[error("key derivation failed: {message}")]
    KeyDerivation {
        /// Description of the failure.
        message: String,
    },

    /// Persisted ledger state could not be read or written.
    #[error("state serialization failed: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Creates a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Creates a compression error.
    pub fn compression(message: impl Into<String>) -> Self {
        Self::Compression {
            message: message.into(),
        }
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a decryption failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid key size error.
    pub fn invalid_key_size(actual: usize, expected: usize) -> Self {
        Self::InvalidKeySize { expected, actual }
    }

    /// Creates a key derivation error.
    pub fn key_derivation_failed(message: impl Into<String>) -> Self {
        Self::KeyDerivation {
            message: message.into(),
        }
    }

    /// Creates a busy error.
    pub fn busy(operation: impl Into<String>) -> Self {
        Self::Busy {
            operation: operation.into(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
