//! Error types for protocol records.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while reading change events.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The operation name is not one of `Insert`, `Update`, `Delete`.
    #[error("unknown operation: {value}")]
    UnknownOperation {
        /// The rejected name.
        value: String,
    },

    /// A required field is absent or null.
    #[error("missing field: {field}")]
    MissingField {
        /// Field name.
        field: &'static str,
    },

    /// A field has the wrong type or format.
    #[error("invalid field {field}: {message}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Description of the problem.
        message: String,
    },

    /// Payload codec error.
    #[error("payload error: {0}")]
    Codec(#[from] stockpile_codec::CodecError),
}

impl ProtocolError {
    /// Creates an invalid field error.
    pub fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }
}
