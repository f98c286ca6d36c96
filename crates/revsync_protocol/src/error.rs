//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while building, encoding or decoding protocol values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Failed to encode a value to CBOR.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode CBOR bytes.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// A document did not serialize to a CBOR map.
    #[error("document must be a map, got {found}")]
    NotAMap {
        /// Kind of value that was produced instead.
        found: &'static str,
    },

    /// An operation is missing a field its kind requires, or carries one it must not.
    #[error("invalid {kind} operation for {entity_id}: {message}")]
    InvalidOperation {
        /// Operation kind.
        kind: &'static str,
        /// Entity the operation targets.
        entity_id: String,
        /// What is wrong.
        message: String,
    },
}

impl ProtocolError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }
}
