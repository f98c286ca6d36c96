//! Error types for the document store.

use revsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that fail a whole request.
///
/// Per-document problems are never errors; they are reported as
/// conflict or rejected outcomes inside the bulk response.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The bulk request carries more operations than allowed.
    #[error("too many operations: {size} > {limit}")]
    BatchTooLarge {
        /// Operations in the request.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The request names a database this server does not hold.
    #[error("unknown database: {0}")]
    UnknownDatabase(String),

    /// The request path is not an endpoint.
    #[error("no such endpoint: {0}")]
    UnknownEndpoint(String),

    /// Body could not be decoded or the response could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] ProtocolError),

    /// Internal store error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidRequest(_)
                | StoreError::BatchTooLarge { .. }
                | StoreError::UnknownDatabase(_)
                | StoreError::UnknownEndpoint(_)
                | StoreError::Codec(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, StoreError::Internal(_))
    }

    /// HTTP status code for the error.
    pub fn status_code(&self) -> u16 {
        match self {
            StoreError::UnknownDatabase(_) | StoreError::UnknownEndpoint(_) => 404,
            StoreError::BatchTooLarge { .. } => 413,
            StoreError::InvalidRequest(_) | StoreError::Codec(_) => 400,
            StoreError::Internal(_) => 500,
        }
    }
}
