//! Error types for the sync engine.

use revsync_protocol::{EntityId, ProtocolError};
use thiserror::Error;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while tracking or flushing entities.
#[derive(Error, Debug)]
pub enum SyncError {
    /// An entity with this identity is already tracked.
    #[error("entity {0} is already tracked")]
    DuplicateIdentity(EntityId),

    /// The entity is not tracked by this unit of work.
    #[error("entity {0} is not tracked")]
    UnknownEntity(EntityId),

    /// The requested lifecycle change is not allowed from the current state.
    #[error("invalid state transition for {entity_id}: {from} -> {to}")]
    InvalidStateTransition {
        /// Entity ID.
        entity_id: EntityId,
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// Network or transport error. No tracker state was changed.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The store did not answer in time. The batch may or may not have been applied.
    #[error("operation timed out")]
    Timeout,

    /// Not connected.
    #[error("not connected to store")]
    NotConnected,

    /// Protocol error (invalid or mismatched response).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] ProtocolError),

    /// The store reported an error for the whole request.
    #[error("store error: {0}")]
    ServerError(String),

    /// One or more writes conflicted and were left unresolved.
    #[error("{} unresolved conflict(s)", .0.len())]
    Conflicts(Vec<EntityId>),

    /// One or more writes were rejected by the store.
    #[error("{} write(s) rejected: {}", .0.len(), first_reason(.0))]
    Rejected(Vec<(EntityId, String)>),

    /// The change set is larger than one batch may be. It is never split.
    #[error("change set of {size} operations exceeds the batch limit of {limit}")]
    BatchTooLarge {
        /// Operations in the change set.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The flush was cancelled.
    #[error("flush cancelled")]
    Cancelled,

    /// The session was closed.
    #[error("session is closed")]
    SessionClosed,
}

fn first_reason(rejections: &[(EntityId, String)]) -> &str {
    rejections.first().map(|(_, reason)| reason.as_str()).unwrap_or("")
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

    /// Creates an invalid state transition error.
    pub fn invalid_transition(
        entity_id: EntityId,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::InvalidStateTransition {
            entity_id,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns true if the same flush can simply be attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout | SyncError::NotConnected => true,
            SyncError::ServerError(_) => true,
            _ => false,
        }
    }

    /// Returns true for errors caused by calling the API incorrectly.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            SyncError::DuplicateIdentity(_)
                | SyncError::UnknownEntity(_)
                | SyncError::InvalidStateTransition { .. }
                | SyncError::SessionClosed
        )
    }

    /// Returns true if a submitted batch may have been applied even though
    /// no usable response was received. A store error may come from a
    /// gateway in front of a store that already applied the batch.
    pub fn leaves_outcome_unknown(&self) -> bool {
        matches!(
            self,
            SyncError::Timeout | SyncError::Cancelled | SyncError::ServerError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection reset").is_retryable());
        assert!(!SyncError::transport_fatal("bad certificate").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::NotConnected.is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(!SyncError::Conflicts(vec![EntityId::new()]).is_retryable());
    }

    #[test]
    fn unknown_outcome_errors() {
        assert!(SyncError::Timeout.leaves_outcome_unknown());
        assert!(SyncError::Cancelled.leaves_outcome_unknown());
        assert!(SyncError::ServerError("502: bad gateway".into()).leaves_outcome_unknown());
        assert!(!SyncError::transport_retryable("connection refused").leaves_outcome_unknown());
        assert!(!SyncError::NotConnected.leaves_outcome_unknown());
        assert!(!SyncError::BatchTooLarge { size: 2, limit: 1 }.leaves_outcome_unknown());
    }

    #[test]
    fn misuse_errors() {
        let id = EntityId::new();
        assert!(SyncError::DuplicateIdentity(id).is_misuse());
        assert!(SyncError::UnknownEntity(id).is_misuse());
        assert!(!SyncError::Timeout.is_misuse());
    }

    #[test]
    fn error_display() {
        let id = EntityId::from_bytes([0; 16]);
        let err = SyncError::Rejected(vec![(id, "too large".into())]);
        let msg = err.to_string();
        assert!(msg.contains("1 write(s) rejected"));
        assert!(msg.contains("too large"));

        let err = SyncError::BatchTooLarge { size: 12, limit: 10 };
        assert!(err.to_string().contains("12"));
        assert!(err.to_string().contains("10"));
    }
}
