//! Configuration for document sessions.

use revsync_protocol::ConflictPolicy;
use std::time::Duration;

/// Default upper bound on operations in one flush.
pub const DEFAULT_MAX_BATCH_OPERATIONS: usize = 10_000;

/// Default timeout of one network request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a document session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Name of the database the session writes to.
    pub database: String,
    /// Whether bulk writes are forced (applied regardless of revision, with
    /// displaced revisions reported afterwards) or checked per document.
    pub force_bulk_writes: bool,
    /// How conflicts reported by a flush are resolved.
    pub conflict_policy: ConflictPolicy,
    /// Largest change set a single flush may submit. A larger change set
    /// fails the flush instead of being split.
    pub max_batch_operations: Option<usize>,
    /// Timeout of each request a network transport built from this
    /// configuration sends.
    pub request_timeout: Duration,
}

impl SessionConfig {
    /// Creates a new session configuration.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            force_bulk_writes: false,
            conflict_policy: ConflictPolicy::Fail,
            max_batch_operations: Some(DEFAULT_MAX_BATCH_OPERATIONS),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Sets whether bulk writes are forced.
    pub fn with_force_bulk_writes(mut self, force: bool) -> Self {
        self.force_bulk_writes = force;
        self
    }

    /// Sets the conflict policy.
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Sets the batch limit. `None` removes it.
    pub fn with_max_batch_operations(mut self, limit: Option<usize>) -> Self {
        self.max_batch_operations = limit;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new("default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let config = SessionConfig::default();
        assert!(!config.force_bulk_writes);
        assert_eq!(config.conflict_policy, ConflictPolicy::Fail);
        assert_eq!(config.max_batch_operations, Some(DEFAULT_MAX_BATCH_OPERATIONS));
    }

    #[test]
    fn session_config_builder() {
        let config = SessionConfig::new("inventory")
            .with_force_bulk_writes(true)
            .with_conflict_policy(ConflictPolicy::LastWriteWins)
            .with_max_batch_operations(None)
            .with_request_timeout(Duration::from_secs(5));

        assert_eq!(config.database, "inventory");
        assert!(config.force_bulk_writes);
        assert_eq!(config.conflict_policy, ConflictPolicy::LastWriteWins);
        assert_eq!(config.max_batch_operations, None);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }
}
