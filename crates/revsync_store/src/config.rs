//! Store configuration.

use std::fmt;
use std::str::FromStr;

/// How the store derives a new revision token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevisionScheme {
    /// Plain per-document generation numbers: `"1"`, `"2"`, ...
    Counter,
    /// Generation plus a content digest: `"2-9f86d081884c7d65"`.
    #[default]
    ContentHash,
}

impl fmt::Display for RevisionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionScheme::Counter => f.write_str("counter"),
            RevisionScheme::ContentHash => f.write_str("content-hash"),
        }
    }
}

impl FromStr for RevisionScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "counter" => Ok(RevisionScheme::Counter),
            "content-hash" | "hash" => Ok(RevisionScheme::ContentHash),
            other => Err(format!("unknown revision scheme: {other}")),
        }
    }
}

/// Configuration for the document store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Largest bulk request accepted, in operations.
    pub max_batch_operations: usize,
    /// Largest document accepted, in encoded bytes.
    pub max_document_bytes: usize,
    /// Revision token format.
    pub revision_scheme: RevisionScheme,
}

impl StoreConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            max_batch_operations: 10_000,
            max_document_bytes: 1024 * 1024,
            revision_scheme: RevisionScheme::ContentHash,
        }
    }

    /// Sets the maximum bulk request size.
    pub fn with_max_batch_operations(mut self, max: usize) -> Self {
        self.max_batch_operations = max;
        self
    }

    /// Sets the maximum document size.
    pub fn with_max_document_bytes(mut self, max: usize) -> Self {
        self.max_document_bytes = max;
        self
    }

    /// Sets the revision scheme.
    pub fn with_revision_scheme(mut self, scheme: RevisionScheme) -> Self {
        self.revision_scheme = scheme;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}
