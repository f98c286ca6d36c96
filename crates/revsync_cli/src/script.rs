//! Replay scripts.
//!
//! A script is a JSON file naming entities by string keys:
//!
//! ```json
//! {
//!   "database": "inventory",
//!   "policy": "last-write-wins",
//!   "steps": [
//!     { "op": "create", "key": "a", "doc": { "sku": "A-1", "qty": 1 } },
//!     { "op": "flush" },
//!     { "op": "remote-update", "key": "a", "doc": { "sku": "A-1", "qty": 9 } },
//!     { "op": "update", "key": "a", "doc": { "sku": "A-1", "qty": 2 } },
//!     { "op": "flush" }
//!   ]
//! }
//! ```
//!
//! `remote-update` and `remote-delete` write straight to the store, as a
//! concurrent client would.

use revsync_engine::{DocumentSession, FlushReport, SessionConfig, SyncError};
use revsync_protocol::{ConflictPolicy, Document, EntityId, ProtocolError};
use revsync_store::{DocumentServer, StoreConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors raised while loading or replaying a script.
#[derive(Error, Debug)]
pub enum ScriptError {
    /// The script file could not be read.
    #[error("cannot read script: {0}")]
    Io(#[from] std::io::Error),

    /// The script is not valid JSON or has an unknown step.
    #[error("invalid script: {0}")]
    Json(#[from] serde_json::Error),

    /// A document could not be encoded.
    #[error("invalid document: {0}")]
    Codec(#[from] ProtocolError),

    /// A step names a key no earlier step created.
    #[error("step {step}: unknown key {key:?}")]
    UnknownKey {
        /// Step index.
        step: usize,
        /// The key.
        key: String,
    },

    /// A create step reuses a key.
    #[error("step {step}: key {key:?} already exists")]
    DuplicateKey {
        /// Step index.
        step: usize,
        /// The key.
        key: String,
    },

    /// The engine refused a step.
    #[error("step {step}: {source}")]
    Sync {
        /// Step index.
        step: usize,
        /// Engine error.
        #[source]
        source: SyncError,
    },
}

/// A parsed script.
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    /// Database name.
    #[serde(default = "default_database")]
    pub database: String,
    /// Conflict policy, unless overridden on the command line.
    #[serde(default)]
    pub policy: Option<ConflictPolicy>,
    /// Whether flushes are forced.
    #[serde(default)]
    pub force: bool,
    /// Steps, in order.
    pub steps: Vec<ScriptStep>,
}

fn default_database() -> String {
    "default".to_string()
}

impl Script {
    /// Reads a script from a file.
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parses a script from JSON text.
    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Index of the first flush step, if any.
    pub fn first_flush(&self) -> Option<usize> {
        self.steps.iter().position(|s| matches!(s, ScriptStep::Flush))
    }
}

/// One script step.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum ScriptStep {
    /// Persist a new entity.
    Create {
        /// Entity key.
        key: String,
        /// Entity state.
        doc: serde_json::Value,
    },
    /// Replace a tracked entity's state.
    Update {
        /// Entity key.
        key: String,
        /// New state.
        doc: serde_json::Value,
    },
    /// Schedule a tracked entity for deletion.
    Remove {
        /// Entity key.
        key: String,
    },
    /// Overwrite the stored document behind the session's back.
    RemoteUpdate {
        /// Entity key.
        key: String,
        /// New stored state.
        doc: serde_json::Value,
    },
    /// Delete the stored document behind the session's back.
    RemoteDelete {
        /// Entity key.
        key: String,
    },
    /// Flush the session.
    Flush,
}

/// What one flush did, with identities shown as script keys.
#[derive(Debug, Clone, Serialize)]
pub struct FlushSummary {
    /// Index of the flush step.
    pub step: usize,
    /// Operations submitted.
    pub submitted: usize,
    /// Operations accepted.
    pub accepted: usize,
    /// Keys whose write conflicted.
    pub conflicts: Vec<String>,
    /// Keys whose write was rejected, with the reason.
    pub rejections: Vec<(String, String)>,
    /// Keys whose remote revision a forced write replaced.
    pub displaced: Vec<String>,
    /// Resolver decisions.
    pub resolutions: Vec<ResolutionSummary>,
    /// Keys still needing attention.
    pub unresolved: Vec<String>,
    /// Network operations performed.
    pub network_operations: usize,
}

/// One resolver decision.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionSummary {
    /// Entity key.
    pub key: String,
    /// Action taken.
    pub action: String,
    /// Lifecycle state afterwards.
    pub state: String,
    /// Revision afterwards.
    pub revision: Option<String>,
}

/// A stored document at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    /// Entity key.
    pub key: String,
    /// Current revision.
    pub revision: String,
    /// Current state.
    pub document: serde_json::Value,
}

/// Replays script steps against an in-process reference store.
pub struct ScriptRunner {
    server: Arc<DocumentServer>,
    session: DocumentSession<Arc<DocumentServer>>,
    keys: BTreeMap<String, EntityId>,
}

impl ScriptRunner {
    /// Creates a runner with an empty store.
    pub fn new(config: SessionConfig, store_config: StoreConfig) -> Self {
        let server = Arc::new(DocumentServer::new(config.database.clone(), store_config));
        let session = DocumentSession::new(config, Arc::clone(&server));
        Self {
            server,
            session,
            keys: BTreeMap::new(),
        }
    }

    /// The session.
    pub fn session(&self) -> &DocumentSession<Arc<DocumentServer>> {
        &self.session
    }

    /// The server.
    pub fn server(&self) -> &Arc<DocumentServer> {
        &self.server
    }

    /// Applies one step. Returns a summary for flush steps.
    pub fn apply(&mut self, step: usize, script_step: &ScriptStep) -> Result<Option<FlushSummary>, ScriptError> {
        let sync = |source: SyncError| ScriptError::Sync { step, source };
        match script_step {
            ScriptStep::Create { key, doc } => {
                if self.keys.contains_key(key) {
                    return Err(ScriptError::DuplicateKey {
                        step,
                        key: key.clone(),
                    });
                }
                let id = self.session.persist(doc).map_err(sync)?;
                self.keys.insert(key.clone(), id);
            }
            ScriptStep::Update { key, doc } => {
                let id = self.lookup(step, key)?;
                self.session.update(id, doc).map_err(sync)?;
            }
            ScriptStep::Remove { key } => {
                let id = self.lookup(step, key)?;
                self.session.remove(id).map_err(sync)?;
            }
            ScriptStep::RemoteUpdate { key, doc } => {
                let id = self.lookup(step, key)?;
                let revision = self.server.store().overwrite(id, Document::from_entity(doc)?);
                debug!(step, key = %key, revision = %revision, "remote update");
            }
            ScriptStep::RemoteDelete { key } => {
                let id = self.lookup(step, key)?;
                self.server.store().delete(id);
            }
            ScriptStep::Flush => {
                let report = self.session.flush().map_err(sync)?;
                return Ok(Some(self.summarize(step, &report)));
            }
        }
        Ok(None)
    }

    /// Applies every step, collecting flush summaries.
    pub fn run(&mut self, steps: &[ScriptStep]) -> Result<Vec<FlushSummary>, ScriptError> {
        let mut flushes = Vec::new();
        for (index, step) in steps.iter().enumerate() {
            if let Some(summary) = self.apply(index, step)? {
                flushes.push(summary);
            }
        }
        Ok(flushes)
    }

    /// Script key of an identity, or the identity itself if unnamed.
    pub fn key_of(&self, id: EntityId) -> String {
        self.keys
            .iter()
            .find(|(_, known)| **known == id)
            .map_or_else(|| id.to_string(), |(key, _)| key.clone())
    }

    /// Live documents in the store, by key.
    pub fn documents(&self) -> Result<Vec<DocumentSummary>, ScriptError> {
        let mut documents = self
            .server
            .store()
            .documents()
            .into_iter()
            .map(|stored| {
                Ok(DocumentSummary {
                    key: self.key_of(stored.entity_id),
                    revision: stored.revision.to_string(),
                    document: stored.document.to_entity()?,
                })
            })
            .collect::<Result<Vec<_>, ProtocolError>>()?;
        documents.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(documents)
    }

    fn lookup(&self, step: usize, key: &str) -> Result<EntityId, ScriptError> {
        self.keys.get(key).copied().ok_or_else(|| ScriptError::UnknownKey {
            step,
            key: key.to_string(),
        })
    }

    fn summarize(&self, step: usize, report: &FlushReport) -> FlushSummary {
        FlushSummary {
            step,
            submitted: report.submitted,
            accepted: report.accepted,
            conflicts: report.conflicts.iter().map(|id| self.key_of(*id)).collect(),
            rejections: report
                .rejections
                .iter()
                .map(|(id, reason)| (self.key_of(*id), reason.clone()))
                .collect(),
            displaced: report.displaced.iter().map(|(id, _)| self.key_of(*id)).collect(),
            resolutions: report
                .resolutions
                .iter()
                .map(|r| ResolutionSummary {
                    key: self.key_of(r.entity_id),
                    action: r.action.to_string(),
                    state: r.state.to_string(),
                    revision: r.revision.as_ref().map(ToString::to_string),
                })
                .collect(),
            unresolved: report.unresolved().into_iter().map(|id| self.key_of(id)).collect(),
            network_operations: report.network_operations,
        }
    }
}

/// Builds the session configuration for a script.
pub fn session_config(
    script: &Script,
    policy: Option<ConflictPolicy>,
    force: bool,
    max_batch_operations: Option<usize>,
) -> SessionConfig {
    let config = SessionConfig::new(script.database.clone())
        .with_force_bulk_writes(force || script.force)
        .with_conflict_policy(policy.or(script.policy).unwrap_or_default());
    match max_batch_operations {
        Some(limit) => config.with_max_batch_operations(Some(limit)),
        None => config,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFLICT_SCRIPT: &str = r#"{
        "steps": [
            { "op": "create", "key": "a", "doc": { "n": 1 } },
            { "op": "create", "key": "b", "doc": { "n": 1 } },
            { "op": "flush" },
            { "op": "remote-update", "key": "a", "doc": { "n": 50 } },
            { "op": "update", "key": "a", "doc": { "n": 2 } },
            { "op": "remove", "key": "b" },
            { "op": "flush" }
        ]
    }"#;

    fn runner_for(script: &Script, policy: Option<ConflictPolicy>) -> ScriptRunner {
        ScriptRunner::new(session_config(script, policy, false, None), StoreConfig::default())
    }

    #[test]
    fn parse_defaults() {
        let script = Script::parse(r#"{ "steps": [ { "op": "flush" } ] }"#).unwrap();
        assert_eq!(script.database, "default");
        assert!(script.policy.is_none());
        assert!(!script.force);
        assert_eq!(script.first_flush(), Some(0));
    }

    #[test]
    fn parse_rejects_unknown_op() {
        let result = Script::parse(r#"{ "steps": [ { "op": "explode" } ] }"#);
        assert!(matches!(result, Err(ScriptError::Json(_))));
    }

    #[test]
    fn replay_reports_conflicts_by_key() {
        let script = Script::parse(CONFLICT_SCRIPT).unwrap();
        let mut runner = runner_for(&script, None);
        let flushes = runner.run(&script.steps).unwrap();

        assert_eq!(flushes.len(), 2);
        assert_eq!(flushes[0].accepted, 2);
        assert_eq!(flushes[1].submitted, 2);
        assert_eq!(flushes[1].conflicts, vec!["a".to_string()]);
        assert_eq!(flushes[1].unresolved, vec!["a".to_string()]);

        let documents = runner.documents().unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].key, "a");
        assert_eq!(documents[0].document, serde_json::json!({ "n": 50 }));
    }

    #[test]
    fn policy_override_resolves() {
        let script = Script::parse(CONFLICT_SCRIPT).unwrap();
        let mut runner = runner_for(&script, Some(ConflictPolicy::LastWriteWins));
        let flushes = runner.run(&script.steps).unwrap();

        assert!(flushes[1].unresolved.is_empty());
        assert_eq!(flushes[1].resolutions[0].action, "resubmitted");
        let documents = runner.documents().unwrap();
        assert_eq!(documents[0].document, serde_json::json!({ "n": 2 }));
    }

    #[test]
    fn unknown_and_duplicate_keys() {
        let mut runner = ScriptRunner::new(SessionConfig::default(), StoreConfig::default());
        let err = runner
            .apply(0, &ScriptStep::Remove { key: "x".into() })
            .unwrap_err();
        assert!(matches!(err, ScriptError::UnknownKey { step: 0, .. }));

        let create = ScriptStep::Create {
            key: "x".into(),
            doc: serde_json::json!({}),
        };
        runner.apply(1, &create).unwrap();
        assert!(matches!(
            runner.apply(2, &create),
            Err(ScriptError::DuplicateKey { step: 2, .. })
        ));
    }

    #[test]
    fn engine_errors_carry_the_step() {
        let mut runner = ScriptRunner::new(SessionConfig::default(), StoreConfig::default());
        let err = runner
            .apply(
                0,
                &ScriptStep::Create {
                    key: "scalar".into(),
                    doc: serde_json::json!(5),
                },
            )
            .unwrap_err();
        assert!(matches!(err, ScriptError::Sync { step: 0, .. }));
    }
}
