//! Replay command implementation.

use crate::script::{session_config, DocumentSummary, FlushSummary, Script, ScriptError, ScriptRunner};
use revsync_protocol::ConflictPolicy;
use revsync_store::{RevisionScheme, StoreConfig};
use serde::Serialize;
use std::path::Path;

/// Command-line overrides for a replay.
#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Conflict policy overriding the script's.
    pub policy: Option<ConflictPolicy>,
    /// Force every flush.
    pub force: bool,
    /// Session-side batch limit.
    pub max_batch: Option<usize>,
    /// Revision scheme of the reference store.
    pub revision_scheme: RevisionScheme,
    /// Fail if any flush leaves a conflict or rejection behind.
    pub strict: bool,
}

/// Replay result.
#[derive(Debug, Serialize)]
pub struct ReplayResult {
    /// Database name.
    pub database: String,
    /// Conflict policy in effect.
    pub policy: String,
    /// One entry per flush step.
    pub flushes: Vec<FlushSummary>,
    /// Store contents afterwards.
    pub documents: Vec<DocumentSummary>,
    /// Bulk requests the store received.
    pub bulk_requests: u64,
}

impl ReplayResult {
    /// Returns true if every flush ended with nothing unresolved.
    pub fn is_clean(&self) -> bool {
        self.flushes
            .iter()
            .all(|f| f.unresolved.is_empty() && f.rejections.is_empty())
    }
}

/// Replays a parsed script.
pub fn replay(script: &Script, options: &ReplayOptions) -> Result<ReplayResult, ScriptError> {
    let config = session_config(script, options.policy, options.force, options.max_batch);
    let policy = config.conflict_policy.to_string();
    let store_config = StoreConfig::new().with_revision_scheme(options.revision_scheme);

    let mut runner = ScriptRunner::new(config, store_config);
    let flushes = runner.run(&script.steps)?;

    Ok(ReplayResult {
        database: script.database.clone(),
        policy,
        flushes,
        documents: runner.documents()?,
        bulk_requests: runner.server().bulk_request_count(),
    })
}

/// Runs the replay command.
pub fn run(
    script_path: &Path,
    options: &ReplayOptions,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let script = Script::load(script_path)?;
    let result = replay(&script, options)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => print_text(&result),
    }

    if options.strict && !result.is_clean() {
        return Err("replay left unresolved conflicts or rejections".into());
    }
    Ok(())
}

fn print_text(result: &ReplayResult) {
    println!("=== Replay: {} (policy {}) ===", result.database, result.policy);
    println!();

    for flush in &result.flushes {
        println!(
            "flush at step {}: submitted {}, accepted {}, network operations {}",
            flush.step, flush.submitted, flush.accepted, flush.network_operations
        );
        for key in &flush.conflicts {
            println!("  conflict: {key}");
        }
        for (key, reason) in &flush.rejections {
            println!("  rejected: {key} ({reason})");
        }
        for key in &flush.displaced {
            println!("  displaced: {key}");
        }
        for resolution in &flush.resolutions {
            println!(
                "  resolved {}: {} -> {} at {}",
                resolution.key,
                resolution.action,
                resolution.state,
                resolution.revision.as_deref().unwrap_or("-")
            );
        }
        if !flush.unresolved.is_empty() {
            println!("  unresolved: {}", flush.unresolved.join(", "));
        }
    }

    println!();
    println!("Documents ({}):", result.documents.len());
    for document in &result.documents {
        println!("  {:<12} {:<24} {}", document.key, document.revision, document.document);
    }
    println!();
    println!("Bulk requests: {}", result.bulk_requests);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SCRIPT: &str = r#"{
        "database": "inventory",
        "steps": [
            { "op": "create", "key": "a", "doc": { "qty": 1 } },
            { "op": "create", "key": "b", "doc": { "qty": 1 } },
            { "op": "create", "key": "c", "doc": { "qty": 1 } },
            { "op": "flush" },
            { "op": "remote-update", "key": "a", "doc": { "qty": 7 } },
            { "op": "update", "key": "a", "doc": { "qty": 2 } },
            { "op": "update", "key": "b", "doc": { "qty": 2 } },
            { "op": "flush" }
        ]
    }"#;

    fn script_file(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn three_creates_are_one_request() {
        let script = Script::parse(SCRIPT).unwrap();
        let result = replay(&script, &ReplayOptions::default()).unwrap();

        assert_eq!(result.flushes[0].submitted, 3);
        assert_eq!(result.bulk_requests, 2);
        assert_eq!(result.flushes[1].conflicts, vec!["a".to_string()]);
        assert!(!result.is_clean());
    }

    #[test]
    fn first_write_wins_keeps_remote() {
        let script = Script::parse(SCRIPT).unwrap();
        let options = ReplayOptions {
            policy: Some(ConflictPolicy::FirstWriteWins),
            ..ReplayOptions::default()
        };
        let result = replay(&script, &options).unwrap();

        assert!(result.is_clean());
        let a = result.documents.iter().find(|d| d.key == "a").unwrap();
        assert_eq!(a.document, serde_json::json!({ "qty": 7 }));
    }

    #[test]
    fn counter_revisions() {
        let script = Script::parse(SCRIPT).unwrap();
        let options = ReplayOptions {
            revision_scheme: RevisionScheme::Counter,
            ..ReplayOptions::default()
        };
        let result = replay(&script, &options).unwrap();
        let b = result.documents.iter().find(|d| d.key == "b").unwrap();
        assert_eq!(b.revision, "2");
    }

    #[test]
    fn batch_limit_stops_the_replay() {
        let script = Script::parse(SCRIPT).unwrap();
        let options = ReplayOptions {
            max_batch: Some(2),
            ..ReplayOptions::default()
        };
        let err = replay(&script, &options).unwrap_err();
        assert!(matches!(err, ScriptError::Sync { step: 3, .. }));
    }

    #[test]
    fn run_from_file() {
        let file = script_file(SCRIPT);
        let options = ReplayOptions {
            policy: Some(ConflictPolicy::LastWriteWins),
            strict: true,
            ..ReplayOptions::default()
        };
        run(file.path(), &options, "json").unwrap();
        run(file.path(), &options, "text").unwrap();
    }

    #[test]
    fn strict_fails_on_conflict() {
        let file = script_file(SCRIPT);
        let options = ReplayOptions {
            strict: true,
            ..ReplayOptions::default()
        };
        assert!(run(file.path(), &options, "text").is_err());
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = run(&dir.path().join("absent.json"), &ReplayOptions::default(), "text");
        assert!(result.is_err());
    }
}
