//! Plan command implementation.

use crate::script::{session_config, Script, ScriptError, ScriptRunner};
use revsync_store::StoreConfig;
use serde::Serialize;
use std::path::Path;

/// One operation of a planned bulk request.
#[derive(Debug, Serialize)]
pub struct PlannedOperation {
    /// Entity key.
    pub key: String,
    /// Operation kind.
    pub kind: String,
    /// Revision the write is based on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_revision: Option<String>,
}

/// Plan result.
#[derive(Debug, Serialize)]
pub struct PlanResult {
    /// Steps replayed before the planned flush.
    pub steps_replayed: usize,
    /// Whether the request would be forced.
    pub force: bool,
    /// Operations, in submission order.
    pub operations: Vec<PlannedOperation>,
}

/// Replays the steps before the first flush (the whole script if it never
/// flushes) and plans that flush without sending it.
pub fn plan(script: &Script, force: bool) -> Result<PlanResult, ScriptError> {
    let config = session_config(script, None, force, None);
    let mut runner = ScriptRunner::new(config, StoreConfig::default());

    let end = script.first_flush().unwrap_or(script.steps.len());
    for (index, step) in script.steps[..end].iter().enumerate() {
        runner.apply(index, step)?;
    }

    let request = runner
        .session()
        .plan()
        .map_err(|source| ScriptError::Sync { step: end, source })?;

    Ok(PlanResult {
        steps_replayed: end,
        force: request.force,
        operations: request
            .operations
            .iter()
            .map(|op| PlannedOperation {
                key: runner.key_of(op.entity_id),
                kind: op.kind.to_string(),
                expected_revision: op.expected_revision.as_ref().map(ToString::to_string),
            })
            .collect(),
    })
}

/// Runs the plan command.
pub fn run(script_path: &Path, force: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let script = Script::load(script_path)?;
    let result = plan(&script, force)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            println!("=== Planned bulk request ===");
            println!("Steps replayed: {}", result.steps_replayed);
            println!("Forced: {}", result.force);
            println!("Operations: {}", result.operations.len());
            for op in &result.operations {
                match &op.expected_revision {
                    Some(revision) => println!("  {:<7} {} @ {}", op.kind, op.key, revision),
                    None => println!("  {:<7} {}", op.kind, op.key),
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn plans_first_flush_in_registration_order() {
        let script = Script::parse(
            r#"{ "steps": [
                { "op": "create", "key": "b", "doc": { "x": 1 } },
                { "op": "create", "key": "a", "doc": { "x": 1 } },
                { "op": "remove", "key": "b" },
                { "op": "create", "key": "c", "doc": { "x": 1 } },
                { "op": "flush" },
                { "op": "create", "key": "late", "doc": { "x": 1 } }
            ] }"#,
        )
        .unwrap();

        let result = plan(&script, false).unwrap();
        assert_eq!(result.steps_replayed, 4);
        let keys: Vec<&str> = result.operations.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "c"]);
        assert!(result.operations.iter().all(|o| o.kind == "create"));
    }

    #[test]
    fn plan_sends_nothing() {
        let script = Script::parse(
            r#"{ "force": true, "steps": [ { "op": "create", "key": "a", "doc": {} } ] }"#,
        )
        .unwrap();
        let result = plan(&script, false).unwrap();
        assert!(result.force);
        assert_eq!(result.operations.len(), 1);
    }

    #[test]
    fn run_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{ "steps": [ { "op": "create", "key": "a", "doc": {} } ] }"#)
            .unwrap();
        run(file.path(), false, "text").unwrap();
        run(file.path(), true, "json").unwrap();
    }
}
