//! Schema migration for persisted workflow states.
//!
//! Migrations form a linear chain. Each step is a pure function from one
//! document shape to the next; loading an old file applies every step
//! between its version and [`CURRENT_SCHEMA_VERSION`] in order.

use super::workflow::CURRENT_SCHEMA_VERSION;
use crate::core::WorkflowInputs;
use crate::errors::MigrationError;
use serde_json::{Map, Value};
use tracing::info;

/// Version assumed for documents without a `version` key.
pub const LEGACY_SCHEMA_VERSION: &str = "1.0";

type MigrationFn = fn(Value) -> Result<Value, MigrationError>;

/// Ordered chain of (from, to, step).
const MIGRATIONS: [(&str, &str, MigrationFn); 2] = [
    ("1.0", "1.1", migrate_1_0_to_1_1),
    ("1.1", "2.0", migrate_1_1_to_2_0),
];

/// Returns the schema version of a raw document.
pub fn detect_version(document: &Value) -> String {
    document
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or(LEGACY_SCHEMA_VERSION)
        .to_string()
}

/// True when the document is older than the current schema.
pub fn needs_migration(document: &Value) -> bool {
    detect_version(document) != CURRENT_SCHEMA_VERSION
}

/// Migrates a raw document to the current schema.
///
/// Documents already at the current version are returned unchanged.
pub fn migrate(mut document: Value) -> Result<Value, MigrationError> {
    let found = detect_version(&document);
    if found == CURRENT_SCHEMA_VERSION {
        return Ok(document);
    }

    let start = MIGRATIONS
        .iter()
        .position(|(from, _, _)| *from == found)
        .ok_or_else(|| classify_unknown(&found))?;

    for (from, to, step) in &MIGRATIONS[start..] {
        document = step(document)?;
        set_version(&mut document, to);
        info!(from = %from, to = %to, "Migrated workflow state schema");
    }
    Ok(document)
}

fn classify_unknown(found: &str) -> MigrationError {
    match (parse_version(found), parse_version(CURRENT_SCHEMA_VERSION)) {
        (Some(found_v), Some(current_v)) if found_v > current_v => MigrationError::Downgrade {
            found: found.to_string(),
            current: CURRENT_SCHEMA_VERSION.to_string(),
        },
        _ => MigrationError::UnknownVersion(found.to_string()),
    }
}

fn parse_version(version: &str) -> Option<(u32, u32)> {
    let (major, minor) = version.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

fn set_version(document: &mut Value, version: &str) {
    if let Some(obj) = document.as_object_mut() {
        obj.insert("version".to_string(), Value::String(version.to_string()));
    }
}

fn root<'a>(
    document: &'a mut Value,
    from: &str,
    to: &str,
) -> Result<&'a mut Map<String, Value>, MigrationError> {
    document
        .as_object_mut()
        .ok_or_else(|| MigrationError::malformed(from, to, "state is not a JSON object"))
}

fn stages_of<'a>(
    root: &'a mut Map<String, Value>,
    from: &str,
    to: &str,
) -> Result<&'a mut Map<String, Value>, MigrationError> {
    let stages = root
        .entry("stages")
        .or_insert_with(|| Value::Object(Map::new()));
    stages
        .as_object_mut()
        .ok_or_else(|| MigrationError::malformed(from, to, "'stages' is not an object"))
}

/// 1.0 -> 1.1: dependency map derived from stages, rollback history added.
fn migrate_1_0_to_1_1(mut document: Value) -> Result<Value, MigrationError> {
    let (from, to) = ("1.0", "1.1");
    let root = root(&mut document, from, to)?;

    if !root.contains_key("stage_dependencies") {
        let stages = stages_of(root, from, to)?;
        let mut deps = Map::new();
        for (name, stage) in stages.iter() {
            let stage_deps = stage
                .get("dependencies")
                .cloned()
                .unwrap_or_else(|| Value::Array(Vec::new()));
            if !stage_deps.is_array() {
                return Err(MigrationError::malformed(
                    from,
                    to,
                    format!("dependencies of stage '{name}' are not a list"),
                ));
            }
            deps.insert(name.clone(), stage_deps);
        }
        root.insert("stage_dependencies".to_string(), Value::Object(deps));
    }
    root.entry("rollback_history")
        .or_insert_with(|| Value::Array(Vec::new()));
    Ok(document)
}

/// 1.1 -> 2.0: per-stage field renames and defaults, metadata and inputs checksum.
fn migrate_1_1_to_2_0(mut document: Value) -> Result<Value, MigrationError> {
    let (from, to) = ("1.1", "2.0");
    let root = root(&mut document, from, to)?;

    let stages = stages_of(root, from, to)?;
    for (name, stage) in stages.iter_mut() {
        let stage = stage.as_object_mut().ok_or_else(|| {
            MigrationError::malformed(from, to, format!("stage '{name}' is not an object"))
        })?;
        if let Some(error) = stage.remove("error") {
            stage.entry("error_message").or_insert(error);
        }
        stage.entry("retry_count").or_insert_with(|| Value::from(0));
        stage
            .entry("metrics")
            .or_insert_with(|| Value::Object(Map::new()));
        stage
            .entry("output_files")
            .or_insert_with(|| Value::Array(Vec::new()));
    }

    root.entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));

    let missing_checksum = root.get("inputs_checksum").map_or(true, Value::is_null);
    let inputs = root.get("inputs").filter(|v| !v.is_null()).cloned();
    if let (true, Some(inputs)) = (missing_checksum, inputs) {
        let inputs: WorkflowInputs = serde_json::from_value(inputs).map_err(|e| {
            MigrationError::malformed(from, to, format!("inputs are unreadable: {e}"))
        })?;
        root.insert(
            "inputs_checksum".to_string(),
            Value::String(inputs.checksum()),
        );
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn legacy_document() -> Value {
        json!({
            "workflow_id": "wf-legacy",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:10:00Z",
            "inputs": {"description": "build a todo app", "overrides": {}},
            "current_stage": "architecture_design",
            "stages": {
                "requirements_analysis": {
                    "status": "completed",
                    "output_files": ["requirements.md"],
                    "dependencies": []
                },
                "architecture_design": {
                    "status": "failed",
                    "error": "model timed out",
                    "dependencies": ["requirements_analysis"]
                }
            }
        })
    }

    #[test]
    fn test_detect_version_defaults_to_legacy() {
        assert_eq!(detect_version(&legacy_document()), "1.0");
        assert!(needs_migration(&legacy_document()));
        assert!(!needs_migration(&json!({"version": "2.0"})));
    }

    #[test]
    fn test_full_chain_from_legacy() {
        let migrated = migrate(legacy_document()).unwrap();

        assert_eq!(migrated["version"], "2.0");
        assert_eq!(
            migrated["stage_dependencies"]["architecture_design"],
            json!(["requirements_analysis"])
        );
        assert_eq!(migrated["rollback_history"], json!([]));
        assert_eq!(migrated["metadata"], json!({}));

        let design = &migrated["stages"]["architecture_design"];
        assert_eq!(design["error_message"], "model timed out");
        assert!(design.get("error").is_none());
        assert_eq!(design["retry_count"], 0);
        assert_eq!(design["output_files"], json!([]));

        let expected = WorkflowInputs::new("build a todo app").checksum();
        assert_eq!(migrated["inputs_checksum"], json!(expected));
    }

    #[test]
    fn test_migrate_from_intermediate_version() {
        let mut doc = legacy_document();
        doc["version"] = json!("1.1");
        doc["stage_dependencies"] = json!({});
        doc["rollback_history"] = json!([]);

        let migrated = migrate(doc).unwrap();
        assert_eq!(migrated["version"], "2.0");
        // 1.0 -> 1.1 was not re-run, so the empty map survives.
        assert_eq!(migrated["stage_dependencies"], json!({}));
    }

    #[test]
    fn test_current_version_untouched() {
        let doc = json!({"version": "2.0", "stages": {}, "custom": 1});
        assert_eq!(migrate(doc.clone()).unwrap(), doc);
    }

    #[test]
    fn test_newer_version_is_downgrade() {
        let err = migrate(json!({"version": "3.0"})).unwrap_err();
        assert!(matches!(err, MigrationError::Downgrade { .. }));
    }

    #[test]
    fn test_unknown_version() {
        let err = migrate(json!({"version": "0.9-beta"})).unwrap_err();
        assert!(matches!(err, MigrationError::UnknownVersion(_)));
    }

    #[test]
    fn test_malformed_stages() {
        let err = migrate(json!({"version": "1.0", "stages": []})).unwrap_err();
        assert!(matches!(err, MigrationError::Malformed { .. }));
    }

    #[test]
    fn test_existing_error_message_wins() {
        let mut doc = legacy_document();
        doc["stages"]["architecture_design"]["error_message"] = json!("newer text");
        let migrated = migrate(doc).unwrap();
        assert_eq!(
            migrated["stages"]["architecture_design"]["error_message"],
            "newer text"
        );
    }
}
