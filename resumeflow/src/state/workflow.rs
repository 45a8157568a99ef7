//! The workflow aggregate and its read-only queries.

use crate::core::{PipelineDefinition, StageState, StageStatus, WorkflowInputs};
use crate::errors::{EngineResult, IntegrityError};
use crate::rollback::RollbackPoint;
use crate::utils::{checksum_excluding, now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: &str = "2.0";

/// Top-level keys left out of the whole-state checksum.
pub const CHECKSUM_EXCLUDED_KEYS: [&str; 3] = ["created_at", "updated_at", "state_checksum"];

/// Metadata key set when the workflow has been aborted.
pub const ABORTED_KEY: &str = "aborted";

/// Metadata key set on states restored from a snapshot.
pub const RESTORED_FROM_KEY: &str = "restored_from";

/// Full persisted state of one workflow.
///
/// Fields are only writable from inside the `state` module; everything
/// else reads through the accessors and mutates through
/// [`crate::state::StateStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub(super) workflow_id: String,
    pub(super) created_at: Timestamp,
    pub(super) updated_at: Timestamp,
    #[serde(default)]
    pub(super) inputs: Option<WorkflowInputs>,
    #[serde(default)]
    pub(super) inputs_checksum: Option<String>,
    #[serde(default)]
    pub(super) current_stage: Option<String>,
    #[serde(with = "stage_map")]
    pub(super) stages: Vec<StageState>,
    #[serde(default)]
    pub(super) metadata: BTreeMap<String, Value>,
    pub(super) version: String,
    #[serde(default)]
    pub(super) state_checksum: Option<String>,
    #[serde(default)]
    pub(super) rollback_history: Vec<RollbackPoint>,
    #[serde(default)]
    pub(super) stage_dependencies: BTreeMap<String, Vec<String>>,
}

impl WorkflowState {
    /// Builds a fresh state with every declared stage pending.
    pub(super) fn from_pipeline(
        workflow_id: &str,
        pipeline: &PipelineDefinition,
    ) -> EngineResult<Self> {
        let now = now_utc();
        let stages = pipeline
            .stages()
            .iter()
            .map(|def| StageState::new(&def.name, def.depends_on.clone()))
            .collect();
        let mut state = Self {
            workflow_id: workflow_id.to_string(),
            created_at: now,
            updated_at: now,
            inputs: None,
            inputs_checksum: None,
            current_stage: None,
            stages,
            metadata: BTreeMap::new(),
            version: CURRENT_SCHEMA_VERSION.to_string(),
            state_checksum: None,
            rollback_history: Vec::new(),
            stage_dependencies: pipeline.dependency_map(),
        };
        state.refresh_checksum()?;
        Ok(state)
    }

    /// Returns the workflow id.
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Returns when the workflow was created.
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Returns when the workflow was last modified.
    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Returns the workflow inputs, if set.
    pub fn inputs(&self) -> Option<&WorkflowInputs> {
        self.inputs.as_ref()
    }

    /// Returns the checksum of the inputs, if set.
    pub fn inputs_checksum(&self) -> Option<&str> {
        self.inputs_checksum.as_deref()
    }

    /// Returns the stage most recently started.
    pub fn current_stage(&self) -> Option<&str> {
        self.current_stage.as_deref()
    }

    /// Returns the stages in declared order.
    pub fn stages(&self) -> &[StageState] {
        &self.stages
    }

    /// Looks up a stage by name.
    pub fn stage(&self, name: &str) -> Option<&StageState> {
        self.stages.iter().find(|s| s.name() == name)
    }

    /// Returns the position of a stage in declared order.
    pub fn stage_position(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name() == name)
    }

    /// Returns the free-form metadata.
    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// Returns the schema version tag.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the stored whole-state checksum.
    pub fn state_checksum(&self) -> Option<&str> {
        self.state_checksum.as_deref()
    }

    /// Returns references to recent rollback points, oldest first.
    pub fn rollback_history(&self) -> &[RollbackPoint] {
        &self.rollback_history
    }

    /// Returns the stage dependency mapping.
    pub fn stage_dependencies(&self) -> &BTreeMap<String, Vec<String>> {
        &self.stage_dependencies
    }

    /// Returns the stage currently running, if any.
    pub fn running_stage(&self) -> Option<&StageState> {
        self.stages
            .iter()
            .find(|s| s.status() == StageStatus::Running)
    }

    /// Returns the first paused stage, if any.
    pub fn paused_stage(&self) -> Option<&StageState> {
        self.stages
            .iter()
            .find(|s| s.status() == StageStatus::Paused)
    }

    /// Returns true once the workflow has been aborted.
    pub fn is_aborted(&self) -> bool {
        self.metadata.contains_key(ABORTED_KEY)
    }

    /// First pending or failed stage in declared order.
    ///
    /// Returns `None` when the workflow is aborted, or when a paused stage
    /// comes before every eligible one: execution is halted until someone
    /// intervenes.
    pub fn next_eligible_stage(&self) -> Option<&str> {
        if self.is_aborted() {
            return None;
        }
        for stage in &self.stages {
            match stage.status() {
                StageStatus::Paused => return None,
                status if status.is_eligible() => return Some(stage.name()),
                _ => {}
            }
        }
        None
    }

    /// True when every stage is completed or skipped.
    pub fn is_complete(&self) -> bool {
        self.stages.iter().all(|s| s.status().is_settled())
    }

    /// True when the orchestrator has a stage it could run next.
    pub fn can_resume(&self) -> bool {
        self.next_eligible_stage().is_some()
    }

    /// Builds the front-end status summary.
    pub fn status_summary(&self) -> StatusSummary {
        let total_stages = self.stages.len();
        let completed_stages = self
            .stages
            .iter()
            .filter(|s| s.status().is_settled())
            .count();
        let failed_stages = self
            .stages
            .iter()
            .filter(|s| s.status() == StageStatus::Failed)
            .count();
        #[allow(clippy::cast_precision_loss)]
        let progress_percent = if total_stages == 0 {
            100.0
        } else {
            (completed_stages as f64 / total_stages as f64 * 1000.0).round() / 10.0
        };
        StatusSummary {
            workflow_id: self.workflow_id.clone(),
            total_stages,
            completed_stages,
            failed_stages,
            progress_percent,
            is_complete: self.is_complete(),
            can_resume: self.can_resume(),
            current_stage: self.current_stage.clone(),
        }
    }

    /// Recomputes the whole-state checksum from the current content.
    pub fn compute_checksum(&self) -> EngineResult<String> {
        let value = serde_json::to_value(self)?;
        Ok(checksum_excluding(&value, &CHECKSUM_EXCLUDED_KEYS))
    }

    /// Checks the stored checksum against the current content.
    pub fn verify(&self) -> EngineResult<()> {
        let Some(expected) = &self.state_checksum else {
            return Ok(());
        };
        let actual = self.compute_checksum()?;
        if *expected == actual {
            Ok(())
        } else {
            Err(IntegrityError::new(&self.workflow_id, expected, actual).into())
        }
    }

    /// Verifies a raw persisted document before it is deserialized.
    ///
    /// Documents without a `state_checksum` are accepted.
    pub fn verify_document(document: &Value) -> Result<(), IntegrityError> {
        let Some(expected) = document.get("state_checksum").and_then(Value::as_str) else {
            return Ok(());
        };
        let actual = checksum_excluding(document, &CHECKSUM_EXCLUDED_KEYS);
        if expected == actual {
            Ok(())
        } else {
            let workflow_id = document
                .get("workflow_id")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Err(IntegrityError::new(workflow_id, expected, actual))
        }
    }

    pub(super) fn stage_mut(&mut self, name: &str) -> Option<&mut StageState> {
        self.stages.iter_mut().find(|s| s.name() == name)
    }

    pub(crate) fn refresh_checksum(&mut self) -> EngineResult<()> {
        self.state_checksum = Some(self.compute_checksum()?);
        Ok(())
    }

    /// Bumps `updated_at` and the checksum. A checksum failure keeps the
    /// old value; the next save reports it.
    pub(super) fn touch(&mut self) {
        self.updated_at = now_utc();
        if let Err(e) = self.refresh_checksum() {
            warn!(workflow_id = %self.workflow_id, error = %e, "Failed to refresh state checksum");
        }
    }

    pub(crate) fn insert_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }
}

/// Progress overview consumed by front ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSummary {
    /// The workflow id.
    pub workflow_id: String,
    /// Number of declared stages.
    pub total_stages: usize,
    /// Stages completed or skipped.
    pub completed_stages: usize,
    /// Stages currently failed.
    pub failed_stages: usize,
    /// Settled stages as a percentage, one decimal place.
    pub progress_percent: f64,
    /// Whether every stage is settled.
    pub is_complete: bool,
    /// Whether a stage is eligible to run.
    pub can_resume: bool,
    /// The stage most recently started.
    pub current_stage: Option<String>,
}

/// Serializes the ordered stage list as a JSON object keyed by stage name.
mod stage_map {
    use crate::core::StageState;
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(stages: &[StageState], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(stages.len()))?;
        for stage in stages {
            map.serialize_entry(stage.name(), stage)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<StageState>, D::Error> {
        deserializer.deserialize_map(StageMapVisitor)
    }

    struct StageMapVisitor;

    impl<'de> Visitor<'de> for StageMapVisitor {
        type Value = Vec<StageState>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of stage name to stage state")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut stages = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((name, mut stage)) = access.next_entry::<String, StageState>()? {
                stage.set_name(&name);
                stages.push(stage);
            }
            Ok(stages)
        }
    }
}
