//! Owner of the workflow state: transitions, persistence and reload.

use super::migration;
use super::workflow::{StatusSummary, WorkflowState, ABORTED_KEY};
use crate::config::EngineConfig;
use crate::core::{PipelineDefinition, StageMetrics, StageState, WorkflowInputs};
use crate::errors::{EngineError, EngineResult, InvalidTransitionError};
use crate::rollback::RollbackPoint;
use crate::utils::{iso_timestamp, read_optional, remove_if_exists, validate_workflow_id, write_atomic};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// State store shared between the orchestrator and the managers.
///
/// The lock is only ever taken for synchronous work and never held
/// across an await point.
pub type SharedStateStore = Arc<Mutex<StateStore>>;

/// Owns one workflow's state and persists it.
#[derive(Debug, Clone)]
pub struct StateStore {
    config: EngineConfig,
    pipeline: PipelineDefinition,
    state: WorkflowState,
}

impl StateStore {
    /// Creates a new workflow with every declared stage pending.
    pub fn initialize(
        config: EngineConfig,
        pipeline: PipelineDefinition,
        workflow_id: &str,
    ) -> EngineResult<Self> {
        validate_workflow_id(workflow_id)?;
        let state = WorkflowState::from_pipeline(workflow_id, &pipeline)?;
        info!(
            workflow_id = %workflow_id,
            stages = pipeline.len(),
            "Initialized workflow state"
        );
        Ok(Self {
            config,
            pipeline,
            state,
        })
    }

    /// Loads a persisted workflow.
    ///
    /// Returns `Ok(None)` if no state file exists. The stored checksum is
    /// verified against the file as written, before any migration runs.
    pub fn load(
        config: EngineConfig,
        pipeline: PipelineDefinition,
        workflow_id: &str,
    ) -> EngineResult<Option<Self>> {
        validate_workflow_id(workflow_id)?;
        let path = config.state_file(workflow_id);
        let Some(content) = read_optional(&path)? else {
            debug!(workflow_id = %workflow_id, "No persisted state found");
            return Ok(None);
        };

        let document: Value = serde_json::from_str(&content)?;
        let state = decode_document(document)?;
        if state.workflow_id != workflow_id {
            return Err(EngineError::InvalidWorkflowId(format!(
                "{} (file {} holds workflow '{}')",
                workflow_id,
                path.display(),
                state.workflow_id
            )));
        }

        let mut store = Self {
            config,
            pipeline,
            state,
        };
        store.recover_loaded_state()?;
        info!(
            workflow_id = %workflow_id,
            version = %store.state.version,
            next_stage = ?store.state.next_eligible_stage(),
            "Loaded workflow state"
        );
        Ok(Some(store))
    }

    /// Loads the workflow if it exists, otherwise initializes it.
    pub fn load_or_initialize(
        config: EngineConfig,
        pipeline: PipelineDefinition,
        workflow_id: &str,
    ) -> EngineResult<Self> {
        match Self::load(config.clone(), pipeline.clone(), workflow_id)? {
            Some(store) => Ok(store),
            None => Self::initialize(config, pipeline, workflow_id),
        }
    }

    /// Wraps the store for sharing with the managers.
    pub fn into_shared(self) -> SharedStateStore {
        Arc::new(Mutex::new(self))
    }

    /// Returns the current state.
    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Returns the workflow id.
    pub fn workflow_id(&self) -> &str {
        &self.state.workflow_id
    }

    /// Returns the declared pipeline.
    pub fn pipeline(&self) -> &PipelineDefinition {
        &self.pipeline
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the path of the state file.
    pub fn path(&self) -> PathBuf {
        self.config.state_file(&self.state.workflow_id)
    }

    /// Stores the inputs and their checksum.
    pub fn set_inputs(&mut self, inputs: WorkflowInputs) {
        self.state.inputs_checksum = Some(inputs.checksum());
        self.state.inputs = Some(inputs);
        self.state.touch();
    }

    /// Marks a stage running and makes it the current stage.
    ///
    /// Fails if another stage is running or a dependency is not yet
    /// completed or skipped.
    pub fn start_stage(&mut self, name: &str) -> EngineResult<()> {
        if let Some(running) = self.state.running_stage() {
            if running.name() != name {
                return Err(EngineError::StageAlreadyRunning {
                    running: running.name().to_string(),
                    requested: name.to_string(),
                });
            }
        }
        let stage = self.stage(name)?;
        for dependency in stage.dependencies() {
            let settled = self
                .state
                .stage(dependency)
                .is_some_and(|d| d.status().is_settled());
            if !settled {
                return Err(EngineError::DependencyNotSatisfied {
                    stage: name.to_string(),
                    dependency: dependency.clone(),
                });
            }
        }

        self.transition(name, StageState::start)?;
        self.state.current_stage = Some(name.to_string());
        self.state.touch();
        info!(workflow_id = %self.state.workflow_id, stage = %name, "Stage started");
        Ok(())
    }

    /// Records a stage's successful completion.
    pub fn complete_stage(
        &mut self,
        name: &str,
        output_files: Vec<String>,
        metrics: StageMetrics,
    ) -> EngineResult<()> {
        let files = output_files.len();
        self.transition(name, |s| s.complete(output_files, metrics))?;
        info!(
            workflow_id = %self.state.workflow_id,
            stage = %name,
            output_files = files,
            "Stage completed"
        );
        Ok(())
    }

    /// Marks a stage failed with a message.
    pub fn fail_stage(&mut self, name: &str, message: &str) -> EngineResult<()> {
        self.transition(name, |s| s.fail(message))?;
        warn!(
            workflow_id = %self.state.workflow_id,
            stage = %name,
            error = %message,
            "Stage failed"
        );
        Ok(())
    }

    /// Marks a stage skipped with a reason.
    pub fn skip_stage(&mut self, name: &str, reason: &str) -> EngineResult<()> {
        self.transition(name, |s| s.skip(reason))?;
        info!(workflow_id = %self.state.workflow_id, stage = %name, reason = %reason, "Stage skipped");
        Ok(())
    }

    /// Pauses a running stage.
    pub fn pause_stage(&mut self, name: &str, message: &str) -> EngineResult<()> {
        self.transition(name, |s| s.pause(message))?;
        info!(workflow_id = %self.state.workflow_id, stage = %name, "Stage paused");
        Ok(())
    }

    /// Returns a paused stage to pending.
    pub fn resume_stage(&mut self, name: &str) -> EngineResult<()> {
        self.transition(name, StageState::resume_to_pending)?;
        info!(workflow_id = %self.state.workflow_id, stage = %name, "Stage resumed to pending");
        Ok(())
    }

    /// Resets a stage to pending, discarding its results.
    pub fn reset_stage(&mut self, name: &str) -> EngineResult<()> {
        self.transition(name, |s| {
            s.reset();
            Ok(())
        })?;
        info!(workflow_id = %self.state.workflow_id, stage = %name, "Stage reset");
        Ok(())
    }

    /// Increments a running stage's retry counter.
    pub fn record_retry(&mut self, name: &str) -> EngineResult<u32> {
        self.transition(name, StageState::record_retry)
    }

    /// First pending or failed stage; see [`WorkflowState::next_eligible_stage`].
    pub fn next_eligible_stage(&self) -> Option<String> {
        self.state.next_eligible_stage().map(str::to_string)
    }

    /// Writes the state file atomically.
    pub fn save(&mut self) -> EngineResult<()> {
        self.state.refresh_checksum()?;
        let path = self.path();
        let body = serde_json::to_vec_pretty(&self.state)?;
        write_atomic(&path, &body)?;
        debug!(
            workflow_id = %self.state.workflow_id,
            path = %path.display(),
            "Saved workflow state"
        );
        Ok(())
    }

    /// Returns every stage declared after `name` to pending.
    ///
    /// Stages at or before `name` are untouched. Also clears the aborted
    /// flag so execution can continue.
    pub fn rollback_to_stage(&mut self, name: &str) -> EngineResult<()> {
        let position = self
            .state
            .stage_position(name)
            .ok_or_else(|| EngineError::UnknownStage(name.to_string()))?;

        let mut reset = Vec::new();
        for stage in self.state.stages.iter_mut().skip(position + 1) {
            stage.reset();
            reset.push(stage.name().to_string());
        }
        self.state.metadata.remove(ABORTED_KEY);
        self.state.current_stage = Some(name.to_string());
        self.state.touch();
        info!(
            workflow_id = %self.state.workflow_id,
            stage = %name,
            reset = ?reset,
            "Rolled back to stage"
        );
        Ok(())
    }

    /// Replaces the whole state, typically with a restored snapshot.
    ///
    /// The replacement goes through the same recovery as a loaded file:
    /// running stages become failed and the pipeline is reconciled.
    pub fn restore_state(&mut self, state: WorkflowState) -> EngineResult<()> {
        if state.workflow_id != self.state.workflow_id {
            return Err(EngineError::InvalidWorkflowId(format!(
                "{} (cannot restore into workflow '{}')",
                state.workflow_id, self.state.workflow_id
            )));
        }
        self.state = state;
        self.recover_loaded_state()?;
        self.state.touch();
        info!(workflow_id = %self.state.workflow_id, "Restored workflow state");
        Ok(())
    }

    /// Appends a rollback point reference, dropping the oldest beyond the limit.
    pub fn record_rollback_point(&mut self, point: RollbackPoint) {
        self.state.rollback_history.push(point);
        let max = self.config.rollback.max_history.max(1);
        let excess = self.state.rollback_history.len().saturating_sub(max);
        if excess > 0 {
            self.state.rollback_history.drain(..excess);
        }
        self.state.touch();
    }

    /// Removes a metadata entry, returning its value.
    pub fn remove_metadata(&mut self, key: &str) -> Option<Value> {
        let removed = self.state.metadata.remove(key);
        if removed.is_some() {
            self.state.touch();
        }
        removed
    }

    /// Sets a metadata entry.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.state.insert_metadata(key, value);
        self.state.touch();
    }

    /// Flags the workflow as aborted; no stage is eligible until a rollback.
    pub fn mark_aborted(&mut self, stage: &str, reason: &str) {
        self.state.insert_metadata(
            ABORTED_KEY,
            json!({
                "stage": stage,
                "reason": reason,
                "aborted_at": iso_timestamp(),
            }),
        );
        self.state.touch();
        warn!(workflow_id = %self.state.workflow_id, stage = %stage, reason = %reason, "Workflow aborted");
    }

    /// True once the workflow has been aborted.
    pub fn is_aborted(&self) -> bool {
        self.state.is_aborted()
    }

    /// True when every stage is completed or skipped.
    pub fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    /// True when a stage is eligible to run.
    pub fn can_resume(&self) -> bool {
        self.state.can_resume()
    }

    /// Builds the status summary.
    pub fn status_summary(&self) -> StatusSummary {
        self.state.status_summary()
    }

    /// Lists the workflow ids with a state file in `state_dir`, sorted.
    pub fn list_workflows(state_dir: &Path) -> EngineResult<Vec<String>> {
        let entries = match std::fs::read_dir(state_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::io(state_dir, e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| EngineError::io(state_dir, e))?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_workflow_id(stem).is_ok() {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Deletes a workflow's state file. Returns false if it did not exist.
    pub fn delete(state_dir: &Path, workflow_id: &str) -> EngineResult<bool> {
        validate_workflow_id(workflow_id)?;
        let removed = remove_if_exists(&state_dir.join(format!("{workflow_id}.json")))?;
        if removed {
            info!(workflow_id = %workflow_id, "Deleted workflow state");
        }
        Ok(removed)
    }

    fn stage(&self, name: &str) -> EngineResult<&StageState> {
        self.state
            .stage(name)
            .ok_or_else(|| EngineError::UnknownStage(name.to_string()))
    }

    fn transition<T, F>(&mut self, name: &str, apply: F) -> EngineResult<T>
    where
        F: FnOnce(&mut StageState) -> Result<T, InvalidTransitionError>,
    {
        let stage = self
            .state
            .stage_mut(name)
            .ok_or_else(|| EngineError::UnknownStage(name.to_string()))?;
        let result = apply(stage)?;
        self.state.touch();
        Ok(result)
    }

    /// Crash recovery and pipeline reconciliation for a state read from disk.
    fn recover_loaded_state(&mut self) -> EngineResult<()> {
        for stage in &mut self.state.stages {
            if stage.status() == crate::core::StageStatus::Running {
                stage.mark_interrupted()?;
                warn!(
                    workflow_id = %self.state.workflow_id,
                    stage = %stage.name(),
                    "Stage was running at last save; marked failed"
                );
            }
        }
        self.reconcile_with_pipeline()?;
        self.state.refresh_checksum()?;
        Ok(())
    }

    /// Puts stages in declared order, appending newly declared ones.
    fn reconcile_with_pipeline(&mut self) -> EngineResult<()> {
        if let Some(unknown) = self
            .state
            .stages
            .iter()
            .find(|s| !self.pipeline.contains(s.name()))
        {
            return Err(EngineError::InvalidPipeline(format!(
                "persisted stage '{}' is not declared in the pipeline",
                unknown.name()
            )));
        }

        let mut existing = std::mem::take(&mut self.state.stages);
        let mut ordered = Vec::with_capacity(self.pipeline.len());
        for def in self.pipeline.stages() {
            let stage = match existing.iter().position(|s| s.name() == def.name) {
                Some(idx) => {
                    let mut stage = existing.swap_remove(idx);
                    stage.set_dependencies(def.depends_on.clone());
                    stage
                }
                None => {
                    info!(stage = %def.name, "Appending newly declared stage");
                    StageState::new(&def.name, def.depends_on.clone())
                }
            };
            ordered.push(stage);
        }
        self.state.stages = ordered;
        self.state.stage_dependencies = self.pipeline.dependency_map();
        Ok(())
    }
}

/// Verifies, migrates and deserializes a raw state document.
pub(crate) fn decode_document(document: Value) -> EngineResult<WorkflowState> {
    WorkflowState::verify_document(&document)?;
    let document = migration::migrate(document)?;
    Ok(serde_json::from_value(document)?)
}
