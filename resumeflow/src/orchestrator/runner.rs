//! The orchestrator: drives stages through execution, recovery and pauses.

use super::executor::{FnExecutor, StageExecutor, StageResult};
use crate::config::EngineConfig;
use crate::core::{StageStatus, WorkflowInputs};
use crate::errors::{EngineError, EngineResult};
use crate::events::{event_types, EventSink, NoOpEventSink};
use crate::observability::{stage_span, workflow_span};
use crate::pause::{PauseRequest, PauseResumeManager, PausePoint, PauseTiming, AUTO_RESUME_ACTOR};
use crate::recovery::{ErrorContext, ErrorRecoveryManager, RecoveryOutcome, StageFault};
use crate::rollback::RollbackManager;
use crate::state::{SharedStateStore, StatusSummary, WorkflowState, ABORTED_KEY};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

/// Metric key under which a stage's suggested follow-ups are stored.
pub const NEXT_ACTIONS_METRIC: &str = "next_actions";

/// How a call to [`Orchestrator::run`] ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every stage is completed or skipped.
    Completed,
    /// The workflow is suspended and no wait timeout is configured.
    Suspended {
        /// The active suspension.
        suspension_id: Uuid,
        /// The stage current when suspended.
        stage: Option<String>,
    },
    /// A stage is paused or failed and needs an operator.
    AwaitingIntervention {
        /// The blocked stage.
        stage: String,
        /// Why it is blocked.
        message: String,
    },
    /// Recovery rolled back to the faulting stage; run again to retry it.
    RolledBack {
        /// The faulting stage.
        stage: String,
    },
    /// Recovery aborted the workflow.
    Aborted {
        /// The faulting stage.
        stage: String,
        /// The fault message.
        message: String,
    },
    /// Waited the configured time without a resume; the stage was failed.
    PauseTimedOut {
        /// The stage that was paused.
        stage: Option<String>,
    },
}

impl RunOutcome {
    /// True for [`RunOutcome::Completed`].
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

enum StageRun {
    Completed,
    Continue,
    Stop(RunOutcome),
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    store: SharedStateStore,
    config: Option<EngineConfig>,
    executors: HashMap<String, Arc<dyn StageExecutor>>,
    fallbacks: HashMap<String, Arc<dyn StageExecutor>>,
    event_sink: Arc<dyn EventSink>,
    pause_points: Vec<PausePoint>,
}

impl OrchestratorBuilder {
    /// Starts a builder over a shared store.
    pub fn new(store: SharedStateStore) -> Self {
        Self {
            store,
            config: None,
            executors: HashMap::new(),
            fallbacks: HashMap::new(),
            event_sink: Arc::new(NoOpEventSink),
            pause_points: Vec::new(),
        }
    }

    /// Overrides the recovery, rollback and pause settings.
    ///
    /// File locations always come from the store's configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Registers the executor for a stage.
    #[must_use]
    pub fn executor(mut self, stage: impl Into<String>, executor: impl StageExecutor + 'static) -> Self {
        self.executors.insert(stage.into(), Arc::new(executor));
        self
    }

    /// Registers a closure as the executor for a stage.
    #[must_use]
    pub fn executor_fn<F>(self, stage: impl Into<String>, func: F) -> Self
    where
        F: Fn(&WorkflowState, &WorkflowInputs) -> Result<StageResult, StageFault>
            + Send
            + Sync
            + 'static,
    {
        self.executor(stage, FnExecutor::new(func))
    }

    /// Registers the executor used when recovery asks for an alternative.
    #[must_use]
    pub fn fallback(mut self, stage: impl Into<String>, executor: impl StageExecutor + 'static) -> Self {
        self.fallbacks.insert(stage.into(), Arc::new(executor));
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Adds a pause point.
    #[must_use]
    pub fn pause_point(mut self, point: PausePoint) -> Self {
        self.pause_points.push(point);
        self
    }

    /// Validates the registrations and builds the managers.
    ///
    /// Every stage needs an executor; executors, fallbacks and pause points
    /// must name declared stages.
    pub fn build(self) -> EngineResult<Orchestrator> {
        let (workflow_id, stages, store_config) = {
            let store = self.store.lock();
            (
                store.workflow_id().to_string(),
                store
                    .pipeline()
                    .stage_names()
                    .map(str::to_string)
                    .collect::<Vec<_>>(),
                store.config().clone(),
            )
        };
        let config = self.config.unwrap_or_else(|| store_config.clone());
        config.validate()?;

        if let Some(missing) = stages.iter().find(|s| !self.executors.contains_key(*s)) {
            return Err(EngineError::NoExecutor(missing.clone()));
        }
        let named = self
            .executors
            .keys()
            .chain(self.fallbacks.keys())
            .chain(self.pause_points.iter().map(|p| &p.stage_name));
        for name in named {
            if !stages.contains(name) {
                return Err(EngineError::UnknownStage(name.clone()));
            }
        }

        let recovery = ErrorRecoveryManager::new(self.store.clone(), config.recovery.clone());
        let pause = PauseResumeManager::new(self.store.clone(), config.pause.clone())?;
        for point in self.pause_points {
            pause.configure_pause_point(point);
        }
        let rollback = RollbackManager::new(store_config.rollback_dir());

        info!(
            workflow_id = %workflow_id,
            stages = stages.len(),
            fallbacks = self.fallbacks.len(),
            "Built orchestrator"
        );
        Ok(Orchestrator {
            workflow_id,
            store: self.store,
            config,
            executors: self.executors,
            fallbacks: self.fallbacks,
            event_sink: self.event_sink,
            recovery: Arc::new(recovery),
            pause: Arc::new(pause),
            rollback,
        })
    }
}

impl std::fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("executors", &self.executors.keys().collect::<Vec<_>>())
            .field("fallbacks", &self.fallbacks.keys().collect::<Vec<_>>())
            .field("pause_points", &self.pause_points.len())
            .finish_non_exhaustive()
    }
}

/// Runs a workflow's stages in order, wiring recovery, rollback and pauses
/// together over one shared store.
pub struct Orchestrator {
    workflow_id: String,
    store: SharedStateStore,
    config: EngineConfig,
    executors: HashMap<String, Arc<dyn StageExecutor>>,
    fallbacks: HashMap<String, Arc<dyn StageExecutor>>,
    event_sink: Arc<dyn EventSink>,
    recovery: Arc<ErrorRecoveryManager>,
    pause: Arc<PauseResumeManager>,
    rollback: RollbackManager,
}

impl Orchestrator {
    /// Starts a builder.
    pub fn builder(store: SharedStateStore) -> OrchestratorBuilder {
        OrchestratorBuilder::new(store)
    }

    /// Returns the workflow id.
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Returns the shared store.
    pub fn store(&self) -> &SharedStateStore {
        &self.store
    }

    /// Returns the effective configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the pause manager, for pausing and resuming from other tasks.
    pub fn pause_manager(&self) -> &Arc<PauseResumeManager> {
        &self.pause
    }

    /// Returns the recovery manager.
    pub fn recovery_manager(&self) -> &Arc<ErrorRecoveryManager> {
        &self.recovery
    }

    /// Returns the rollback manager.
    pub fn rollback_manager(&self) -> &RollbackManager {
        &self.rollback
    }

    /// Returns the status summary.
    pub fn status(&self) -> StatusSummary {
        self.store.lock().status_summary()
    }

    /// Runs stages until the workflow completes or cannot continue.
    ///
    /// Calling `run` again after a resume, a rollback or an intervention
    /// picks up from the first eligible stage. Store faults are returned as
    /// errors and never retried.
    pub async fn run(&self) -> EngineResult<RunOutcome> {
        let span = workflow_span(&self.workflow_id);
        self.run_loop().instrument(span).await
    }

    /// Submits a pause request.
    pub fn request_pause(&self, request: PauseRequest) -> EngineResult<Uuid> {
        self.pause.request_pause(request)
    }

    /// Resumes the workflow. Returns false if it was not suspended.
    pub async fn resume(&self, resumed_by: &str) -> EngineResult<bool> {
        let resumed = self.pause.resume_workflow(&self.workflow_id, resumed_by)?;
        if resumed {
            self.emit(
                event_types::WORKFLOW_RESUMED,
                json!({ "workflow_id": self.workflow_id, "resumed_by": resumed_by }),
            )
            .await;
        }
        Ok(resumed)
    }

    /// Returns a stage paused for manual intervention to pending.
    pub fn resolve_intervention(&self, stage: &str) -> EngineResult<()> {
        let mut store = self.store.lock();
        store.resume_stage(stage)?;
        store.save()?;
        info!(workflow_id = %self.workflow_id, stage = %stage, "Intervention resolved");
        Ok(())
    }

    /// Resets every stage after `stage` to pending and saves.
    pub async fn rollback_to_stage(&self, stage: &str) -> EngineResult<()> {
        {
            let mut store = self.store.lock();
            store.rollback_to_stage(stage)?;
            store.save()?;
        }
        self.emit(
            event_types::WORKFLOW_ROLLED_BACK,
            json!({ "workflow_id": self.workflow_id, "stage": stage }),
        )
        .await;
        Ok(())
    }

    /// Restores the newest snapshot matching `checksum_prefix` into the store.
    ///
    /// Returns false if no snapshot matches.
    pub async fn rollback_to(&self, checksum_prefix: &str) -> EngineResult<bool> {
        let Some(state) = self
            .rollback
            .restore_from_rollback(&self.workflow_id, checksum_prefix)?
        else {
            return Ok(false);
        };
        {
            let mut store = self.store.lock();
            store.restore_state(state)?;
            store.save()?;
        }
        self.emit(
            event_types::WORKFLOW_ROLLED_BACK,
            json!({ "workflow_id": self.workflow_id, "checksum": checksum_prefix }),
        )
        .await;
        Ok(true)
    }

    async fn run_loop(&self) -> EngineResult<RunOutcome> {
        if self.store.lock().state().inputs().is_none() {
            return Err(EngineError::MissingInputs(self.workflow_id.clone()));
        }

        loop {
            if let Some(outcome) = self.wait_while_suspended().await? {
                return Ok(outcome);
            }

            let next = self.store.lock().next_eligible_stage();
            let Some(stage) = next else {
                return Ok(self.finish().await);
            };

            self.start_stage(&stage).await?;
            if self.pause.check_pause_point(&stage, PauseTiming::Before)? {
                let mut store = self.store.lock();
                if stage_status(&store, &stage)? == StageStatus::Running {
                    store.pause_stage(&stage, "Workflow suspended before stage execution")?;
                    store.save()?;
                }
                continue;
            }

            match self.execute_with_recovery(&stage).await? {
                StageRun::Completed => {
                    self.pause.check_pause_point(&stage, PauseTiming::After)?;
                }
                StageRun::Continue => {
                    // A skipped stage is finished too; a stage paused mid-run is not.
                    let settled = stage_status(&self.store.lock(), &stage)?.is_settled();
                    if settled {
                        self.pause.check_pause_point(&stage, PauseTiming::After)?;
                    }
                }
                StageRun::Stop(outcome) => return Ok(outcome),
            }
        }
    }

    /// Applies due auto-resumes, then blocks on an active suspension.
    ///
    /// Returns `None` once execution may continue.
    async fn wait_while_suspended(&self) -> EngineResult<Option<RunOutcome>> {
        for suspension_id in self.pause.check_auto_resume()? {
            self.emit(
                event_types::WORKFLOW_RESUMED,
                json!({
                    "workflow_id": self.workflow_id,
                    "suspension_id": suspension_id,
                    "resumed_by": AUTO_RESUME_ACTOR,
                }),
            )
            .await;
        }

        let Some(suspension) = self.pause.active_suspension() else {
            return Ok(None);
        };
        self.emit(
            event_types::WORKFLOW_SUSPENDED,
            json!({
                "workflow_id": self.workflow_id,
                "suspension_id": suspension.suspension_id,
                "stage": suspension.stage_name,
                "reason": suspension.reason,
                "message": suspension.message,
            }),
        )
        .await;

        let Some(timeout) = self.config.pause.wait_timeout() else {
            return Ok(Some(RunOutcome::Suspended {
                suspension_id: suspension.suspension_id,
                stage: suspension.stage_name,
            }));
        };

        info!(
            workflow_id = %self.workflow_id,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "Waiting for resume"
        );
        if self.pause.wait_for_resume(Some(timeout)).await? {
            self.emit(
                event_types::WORKFLOW_RESUMED,
                json!({ "workflow_id": self.workflow_id, "suspension_id": suspension.suspension_id }),
            )
            .await;
            return Ok(None);
        }

        warn!(
            workflow_id = %self.workflow_id,
            stage = ?suspension.stage_name,
            "Pause wait timed out"
        );
        {
            let mut store = self.store.lock();
            if let Some(stage) = suspension.stage_name.as_deref() {
                if stage_status(&store, stage)? == StageStatus::Paused {
                    let message = format!(
                        "Paused for more than {}ms without being resumed",
                        timeout.as_millis()
                    );
                    store.fail_stage(stage, &message)?;
                }
            }
            store.save()?;
        }
        Ok(Some(RunOutcome::PauseTimedOut {
            stage: suspension.stage_name,
        }))
    }

    async fn start_stage(&self, stage: &str) -> EngineResult<()> {
        let retry_count = {
            let mut store = self.store.lock();
            store.start_stage(stage)?;
            store.save()?;
            store.state().stage(stage).map_or(0, crate::core::StageState::retry_count)
        };
        self.emit(
            event_types::STAGE_STARTED,
            json!({ "workflow_id": self.workflow_id, "stage": stage, "retry_count": retry_count }),
        )
        .await;
        Ok(())
    }

    async fn execute_with_recovery(&self, stage: &str) -> EngineResult<StageRun> {
        let mut executor = self
            .executors
            .get(stage)
            .cloned()
            .ok_or_else(|| EngineError::NoExecutor(stage.to_string()))?;
        let mut on_fallback = false;
        let mut previous: Option<ErrorContext> = None;

        loop {
            let (state, inputs) = self.execution_snapshot(stage)?;
            if state.stage(stage).map(crate::core::StageState::status) != Some(StageStatus::Running) {
                info!(stage = %stage, "Stage no longer running, not executing");
                return Ok(StageRun::Continue);
            }

            let attempt = previous.as_ref().map_or(0, |ctx| ctx.retry_count);
            let result = executor
                .execute(&state, &inputs)
                .instrument(stage_span(&self.workflow_id, stage, attempt))
                .await;

            let still_running = stage_status(&self.store.lock(), stage)? == StageStatus::Running;
            if !still_running {
                info!(stage = %stage, "Stage was suspended during execution, discarding its result");
                return Ok(StageRun::Continue);
            }

            let fault = match result {
                Ok(result) => {
                    self.complete_stage(stage, result, previous.as_ref()).await?;
                    return Ok(StageRun::Completed);
                }
                Err(fault) => fault,
            };

            self.emit(
                event_types::STAGE_FAILED,
                json!({
                    "workflow_id": self.workflow_id,
                    "stage": stage,
                    "error_type": fault.error_type,
                    "message": fault.message,
                    "attempt": attempt,
                }),
            )
            .await;

            let (mut ctx, outcome) = self
                .recovery
                .handle_fault(stage, &fault, previous.as_ref())
                .await?;
            let outcome = match outcome {
                RecoveryOutcome::Retry { attempt, delay } => {
                    self.emit(
                        event_types::STAGE_RETRYING,
                        json!({
                            "workflow_id": self.workflow_id,
                            "stage": stage,
                            "attempt": attempt,
                            "delay_ms": u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        }),
                    )
                    .await;
                    previous = Some(ctx);
                    continue;
                }
                RecoveryOutcome::AlternativeRequested => match self.fallbacks.get(stage) {
                    Some(fallback) if !on_fallback => {
                        info!(stage = %stage, "Switching to fallback executor");
                        executor = fallback.clone();
                        on_fallback = true;
                        previous = Some(ctx);
                        continue;
                    }
                    _ => self.recovery.escalate(&mut ctx)?,
                },
                RecoveryOutcome::RetryExhausted => self.recovery.escalate(&mut ctx)?,
                other => other,
            };
            return self.settle(stage, outcome).await;
        }
    }

    fn execution_snapshot(&self, stage: &str) -> EngineResult<(WorkflowState, WorkflowInputs)> {
        let store = self.store.lock();
        let state = store.state().clone();
        let inputs = state
            .inputs()
            .cloned()
            .ok_or_else(|| EngineError::MissingInputs(self.workflow_id.clone()))?;
        if state.stage(stage).is_none() {
            return Err(EngineError::UnknownStage(stage.to_string()));
        }
        Ok((state, inputs))
    }

    async fn complete_stage(
        &self,
        stage: &str,
        result: StageResult,
        previous: Option<&ErrorContext>,
    ) -> EngineResult<()> {
        let StageResult {
            output_files,
            mut metrics,
            next_actions,
        } = result;
        if !next_actions.is_empty() {
            metrics.insert(NEXT_ACTIONS_METRIC.to_string(), json!(next_actions));
        }
        let files = output_files.len();
        {
            let mut store = self.store.lock();
            store.complete_stage(stage, output_files, metrics)?;
            store.save()?;
        }
        if let Some(previous) = previous {
            self.recovery.mark_resolved(previous.error_id);
        }
        self.emit(
            event_types::STAGE_COMPLETED,
            json!({ "workflow_id": self.workflow_id, "stage": stage, "output_files": files }),
        )
        .await;

        if self.config.rollback.snapshot_on_complete {
            self.snapshot(stage)?;
        }
        Ok(())
    }

    /// Snapshots the state after a stage. Snapshot write failures only warn.
    fn snapshot(&self, stage: &str) -> EngineResult<()> {
        let state = self.store.lock().state().clone();
        let point = match self
            .rollback
            .create_rollback_point(&state, &format!("After stage '{stage}'"))
        {
            Ok(point) => point,
            Err(e) => {
                warn!(stage = %stage, error = %e, "Failed to create rollback point");
                return Ok(());
            }
        };
        {
            let mut store = self.store.lock();
            store.record_rollback_point(point);
            store.save()?;
        }
        if let Err(e) = self
            .rollback
            .cleanup_old_rollbacks(&self.workflow_id, self.config.rollback.keep_count)
        {
            warn!(error = %e, "Failed to clean up rollback points");
        }
        Ok(())
    }

    async fn settle(&self, stage: &str, outcome: RecoveryOutcome) -> EngineResult<StageRun> {
        self.store.lock().save()?;
        let run = match outcome {
            RecoveryOutcome::Skipped => {
                self.emit(
                    event_types::STAGE_SKIPPED,
                    json!({ "workflow_id": self.workflow_id, "stage": stage }),
                )
                .await;
                StageRun::Continue
            }
            RecoveryOutcome::RolledBack => {
                self.emit(
                    event_types::WORKFLOW_ROLLED_BACK,
                    json!({ "workflow_id": self.workflow_id, "stage": stage }),
                )
                .await;
                StageRun::Stop(RunOutcome::RolledBack {
                    stage: stage.to_string(),
                })
            }
            RecoveryOutcome::RollbackFailed { reason } => {
                StageRun::Stop(RunOutcome::AwaitingIntervention {
                    stage: stage.to_string(),
                    message: reason,
                })
            }
            RecoveryOutcome::ManualIntervention { message } => {
                StageRun::Stop(RunOutcome::AwaitingIntervention {
                    stage: stage.to_string(),
                    message,
                })
            }
            RecoveryOutcome::Aborted { message } => {
                self.emit(
                    event_types::WORKFLOW_ABORTED,
                    json!({ "workflow_id": self.workflow_id, "stage": stage, "message": message }),
                )
                .await;
                StageRun::Stop(RunOutcome::Aborted {
                    stage: stage.to_string(),
                    message,
                })
            }
            other @ (RecoveryOutcome::Retry { .. }
            | RecoveryOutcome::RetryExhausted
            | RecoveryOutcome::AlternativeRequested) => {
                StageRun::Stop(RunOutcome::AwaitingIntervention {
                    stage: stage.to_string(),
                    message: format!("Recovery ended without a decision: {other:?}"),
                })
            }
        };
        Ok(run)
    }

    /// Decides the outcome when no stage is eligible.
    async fn finish(&self) -> RunOutcome {
        let state = self.store.lock().state().clone();
        if state.is_complete() {
            info!(workflow_id = %self.workflow_id, "Workflow completed");
            self.emit(
                event_types::WORKFLOW_COMPLETED,
                json!({ "workflow_id": self.workflow_id, "stages": state.stages().len() }),
            )
            .await;
            return RunOutcome::Completed;
        }

        if let Some(aborted) = state.metadata().get(ABORTED_KEY) {
            let field = |key: &str| {
                aborted
                    .get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            return RunOutcome::Aborted {
                stage: field("stage"),
                message: field("reason"),
            };
        }

        let blocked = state
            .paused_stage()
            .or_else(|| state.stages().iter().find(|s| !s.status().is_settled()));
        match blocked {
            Some(stage) => RunOutcome::AwaitingIntervention {
                stage: stage.name().to_string(),
                message: stage
                    .error_message()
                    .unwrap_or("Stage is blocked")
                    .to_string(),
            },
            None => RunOutcome::Completed,
        }
    }

    async fn emit(&self, event_type: &str, data: Value) {
        self.event_sink.emit(event_type, Some(data)).await;
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("workflow_id", &self.workflow_id)
            .field("executors", &self.executors.keys().collect::<Vec<_>>())
            .field("fallbacks", &self.fallbacks.keys().collect::<Vec<_>>())
            .field("pause", &self.pause)
            .finish_non_exhaustive()
    }
}

fn stage_status(store: &crate::state::StateStore, stage: &str) -> EngineResult<StageStatus> {
    store
        .state()
        .stage(stage)
        .map(crate::core::StageState::status)
        .ok_or_else(|| EngineError::UnknownStage(stage.to_string()))
}
