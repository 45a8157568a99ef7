//! The error recovery manager.
//!
//! Each fault moves through observed -> categorized -> strategy selected ->
//! recovery attempted, ending resolved or escalated. Stage mutations go
//! through the shared [`StateStore`](crate::state::StateStore).

use super::backoff::BackoffPolicy;
use super::classify::{assess_severity, categorize, select_strategy};
use super::context::ErrorContext;
use super::fault::StageFault;
use super::stats::ErrorStatistics;
use super::types::{RecoveryOutcome, RecoveryStrategy};
use crate::config::RecoveryConfig;
use crate::core::StageStatus;
use crate::errors::{EngineError, EngineResult};
use crate::state::SharedStateStore;
use crate::utils::{read_optional, remove_if_exists, write_atomic};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Classifies stage faults and applies recovery strategies.
pub struct ErrorRecoveryManager {
    store: SharedStateStore,
    config: RecoveryConfig,
    history: Mutex<VecDeque<ErrorContext>>,
    error_log: Option<PathBuf>,
}

impl ErrorRecoveryManager {
    /// Creates a manager over the shared store.
    ///
    /// When `persist_error_log` is set, handled faults are also written to
    /// `<state_dir>/errors/<workflow_id>.json`.
    pub fn new(store: SharedStateStore, config: RecoveryConfig) -> Self {
        let error_log = config.persist_error_log.then(|| {
            let guard = store.lock();
            guard
                .config()
                .error_log_dir()
                .join(format!("{}.json", guard.workflow_id()))
        });
        Self {
            store,
            config,
            history: Mutex::new(VecDeque::new()),
            error_log,
        }
    }

    /// Returns the recovery configuration.
    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Returns the error log path, if persistence is enabled.
    pub fn error_log_path(&self) -> Option<&Path> {
        self.error_log.as_deref()
    }

    /// Classifies a fault and builds its context.
    pub fn create_context(&self, stage_name: &str, fault: &StageFault) -> ErrorContext {
        let category = categorize(fault);
        let severity = assess_severity(fault);
        let strategy = select_strategy(fault, category);
        let backoff = BackoffPolicy::from_config(&self.config).adjusted_for(category);
        let workflow_id = self.store.lock().workflow_id().to_string();

        info!(
            workflow_id = %workflow_id,
            stage = %stage_name,
            error_type = %fault.error_type,
            category = %category,
            severity = %severity,
            strategy = %strategy,
            "Classified stage fault"
        );

        ErrorContext::new(
            workflow_id,
            stage_name,
            &fault.error_type,
            &fault.message,
            severity,
            category,
            strategy,
            self.config.max_retries,
            backoff,
        )
        .with_details(fault.details.clone())
    }

    /// Classifies a fault and attempts recovery.
    ///
    /// `previous` is the context of an earlier fault in the same stage run;
    /// its retry count carries over so backoff keeps growing.
    pub async fn handle_fault(
        &self,
        stage_name: &str,
        fault: &StageFault,
        previous: Option<&ErrorContext>,
    ) -> EngineResult<(ErrorContext, RecoveryOutcome)> {
        let mut ctx = self.create_context(stage_name, fault);
        if let Some(previous) = previous {
            ctx = ctx.continuing(previous);
        }
        let outcome = self.attempt_recovery(&mut ctx).await?;
        Ok((ctx, outcome))
    }

    /// Applies the context's strategy.
    ///
    /// A retry sleeps for the backoff delay before returning, blocking only
    /// the calling task. Engine errors mean the store itself rejected the
    /// change and are never retried.
    pub async fn attempt_recovery(&self, ctx: &mut ErrorContext) -> EngineResult<RecoveryOutcome> {
        if ctx.recovery_strategy != RecoveryStrategy::Retry {
            let strategy = ctx.recovery_strategy;
            return self.apply(ctx, strategy);
        }

        if ctx.is_exhausted() {
            ctx.resolve(false, "retries exhausted");
            warn!(
                stage = %ctx.stage_name,
                retries = ctx.retry_count,
                max_retries = ctx.max_retries,
                "Retries exhausted"
            );
            self.record(ctx);
            return Ok(RecoveryOutcome::RetryExhausted);
        }

        let delay = ctx.next_delay();
        info!(
            stage = %ctx.stage_name,
            attempt = ctx.retry_count + 1,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Retrying stage after backoff"
        );
        tokio::time::sleep(delay).await;

        ctx.retry_count += 1;
        {
            // A suspension may have paused the stage during the backoff.
            let mut store = self.store.lock();
            if status_of(&store, &ctx.stage_name)? == StageStatus::Running {
                store.record_retry(&ctx.stage_name)?;
            }
        }
        ctx.resolve(false, format!("retry {} of {}", ctx.retry_count, ctx.max_retries));
        self.record(ctx);
        Ok(RecoveryOutcome::Retry {
            attempt: ctx.retry_count,
            delay,
        })
    }

    /// Applies the configured escalation strategy after retries ran out.
    ///
    /// Retry and alternative are not valid escalations and fall back to manual.
    pub fn escalate(&self, ctx: &mut ErrorContext) -> EngineResult<RecoveryOutcome> {
        let strategy = match self.config.escalation_strategy {
            RecoveryStrategy::Retry | RecoveryStrategy::Alternative => RecoveryStrategy::Manual,
            other => other,
        };
        warn!(
            stage = %ctx.stage_name,
            from = %ctx.recovery_strategy,
            to = %strategy,
            "Escalating fault"
        );
        ctx.recovery_strategy = strategy;
        self.apply(ctx, strategy)
    }

    /// Marks a recorded fault resolved, e.g. after a retried stage succeeds.
    pub fn mark_resolved(&self, error_id: Uuid) -> bool {
        let updated = {
            let mut history = self.history.lock();
            history.iter_mut().find(|c| c.error_id == error_id).map(|ctx| {
                ctx.resolve(true, "stage succeeded after retry");
                ctx.clone()
            })
        };
        match updated {
            Some(ctx) => {
                self.persist(&ctx);
                true
            }
            None => false,
        }
    }

    /// Returns the recorded faults, oldest first.
    pub fn history(&self) -> Vec<ErrorContext> {
        self.history.lock().iter().cloned().collect()
    }

    /// Derives statistics from the history.
    pub fn statistics(&self) -> ErrorStatistics {
        ErrorStatistics::from_history(self.history.lock().iter())
    }

    /// Clears the in-memory history and the error log.
    pub fn clear_history(&self) -> EngineResult<()> {
        self.history.lock().clear();
        if let Some(path) = &self.error_log {
            remove_if_exists(path)?;
        }
        Ok(())
    }

    fn apply(&self, ctx: &mut ErrorContext, strategy: RecoveryStrategy) -> EngineResult<RecoveryOutcome> {
        let stage = ctx.stage_name.clone();
        let message = ctx.error_message.clone();

        let outcome = match strategy {
            RecoveryStrategy::Retry => {
                // Only reachable through escalation misconfiguration.
                return Err(EngineError::Config(
                    "retry cannot be applied synchronously".to_string(),
                ));
            }
            RecoveryStrategy::Skip => {
                let reason = format!("Skipped after {} error: {}", ctx.category, message);
                self.store.lock().skip_stage(&stage, &reason)?;
                ctx.resolve(true, "stage skipped");
                RecoveryOutcome::Skipped
            }
            RecoveryStrategy::Rollback => {
                let mut store = self.store.lock();
                if status_of(&store, &stage)? != StageStatus::Failed {
                    store.fail_stage(&stage, &message)?;
                }
                match store.rollback_to_stage(&stage) {
                    Ok(()) => {
                        ctx.resolve(true, "rolled back to faulting stage");
                        RecoveryOutcome::RolledBack
                    }
                    Err(e) => {
                        warn!(stage = %stage, error = %e, "Rollback failed");
                        ctx.resolve(false, "rollback failed");
                        RecoveryOutcome::RollbackFailed {
                            reason: e.to_string(),
                        }
                    }
                }
            }
            RecoveryStrategy::Manual => {
                let mut store = self.store.lock();
                if status_of(&store, &stage)? == StageStatus::Running {
                    store.pause_stage(&stage, &message)?;
                }
                ctx.resolve(false, "awaiting manual intervention");
                RecoveryOutcome::ManualIntervention { message }
            }
            RecoveryStrategy::Abort => {
                let mut store = self.store.lock();
                if matches!(
                    status_of(&store, &stage)?,
                    StageStatus::Pending | StageStatus::Running | StageStatus::Paused
                ) {
                    store.fail_stage(&stage, &message)?;
                }
                store.mark_aborted(&stage, &message);
                ctx.resolve(false, "workflow aborted");
                RecoveryOutcome::Aborted { message }
            }
            RecoveryStrategy::Alternative => {
                ctx.resolve(false, "fallback executor requested");
                RecoveryOutcome::AlternativeRequested
            }
        };

        info!(stage = %stage, strategy = %strategy, outcome = ?outcome, "Applied recovery strategy");
        self.record(ctx);
        Ok(outcome)
    }

    /// Stores the context, replacing an earlier entry with the same id.
    fn record(&self, ctx: &ErrorContext) {
        {
            let mut history = self.history.lock();
            if let Some(existing) = history.iter_mut().find(|c| c.error_id == ctx.error_id) {
                *existing = ctx.clone();
            } else {
                history.push_back(ctx.clone());
                while history.len() > self.config.max_error_history {
                    history.pop_front();
                }
            }
        }
        self.persist(ctx);
    }

    fn persist(&self, ctx: &ErrorContext) {
        let Some(path) = &self.error_log else {
            return;
        };
        if let Err(e) = self.append_to_log(path, ctx) {
            warn!(path = %path.display(), error = %e, "Failed to write error log");
        }
    }

    fn append_to_log(&self, path: &Path, ctx: &ErrorContext) -> EngineResult<()> {
        let mut entries: Vec<Value> = match read_optional(path)? {
            Some(content) => serde_json::from_str(&content)?,
            None => Vec::new(),
        };
        let id = ctx.error_id.to_string();
        let entry = serde_json::to_value(ctx.to_dict())?;
        match entries
            .iter_mut()
            .find(|e| e.get("error_id").and_then(Value::as_str) == Some(id.as_str()))
        {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        let excess = entries.len().saturating_sub(self.config.max_error_history);
        entries.drain(..excess);
        write_atomic(path, &serde_json::to_vec_pretty(&entries)?)
    }
}

impl std::fmt::Debug for ErrorRecoveryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorRecoveryManager")
            .field("config", &self.config)
            .field("history", &self.history.lock().len())
            .field("error_log", &self.error_log)
            .finish_non_exhaustive()
    }
}

fn status_of(store: &crate::state::StateStore, stage: &str) -> EngineResult<StageStatus> {
    store
        .state()
        .stage(stage)
        .map(crate::core::StageState::status)
        .ok_or_else(|| EngineError::UnknownStage(stage.to_string()))
}
