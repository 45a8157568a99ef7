//! End-to-end tests for orchestrated workflow runs.

#[cfg(test)]
mod tests {
    use crate::config::{EngineConfig, PauseConfig, RecoveryConfig};
    use crate::core::{PipelineDefinition, StageStatus, WorkflowInputs, STANDARD_STAGES};
    use crate::errors::EngineError;
    use crate::events::{event_types, CollectingEventSink};
    use crate::orchestrator::{Orchestrator, OrchestratorBuilder, RunOutcome, StageExecutor, StageResult};
    use crate::pause::{PausePoint, PausePolicy, PauseReason, PauseRequest, PauseTiming};
    use crate::recovery::{RecoveryStrategy, StageFault};
    use crate::state::{SharedStateStore, StateStore, WorkflowState, ABORTED_KEY, RESTORED_FROM_KEY};
    use crate::testing::{
        assert_stage_has_message, assert_stage_status, assert_stage_statuses, FailingExecutor,
        FlakyExecutor, MockExecutor, SlowExecutor,
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    const WORKFLOW_ID: &str = "todo-app";

    fn fast_config(dir: &Path) -> EngineConfig {
        EngineConfig::new().with_state_dir(dir).with_recovery(
            RecoveryConfig::new()
                .with_max_retries(3)
                .with_base_delay_ms(1)
                .with_max_delay_ms(5),
        )
    }

    fn new_store(config: EngineConfig) -> SharedStateStore {
        let mut store =
            StateStore::initialize(config, PipelineDefinition::standard(), WORKFLOW_ID).unwrap();
        store.set_inputs(WorkflowInputs::new("build a todo app"));
        store.save().unwrap();
        store.into_shared()
    }

    fn setup() -> (TempDir, SharedStateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = new_store(fast_config(dir.path()));
        (dir, store)
    }

    /// Registers a succeeding executor for every stage not yet registered.
    fn with_defaults(mut builder: OrchestratorBuilder, skip: &[&str]) -> OrchestratorBuilder {
        for stage in STANDARD_STAGES {
            if !skip.contains(&stage) {
                builder = builder.executor(stage, MockExecutor::new());
            }
        }
        builder
    }

    fn state_of(orchestrator: &Orchestrator) -> WorkflowState {
        orchestrator.store().lock().state().clone()
    }

    fn network_fault() -> StageFault {
        StageFault::new("ConnectionError", "connection refused by upstream")
    }

    #[tokio::test]
    async fn test_run_completes_all_stages() {
        let (_dir, store) = setup();
        let sink = Arc::new(CollectingEventSink::new());
        let orchestrator = with_defaults(Orchestrator::builder(store), &[])
            .event_sink(sink.clone())
            .build()
            .unwrap();

        let outcome = orchestrator.run().await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed);

        let state = state_of(&orchestrator);
        assert_stage_statuses(&state, &[StageStatus::Completed; 5]);
        assert_eq!(state.rollback_history().len(), 5);
        assert!(state.verify().is_ok());

        let status = orchestrator.status();
        assert!(status.is_complete);
        assert_eq!(status.progress_percent, 100.0);

        let points = orchestrator
            .rollback_manager()
            .list_rollback_points(WORKFLOW_ID)
            .unwrap();
        assert_eq!(points.len(), 5);

        let events = sink.event_types();
        assert_eq!(events.len(), 11);
        assert_eq!(events[0], event_types::STAGE_STARTED);
        assert_eq!(events[1], event_types::STAGE_COMPLETED);
        assert_eq!(events[10], event_types::WORKFLOW_COMPLETED);

        // A second run has nothing left to do.
        assert_eq!(orchestrator.run().await.unwrap(), RunOutcome::Completed);
    }

    #[tokio::test]
    async fn test_rollback_to_stage_after_retries_exhausted() {
        let (_dir, store) = setup();
        let failing = Arc::new(FailingExecutor::new(network_fault()));
        let analysis = MockExecutor::returning(
            StageResult::new()
                .with_output_file("docs/requirements.md")
                .with_output_file("docs/user_stories.md")
                .with_output_file("docs/constraints.md"),
        );
        let orchestrator = with_defaults(
            Orchestrator::builder(store)
                .executor("requirements_analysis", analysis)
                .executor("architecture_design", failing.clone()),
            &["requirements_analysis", "architecture_design"],
        )
        .build()
        .unwrap();

        let outcome = orchestrator.run().await.unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::AwaitingIntervention { ref stage, .. } if stage == "architecture_design"
        ));
        assert_eq!(failing.call_count(), 4);

        let state = state_of(&orchestrator);
        assert_stage_status(&state, "architecture_design", StageStatus::Paused);
        assert_stage_has_message(&state, "architecture_design");
        assert_eq!(state.stage("architecture_design").unwrap().retry_count(), 3);
        assert!(!state.can_resume());

        orchestrator
            .rollback_to_stage("requirements_analysis")
            .await
            .unwrap();

        let state = state_of(&orchestrator);
        let analysis = state.stage("requirements_analysis").unwrap();
        assert_eq!(analysis.status(), StageStatus::Completed);
        assert_eq!(analysis.output_files().len(), 3);
        assert_stage_status(&state, "architecture_design", StageStatus::Pending);
        assert_eq!(state.stage("architecture_design").unwrap().retry_count(), 0);
        assert!(state.can_resume());

        let stats = orchestrator.recovery_manager().statistics();
        assert_eq!(stats.total_errors, 4);
        assert_eq!(stats.by_category["network"], 4);
    }

    #[tokio::test]
    async fn test_retry_then_success_marks_fault_resolved() {
        let (_dir, store) = setup();
        let flaky = Arc::new(FlakyExecutor::new(2, network_fault()));
        let sink = Arc::new(CollectingEventSink::new());
        let orchestrator = with_defaults(
            Orchestrator::builder(store).executor("implementation", flaky.clone()),
            &["implementation"],
        )
        .event_sink(sink.clone())
        .build()
        .unwrap();

        assert_eq!(orchestrator.run().await.unwrap(), RunOutcome::Completed);
        assert_eq!(flaky.call_count(), 3);
        assert_eq!(sink.events_of_type(event_types::STAGE_RETRYING).len(), 2);

        let state = state_of(&orchestrator);
        assert_eq!(state.stage("implementation").unwrap().retry_count(), 2);

        let history = orchestrator.recovery_manager().history();
        assert_eq!(history.len(), 2);
        assert!(history.last().unwrap().resolved);
    }

    #[tokio::test]
    async fn test_immediate_pause_during_execution_then_resume() {
        let (_dir, store) = setup();
        let orchestrator = Arc::new(
            with_defaults(
                Orchestrator::builder(store)
                    .executor("requirements_analysis", SlowExecutor::with_delay_ms(200)),
                &["requirements_analysis"],
            )
            .build()
            .unwrap(),
        );

        let run = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.run().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        orchestrator
            .request_pause(PauseRequest::new(
                PauseReason::UserRequest,
                "alice",
                "Reviewing requirements",
            ))
            .unwrap();
        assert!(orchestrator
            .pause_manager()
            .check_pause_point("requirements_analysis", PauseTiming::Before)
            .unwrap());
        assert_stage_status(
            &state_of(&orchestrator),
            "requirements_analysis",
            StageStatus::Paused,
        );

        let outcome = run.await.unwrap().unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::Suspended { stage: Some(ref s), .. } if s == "requirements_analysis"
        ));
        assert_stage_status(
            &state_of(&orchestrator),
            "requirements_analysis",
            StageStatus::Paused,
        );

        assert!(orchestrator.resume("alice").await.unwrap());
        assert_stage_status(
            &state_of(&orchestrator),
            "requirements_analysis",
            StageStatus::Pending,
        );
        assert!(!orchestrator.resume("alice").await.unwrap());

        assert_eq!(orchestrator.run().await.unwrap(), RunOutcome::Completed);
    }

    #[tokio::test]
    async fn test_pause_point_suspends_and_resume_continues() {
        let (_dir, store) = setup();
        let implementation = Arc::new(MockExecutor::new());
        let sink = Arc::new(CollectingEventSink::new());
        let orchestrator = with_defaults(
            Orchestrator::builder(store)
                .executor("implementation", implementation.clone())
                .pause_point(PausePoint::new("implementation").with_description("Approve the design")),
            &["implementation"],
        )
        .event_sink(sink.clone())
        .build()
        .unwrap();

        let outcome = orchestrator.run().await.unwrap();
        let RunOutcome::Suspended { suspension_id, stage } = outcome.clone() else {
            panic!("expected suspension, got {outcome:?}");
        };
        assert_eq!(stage.as_deref(), Some("implementation"));
        assert_eq!(implementation.call_count(), 0);

        let state = state_of(&orchestrator);
        assert_stage_status(&state, "implementation", StageStatus::Paused);
        assert_eq!(
            state.stage("implementation").unwrap().error_message(),
            Some("Approve the design")
        );
        assert_eq!(
            orchestrator.pause_manager().active_suspension().unwrap().suspension_id,
            suspension_id
        );

        assert!(orchestrator.resume("reviewer").await.unwrap());
        assert_eq!(orchestrator.run().await.unwrap(), RunOutcome::Completed);
        assert_eq!(implementation.call_count(), 1);
        assert_eq!(sink.events_of_type(event_types::WORKFLOW_SUSPENDED).len(), 1);
        assert_eq!(sink.events_of_type(event_types::WORKFLOW_RESUMED).len(), 1);
    }

    #[tokio::test]
    async fn test_deferred_pause_after_current_stage() {
        let (_dir, store) = setup();
        let orchestrator = with_defaults(Orchestrator::builder(store), &[]).build().unwrap();
        orchestrator
            .request_pause(
                PauseRequest::new(PauseReason::Maintenance, "ops", "Deploy window")
                    .with_policy(PausePolicy::AfterCurrentStage)
                    .with_target_stage("architecture_design"),
            )
            .unwrap();

        let outcome = orchestrator.run().await.unwrap();
        assert!(matches!(outcome, RunOutcome::Suspended { .. }));
        let state = state_of(&orchestrator);
        assert_stage_statuses(
            &state,
            &[
                StageStatus::Completed,
                StageStatus::Completed,
                StageStatus::Pending,
                StageStatus::Pending,
                StageStatus::Pending,
            ],
        );

        assert!(orchestrator.resume("ops").await.unwrap());
        assert_eq!(orchestrator.run().await.unwrap(), RunOutcome::Completed);
    }

    #[tokio::test]
    async fn test_suspension_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = fast_config(dir.path());
        let orchestrator = with_defaults(
            Orchestrator::builder(new_store(config.clone()))
                .pause_point(PausePoint::new("testing")),
            &[],
        )
        .build()
        .unwrap();
        assert!(matches!(
            orchestrator.run().await.unwrap(),
            RunOutcome::Suspended { .. }
        ));
        drop(orchestrator);

        let reloaded = StateStore::load(config, PipelineDefinition::standard(), WORKFLOW_ID)
            .unwrap()
            .unwrap()
            .into_shared();
        let orchestrator = with_defaults(Orchestrator::builder(reloaded), &[])
            .build()
            .unwrap();
        assert!(orchestrator.pause_manager().is_suspended());
        assert!(matches!(
            orchestrator.run().await.unwrap(),
            RunOutcome::Suspended { .. }
        ));

        assert!(orchestrator.resume("ops").await.unwrap());
        assert_eq!(orchestrator.run().await.unwrap(), RunOutcome::Completed);
    }

    #[tokio::test]
    async fn test_pause_wait_timeout_fails_stage() {
        let dir = tempfile::tempdir().unwrap();
        let config = fast_config(dir.path())
            .with_pause(PauseConfig::default().with_wait_timeout_ms(30).with_auto_resume_poll_ms(5));
        let orchestrator = with_defaults(
            Orchestrator::builder(new_store(config)).pause_point(PausePoint::new("testing")),
            &[],
        )
        .build()
        .unwrap();

        let outcome = orchestrator.run().await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::PauseTimedOut {
                stage: Some("testing".to_string())
            }
        );
        let state = state_of(&orchestrator);
        assert_stage_status(&state, "testing", StageStatus::Failed);
        assert_stage_has_message(&state, "testing");
    }

    #[tokio::test]
    async fn test_auto_resume_while_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let config = fast_config(dir.path())
            .with_pause(PauseConfig::default().with_wait_timeout_ms(5000).with_auto_resume_poll_ms(5));
        let sink = Arc::new(CollectingEventSink::new());
        let orchestrator = with_defaults(
            Orchestrator::builder(new_store(config)).pause_point(
                PausePoint::new("documentation").with_auto_resume_after(Duration::from_millis(20)),
            ),
            &[],
        )
        .event_sink(sink.clone())
        .build()
        .unwrap();

        assert_eq!(orchestrator.run().await.unwrap(), RunOutcome::Completed);
        assert_eq!(sink.events_of_type(event_types::WORKFLOW_RESUMED).len(), 1);
        let history = orchestrator.pause_manager().pause_history();
        assert_eq!(history.len(), 2);
    }

    fn skipping_executor() -> FailingExecutor {
        FailingExecutor::new(
            StageFault::new("ToolError", "generator unavailable")
                .with_strategy(RecoveryStrategy::Skip),
        )
    }

    #[tokio::test]
    async fn test_after_pause_point_fires_on_skipped_stage() {
        let (_dir, store) = setup();
        let orchestrator = with_defaults(
            Orchestrator::builder(store)
                .executor("implementation", skipping_executor())
                .pause_point(PausePoint::new("implementation").with_timing(PauseTiming::After)),
            &["implementation"],
        )
        .build()
        .unwrap();

        let outcome = orchestrator.run().await.unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::Suspended { stage: Some(ref s), .. } if s == "implementation"
        ));
        let state = state_of(&orchestrator);
        assert_stage_status(&state, "implementation", StageStatus::Skipped);
        assert_stage_status(&state, "testing", StageStatus::Pending);

        assert!(orchestrator.resume("reviewer").await.unwrap());
        assert_eq!(orchestrator.run().await.unwrap(), RunOutcome::Completed);
        let state = state_of(&orchestrator);
        assert_stage_status(&state, "implementation", StageStatus::Skipped);
        assert_stage_status(&state, "documentation", StageStatus::Completed);
    }

    #[tokio::test]
    async fn test_deferred_pause_after_skipped_last_stage() {
        let (_dir, store) = setup();
        let orchestrator = with_defaults(
            Orchestrator::builder(store).executor("documentation", skipping_executor()),
            &["documentation"],
        )
        .build()
        .unwrap();
        orchestrator
            .request_pause(
                PauseRequest::new(PauseReason::UserRequest, "alice", "Review before release")
                    .with_policy(PausePolicy::AfterCurrentStage)
                    .with_target_stage("documentation"),
            )
            .unwrap();

        let outcome = orchestrator.run().await.unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::Suspended { stage: Some(ref s), .. } if s == "documentation"
        ));
        assert_stage_status(
            &state_of(&orchestrator),
            "documentation",
            StageStatus::Skipped,
        );
        assert!(orchestrator.pause_manager().pending_requests().is_empty());

        assert!(orchestrator.resume("alice").await.unwrap());
        assert_eq!(orchestrator.run().await.unwrap(), RunOutcome::Completed);
    }

    #[tokio::test]
    async fn test_after_pause_point_fires_after_fallback() {
        let (_dir, store) = setup();
        let fallback = Arc::new(MockExecutor::new());
        let orchestrator = with_defaults(
            Orchestrator::builder(store)
                .executor(
                    "testing",
                    FailingExecutor::new(
                        StageFault::new("ToolError", "primary runner crashed")
                            .with_strategy(RecoveryStrategy::Alternative),
                    ),
                )
                .fallback("testing", fallback.clone())
                .pause_point(PausePoint::new("testing").with_timing(PauseTiming::After)),
            &["testing"],
        )
        .build()
        .unwrap();

        assert!(matches!(
            orchestrator.run().await.unwrap(),
            RunOutcome::Suspended { .. }
        ));
        assert_eq!(fallback.call_count(), 1);
        let state = state_of(&orchestrator);
        assert_stage_status(&state, "testing", StageStatus::Completed);
        assert_stage_status(&state, "documentation", StageStatus::Pending);

        assert!(orchestrator.resume("reviewer").await.unwrap());
        assert_eq!(orchestrator.run().await.unwrap(), RunOutcome::Completed);
        assert_eq!(fallback.call_count(), 1);
    }

    #[tokio::test]
    async fn test_skip_strategy_continues() {
        let (_dir, store) = setup();
        let sink = Arc::new(CollectingEventSink::new());
        let orchestrator = with_defaults(
            Orchestrator::builder(store).executor(
                "documentation",
                FailingExecutor::new(
                    StageFault::new("DocsError", "generator unavailable")
                        .with_strategy(RecoveryStrategy::Skip),
                ),
            ),
            &["documentation"],
        )
        .event_sink(sink.clone())
        .build()
        .unwrap();

        assert_eq!(orchestrator.run().await.unwrap(), RunOutcome::Completed);
        let state = state_of(&orchestrator);
        assert_stage_status(&state, "documentation", StageStatus::Skipped);
        assert_stage_has_message(&state, "documentation");
        assert_eq!(sink.events_of_type(event_types::STAGE_SKIPPED).len(), 1);
    }

    #[tokio::test]
    async fn test_abort_strategy_stops_workflow() {
        let (_dir, store) = setup();
        let orchestrator = with_defaults(
            Orchestrator::builder(store).executor(
                "implementation",
                FailingExecutor::new(StageFault::new("ConfigError", "config key missing")),
            ),
            &["implementation"],
        )
        .build()
        .unwrap();

        let outcome = orchestrator.run().await.unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::Aborted { ref stage, .. } if stage == "implementation"
        ));
        let state = state_of(&orchestrator);
        assert!(state.metadata().contains_key(ABORTED_KEY));
        assert_stage_status(&state, "implementation", StageStatus::Failed);

        // Aborted workflows stay aborted across runs.
        let again = orchestrator.run().await.unwrap();
        assert!(matches!(again, RunOutcome::Aborted { ref stage, .. } if stage == "implementation"));
    }

    #[tokio::test]
    async fn test_rollback_strategy_reruns_stage() {
        let (_dir, store) = setup();
        let flaky = Arc::new(FlakyExecutor::new(
            1,
            StageFault::new("StateError", "partial output").with_strategy(RecoveryStrategy::Rollback),
        ));
        let orchestrator = with_defaults(
            Orchestrator::builder(store).executor("testing", flaky.clone()),
            &["testing"],
        )
        .build()
        .unwrap();

        assert_eq!(
            orchestrator.run().await.unwrap(),
            RunOutcome::RolledBack {
                stage: "testing".to_string()
            }
        );
        assert_stage_status(&state_of(&orchestrator), "testing", StageStatus::Failed);

        assert_eq!(orchestrator.run().await.unwrap(), RunOutcome::Completed);
        assert_eq!(flaky.call_count(), 2);
    }

    #[tokio::test]
    async fn test_alternative_uses_fallback_executor() {
        let (_dir, store) = setup();
        let fallback = Arc::new(MockExecutor::returning(
            StageResult::new().with_output_file("tests/smoke.rs"),
        ));
        let orchestrator = with_defaults(
            Orchestrator::builder(store)
                .executor(
                    "testing",
                    FailingExecutor::new(
                        StageFault::new("ToolError", "primary runner crashed")
                            .with_strategy(RecoveryStrategy::Alternative),
                    ),
                )
                .fallback("testing", fallback.clone()),
            &["testing"],
        )
        .build()
        .unwrap();

        assert_eq!(orchestrator.run().await.unwrap(), RunOutcome::Completed);
        assert_eq!(fallback.call_count(), 1);
        let state = state_of(&orchestrator);
        assert_eq!(
            state.stage("testing").unwrap().output_files(),
            ["tests/smoke.rs".to_string()]
        );
    }

    #[tokio::test]
    async fn test_manual_intervention_then_resolve() {
        let (_dir, store) = setup();
        let design = Arc::new(MockExecutor::new());
        design.set_fault(StageFault::new("ValueError", "invalid schema in design"));
        let orchestrator = with_defaults(
            Orchestrator::builder(store).executor("architecture_design", design.clone()),
            &["architecture_design"],
        )
        .build()
        .unwrap();

        let outcome = orchestrator.run().await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::AwaitingIntervention {
                stage: "architecture_design".to_string(),
                message: "invalid schema in design".to_string(),
            }
        );
        assert_eq!(design.call_count(), 1);

        // Still blocked until someone intervenes.
        assert!(matches!(
            orchestrator.run().await.unwrap(),
            RunOutcome::AwaitingIntervention { .. }
        ));

        design.set_result(StageResult::new());
        orchestrator.resolve_intervention("architecture_design").unwrap();
        assert_eq!(orchestrator.run().await.unwrap(), RunOutcome::Completed);
        assert_eq!(design.call_count(), 2);
    }

    #[tokio::test]
    async fn test_rollback_to_snapshot() {
        let (_dir, store) = setup();
        let orchestrator = with_defaults(Orchestrator::builder(store), &[]).build().unwrap();
        assert_eq!(orchestrator.run().await.unwrap(), RunOutcome::Completed);

        let points = orchestrator
            .rollback_manager()
            .list_rollback_points(WORKFLOW_ID)
            .unwrap();
        let first = points.last().unwrap();
        assert_eq!(first.stage_name.as_deref(), Some("requirements_analysis"));

        assert!(orchestrator.rollback_to(first.short_checksum()).await.unwrap());
        let state = state_of(&orchestrator);
        assert_stage_status(&state, "requirements_analysis", StageStatus::Completed);
        assert_stage_status(&state, "architecture_design", StageStatus::Pending);
        assert!(state.metadata().contains_key(RESTORED_FROM_KEY));

        assert!(!orchestrator.rollback_to("ffffffffffff").await.unwrap());
        assert_eq!(orchestrator.run().await.unwrap(), RunOutcome::Completed);
    }

    #[tokio::test]
    async fn test_next_actions_stored_with_metrics() {
        let (_dir, store) = setup();
        let orchestrator = with_defaults(
            Orchestrator::builder(store).executor(
                "testing",
                MockExecutor::returning(StageResult::new().with_next_action("raise coverage")),
            ),
            &["testing"],
        )
        .build()
        .unwrap();

        assert_eq!(orchestrator.run().await.unwrap(), RunOutcome::Completed);
        let state = state_of(&orchestrator);
        assert_eq!(
            state.stage("testing").unwrap().metrics()[crate::orchestrator::NEXT_ACTIONS_METRIC],
            serde_json::json!(["raise coverage"])
        );
    }

    #[tokio::test]
    async fn test_build_validation() {
        let (_dir, store) = setup();
        let missing = with_defaults(Orchestrator::builder(store.clone()), &["testing"]).build();
        assert!(matches!(missing, Err(EngineError::NoExecutor(ref s)) if s == "testing"));

        let unknown = with_defaults(Orchestrator::builder(store.clone()), &[])
            .executor("deployment", MockExecutor::new())
            .build();
        assert!(matches!(unknown, Err(EngineError::UnknownStage(ref s)) if s == "deployment"));

        let bad_point = with_defaults(Orchestrator::builder(store), &[])
            .pause_point(PausePoint::new("deployment"))
            .build();
        assert!(matches!(bad_point, Err(EngineError::UnknownStage(_))));
    }

    #[tokio::test]
    async fn test_run_without_inputs_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::initialize(
            fast_config(dir.path()),
            PipelineDefinition::standard(),
            WORKFLOW_ID,
        )
        .unwrap()
        .into_shared();
        let orchestrator = with_defaults(Orchestrator::builder(store), &[]).build().unwrap();
        assert!(matches!(
            orchestrator.run().await,
            Err(EngineError::MissingInputs(_))
        ));
    }

    mockall::mock! {
        Stage {}

        #[async_trait]
        impl StageExecutor for Stage {
            async fn execute(
                &self,
                state: &WorkflowState,
                inputs: &WorkflowInputs,
            ) -> Result<StageResult, StageFault>;
        }
    }

    #[tokio::test]
    async fn test_executor_sees_inputs_and_current_stage() {
        let (_dir, store) = setup();
        let mut executor = MockStage::new();
        executor
            .expect_execute()
            .withf(|state, inputs| {
                state.current_stage() == Some("testing")
                    && inputs.description() == "build a todo app"
            })
            .times(1)
            .returning(|_, _| Ok(StageResult::new().with_output_file("report.xml")));

        let orchestrator = with_defaults(
            Orchestrator::builder(store).executor("testing", executor),
            &["testing"],
        )
        .build()
        .unwrap();
        assert_eq!(orchestrator.run().await.unwrap(), RunOutcome::Completed);
    }
}
