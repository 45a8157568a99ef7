//! Stage executors: the external work each stage performs.

use crate::core::{StageMetrics, WorkflowInputs};
use crate::recovery::StageFault;
use crate::state::WorkflowState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

/// What a stage produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Paths of files the stage wrote.
    #[serde(default)]
    pub output_files: Vec<String>,
    /// Free-form metrics.
    #[serde(default)]
    pub metrics: StageMetrics,
    /// Suggested follow-ups, stored with the stage metrics.
    #[serde(default)]
    pub next_actions: Vec<String>,
}

impl StageResult {
    /// Creates an empty result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an output file.
    #[must_use]
    pub fn with_output_file(mut self, path: impl Into<String>) -> Self {
        self.output_files.push(path.into());
        self
    }

    /// Adds a metric.
    #[must_use]
    pub fn with_metric(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    /// Adds a suggested follow-up.
    #[must_use]
    pub fn with_next_action(mut self, action: impl Into<String>) -> Self {
        self.next_actions.push(action.into());
        self
    }
}

/// Performs one stage's work.
///
/// Executors see a snapshot of the state; they never mutate it. A returned
/// fault is handed to the recovery manager.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Runs the stage.
    async fn execute(
        &self,
        state: &WorkflowState,
        inputs: &WorkflowInputs,
    ) -> Result<StageResult, StageFault>;
}

#[async_trait]
impl<T> StageExecutor for std::sync::Arc<T>
where
    T: StageExecutor + ?Sized,
{
    async fn execute(
        &self,
        state: &WorkflowState,
        inputs: &WorkflowInputs,
    ) -> Result<StageResult, StageFault> {
        (**self).execute(state, inputs).await
    }
}

/// A synchronous closure executor.
pub struct FnExecutor<F>
where
    F: Fn(&WorkflowState, &WorkflowInputs) -> Result<StageResult, StageFault> + Send + Sync,
{
    func: F,
}

impl<F> FnExecutor<F>
where
    F: Fn(&WorkflowState, &WorkflowInputs) -> Result<StageResult, StageFault> + Send + Sync,
{
    /// Wraps a closure.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> fmt::Debug for FnExecutor<F>
where
    F: Fn(&WorkflowState, &WorkflowInputs) -> Result<StageResult, StageFault> + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnExecutor").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> StageExecutor for FnExecutor<F>
where
    F: Fn(&WorkflowState, &WorkflowInputs) -> Result<StageResult, StageFault> + Send + Sync,
{
    async fn execute(
        &self,
        state: &WorkflowState,
        inputs: &WorkflowInputs,
    ) -> Result<StageResult, StageFault> {
        (self.func)(state, inputs)
    }
}

/// An async closure executor. The closure receives owned copies.
pub struct AsyncFnExecutor<F, Fut>
where
    F: Fn(WorkflowState, WorkflowInputs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StageResult, StageFault>> + Send,
{
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnExecutor<F, Fut>
where
    F: Fn(WorkflowState, WorkflowInputs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StageResult, StageFault>> + Send,
{
    /// Wraps an async closure.
    pub fn new(func: F) -> Self {
        Self {
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> fmt::Debug for AsyncFnExecutor<F, Fut>
where
    F: Fn(WorkflowState, WorkflowInputs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StageResult, StageFault>> + Send,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFnExecutor").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> StageExecutor for AsyncFnExecutor<F, Fut>
where
    F: Fn(WorkflowState, WorkflowInputs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StageResult, StageFault>> + Send,
{
    async fn execute(
        &self,
        state: &WorkflowState,
        inputs: &WorkflowInputs,
    ) -> Result<StageResult, StageFault> {
        (self.func)(state.clone(), inputs.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::PipelineDefinition;
    use crate::state::StateStore;
    use serde_json::json;

    fn state() -> WorkflowState {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new().with_state_dir(dir.path());
        StateStore::initialize(config, PipelineDefinition::standard(), "wf-exec")
            .unwrap()
            .state()
            .clone()
    }

    #[test]
    fn test_stage_result_builder() {
        let result = StageResult::new()
            .with_output_file("docs/requirements.md")
            .with_metric("pages", json!(3))
            .with_next_action("review");
        assert_eq!(result.output_files, vec!["docs/requirements.md"]);
        assert_eq!(result.metrics["pages"], json!(3));
        assert_eq!(result.next_actions, vec!["review"]);
    }

    #[tokio::test]
    async fn test_fn_executor() {
        let executor = FnExecutor::new(|state: &WorkflowState, inputs: &WorkflowInputs| {
            Ok(StageResult::new()
                .with_metric("workflow", json!(state.workflow_id()))
                .with_metric("description", json!(inputs.description())))
        });
        let result = executor
            .execute(&state(), &WorkflowInputs::new("build a todo app"))
            .await
            .unwrap();
        assert_eq!(result.metrics["workflow"], json!("wf-exec"));
        assert_eq!(result.metrics["description"], json!("build a todo app"));
    }

    #[tokio::test]
    async fn test_async_fn_executor_propagates_fault() {
        let executor = AsyncFnExecutor::new(|_state, _inputs| async {
            Err(StageFault::new("ConnectionError", "connection refused"))
        });
        let fault = executor
            .execute(&state(), &WorkflowInputs::new("x"))
            .await
            .unwrap_err();
        assert_eq!(fault.error_type, "ConnectionError");
    }
}
