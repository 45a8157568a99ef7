//! Mock stage executors for testing.

use crate::core::WorkflowInputs;
use crate::orchestrator::{StageExecutor, StageResult};
use crate::recovery::StageFault;
use crate::state::WorkflowState;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

/// Records calls and returns a configurable result.
#[derive(Debug)]
pub struct MockExecutor {
    result: Mutex<Result<StageResult, StageFault>>,
    calls: Mutex<Vec<Option<String>>>,
}

impl MockExecutor {
    /// Creates a mock returning an empty success.
    #[must_use]
    pub fn new() -> Self {
        Self::returning(StageResult::new())
    }

    /// Creates a mock returning `result`.
    #[must_use]
    pub fn returning(result: StageResult) -> Self {
        Self {
            result: Mutex::new(Ok(result)),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Makes subsequent calls succeed with `result`.
    pub fn set_result(&self, result: StageResult) {
        *self.result.lock() = Ok(result);
    }

    /// Makes subsequent calls fail with `fault`.
    pub fn set_fault(&self, fault: StageFault) {
        *self.result.lock() = Err(fault);
    }

    /// Number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// The workflow's current stage at each call.
    #[must_use]
    pub fn recorded_stages(&self) -> Vec<Option<String>> {
        self.calls.lock().clone()
    }
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StageExecutor for MockExecutor {
    async fn execute(
        &self,
        state: &WorkflowState,
        _inputs: &WorkflowInputs,
    ) -> Result<StageResult, StageFault> {
        self.calls
            .lock()
            .push(state.current_stage().map(str::to_string));
        self.result.lock().clone()
    }
}

/// Always fails with the same fault.
#[derive(Debug)]
pub struct FailingExecutor {
    fault: StageFault,
    calls: Mutex<usize>,
}

impl FailingExecutor {
    /// Creates an executor failing with `fault`.
    #[must_use]
    pub fn new(fault: StageFault) -> Self {
        Self {
            fault,
            calls: Mutex::new(0),
        }
    }

    /// Number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl StageExecutor for FailingExecutor {
    async fn execute(
        &self,
        _state: &WorkflowState,
        _inputs: &WorkflowInputs,
    ) -> Result<StageResult, StageFault> {
        *self.calls.lock() += 1;
        Err(self.fault.clone())
    }
}

/// Fails a fixed number of times, then succeeds.
#[derive(Debug)]
pub struct FlakyExecutor {
    fault: StageFault,
    failures_left: Mutex<usize>,
    result: StageResult,
    calls: Mutex<usize>,
}

impl FlakyExecutor {
    /// Creates an executor failing `failures` times with `fault`.
    #[must_use]
    pub fn new(failures: usize, fault: StageFault) -> Self {
        Self {
            fault,
            failures_left: Mutex::new(failures),
            result: StageResult::new(),
            calls: Mutex::new(0),
        }
    }

    /// Sets the result returned once the failures are used up.
    #[must_use]
    pub fn with_result(mut self, result: StageResult) -> Self {
        self.result = result;
        self
    }

    /// Number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl StageExecutor for FlakyExecutor {
    async fn execute(
        &self,
        _state: &WorkflowState,
        _inputs: &WorkflowInputs,
    ) -> Result<StageResult, StageFault> {
        *self.calls.lock() += 1;
        let mut left = self.failures_left.lock();
        if *left > 0 {
            *left -= 1;
            Err(self.fault.clone())
        } else {
            Ok(self.result.clone())
        }
    }
}

/// Sleeps before succeeding.
#[derive(Debug)]
pub struct SlowExecutor {
    delay: Duration,
}

impl SlowExecutor {
    /// Creates an executor sleeping for `delay`.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Creates an executor sleeping for `ms` milliseconds.
    #[must_use]
    pub fn with_delay_ms(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }
}

#[async_trait]
impl StageExecutor for SlowExecutor {
    async fn execute(
        &self,
        _state: &WorkflowState,
        _inputs: &WorkflowInputs,
    ) -> Result<StageResult, StageFault> {
        tokio::time::sleep(self.delay).await;
        Ok(StageResult::new())
    }
}
