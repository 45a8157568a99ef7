//! Orchestrator: runs stage executors in order and wires the recovery,
//! rollback and pause managers together over one shared store.
//!
//! ```text
//! auto-resume check -> wait while suspended -> next eligible stage
//!   -> start + save -> before-pause check -> execute (+ recovery loop)
//!   -> complete, save, snapshot -> after-pause check
//! ```

mod executor;
mod runner;

#[cfg(test)]
mod integration_tests;

pub use executor::{AsyncFnExecutor, FnExecutor, StageExecutor, StageResult};
pub use runner::{Orchestrator, OrchestratorBuilder, RunOutcome, NEXT_ACTIONS_METRIC};
