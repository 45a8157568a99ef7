//! Testing utilities: mock executors and state assertions.

mod assertions;
mod mocks;

pub use assertions::{assert_stage_has_message, assert_stage_status, assert_stage_statuses};
pub use mocks::{FailingExecutor, FlakyExecutor, MockExecutor, SlowExecutor};
