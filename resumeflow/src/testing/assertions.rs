//! Assertions over workflow state.

use crate::core::StageStatus;
use crate::state::WorkflowState;

/// Asserts a stage's status.
pub fn assert_stage_status(state: &WorkflowState, stage: &str, expected: StageStatus) {
    let actual = state.stage(stage).map(crate::core::StageState::status);
    assert_eq!(
        actual,
        Some(expected),
        "Expected stage '{stage}' to be {expected:?}, got {actual:?}"
    );
}

/// Asserts the status of every stage, in declared order.
pub fn assert_stage_statuses(state: &WorkflowState, expected: &[StageStatus]) {
    let actual: Vec<StageStatus> = state.stages().iter().map(|s| s.status()).collect();
    assert_eq!(actual, expected, "Unexpected stage statuses");
}

/// Asserts that a failed or paused stage explains itself.
pub fn assert_stage_has_message(state: &WorkflowState, stage: &str) {
    let message = state.stage(stage).and_then(|s| s.error_message());
    assert!(
        message.is_some_and(|m| !m.is_empty()),
        "Expected stage '{stage}' to carry a message"
    );
}
