//! Stage status enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle status of a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage has not started, or was reset.
    #[default]
    Pending,
    /// Stage is currently executing.
    Running,
    /// Stage completed successfully.
    Completed,
    /// Stage failed.
    Failed,
    /// Stage was skipped.
    Skipped,
    /// Stage is suspended while running, awaiting resume or intervention.
    Paused,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Returns true if dependents may proceed past this stage.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }

    /// Returns true if the orchestrator may select this stage to run.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}
