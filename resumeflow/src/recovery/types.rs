//! Fault classification vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How bad a fault is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// Warnings and deprecations.
    Low,
    /// Everything not matched elsewhere.
    #[default]
    Medium,
    /// Security and permission problems.
    High,
    /// Fatal errors and corruption.
    Critical,
}

impl ErrorSeverity {
    /// Returns the snake_case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of fault occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Connection, DNS and socket failures.
    Network,
    /// Deadlines and timeouts.
    Timeout,
    /// Memory, quota and rate limits.
    Resource,
    /// Malformed or invalid data.
    Validation,
    /// Missing modules or packages.
    Dependency,
    /// Files, directories and disk.
    Filesystem,
    /// Credentials and permissions.
    Authentication,
    /// Bad settings or environment.
    Configuration,
    /// A failure inside the stage itself.
    #[default]
    StageExecution,
    /// A third-party service; only assigned by pre-classification.
    ExternalService,
}

impl ErrorCategory {
    /// Returns the snake_case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Resource => "resource",
            Self::Validation => "validation",
            Self::Dependency => "dependency",
            Self::Filesystem => "filesystem",
            Self::Authentication => "authentication",
            Self::Configuration => "configuration",
            Self::StageExecution => "stage_execution",
            Self::ExternalService => "external_service",
        }
    }

    /// Default recovery strategy for this category.
    pub fn default_strategy(self) -> RecoveryStrategy {
        match self {
            Self::Network | Self::Timeout | Self::ExternalService | Self::Resource => {
                RecoveryStrategy::Retry
            }
            Self::Validation | Self::Authentication => RecoveryStrategy::Manual,
            Self::Configuration => RecoveryStrategy::Abort,
            Self::Dependency | Self::Filesystem | Self::StageExecution => RecoveryStrategy::Retry,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy applied to a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Re-run the stage after a backoff delay.
    #[default]
    Retry,
    /// Mark the stage skipped and continue.
    Skip,
    /// Reset every later stage and re-run from the faulting stage.
    Rollback,
    /// Pause the stage until an operator intervenes.
    Manual,
    /// Fail the stage and stop the workflow.
    Abort,
    /// Run a registered fallback executor.
    Alternative,
}

impl RecoveryStrategy {
    /// Returns the snake_case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::Skip => "skip",
            Self::Rollback => "rollback",
            Self::Manual => "manual",
            Self::Abort => "abort",
            Self::Alternative => "alternative",
        }
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one recovery attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryOutcome {
    /// The caller should re-run the stage; the delay has already elapsed.
    Retry {
        /// Retry number within this fault sequence, starting at 1.
        attempt: u32,
        /// How long the manager waited.
        delay: Duration,
    },
    /// Retries ran out; the caller should escalate.
    RetryExhausted,
    /// The stage was skipped and the pipeline can continue.
    Skipped,
    /// Later stages were reset and the faulting stage is eligible again.
    RolledBack,
    /// The rollback itself failed.
    RollbackFailed {
        /// Why the rollback failed.
        reason: String,
    },
    /// The stage is paused until an operator intervenes.
    ManualIntervention {
        /// The fault message attached to the stage.
        message: String,
    },
    /// The workflow is aborted.
    Aborted {
        /// The fault message attached to the stage.
        message: String,
    },
    /// The caller should run a fallback executor.
    AlternativeRequested,
}

impl RecoveryOutcome {
    /// True if the pipeline can keep going without intervention.
    pub fn is_recovered(&self) -> bool {
        matches!(self, Self::Retry { .. } | Self::Skipped | Self::RolledBack)
    }
}
