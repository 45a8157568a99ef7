//! Error types for the resumeflow engine.
//!
//! `EngineError` covers the exceptional conditions: corrupt or unreadable
//! state, programmer errors such as illegal status transitions, and I/O.
//! Faults raised by stage executors are not engine errors; they are values
//! of [`crate::recovery::StageFault`] handed to the recovery manager.

use crate::core::StageStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// The main error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A stage status transition was not allowed from its current status.
    #[error("{0}")]
    InvalidTransition(#[from] InvalidTransitionError),

    /// A persisted state failed checksum verification.
    #[error("{0}")]
    Integrity(#[from] IntegrityError),

    /// A persisted state could not be migrated to the current schema.
    #[error("{0}")]
    Migration(#[from] MigrationError),

    /// The named stage is not declared in the pipeline.
    #[error("Unknown stage: '{0}'")]
    UnknownStage(String),

    /// A stage was started while another stage is still running.
    #[error("Cannot start stage '{requested}': stage '{running}' is still running")]
    StageAlreadyRunning {
        /// The stage currently running.
        running: String,
        /// The stage that was requested.
        requested: String,
    },

    /// A stage was started before one of its dependencies settled.
    #[error("Stage '{stage}' depends on '{dependency}' which has not completed")]
    DependencyNotSatisfied {
        /// The stage being started.
        stage: String,
        /// The unsatisfied dependency.
        dependency: String,
    },

    /// The pipeline definition is malformed.
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    /// A workflow id cannot be used as a file name component.
    #[error("Invalid workflow id: '{0}'")]
    InvalidWorkflowId(String),

    /// The workflow has no inputs to hand to stage executors.
    #[error("Workflow '{0}' has no inputs")]
    MissingInputs(String),

    /// No executor is registered for a stage.
    #[error("No executor registered for stage '{0}'")]
    NoExecutor(String),

    /// A configuration value is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error on a specific path.
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    /// Wraps an IO error with the path that caused it.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true for errors caused by corrupt or incompatible persisted data.
    ///
    /// These are never worth retrying.
    #[must_use]
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::Integrity(_) | Self::Migration(_) | Self::Serialization(_)
        )
    }
}

/// Error raised when a stage transition is not permitted.
#[derive(Debug, Clone, Error)]
#[error("Invalid transition for stage '{stage}': cannot {action} from '{from}'")]
pub struct InvalidTransitionError {
    /// The stage name.
    pub stage: String,
    /// The status the stage was in.
    pub from: StageStatus,
    /// The attempted transition.
    pub action: &'static str,
}

impl InvalidTransitionError {
    /// Creates a new invalid transition error.
    #[must_use]
    pub fn new(stage: impl Into<String>, from: StageStatus, action: &'static str) -> Self {
        Self {
            stage: stage.into(),
            from,
            action,
        }
    }
}

/// Error raised when a stored checksum does not match the recomputed one.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Integrity check failed for workflow '{workflow_id}': expected checksum {expected}, computed {actual}")]
pub struct IntegrityError {
    /// The workflow whose state is corrupt.
    pub workflow_id: String,
    /// The checksum stored alongside the state.
    pub expected: String,
    /// The checksum computed from the stored content.
    pub actual: String,
}

impl IntegrityError {
    /// Creates a new integrity error.
    #[must_use]
    pub fn new(
        workflow_id: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!("IntegrityError"));
        map.insert("workflow_id".to_string(), serde_json::json!(self.workflow_id));
        map.insert("expected".to_string(), serde_json::json!(self.expected));
        map.insert("actual".to_string(), serde_json::json!(self.actual));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Errors from the schema migration chain.
#[derive(Debug, Clone, Error)]
pub enum MigrationError {
    /// The stored version is newer than this build understands.
    #[error("Cannot migrate state from version {found} down to {current}")]
    Downgrade {
        /// Version found on disk.
        found: String,
        /// Version this build writes.
        current: String,
    },

    /// The stored version is not part of the chain.
    #[error("Unknown state schema version: {0}")]
    UnknownVersion(String),

    /// The stored document does not have the shape a migration expects.
    #[error("Malformed state for migration {from} -> {to}: {reason}")]
    Malformed {
        /// Source version of the failing step.
        from: String,
        /// Target version of the failing step.
        to: String,
        /// What was wrong.
        reason: String,
    },
}

impl MigrationError {
    /// Creates a malformed-document error.
    #[must_use]
    pub fn malformed(from: &str, to: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.into(),
        }
    }
}
