//! Per-stage state and its validated transitions.

use super::StageStatus;
use crate::errors::InvalidTransitionError;
use crate::utils::{checksum_value, now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metrics recorded by a stage, keyed by metric name.
pub type StageMetrics = BTreeMap<String, serde_json::Value>;

const DEFAULT_FAILURE_MESSAGE: &str = "stage failed without an error message";
const DEFAULT_PAUSE_MESSAGE: &str = "stage paused";
const INTERRUPTED_MESSAGE: &str =
    "stage was running when the process stopped; marked failed on reload";

/// State of a single pipeline stage.
///
/// The status field is private: every change goes through a transition
/// method that checks the current status first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageState {
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(default)]
    output_files: Vec<String>,
    #[serde(default)]
    metrics: StageMetrics,
    #[serde(default)]
    retry_count: u32,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
}

impl StageState {
    /// Creates a pending stage.
    #[must_use]
    pub fn new(name: impl Into<String>, dependencies: Vec<String>) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Pending,
            started_at: None,
            completed_at: None,
            error_message: None,
            output_files: Vec::new(),
            metrics: StageMetrics::new(),
            retry_count: 0,
            dependencies,
            checksum: None,
        }
    }

    /// Returns the stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> StageStatus {
        self.status
    }

    /// Returns when the stage last started.
    #[must_use]
    pub fn started_at(&self) -> Option<Timestamp> {
        self.started_at
    }

    /// Returns when the stage reached a terminal status.
    #[must_use]
    pub fn completed_at(&self) -> Option<Timestamp> {
        self.completed_at
    }

    /// Returns the error or explanation attached to the stage.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Returns the files produced by the stage.
    #[must_use]
    pub fn output_files(&self) -> &[String] {
        &self.output_files
    }

    /// Returns the stage metrics.
    #[must_use]
    pub fn metrics(&self) -> &StageMetrics {
        &self.metrics
    }

    /// Returns how many retries have been attempted.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Returns the declared dependencies.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Returns the content checksum over outputs and metrics.
    #[must_use]
    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    /// Returns how long the stage ran, if it has finished.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// pending | failed -> running
    pub fn start(&mut self) -> Result<(), InvalidTransitionError> {
        self.expect(&[StageStatus::Pending, StageStatus::Failed], "start")?;
        self.status = StageStatus::Running;
        self.started_at = Some(now_utc());
        self.completed_at = None;
        self.error_message = None;
        Ok(())
    }

    /// running -> completed
    pub fn complete(
        &mut self,
        output_files: Vec<String>,
        metrics: StageMetrics,
    ) -> Result<(), InvalidTransitionError> {
        self.expect(&[StageStatus::Running], "complete")?;
        self.checksum = Some(content_checksum(&output_files, &metrics));
        self.status = StageStatus::Completed;
        self.output_files = output_files;
        self.metrics = metrics;
        self.completed_at = Some(now_utc());
        self.error_message = None;
        Ok(())
    }

    /// pending | running | paused -> failed
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), InvalidTransitionError> {
        self.expect(
            &[StageStatus::Pending, StageStatus::Running, StageStatus::Paused],
            "fail",
        )?;
        self.status = StageStatus::Failed;
        self.error_message = Some(non_empty(message.into(), DEFAULT_FAILURE_MESSAGE));
        self.completed_at = Some(now_utc());
        Ok(())
    }

    /// pending | running | failed | paused -> skipped
    pub fn skip(&mut self, reason: impl Into<String>) -> Result<(), InvalidTransitionError> {
        self.expect(
            &[
                StageStatus::Pending,
                StageStatus::Running,
                StageStatus::Failed,
                StageStatus::Paused,
            ],
            "skip",
        )?;
        self.status = StageStatus::Skipped;
        let reason = reason.into();
        self.error_message = (!reason.is_empty()).then_some(reason);
        self.completed_at = Some(now_utc());
        Ok(())
    }

    /// running -> paused
    pub fn pause(&mut self, message: impl Into<String>) -> Result<(), InvalidTransitionError> {
        self.expect(&[StageStatus::Running], "pause")?;
        self.status = StageStatus::Paused;
        self.error_message = Some(non_empty(message.into(), DEFAULT_PAUSE_MESSAGE));
        Ok(())
    }

    /// paused -> pending
    ///
    /// The stage re-enters through [`StageState::start`] so its timestamps
    /// describe the run that actually completes it.
    pub fn resume_to_pending(&mut self) -> Result<(), InvalidTransitionError> {
        self.expect(&[StageStatus::Paused], "resume")?;
        self.status = StageStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.error_message = None;
        Ok(())
    }

    /// running -> failed, used when a persisted running stage is reloaded.
    pub fn mark_interrupted(&mut self) -> Result<(), InvalidTransitionError> {
        self.expect(&[StageStatus::Running], "mark interrupted")?;
        self.status = StageStatus::Failed;
        self.error_message = Some(INTERRUPTED_MESSAGE.to_string());
        Ok(())
    }

    /// Increments the retry counter of a running stage.
    pub fn record_retry(&mut self) -> Result<u32, InvalidTransitionError> {
        self.expect(&[StageStatus::Running], "retry")?;
        self.retry_count += 1;
        Ok(self.retry_count)
    }

    /// any -> pending, discarding everything the stage produced.
    pub fn reset(&mut self) {
        self.status = StageStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.error_message = None;
        self.output_files.clear();
        self.metrics.clear();
        self.retry_count = 0;
        self.checksum = None;
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub(crate) fn set_dependencies(&mut self, dependencies: Vec<String>) {
        self.dependencies = dependencies;
    }

    fn expect(
        &self,
        allowed: &[StageStatus],
        action: &'static str,
    ) -> Result<(), InvalidTransitionError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(InvalidTransitionError::new(&self.name, self.status, action))
        }
    }
}

fn content_checksum(output_files: &[String], metrics: &StageMetrics) -> String {
    checksum_value(&serde_json::json!({
        "output_files": output_files,
        "metrics": metrics,
    }))
}

fn non_empty(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}
