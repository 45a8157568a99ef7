//! Recorded faults.

use super::backoff::BackoffPolicy;
use super::types::{ErrorCategory, ErrorSeverity, RecoveryStrategy};
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use uuid::Uuid;

/// One observed fault together with its classification and retry progress.
///
/// Only the retry counter, the backoff parameters, the strategy (on
/// escalation) and the resolution change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique id.
    pub error_id: Uuid,
    /// When the fault was observed.
    pub timestamp: Timestamp,
    /// The faulting stage.
    pub stage_name: String,
    /// The owning workflow.
    pub workflow_id: String,
    /// Type name of the fault.
    pub error_type: String,
    /// Fault message.
    pub error_message: String,
    /// Structured details.
    #[serde(default)]
    pub error_details: BTreeMap<String, Value>,
    /// Assigned severity.
    pub severity: ErrorSeverity,
    /// Assigned category.
    pub category: ErrorCategory,
    /// Strategy applied.
    pub recovery_strategy: RecoveryStrategy,
    /// Retries performed in this fault sequence.
    pub retry_count: u32,
    /// Retries allowed in this fault sequence.
    pub max_retries: u32,
    /// Backoff parameters after category adjustment.
    pub backoff: BackoffPolicy,
    /// Whether the fault was handled without intervention.
    #[serde(default)]
    pub resolved: bool,
    /// Short description of what the manager did.
    #[serde(default)]
    pub resolution: Option<String>,
}

impl ErrorContext {
    /// Creates a context for a freshly observed fault.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        workflow_id: impl Into<String>,
        stage_name: impl Into<String>,
        error_type: impl Into<String>,
        error_message: impl Into<String>,
        severity: ErrorSeverity,
        category: ErrorCategory,
        recovery_strategy: RecoveryStrategy,
        max_retries: u32,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            error_id: Uuid::new_v4(),
            timestamp: now_utc(),
            stage_name: stage_name.into(),
            workflow_id: workflow_id.into(),
            error_type: error_type.into(),
            error_message: error_message.into(),
            error_details: BTreeMap::new(),
            severity,
            category,
            recovery_strategy,
            retry_count: 0,
            max_retries,
            backoff,
            resolved: false,
            resolution: None,
        }
    }

    /// Adds structured details.
    #[must_use]
    pub fn with_details(mut self, details: BTreeMap<String, Value>) -> Self {
        self.error_details = details;
        self
    }

    /// Carries retry progress over from an earlier fault of the same stage run.
    #[must_use]
    pub fn continuing(mut self, previous: &ErrorContext) -> Self {
        if previous.stage_name == self.stage_name {
            self.retry_count = previous.retry_count;
        }
        self
    }

    /// True once no retries remain.
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Delay before the next retry.
    pub fn next_delay(&self) -> Duration {
        self.backoff.delay_for(self.retry_count)
    }

    /// Base delay after category adjustment.
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.backoff.base_delay_ms)
    }

    /// Cap on a single delay.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.backoff.max_delay_ms)
    }

    pub(crate) fn resolve(&mut self, resolved: bool, resolution: impl Into<String>) {
        self.resolved = resolved;
        self.resolution = Some(resolution.into());
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert("error_id".to_string(), serde_json::json!(self.error_id.to_string()));
        map.insert("timestamp".to_string(), serde_json::json!(self.timestamp.to_rfc3339()));
        map.insert("stage_name".to_string(), serde_json::json!(self.stage_name));
        map.insert("workflow_id".to_string(), serde_json::json!(self.workflow_id));
        map.insert("error_type".to_string(), serde_json::json!(self.error_type));
        map.insert("error_message".to_string(), serde_json::json!(self.error_message));
        map.insert("error_details".to_string(), serde_json::json!(self.error_details));
        map.insert("severity".to_string(), serde_json::json!(self.severity));
        map.insert("category".to_string(), serde_json::json!(self.category));
        map.insert(
            "recovery_strategy".to_string(),
            serde_json::json!(self.recovery_strategy),
        );
        map.insert("retry_count".to_string(), serde_json::json!(self.retry_count));
        map.insert("max_retries".to_string(), serde_json::json!(self.max_retries));
        map.insert(
            "base_delay".to_string(),
            serde_json::json!(self.base_delay().as_secs_f64()),
        );
        map.insert(
            "backoff_multiplier".to_string(),
            serde_json::json!(self.backoff.multiplier),
        );
        map.insert(
            "max_delay".to_string(),
            serde_json::json!(self.max_delay().as_secs_f64()),
        );
        map.insert("resolved".to_string(), serde_json::json!(self.resolved));
        map.insert("resolution".to_string(), serde_json::json!(self.resolution));
        map
    }
}
