//! Pause points, pause requests and suspension records.

use crate::state::WorkflowState;
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// When a deferred pause request takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PausePolicy {
    /// Suspend as soon as the request is made.
    #[default]
    Immediate,
    /// Suspend at the next check after a stage finishes.
    AfterCurrentStage,
    /// Suspend at the next check of any kind.
    AtNextCheckpoint,
    /// Discard the request.
    Never,
}

/// Why a workflow was suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    /// An operator asked for it.
    #[default]
    UserRequest,
    /// A configured pause point fired.
    PausePoint,
    /// Recovery needs someone to look at a fault.
    ManualIntervention,
    /// Planned downtime.
    Maintenance,
    /// A quota or budget ran out.
    ResourceLimit,
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UserRequest => "user_request",
            Self::PausePoint => "pause_point",
            Self::ManualIntervention => "manual_intervention",
            Self::Maintenance => "maintenance",
            Self::ResourceLimit => "resource_limit",
        })
    }
}

/// Whether a pause check runs before or after the stage executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseTiming {
    /// After the stage is marked running, before it executes.
    #[default]
    Before,
    /// After the stage has finished.
    After,
}

/// Predicate deciding whether a pause point fires.
pub type PauseCondition = Arc<dyn Fn(&WorkflowState) -> bool + Send + Sync>;

/// A statically configured place to pause.
#[derive(Clone)]
pub struct PausePoint {
    /// Stage the point is attached to.
    pub stage_name: String,
    /// Before or after the stage.
    pub timing: PauseTiming,
    /// Optional predicate; absent means always pause.
    pub condition: Option<PauseCondition>,
    /// Message recorded on the suspension.
    pub description: String,
    /// Resume automatically after this long.
    pub auto_resume_after: Option<Duration>,
    /// Require an explicit resume, ignoring `auto_resume_after`.
    pub require_confirmation: bool,
}

impl PausePoint {
    /// Creates an unconditional pause point before `stage_name`.
    #[must_use]
    pub fn new(stage_name: impl Into<String>) -> Self {
        let stage_name = stage_name.into();
        Self {
            description: format!("Pause point at '{stage_name}'"),
            stage_name,
            timing: PauseTiming::Before,
            condition: None,
            auto_resume_after: None,
            require_confirmation: false,
        }
    }

    /// Sets the timing.
    #[must_use]
    pub fn with_timing(mut self, timing: PauseTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Sets the condition.
    #[must_use]
    pub fn with_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&WorkflowState) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the auto-resume delay.
    #[must_use]
    pub fn with_auto_resume_after(mut self, delay: Duration) -> Self {
        self.auto_resume_after = Some(delay);
        self
    }

    /// Requires an explicit resume.
    #[must_use]
    pub fn requiring_confirmation(mut self) -> Self {
        self.require_confirmation = true;
        self
    }

    /// True if this point fires for `stage` at `timing` given `state`.
    pub fn triggers(&self, stage: &str, timing: PauseTiming, state: &WorkflowState) -> bool {
        self.stage_name == stage
            && self.timing == timing
            && self.condition.as_ref().map_or(true, |condition| condition(state))
    }

    /// Auto-resume delay after applying `require_confirmation`.
    pub fn effective_auto_resume(&self) -> Option<Duration> {
        if self.require_confirmation {
            None
        } else {
            self.auto_resume_after
        }
    }
}

impl fmt::Debug for PausePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PausePoint")
            .field("stage_name", &self.stage_name)
            .field("timing", &self.timing)
            .field("has_condition", &self.condition.is_some())
            .field("description", &self.description)
            .field("auto_resume_after", &self.auto_resume_after)
            .field("require_confirmation", &self.require_confirmation)
            .finish()
    }
}

/// A request to pause, removed once applied or cancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseRequest {
    /// Request id.
    pub request_id: Uuid,
    /// Why the pause is wanted.
    pub reason: PauseReason,
    /// Who asked.
    pub requested_by: String,
    /// Message recorded on the suspension.
    pub message: String,
    /// Only pause at this stage.
    #[serde(default)]
    pub target_stage: Option<String>,
    /// When to apply the pause.
    pub policy: PausePolicy,
    /// Resume automatically after this long.
    #[serde(default)]
    pub auto_resume_after: Option<Duration>,
    /// When the request was made.
    pub created_at: Timestamp,
}

impl PauseRequest {
    /// Creates an immediate pause request.
    #[must_use]
    pub fn new(
        reason: PauseReason,
        requested_by: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            reason,
            requested_by: requested_by.into(),
            message: message.into(),
            target_stage: None,
            policy: PausePolicy::Immediate,
            auto_resume_after: None,
            created_at: now_utc(),
        }
    }

    /// Sets the policy.
    #[must_use]
    pub fn with_policy(mut self, policy: PausePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Restricts the request to one stage.
    #[must_use]
    pub fn with_target_stage(mut self, stage: impl Into<String>) -> Self {
        self.target_stage = Some(stage.into());
        self
    }

    /// Sets the auto-resume delay.
    #[must_use]
    pub fn with_auto_resume_after(mut self, delay: Duration) -> Self {
        self.auto_resume_after = Some(delay);
        self
    }

    /// True if a deferred request fires for `stage` at `timing`.
    pub fn triggers(&self, stage: &str, timing: PauseTiming) -> bool {
        let policy_matches = match self.policy {
            PausePolicy::AtNextCheckpoint => true,
            PausePolicy::AfterCurrentStage => timing == PauseTiming::After,
            PausePolicy::Immediate | PausePolicy::Never => false,
        };
        policy_matches && self.target_stage.as_deref().map_or(true, |t| t == stage)
    }
}

/// A persisted record that a workflow is suspended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSuspension {
    /// Suspension id.
    pub suspension_id: Uuid,
    /// The suspended workflow.
    pub workflow_id: String,
    /// The current stage when suspended.
    #[serde(default)]
    pub stage_name: Option<String>,
    /// When the suspension started.
    pub suspended_at: Timestamp,
    /// Why.
    pub reason: PauseReason,
    /// Explanation.
    pub message: String,
    /// Who caused it.
    #[serde(default)]
    pub requested_by: Option<String>,
    /// Whether the workflow can be resumed.
    pub resumable: bool,
    /// Resume automatically after this time.
    #[serde(default)]
    pub auto_resume_at: Option<Timestamp>,
    /// Arbitrary caller data.
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
}

impl WorkflowSuspension {
    /// True once the auto-resume deadline has passed.
    pub fn auto_resume_due(&self, now: Timestamp) -> bool {
        self.resumable && self.auto_resume_at.is_some_and(|at| at <= now)
    }
}

/// Kind of pause history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseEvent {
    /// The workflow was suspended.
    Suspended,
    /// The workflow was resumed.
    Resumed,
}

/// One applied suspension or resumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseHistoryEntry {
    /// What happened.
    pub event: PauseEvent,
    /// The suspension involved.
    pub suspension_id: Uuid,
    /// The stage involved.
    pub stage_name: Option<String>,
    /// Who triggered it.
    pub actor: String,
    /// When.
    pub at: Timestamp,
}
