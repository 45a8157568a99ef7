//! Lifecycle events emitted by the orchestrator.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event names.
pub mod event_types {
    /// A stage was marked running.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage completed.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage raised a fault.
    pub const STAGE_FAILED: &str = "stage.failed";
    /// A stage is about to be retried.
    pub const STAGE_RETRYING: &str = "stage.retrying";
    /// A stage was skipped by recovery.
    pub const STAGE_SKIPPED: &str = "stage.skipped";
    /// The workflow was suspended.
    pub const WORKFLOW_SUSPENDED: &str = "workflow.suspended";
    /// The workflow was resumed.
    pub const WORKFLOW_RESUMED: &str = "workflow.resumed";
    /// The workflow was rolled back.
    pub const WORKFLOW_ROLLED_BACK: &str = "workflow.rolled_back";
    /// The workflow was aborted.
    pub const WORKFLOW_ABORTED: &str = "workflow.aborted";
    /// Every stage is settled.
    pub const WORKFLOW_COMPLETED: &str = "workflow.completed";
}
