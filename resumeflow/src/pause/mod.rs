//! Pause and resume: pause points, pause requests and suspensions.

mod manager;
mod signal;
mod types;

pub use manager::{PauseResumeManager, AUTO_RESUME_ACTOR, RESUMED_PAUSE_POINT_KEY};
pub use signal::{PauseSignal, SignalState};
pub use types::{
    PauseCondition, PauseEvent, PauseHistoryEntry, PausePolicy, PausePoint, PauseReason,
    PauseRequest, PauseTiming, WorkflowSuspension,
};
