//! # Resumeflow
//!
//! A resumable multi-stage workflow engine.
//!
//! A workflow is an ordered list of named stages. Resumeflow persists the
//! progress of each stage so a run can stop at any point and continue
//! later, with support for:
//!
//! - **Integrity-checked state**: atomic state files carrying a whole-state
//!   checksum, verified and migrated on load
//! - **Rollback**: immutable snapshots after each completed stage, and
//!   stage-level rollback that keeps earlier work intact
//! - **Error recovery**: fault classification, exponential backoff and
//!   configurable escalation
//! - **Pause and resume**: pause points, pause requests and durable
//!   suspensions with optional auto-resume
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use resumeflow::prelude::*;
//!
//! let config = EngineConfig::new().with_state_dir(".workflow_state");
//! let mut store = StateStore::load_or_initialize(config, PipelineDefinition::standard(), "todo-app")?;
//! store.set_inputs(WorkflowInputs::new("build a todo app"));
//!
//! let orchestrator = Orchestrator::builder(store.into_shared())
//!     .executor("requirements_analysis", AnalysisStage::new())
//!     // ... one executor per stage
//!     .build()?;
//!
//! match orchestrator.run().await? {
//!     RunOutcome::Completed => println!("done"),
//!     other => println!("stopped: {other:?}"),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod orchestrator;
pub mod pause;
pub mod recovery;
pub mod rollback;
pub mod state;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{EngineConfig, PauseConfig, RecoveryConfig, RollbackConfig};
    pub use crate::core::{
        PipelineDefinition, StageDefinition, StageMetrics, StageState, StageStatus,
        WorkflowInputs, STANDARD_STAGES,
    };
    pub use crate::errors::{EngineError, EngineResult};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::orchestrator::{
        Orchestrator, OrchestratorBuilder, RunOutcome, StageExecutor, StageResult,
    };
    pub use crate::pause::{
        PausePoint, PausePolicy, PauseReason, PauseRequest, PauseResumeManager, PauseTiming,
        WorkflowSuspension,
    };
    pub use crate::recovery::{
        ErrorCategory, ErrorRecoveryManager, ErrorSeverity, RecoveryStrategy, StageFault,
    };
    pub use crate::rollback::{RollbackManager, RollbackPoint};
    pub use crate::state::{SharedStateStore, StateStore, StatusSummary, WorkflowState};
    pub use crate::utils::{iso_timestamp, Timestamp};
}
