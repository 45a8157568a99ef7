//! Stage model: the value types the rest of the engine is built on.
//!
//! - Stage status enum
//! - Per-stage state with validated transitions
//! - Workflow inputs and their checksum
//! - Declared pipeline shape

mod inputs;
mod pipeline;
mod stage;
mod status;

pub use inputs::WorkflowInputs;
pub use pipeline::{PipelineDefinition, StageDefinition, STANDARD_STAGES};
pub use stage::{StageMetrics, StageState};
pub use status::StageStatus;
