//! State store: the workflow aggregate, its persistence and schema migration.
//!
//! State files are written atomically to `<state_dir>/<workflow_id>.json`
//! and carry a whole-state checksum that is verified on every load.

pub mod migration;
mod store;
mod workflow;

pub(crate) use store::decode_document;
pub use store::{SharedStateStore, StateStore};
pub use workflow::{
    StatusSummary, WorkflowState, ABORTED_KEY, CHECKSUM_EXCLUDED_KEYS, CURRENT_SCHEMA_VERSION,
    RESTORED_FROM_KEY,
};
