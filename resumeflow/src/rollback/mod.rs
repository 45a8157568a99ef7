//! Rollback manager: immutable point-in-time snapshots of workflow state.
//!
//! Snapshots live in `<state_dir>/rollbacks/` as
//! `<workflow_id>_<checksum prefix>_<stamp>.json`.

mod manager;
mod point;

pub use manager::RollbackManager;
pub use point::{RollbackPoint, CHECKSUM_PREFIX_LEN};
