//! Rollback point references.

use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Length of the checksum prefix used in snapshot file names.
pub const CHECKSUM_PREFIX_LEN: usize = 12;

/// A named reference to a persisted snapshot.
///
/// The checksum folds in the capture time, so it identifies a snapshot
/// rather than describing its content: two snapshots of the same state
/// have different checksums.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackPoint {
    /// The workflow the snapshot belongs to.
    pub workflow_id: String,
    /// When the snapshot was captured.
    pub timestamp: Timestamp,
    /// The current stage at capture time.
    #[serde(default)]
    pub stage_name: Option<String>,
    /// Snapshot identity.
    pub checksum: String,
    /// Human description.
    #[serde(default)]
    pub description: String,
}

impl RollbackPoint {
    /// Creates a rollback point captured now.
    #[must_use]
    pub fn new(
        workflow_id: impl Into<String>,
        stage_name: Option<String>,
        checksum: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            timestamp: now_utc(),
            stage_name,
            checksum: checksum.into(),
            description: description.into(),
        }
    }

    /// Sets the capture time.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The checksum prefix used in file names.
    #[must_use]
    pub fn short_checksum(&self) -> &str {
        let end = self.checksum.len().min(CHECKSUM_PREFIX_LEN);
        &self.checksum[..end]
    }

    /// True if the checksum starts with `prefix`.
    #[must_use]
    pub fn matches(&self, prefix: &str) -> bool {
        self.checksum.starts_with(prefix)
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("workflow_id".to_string(), serde_json::json!(self.workflow_id));
        map.insert(
            "timestamp".to_string(),
            serde_json::json!(self.timestamp.to_rfc3339()),
        );
        map.insert("stage_name".to_string(), serde_json::json!(self.stage_name));
        map.insert("checksum".to_string(), serde_json::json!(self.checksum));
        map.insert("description".to_string(), serde_json::json!(self.description));
        map
    }
}
