//! Snapshot creation, listing, restore and retention.

use super::point::RollbackPoint;
use crate::errors::{EngineError, EngineResult};
use crate::state::{decode_document, WorkflowState, RESTORED_FROM_KEY};
use crate::utils::{file_stamp, iso_timestamp, now_utc, read_optional, sha256_hex, write_atomic};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// On-disk snapshot layout: the point plus the full serialized state.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotFile {
    point: RollbackPoint,
    state: Value,
}

/// Creates and restores immutable state snapshots.
#[derive(Debug, Clone)]
pub struct RollbackManager {
    dir: PathBuf,
}

impl RollbackManager {
    /// Creates a manager writing snapshots into `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the snapshot directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes a snapshot of `state` and returns its rollback point.
    pub fn create_rollback_point(
        &self,
        state: &WorkflowState,
        description: &str,
    ) -> EngineResult<RollbackPoint> {
        let timestamp = now_utc();
        let serialized = serde_json::to_string(state)?;
        let checksum = sha256_hex(format!("{serialized}{}", timestamp.to_rfc3339()).as_bytes());

        let point = RollbackPoint::new(
            state.workflow_id(),
            state.current_stage().map(str::to_string),
            checksum,
            description,
        )
        .with_timestamp(timestamp);

        let path = self.dir.join(format!(
            "{}_{}_{}.json",
            point.workflow_id,
            point.short_checksum(),
            file_stamp(&timestamp)
        ));
        if path.exists() {
            return Err(EngineError::io(
                &path,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "snapshot already exists"),
            ));
        }

        let snapshot = SnapshotFile {
            point: point.clone(),
            state: serde_json::from_str(&serialized)?,
        };
        write_atomic(&path, &serde_json::to_vec_pretty(&snapshot)?)?;
        info!(
            workflow_id = %point.workflow_id,
            checksum = %point.short_checksum(),
            stage = ?point.stage_name,
            description = %description,
            "Created rollback point"
        );
        Ok(point)
    }

    /// Lists a workflow's rollback points, newest first.
    pub fn list_rollback_points(&self, workflow_id: &str) -> EngineResult<Vec<RollbackPoint>> {
        Ok(self
            .snapshots(workflow_id)?
            .into_iter()
            .map(|(_, snapshot)| snapshot.point)
            .collect())
    }

    /// Restores the most recent snapshot whose checksum starts with `checksum_prefix`.
    ///
    /// The state goes through the same verification and migration as a
    /// state file and is annotated with `metadata.restored_from`.
    pub fn restore_from_rollback(
        &self,
        workflow_id: &str,
        checksum_prefix: &str,
    ) -> EngineResult<Option<WorkflowState>> {
        let Some((path, snapshot)) = self
            .snapshots(workflow_id)?
            .into_iter()
            .find(|(_, s)| s.point.matches(checksum_prefix))
        else {
            debug!(workflow_id = %workflow_id, prefix = %checksum_prefix, "No matching rollback point");
            return Ok(None);
        };

        let mut state = decode_document(snapshot.state)?;
        state.insert_metadata(
            RESTORED_FROM_KEY,
            json!({
                "checksum": snapshot.point.checksum,
                "timestamp": snapshot.point.timestamp.to_rfc3339(),
                "description": snapshot.point.description,
                "restored_at": iso_timestamp(),
            }),
        );
        state.refresh_checksum()?;
        info!(
            workflow_id = %workflow_id,
            checksum = %snapshot.point.short_checksum(),
            path = %path.display(),
            "Restored rollback point"
        );
        Ok(Some(state))
    }

    /// Deletes all but the `keep_count` most recent snapshots, oldest first.
    ///
    /// Returns the number of snapshots removed.
    pub fn cleanup_old_rollbacks(&self, workflow_id: &str, keep_count: usize) -> EngineResult<usize> {
        let snapshots = self.snapshots(workflow_id)?;
        let mut removed = 0;
        for (path, snapshot) in snapshots.iter().skip(keep_count).rev() {
            std::fs::remove_file(path).map_err(|e| EngineError::io(path, e))?;
            debug!(checksum = %snapshot.point.short_checksum(), "Removed old rollback point");
            removed += 1;
        }
        if removed > 0 {
            info!(workflow_id = %workflow_id, removed, kept = keep_count, "Cleaned up rollback points");
        }
        Ok(removed)
    }

    /// Readable snapshots for a workflow, newest first.
    fn snapshots(&self, workflow_id: &str) -> EngineResult<Vec<(PathBuf, SnapshotFile)>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::io(&self.dir, e)),
        };

        let prefix = format!("{workflow_id}_");
        let mut found = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| EngineError::io(&self.dir, e))?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(&prefix) || !name.ends_with(".json") {
                continue;
            }
            let Some(content) = read_optional(&path)? else {
                continue;
            };
            match serde_json::from_str::<SnapshotFile>(&content) {
                // Ids may contain '_', so the file name prefix alone is not proof.
                Ok(snapshot) if snapshot.point.workflow_id == workflow_id => {
                    found.push((path, snapshot));
                }
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable snapshot"),
            }
        }
        found.sort_by(|a, b| b.1.point.timestamp.cmp(&a.1.point.timestamp));
        Ok(found)
    }
}
