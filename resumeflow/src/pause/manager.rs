//! The pause/resume manager.
//!
//! Holds at most one active suspension per workflow. The suspension is
//! mirrored to `<state_dir>/suspensions/<workflow_id>.json` so a restarted
//! process comes back suspended, and into a [`PauseSignal`] that the
//! orchestrator blocks on.

use super::signal::PauseSignal;
use super::types::{
    PauseEvent, PauseHistoryEntry, PausePolicy, PausePoint, PauseReason, PauseRequest,
    PauseTiming, WorkflowSuspension,
};
use crate::config::PauseConfig;
use crate::core::StageStatus;
use crate::errors::EngineResult;
use crate::state::SharedStateStore;
use crate::utils::{now_utc, read_optional, remove_if_exists, write_atomic};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Actor recorded when a suspension resumes on its own.
pub const AUTO_RESUME_ACTOR: &str = "auto-resume";

/// Metadata key naming the pause point a resume just released.
///
/// The next check consumes it, so resuming at an unconditional pause point
/// does not suspend again on the same check.
pub const RESUMED_PAUSE_POINT_KEY: &str = "resumed_pause_point";

const TIMING_KEY: &str = "timing";

/// Manages pause points, pause requests and the active suspension.
pub struct PauseResumeManager {
    store: SharedStateStore,
    config: PauseConfig,
    workflow_id: String,
    record_path: PathBuf,
    pause_points: RwLock<Vec<PausePoint>>,
    pending: Mutex<Vec<PauseRequest>>,
    active: Mutex<Option<WorkflowSuspension>>,
    history: Mutex<Vec<PauseHistoryEntry>>,
    signal: PauseSignal,
}

impl PauseResumeManager {
    /// Creates a manager, restoring a persisted suspension if one exists.
    pub fn new(store: SharedStateStore, config: PauseConfig) -> EngineResult<Self> {
        let (workflow_id, record_path) = {
            let guard = store.lock();
            let id = guard.workflow_id().to_string();
            let path = guard.config().suspension_dir().join(format!("{id}.json"));
            (id, path)
        };

        let signal = PauseSignal::new();
        let restored = match read_optional(&record_path)? {
            Some(content) => {
                let suspension: WorkflowSuspension = serde_json::from_str(&content)?;
                info!(
                    workflow_id = %workflow_id,
                    suspension_id = %suspension.suspension_id,
                    "Restored workflow suspension"
                );
                signal.pause();
                Some(suspension)
            }
            None => None,
        };

        Ok(Self {
            store,
            config,
            workflow_id,
            record_path,
            pause_points: RwLock::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            active: Mutex::new(restored),
            history: Mutex::new(Vec::new()),
            signal,
        })
    }

    /// Returns the pause configuration.
    pub fn config(&self) -> &PauseConfig {
        &self.config
    }

    /// Adds a pause point, replacing one with the same stage and timing.
    pub fn configure_pause_point(&self, point: PausePoint) {
        let mut points = self.pause_points.write();
        points.retain(|p| !(p.stage_name == point.stage_name && p.timing == point.timing));
        debug!(stage = %point.stage_name, timing = ?point.timing, "Configured pause point");
        points.push(point);
    }

    /// Removes every pause point on `stage`. Returns true if any existed.
    pub fn remove_pause_point(&self, stage: &str) -> bool {
        let mut points = self.pause_points.write();
        let before = points.len();
        points.retain(|p| p.stage_name != stage);
        points.len() != before
    }

    /// Returns the configured pause points.
    pub fn pause_points(&self) -> Vec<PausePoint> {
        self.pause_points.read().clone()
    }

    /// Submits a pause request and returns its id.
    ///
    /// Immediate requests suspend right away; `never` requests are dropped;
    /// the rest wait for a matching [`check_pause_point`](Self::check_pause_point).
    pub fn request_pause(&self, request: PauseRequest) -> EngineResult<Uuid> {
        let request_id = request.request_id;
        match request.policy {
            PausePolicy::Never => {
                debug!(request_id = %request_id, "Discarded pause request with policy never");
            }
            PausePolicy::Immediate => {
                self.suspend_for_request(&request)?;
            }
            PausePolicy::AfterCurrentStage | PausePolicy::AtNextCheckpoint => {
                info!(
                    request_id = %request_id,
                    policy = ?request.policy,
                    target_stage = ?request.target_stage,
                    "Queued pause request"
                );
                self.pending.lock().push(request);
            }
        }
        Ok(request_id)
    }

    /// Cancels a queued request. Returns true if it was still queued.
    pub fn cancel_pause_request(&self, request_id: Uuid) -> bool {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|r| r.request_id != request_id);
        pending.len() != before
    }

    /// Returns the queued requests.
    pub fn pending_requests(&self) -> Vec<PauseRequest> {
        self.pending.lock().clone()
    }

    /// Returns true if execution must not proceed past this point.
    ///
    /// Already suspended workflows always return true. Otherwise pause
    /// points are evaluated first, then queued requests; the first match
    /// suspends the workflow and is consumed if it was a request.
    pub fn check_pause_point(&self, stage: &str, timing: PauseTiming) -> EngineResult<bool> {
        if self.is_suspended() {
            return Ok(true);
        }

        let state = {
            let mut store = self.store.lock();
            let state = store.state().clone();
            store.remove_metadata(RESUMED_PAUSE_POINT_KEY);
            state
        };
        let released = state.metadata().get(RESUMED_PAUSE_POINT_KEY).is_some_and(|r| {
            r.get("stage").and_then(Value::as_str) == Some(stage)
                && r.get(TIMING_KEY) == serde_json::to_value(timing).ok().as_ref()
        });
        let point = if released {
            debug!(stage = %stage, timing = ?timing, "Pause point released by resume");
            None
        } else {
            self.pause_points
                .read()
                .iter()
                .find(|p| p.triggers(stage, timing, &state))
                .cloned()
        };
        if let Some(point) = point {
            let mut data = BTreeMap::new();
            data.insert(TIMING_KEY.to_string(), serde_json::to_value(point.timing)?);
            self.suspend_workflow(
                PauseReason::PausePoint,
                &point.description,
                None,
                point.effective_auto_resume(),
                data,
            )?;
            return Ok(true);
        }

        let request = {
            let mut pending = self.pending.lock();
            pending
                .iter()
                .position(|r| r.triggers(stage, timing))
                .map(|index| pending.remove(index))
        };
        if let Some(request) = request {
            self.suspend_for_request(&request)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Suspends the workflow and returns the suspension id.
    ///
    /// A running current stage is paused and the state saved. If a
    /// suspension is already active its id is returned unchanged.
    pub fn suspend_workflow(
        &self,
        reason: PauseReason,
        message: &str,
        requested_by: Option<&str>,
        auto_resume_after: Option<Duration>,
        data: BTreeMap<String, Value>,
    ) -> EngineResult<Uuid> {
        let mut active = self.active.lock();
        if let Some(existing) = active.as_ref() {
            debug!(suspension_id = %existing.suspension_id, "Workflow already suspended");
            return Ok(existing.suspension_id);
        }

        let stage_name = {
            let mut store = self.store.lock();
            let current = store.state().current_stage().map(str::to_string);
            if let Some(stage) = current.as_deref() {
                if store.state().stage(stage).map(|s| s.status()) == Some(StageStatus::Running) {
                    store.pause_stage(stage, message)?;
                }
            }
            store.save()?;
            current
        };

        let now = now_utc();
        let auto_resume_at = auto_resume_after
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .and_then(|d| now.checked_add_signed(d));
        let suspension = WorkflowSuspension {
            suspension_id: Uuid::new_v4(),
            workflow_id: self.workflow_id.clone(),
            stage_name: stage_name.clone(),
            suspended_at: now,
            reason,
            message: message.to_string(),
            requested_by: requested_by.map(str::to_string),
            resumable: true,
            auto_resume_at,
            data,
        };
        write_atomic(&self.record_path, &serde_json::to_vec_pretty(&suspension)?)?;

        let suspension_id = suspension.suspension_id;
        *active = Some(suspension);
        self.signal.pause();
        self.push_history(
            PauseEvent::Suspended,
            suspension_id,
            stage_name.clone(),
            requested_by.unwrap_or("system"),
        );
        info!(
            workflow_id = %self.workflow_id,
            suspension_id = %suspension_id,
            stage = ?stage_name,
            reason = %reason,
            "Workflow suspended"
        );
        Ok(suspension_id)
    }

    /// Resumes a suspended workflow.
    ///
    /// Returns false, changing nothing, if `workflow_id` has no active
    /// suspension. Otherwise the record is deleted, the paused stage goes
    /// back to pending and every waiter is released. The suspension's own
    /// stage is preferred; any other paused stage is the fallback.
    pub fn resume_workflow(&self, workflow_id: &str, resumed_by: &str) -> EngineResult<bool> {
        if workflow_id != self.workflow_id {
            debug!(workflow_id = %workflow_id, "Resume requested for a different workflow");
            return Ok(false);
        }
        let mut active = self.active.lock();
        let Some(suspension) = active.as_ref() else {
            debug!(workflow_id = %workflow_id, "Resume requested but workflow is not suspended");
            return Ok(false);
        };

        {
            let mut store = self.store.lock();
            let paused = suspension
                .stage_name
                .as_deref()
                .filter(|s| store.state().stage(s).map(|st| st.status()) == Some(StageStatus::Paused))
                .or_else(|| store.state().paused_stage().map(|s| s.name()))
                .map(str::to_string);
            if let Some(stage) = paused {
                store.resume_stage(&stage)?;
            }
            if let Some(stage) = suspension.stage_name.as_deref() {
                if let Some(timing) = suspension.data.get(TIMING_KEY) {
                    store.set_metadata(
                        RESUMED_PAUSE_POINT_KEY,
                        serde_json::json!({ "stage": stage, "timing": timing }),
                    );
                }
            }
            store.save()?;
        }
        remove_if_exists(&self.record_path)?;

        let suspension_id = suspension.suspension_id;
        let stage_name = suspension.stage_name.clone();
        *active = None;
        drop(active);
        self.signal.release();
        self.push_history(PauseEvent::Resumed, suspension_id, stage_name, resumed_by);
        info!(
            workflow_id = %workflow_id,
            suspension_id = %suspension_id,
            resumed_by = %resumed_by,
            "Workflow resumed"
        );
        Ok(true)
    }

    /// Blocks until the workflow is not suspended.
    ///
    /// Returns immediately when not suspended; returns false if `timeout`
    /// elapses first.
    pub async fn wait_if_paused(&self, timeout: Option<Duration>) -> bool {
        self.signal.wait_until_running(timeout).await
    }

    /// Waits for a resume, checking auto-resume deadlines while blocked.
    ///
    /// Returns false if `timeout` elapses while still suspended.
    pub async fn wait_for_resume(&self, timeout: Option<Duration>) -> EngineResult<bool> {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        let poll = self.config.auto_resume_poll();
        loop {
            self.check_auto_resume()?;
            if !self.is_suspended() {
                return Ok(true);
            }
            let slice = match deadline {
                Some(deadline) => {
                    let now = tokio::time::Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    poll.min(deadline - now)
                }
                None => poll,
            };
            if self.wait_if_paused(Some(slice)).await && !self.is_suspended() {
                return Ok(true);
            }
        }
    }

    /// Resumes the active suspension if its auto-resume time has passed.
    ///
    /// Returns the ids of suspensions resumed.
    pub fn check_auto_resume(&self) -> EngineResult<Vec<Uuid>> {
        let due = self
            .active
            .lock()
            .as_ref()
            .filter(|s| s.auto_resume_due(now_utc()))
            .map(|s| s.suspension_id);
        let Some(suspension_id) = due else {
            return Ok(Vec::new());
        };
        if self.resume_workflow(&self.workflow_id, AUTO_RESUME_ACTOR)? {
            Ok(vec![suspension_id])
        } else {
            warn!(suspension_id = %suspension_id, "Auto-resume found no active suspension");
            Ok(Vec::new())
        }
    }

    /// True while a suspension is active.
    pub fn is_suspended(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Returns the active suspension.
    pub fn active_suspension(&self) -> Option<WorkflowSuspension> {
        self.active.lock().clone()
    }

    /// Returns applied suspensions and resumptions, oldest first.
    pub fn pause_history(&self) -> Vec<PauseHistoryEntry> {
        self.history.lock().clone()
    }

    /// Returns the signal the orchestrator blocks on.
    pub fn signal(&self) -> &PauseSignal {
        &self.signal
    }

    fn suspend_for_request(&self, request: &PauseRequest) -> EngineResult<Uuid> {
        let mut data = BTreeMap::new();
        data.insert(
            "request_id".to_string(),
            Value::String(request.request_id.to_string()),
        );
        data.insert("policy".to_string(), serde_json::to_value(request.policy)?);
        self.suspend_workflow(
            request.reason,
            &request.message,
            Some(&request.requested_by),
            request.auto_resume_after,
            data,
        )
    }

    fn push_history(
        &self,
        event: PauseEvent,
        suspension_id: Uuid,
        stage_name: Option<String>,
        actor: &str,
    ) {
        self.history.lock().push(PauseHistoryEntry {
            event,
            suspension_id,
            stage_name,
            actor: actor.to_string(),
            at: now_utc(),
        });
    }
}

impl std::fmt::Debug for PauseResumeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PauseResumeManager")
            .field("workflow_id", &self.workflow_id)
            .field("pause_points", &self.pause_points.read().len())
            .field("pending", &self.pending.lock().len())
            .field("suspended", &self.is_suspended())
            .finish_non_exhaustive()
    }
}
