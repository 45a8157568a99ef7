//! Engine configuration.
//!
//! Every field has a serde default so partial JSON files are accepted, and
//! a few values can be overridden from the environment.

use crate::errors::{EngineError, EngineResult};
use crate::recovery::RecoveryStrategy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding [`EngineConfig::state_dir`].
pub const ENV_STATE_DIR: &str = "RESUMEFLOW_STATE_DIR";
/// Environment variable overriding [`RecoveryConfig::max_retries`].
pub const ENV_MAX_RETRIES: &str = "RESUMEFLOW_MAX_RETRIES";
/// Environment variable overriding [`LoggingConfig::level`].
pub const ENV_LOG: &str = "RESUMEFLOW_LOG";

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding state files, snapshots, suspensions and error logs.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Error recovery settings.
    #[serde(default)]
    pub recovery: RecoveryConfig,
    /// Rollback snapshot settings.
    #[serde(default)]
    pub rollback: RollbackConfig,
    /// Pause/resume settings.
    #[serde(default)]
    pub pause: PauseConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".resumeflow")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            recovery: RecoveryConfig::default(),
            rollback: RollbackConfig::default(),
            pause: PauseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the state directory.
    #[must_use]
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    /// Sets the recovery configuration.
    #[must_use]
    pub fn with_recovery(mut self, recovery: RecoveryConfig) -> Self {
        self.recovery = recovery;
        self
    }

    /// Sets the rollback configuration.
    #[must_use]
    pub fn with_rollback(mut self, rollback: RollbackConfig) -> Self {
        self.rollback = rollback;
        self
    }

    /// Sets the pause configuration.
    #[must_use]
    pub fn with_pause(mut self, pause: PauseConfig) -> Self {
        self.pause = pause;
        self
    }

    /// Path of the state file for a workflow.
    #[must_use]
    pub fn state_file(&self, workflow_id: &str) -> PathBuf {
        self.state_dir.join(format!("{workflow_id}.json"))
    }

    /// Directory holding rollback snapshots.
    #[must_use]
    pub fn rollback_dir(&self) -> PathBuf {
        self.state_dir.join("rollbacks")
    }

    /// Directory holding suspension records.
    #[must_use]
    pub fn suspension_dir(&self) -> PathBuf {
        self.state_dir.join("suspensions")
    }

    /// Directory holding persisted error logs.
    #[must_use]
    pub fn error_log_dir(&self) -> PathBuf {
        self.state_dir.join("errors")
    }

    /// Loads a configuration from a JSON file.
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from the process environment.
    pub fn with_env_overrides(self) -> EngineResult<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> EngineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_STATE_DIR).filter(|v| !v.is_empty()) {
            self.state_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(ENV_MAX_RETRIES) {
            self.recovery.max_retries = raw.trim().parse().map_err(|_| {
                EngineError::Config(format!("{ENV_MAX_RETRIES} must be an integer, got '{raw}'"))
            })?;
        }
        if let Some(level) = lookup(ENV_LOG).filter(|v| !v.is_empty()) {
            self.logging.level = level;
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> EngineResult<()> {
        if self.recovery.backoff_multiplier < 1.0 {
            return Err(EngineError::Config(format!(
                "recovery.backoff_multiplier must be >= 1.0, got {}",
                self.recovery.backoff_multiplier
            )));
        }
        if self.recovery.max_error_history == 0 {
            return Err(EngineError::Config(
                "recovery.max_error_history must be positive".to_string(),
            ));
        }
        if self.rollback.keep_count == 0 {
            return Err(EngineError::Config(
                "rollback.keep_count must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Error recovery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Retries allowed per fault sequence before escalation.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay between retries in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Factor applied to the delay for each further retry.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Upper bound on a single retry delay in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Strategy applied once retries are exhausted.
    #[serde(default = "default_escalation_strategy")]
    pub escalation_strategy: RecoveryStrategy,
    /// Number of error contexts kept in memory and in the error log.
    #[serde(default = "default_max_error_history")]
    pub max_error_history: usize,
    /// Whether the error history is written to disk.
    #[serde(default = "default_persist_error_log")]
    pub persist_error_log: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    300_000
}

fn default_escalation_strategy() -> RecoveryStrategy {
    RecoveryStrategy::Manual
}

fn default_max_error_history() -> usize {
    1000
}

fn default_persist_error_log() -> bool {
    true
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            escalation_strategy: default_escalation_strategy(),
            max_error_history: default_max_error_history(),
            persist_error_log: default_persist_error_log(),
        }
    }
}

impl RecoveryConfig {
    /// Creates a recovery config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum retries.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the escalation strategy.
    #[must_use]
    pub fn with_escalation(mut self, strategy: RecoveryStrategy) -> Self {
        self.escalation_strategy = strategy;
        self
    }

    /// Enables or disables the on-disk error log.
    #[must_use]
    pub fn with_persisted_log(mut self, persist: bool) -> Self {
        self.persist_error_log = persist;
        self
    }

    /// Base delay as a Duration.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Maximum delay as a Duration.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Rollback snapshot settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackConfig {
    /// Snapshots kept per workflow by retention cleanup.
    #[serde(default = "default_keep_count")]
    pub keep_count: usize,
    /// Rollback point references kept in the workflow state.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Whether the orchestrator snapshots after each completed stage.
    #[serde(default = "default_snapshot_on_complete")]
    pub snapshot_on_complete: bool,
}

fn default_keep_count() -> usize {
    10
}

fn default_max_history() -> usize {
    20
}

fn default_snapshot_on_complete() -> bool {
    true
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            keep_count: default_keep_count(),
            max_history: default_max_history(),
            snapshot_on_complete: default_snapshot_on_complete(),
        }
    }
}

impl RollbackConfig {
    /// Sets the retention count.
    #[must_use]
    pub fn with_keep_count(mut self, keep: usize) -> Self {
        self.keep_count = keep;
        self
    }

    /// Sets the in-state history bound.
    #[must_use]
    pub fn with_max_history(mut self, max: usize) -> Self {
        self.max_history = max;
        self
    }
}

/// Pause/resume settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseConfig {
    /// How long the orchestrator blocks on a suspension before giving up.
    ///
    /// `None` makes `run` return immediately with a suspended outcome.
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
    /// How often auto-resume deadlines are checked while blocked.
    #[serde(default = "default_auto_resume_poll_ms")]
    pub auto_resume_poll_ms: u64,
}

fn default_auto_resume_poll_ms() -> u64 {
    1000
}

impl Default for PauseConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: None,
            auto_resume_poll_ms: default_auto_resume_poll_ms(),
        }
    }
}

impl PauseConfig {
    /// Sets the wait timeout.
    #[must_use]
    pub fn with_wait_timeout_ms(mut self, timeout: u64) -> Self {
        self.wait_timeout_ms = Some(timeout);
        self
    }

    /// Sets the auto-resume poll interval.
    #[must_use]
    pub fn with_auto_resume_poll_ms(mut self, poll: u64) -> Self {
        self.auto_resume_poll_ms = poll;
        self
    }

    /// Wait timeout as a Duration.
    #[must_use]
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }

    /// Poll interval as a Duration.
    #[must_use]
    pub fn auto_resume_poll(&self) -> Duration {
        Duration::from_millis(self.auto_resume_poll_ms.max(1))
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
