//! Error recovery: fault classification, backoff and recovery strategies.
//!
//! - [`StageFault`] is what executors return on failure
//! - [`classify`] turns a fault into a category, severity and strategy
//! - [`ErrorRecoveryManager`] applies the strategy to the shared store
//!   and keeps a bounded history

mod backoff;
pub mod classify;
mod context;
mod fault;
mod manager;
mod stats;
mod types;

pub use backoff::{
    should_retry, BackoffPolicy, RetryDecision, EXTERNAL_SERVICE_MULTIPLIER,
    RESOURCE_MIN_BASE_DELAY_MS, TIMEOUT_BASE_DELAY_FACTOR,
};
pub use context::ErrorContext;
pub use fault::StageFault;
pub use manager::ErrorRecoveryManager;
pub use stats::ErrorStatistics;
pub use types::{ErrorCategory, ErrorSeverity, RecoveryOutcome, RecoveryStrategy};
