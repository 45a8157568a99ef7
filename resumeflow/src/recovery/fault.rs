//! Faults raised by stage executors.

use super::types::{ErrorCategory, ErrorSeverity, RecoveryStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// A failure reported by a stage executor.
///
/// Faults are values handed to the recovery manager. Setting any of the
/// classification fields bypasses keyword inference for that field.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{error_type}: {message}")]
pub struct StageFault {
    /// Type name of the underlying error.
    pub error_type: String,
    /// Human-readable message.
    pub message: String,
    /// Structured details.
    #[serde(default)]
    pub details: BTreeMap<String, Value>,
    /// Pre-assigned category.
    #[serde(default)]
    pub category: Option<ErrorCategory>,
    /// Pre-assigned severity.
    #[serde(default)]
    pub severity: Option<ErrorSeverity>,
    /// Pre-assigned recovery strategy.
    #[serde(default)]
    pub strategy: Option<RecoveryStrategy>,
}

impl StageFault {
    /// Creates an unclassified fault.
    #[must_use]
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            details: BTreeMap::new(),
            category: None,
            severity: None,
            strategy: None,
        }
    }

    /// Creates a fault pre-classified as an external service failure.
    #[must_use]
    pub fn external_service(message: impl Into<String>) -> Self {
        Self::new("ExternalServiceError", message).with_category(ErrorCategory::ExternalService)
    }

    /// Adds a detail entry.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    /// Pre-assigns the category.
    #[must_use]
    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Pre-assigns the severity.
    #[must_use]
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Pre-assigns the recovery strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: RecoveryStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Text inspected by keyword classification.
    pub(crate) fn haystack(&self) -> String {
        format!("{} {}", self.error_type, self.message)
    }
}

impl From<std::io::Error> for StageFault {
    fn from(err: std::io::Error) -> Self {
        Self::new(format!("io::{:?}", err.kind()), err.to_string())
            .with_detail("io_kind", Value::String(format!("{:?}", err.kind())))
    }
}

impl From<anyhow::Error> for StageFault {
    fn from(err: anyhow::Error) -> Self {
        let chain: Vec<Value> = err.chain().skip(1).map(|c| Value::String(c.to_string())).collect();
        let mut fault = Self::new("anyhow::Error", format!("{err:#}"));
        if !chain.is_empty() {
            fault = fault.with_detail("causes", Value::Array(chain));
        }
        fault
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_display() {
        let fault = StageFault::new("HttpError", "502 from upstream");
        assert_eq!(fault.to_string(), "HttpError: 502 from upstream");
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "read took too long");
        let fault = StageFault::from(io);
        assert_eq!(fault.error_type, "io::TimedOut");
        assert_eq!(fault.details["io_kind"], "TimedOut");
        assert!(fault.category.is_none());
    }

    #[test]
    fn test_from_anyhow_keeps_chain() {
        let err = Err::<(), _>(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))
            .context("loading template")
            .unwrap_err();
        let fault = StageFault::from(err);
        assert!(fault.message.contains("loading template"));
        assert!(fault.message.contains("gone"));
        assert_eq!(fault.details["causes"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_pre_classification() {
        let fault = StageFault::external_service("vendor API down")
            .with_severity(ErrorSeverity::High)
            .with_strategy(RecoveryStrategy::Skip);
        assert_eq!(fault.category, Some(ErrorCategory::ExternalService));
        assert_eq!(fault.severity, Some(ErrorSeverity::High));
        assert_eq!(fault.strategy, Some(RecoveryStrategy::Skip));
    }
}
