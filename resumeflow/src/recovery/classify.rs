//! Deterministic keyword classification of faults.
//!
//! Categories are tried in a fixed order and the first match wins, so a
//! fault mentioning both a connection and a file is a network fault.

use super::fault::StageFault;
use super::types::{ErrorCategory, ErrorSeverity, RecoveryStrategy};
use regex::Regex;
use std::sync::LazyLock;

static CATEGORY_PATTERNS: LazyLock<Vec<(ErrorCategory, Regex)>> = LazyLock::new(|| {
    [
        (
            ErrorCategory::Network,
            r"connection|network|socket|dns|unreachable|refused|reset by peer|\bhttps?\b|\bssl\b|\btls\b",
        ),
        (ErrorCategory::Timeout, r"timeout|timed ?out|deadline"),
        (
            ErrorCategory::Filesystem,
            r"\bfile|director(y|ies)|\bpath\b|\bdisk\b|no such|\bio\b|enoent",
        ),
        (
            ErrorCategory::Resource,
            r"memory|\boom\b|quota|resource|exhausted|too many|rate limit|capacity",
        ),
        (
            ErrorCategory::Validation,
            r"validat|invalid|malformed|schema|parse|parsing",
        ),
        (
            ErrorCategory::Dependency,
            r"dependenc|import|module|package|not installed",
        ),
        (
            ErrorCategory::Authentication,
            r"auth|credential|token|unauthori[sz]ed|forbidden|permission|api key",
        ),
        (
            ErrorCategory::Configuration,
            r"config|setting|environment variable",
        ),
    ]
    .into_iter()
    .map(|(category, pattern)| {
        let re = Regex::new(&format!("(?i){pattern}")).expect("category pattern is a valid regex");
        (category, re)
    })
    .collect()
});

static CRITICAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)fatal|corrupt|critical|panic").expect("critical pattern is a valid regex")
});
static HIGH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)security|auth|permission|credential|forbidden")
        .expect("high pattern is a valid regex")
});
static LOW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)warning|deprecat").expect("low pattern is a valid regex")
});

/// Assigns a category, honouring pre-classification.
pub fn categorize(fault: &StageFault) -> ErrorCategory {
    if let Some(category) = fault.category {
        return category;
    }
    let haystack = fault.haystack();
    CATEGORY_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(&haystack))
        .map_or(ErrorCategory::StageExecution, |(category, _)| *category)
}

/// Assigns a severity, honouring pre-classification.
pub fn assess_severity(fault: &StageFault) -> ErrorSeverity {
    if let Some(severity) = fault.severity {
        return severity;
    }
    let haystack = fault.haystack();
    if CRITICAL.is_match(&haystack) {
        ErrorSeverity::Critical
    } else if HIGH.is_match(&haystack) {
        ErrorSeverity::High
    } else if LOW.is_match(&haystack) {
        ErrorSeverity::Low
    } else {
        ErrorSeverity::Medium
    }
}

/// Picks the recovery strategy, honouring pre-classification.
pub fn select_strategy(fault: &StageFault, category: ErrorCategory) -> RecoveryStrategy {
    fault
        .strategy
        .unwrap_or_else(|| category.default_strategy())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category_of(error_type: &str, message: &str) -> ErrorCategory {
        categorize(&StageFault::new(error_type, message))
    }

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(CATEGORY_PATTERNS.len(), 8);
        assert!(CRITICAL.is_match("fatal error"));
        assert!(HIGH.is_match("permission denied"));
        assert!(LOW.is_match("deprecated flag"));
    }

    #[test]
    fn test_categories() {
        assert_eq!(category_of("ClientError", "Connection refused"), ErrorCategory::Network);
        assert_eq!(category_of("Error", "request timed out"), ErrorCategory::Timeout);
        assert_eq!(category_of("Error", "No such file: requirements.md"), ErrorCategory::Filesystem);
        assert_eq!(category_of("MemoryError", "allocation failed"), ErrorCategory::Resource);
        assert_eq!(category_of("ValueError", "invalid stage output"), ErrorCategory::Validation);
        assert_eq!(category_of("ImportError", "cannot load"), ErrorCategory::Dependency);
        assert_eq!(category_of("Error", "Unauthorized"), ErrorCategory::Authentication);
        assert_eq!(category_of("Error", "config key missing"), ErrorCategory::Configuration);
        assert_eq!(category_of("Error", "agent gave up"), ErrorCategory::StageExecution);
    }

    #[test]
    fn test_order_decides_ties() {
        // Mentions a network failure and a file; network is checked first.
        assert_eq!(
            category_of("Error", "connection lost while uploading file"),
            ErrorCategory::Network
        );
    }

    #[test]
    fn test_io_kinds() {
        let timeout = StageFault::from(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"));
        assert_eq!(categorize(&timeout), ErrorCategory::Timeout);

        let missing = StageFault::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(categorize(&missing), ErrorCategory::Filesystem);
    }

    #[test]
    fn test_external_service_only_by_pre_classification() {
        assert_ne!(
            category_of("ExternalServiceError", "vendor down"),
            ErrorCategory::ExternalService
        );
        let fault = StageFault::external_service("vendor down");
        assert_eq!(categorize(&fault), ErrorCategory::ExternalService);
    }

    #[test]
    fn test_severity() {
        let sev = |msg: &str| assess_severity(&StageFault::new("Error", msg));
        assert_eq!(sev("fatal: index corrupt"), ErrorSeverity::Critical);
        assert_eq!(sev("permission denied"), ErrorSeverity::High);
        assert_eq!(sev("deprecated flag used"), ErrorSeverity::Low);
        assert_eq!(sev("something odd"), ErrorSeverity::Medium);
    }

    #[test]
    fn test_strategy_respects_pre_classification() {
        let plain = StageFault::new("Error", "config missing");
        assert_eq!(
            select_strategy(&plain, categorize(&plain)),
            RecoveryStrategy::Abort
        );
        let forced = plain.with_strategy(RecoveryStrategy::Skip);
        assert_eq!(
            select_strategy(&forced, categorize(&forced)),
            RecoveryStrategy::Skip
        );
    }
}
