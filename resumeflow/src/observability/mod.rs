//! Logging setup and tracing spans.

use crate::config::{LogFormat, LoggingConfig};
use tracing::Span;
use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber.
///
/// `RUST_LOG` wins over `config.level` when set. Returns false if a
/// subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);
    let installed = match config.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };
    installed.is_ok()
}

/// Span covering one workflow run.
pub fn workflow_span(workflow_id: &str) -> Span {
    tracing::info_span!("workflow", workflow_id = %workflow_id)
}

/// Span covering one stage attempt.
pub fn stage_span(workflow_id: &str, stage: &str, attempt: u32) -> Span {
    tracing::info_span!("stage", workflow_id = %workflow_id, stage = %stage, attempt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_reports_existing_subscriber() {
        let config = LoggingConfig::default();
        let _ = init_logging(&config);
        assert!(!init_logging(&LoggingConfig {
            format: LogFormat::Json,
            ..config
        }));
    }

    #[test]
    fn test_spans_are_constructible() {
        let _workflow = workflow_span("wf").entered();
        let _stage = stage_span("wf", "analysis", 0).entered();
    }
}
