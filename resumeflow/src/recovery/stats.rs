//! Statistics folded from the error history.

use super::context::ErrorContext;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate view of recorded faults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorStatistics {
    /// Number of faults in the history.
    pub total_errors: usize,
    /// Faults per category.
    pub by_category: BTreeMap<String, usize>,
    /// Faults per severity.
    pub by_severity: BTreeMap<String, usize>,
    /// Faults per stage.
    pub by_stage: BTreeMap<String, usize>,
    /// Faults handled without intervention.
    pub resolved: usize,
}

impl ErrorStatistics {
    /// Folds a history into statistics.
    pub fn from_history<'a, I>(history: I) -> Self
    where
        I: IntoIterator<Item = &'a ErrorContext>,
    {
        history.into_iter().fold(Self::default(), |mut stats, ctx| {
            stats.total_errors += 1;
            *stats
                .by_category
                .entry(ctx.category.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_severity
                .entry(ctx.severity.as_str().to_string())
                .or_default() += 1;
            *stats.by_stage.entry(ctx.stage_name.clone()).or_default() += 1;
            if ctx.resolved {
                stats.resolved += 1;
            }
            stats
        })
    }

    /// Fraction of faults resolved, 0.0 for an empty history.
    #[allow(clippy::cast_precision_loss)]
    pub fn resolution_rate(&self) -> f64 {
        if self.total_errors == 0 {
            0.0
        } else {
            self.resolved as f64 / self.total_errors as f64
        }
    }
}
