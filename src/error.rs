//! Error taxonomy for the analysis engine
//!
//! Two families:
//! - [`MetricError`]: per-metric statistical failures. Caught by the pipeline and
//!   downgraded to a result row with null statistics; never aborts a batch.
//! - [`ConfigError`]: malformed catalog, groups or segmentation. Fatal, raised
//!   during validation before any metric is computed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-metric failure raised by the ratio estimator or the two-sample test
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricError {
    /// Denominator sums to zero (or the estimate is not finite) for an arm
    #[error("metric undefined for arm '{arm}': {reason}")]
    UndefinedMetric { arm: String, reason: String },

    /// Required aggregate column absent for an arm
    #[error("no data for arm '{arm}' in aggregate '{field}'")]
    MissingData { arm: String, field: String },

    /// Too few clusters to estimate a variance
    #[error("arm '{arm}' has {found} cluster(s), at least {required} required")]
    InsufficientClusters {
        arm: String,
        found: usize,
        required: usize,
    },
}

impl MetricError {
    /// Enumerable failure kind for reporting
    pub fn kind(&self) -> FailureKind {
        match self {
            MetricError::UndefinedMetric { .. } => FailureKind::UndefinedMetric,
            MetricError::MissingData { .. } => FailureKind::MissingData,
            MetricError::InsufficientClusters { .. } => FailureKind::InsufficientClusters,
        }
    }
}

/// Failure kinds recorded on faulted result rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UndefinedMetric,
    MissingData,
    InsufficientClusters,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::UndefinedMetric => "undefined_metric",
            FailureKind::MissingData => "missing_data",
            FailureKind::InsufficientClusters => "insufficient_clusters",
        };
        f.write_str(s)
    }
}

/// Fatal configuration error, surfaced before the batch runs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("metric '{metric}' references aggregate '{field}' which is never computed")]
    UnknownField { metric: String, field: String },

    #[error("duplicate {kind} name '{name}'")]
    Duplicate { kind: &'static str, name: String },

    #[error("invalid identifier '{0}' (expected lowercase snake_case)")]
    InvalidIdentifier(String),

    #[error("aggregate '{name}': {reason}")]
    InvalidAggregate { name: String, reason: String },

    #[error("significance level must be in (0, 1), got {0}")]
    InvalidAlpha(f64),

    #[error("invalid groups: {0}")]
    InvalidGroups(String),

    #[error("group label '{0}' not present in input data")]
    UnknownGroup(String),

    #[error("invalid segmentation: {0}")]
    InvalidSegmentation(String),

    #[error("invalid test configuration: {0}")]
    InvalidTest(String),

    #[error("unknown metric '{0}'")]
    UnknownMetric(String),
}
