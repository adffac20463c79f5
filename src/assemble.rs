//! Results assembler: the pipeline over every catalog metric
//!
//! One row per metric, in catalog order, always. Configuration problems are
//! fatal and raised before any metric runs; per-metric failures stay on
//! their row.

use crate::aggregate::ClusterAggregateTable;
use crate::catalog::MetricCatalog;
use crate::config::Groups;
use crate::error::ConfigError;
use crate::hypothesis::{RatioMetricPipeline, TestConfig, TestResult};
use serde::Serialize;
use std::collections::BTreeSet;

/// Results of one comparison, one row per catalog metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultsTable {
    pub alpha: f64,
    pub control: String,
    pub treatment: String,
    pub rows: Vec<TestResult>,
}

impl ResultsTable {
    pub fn row(&self, metric: &str) -> Option<&TestResult> {
        self.rows.iter().find(|r| r.metric_name == metric)
    }

    pub fn significant(&self) -> impl Iterator<Item = &TestResult> {
        self.rows.iter().filter(|r| r.significant())
    }

    pub fn failed(&self) -> impl Iterator<Item = &TestResult> {
        self.rows.iter().filter(|r| !r.succeeded())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Validate labels and, when there is any data, require both to be present
pub(crate) fn check_groups<S: AsRef<str> + Ord>(
    groups: &Groups,
    arms: &BTreeSet<S>,
) -> Result<(), ConfigError> {
    groups.validate()?;
    if arms.is_empty() {
        return Ok(());
    }
    for label in [&groups.control, &groups.treatment] {
        if !arms.iter().any(|arm| arm.as_ref() == label.as_str()) {
            return Err(ConfigError::UnknownGroup(label.clone()));
        }
    }
    Ok(())
}

/// Run every metric of an already-validated catalog
pub(crate) fn assemble_validated(
    catalog: &MetricCatalog,
    table: &ClusterAggregateTable,
    groups: &Groups,
    config: &TestConfig,
) -> ResultsTable {
    let rows: Vec<TestResult> = catalog
        .metrics()
        .iter()
        .map(|definition| RatioMetricPipeline::new(definition, table, groups, config).run())
        .collect();

    let failed = rows.iter().filter(|r| !r.succeeded()).count();
    tracing::debug!(
        "assembled {} metrics ({} failed) for '{}' vs '{}'",
        rows.len(),
        failed,
        groups.treatment,
        groups.control
    );

    ResultsTable {
        alpha: config.significance_level,
        control: groups.control.clone(),
        treatment: groups.treatment.clone(),
        rows,
    }
}

/// Compare treatment against control for every metric in the catalog
///
/// # Errors
/// Fatal `ConfigError` when the catalog, test config or groups are invalid,
/// or a group label does not occur in a non-empty table.
pub fn assemble(
    catalog: &MetricCatalog,
    table: &ClusterAggregateTable,
    groups: &Groups,
    config: &TestConfig,
) -> Result<ResultsTable, ConfigError> {
    catalog.validate()?;
    config.validate()?;
    check_groups(groups, &table.arms())?;
    Ok(assemble_validated(catalog, table, groups, config))
}
