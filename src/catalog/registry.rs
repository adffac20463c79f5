use crate::catalog::{AggregateSpec, MetricDefinition};
use crate::error::ConfigError;
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("static identifier regex"));

/// Ordered catalog of aggregate columns and the ratio metrics built from them
///
/// Metrics are evaluated in catalog order, which is also the order of the
/// results table.
///
/// # Example Usage
/// ```
/// use switchback::catalog::MetricCatalog;
///
/// let catalog = MetricCatalog::default_catalog()?;
/// catalog.validate()?;
/// assert_eq!(catalog.metrics()[0].name, "cp2order");
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MetricCatalog {
    aggregates: Vec<AggregateSpec>,
    metrics: Vec<MetricDefinition>,
}

#[derive(serde::Deserialize)]
struct CatalogFile {
    #[serde(default)]
    aggregate: Vec<AggregateSpec>,
    #[serde(default)]
    metric: Vec<MetricDefinition>,
}

impl MetricCatalog {
    pub fn new(aggregates: Vec<AggregateSpec>, metrics: Vec<MetricDefinition>) -> Self {
        Self {
            aggregates,
            metrics,
        }
    }

    /// Load a catalog from a TOML file with `[[aggregate]]` and `[[metric]]` tables
    ///
    /// # Errors
    /// Returns error if the file is unreadable or has invalid TOML. Semantic
    /// checks are left to [`MetricCatalog::validate`].
    ///
    /// # Example TOML
    /// ```toml
    /// [[aggregate]]
    /// name = "orders_count"
    /// source = "orders"
    /// reduction = "count_distinct"
    /// column = "order_uuid"
    ///
    /// [[metric]]
    /// name = "cp2order"
    /// numerator = "orders_count"
    /// denominator = "calcprices_count"
    /// ```
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read metric catalog: {}", path.as_ref().display())
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile =
            toml::from_str(content).context("Failed to parse TOML metric catalog")?;
        Ok(Self::new(file.aggregate, file.metric))
    }

    /// Embedded marketplace catalog (conversion funnel, prices, surge, balance
    /// and segment-conditioned variants)
    pub fn default_catalog() -> Result<Self> {
        const DEFAULT_TOML: &str = include_str!("../../metrics-default.toml");
        Self::from_toml_str(DEFAULT_TOML).context("Failed to parse embedded metrics-default.toml")
    }

    pub fn aggregates(&self) -> &[AggregateSpec] {
        &self.aggregates
    }

    pub fn metrics(&self) -> &[MetricDefinition] {
        &self.metrics
    }

    pub fn metric(&self, name: &str) -> Option<&MetricDefinition> {
        self.metrics.iter().find(|m| m.name == name)
    }

    /// Names of every column the aggregator will produce
    pub fn aggregate_names(&self) -> impl Iterator<Item = &str> {
        self.aggregates.iter().map(|a| a.name.as_str())
    }

    /// Restrict the catalog to the named metrics, keeping catalog order
    pub fn select(&self, names: &[String]) -> std::result::Result<Self, ConfigError> {
        for name in names {
            if self.metric(name).is_none() {
                return Err(ConfigError::UnknownMetric(name.clone()));
            }
        }
        let metrics = self
            .metrics
            .iter()
            .filter(|m| names.contains(&m.name))
            .cloned()
            .collect();
        Ok(Self::new(self.aggregates.clone(), metrics))
    }

    /// Validate the catalog once, before any computation
    ///
    /// Checks identifiers, uniqueness, aggregate column requirements and that
    /// every metric's numerator/denominator is an aggregate that will be computed.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let ident = &*IDENTIFIER;

        let mut aggregate_names = HashSet::new();
        for spec in &self.aggregates {
            if !ident.is_match(&spec.name) {
                return Err(ConfigError::InvalidIdentifier(spec.name.clone()));
            }
            if !aggregate_names.insert(spec.name.as_str()) {
                return Err(ConfigError::Duplicate {
                    kind: "aggregate",
                    name: spec.name.clone(),
                });
            }
            if spec.source.is_empty() {
                return Err(ConfigError::InvalidAggregate {
                    name: spec.name.clone(),
                    reason: "empty source table".to_string(),
                });
            }
            if spec.reduction.needs_column() && spec.column.is_none() {
                return Err(ConfigError::InvalidAggregate {
                    name: spec.name.clone(),
                    reason: format!("reduction {:?} requires a column", spec.reduction),
                });
            }
        }

        let mut metric_names = HashSet::new();
        for metric in &self.metrics {
            if !ident.is_match(&metric.name) {
                return Err(ConfigError::InvalidIdentifier(metric.name.clone()));
            }
            if !metric_names.insert(metric.name.as_str()) {
                return Err(ConfigError::Duplicate {
                    kind: "metric",
                    name: metric.name.clone(),
                });
            }
            for field in [&metric.numerator, &metric.denominator] {
                if !aggregate_names.contains(field.as_str()) {
                    return Err(ConfigError::UnknownField {
                        metric: metric.name.clone(),
                        field: field.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}
