use crate::events::EventRow;
use serde::{Deserialize, Serialize};

/// How an aggregate reduces the rows of one group
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    /// Number of distinct non-null values of `column` (e.g. order identifiers)
    CountDistinct,
    /// Number of rows where flag `column` is true
    CountTrue,
    /// Sum of numeric `column`, missing values skipped
    Sum,
    /// Number of rows passing the filter
    CountRows,
}

impl Reduction {
    pub fn needs_column(self) -> bool {
        !matches!(self, Reduction::CountRows)
    }
}

/// Row predicate applied before grouping
///
/// # Example TOML
/// ```toml
/// filter = { gt = { column = "surge", value = 1.0 } }
/// filter = { all = [{ le = { column = "surge", value = 1.0 } }, { flag = "is_order_done" }] }
/// filter = { within_pct = { column = "price_start_usd", reference = "minprice_usd", pct = 1.0 } }
/// ```
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Gt { column: String, value: f64 },
    Ge { column: String, value: f64 },
    Lt { column: String, value: f64 },
    Le { column: String, value: f64 },
    /// Boolean column is true
    Flag(String),
    /// `column` lies within `pct` percent of `reference` (inclusive)
    WithinPct {
        column: String,
        reference: String,
        pct: f64,
    },
    All(Vec<Predicate>),
}

impl Predicate {
    /// Missing numeric values never match, like comparisons against NaN
    pub fn matches(&self, row: &EventRow) -> bool {
        match self {
            Predicate::Gt { column, value } => row.number(column).is_some_and(|x| x > *value),
            Predicate::Ge { column, value } => row.number(column).is_some_and(|x| x >= *value),
            Predicate::Lt { column, value } => row.number(column).is_some_and(|x| x < *value),
            Predicate::Le { column, value } => row.number(column).is_some_and(|x| x <= *value),
            Predicate::Flag(column) => row.flag(column),
            Predicate::WithinPct {
                column,
                reference,
                pct,
            } => match (row.number(column), row.number(reference)) {
                (Some(x), Some(r)) => {
                    let band = pct / 100.0;
                    x >= r * (1.0 - band) && x <= r * (1.0 + band)
                }
                _ => false,
            },
            Predicate::All(parts) => parts.iter().all(|p| p.matches(row)),
        }
    }
}

/// A named aggregate column produced by the metric aggregator
///
/// # Example TOML
/// ```toml
/// [[aggregate]]
/// name = "surge_gr_1_orders_count"
/// source = "full"
/// reduction = "count_distinct"
/// column = "order_uuid"
/// filter = { gt = { column = "surge", value = 1.0 } }
/// ```
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AggregateSpec {
    /// Output column name (e.g. "orders_count")
    pub name: String,

    /// Source table the rows come from (e.g. "orders")
    pub source: String,

    pub reduction: Reduction,

    /// Input column; unused for `count_rows`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Predicate>,
}

impl AggregateSpec {
    pub fn accepts(&self, row: &EventRow) -> bool {
        self.filter.as_ref().map_or(true, |f| f.matches(row))
    }
}

/// Ratio metric: pooled `sum(numerator) / sum(denominator)` per arm
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct MetricDefinition {
    pub name: String,
    pub numerator: String,
    pub denominator: String,
}

impl MetricDefinition {
    pub fn new(
        name: impl Into<String>,
        numerator: impl Into<String>,
        denominator: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            numerator: numerator.into(),
            denominator: denominator.into(),
        }
    }
}
