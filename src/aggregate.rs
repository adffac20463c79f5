//! Metric aggregator: raw event rows to one wide row per group
//!
//! Every aggregate spec is reduced per group key, then the aggregates are
//! left-joined onto the groups of the first (base) spec. A group missing from a
//! joined aggregate keeps `None` in that column: "no data" is preserved here and
//! resolved by the ratio estimator's missing-value policy.

use crate::catalog::{AggregateSpec, Reduction};
use crate::events::{ClusterId, EventRow, EventTables};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Numeric bucket coordinate (e.g. a surge or distance bin) with a total order
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BinValue(pub f64);

impl PartialEq for BinValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BinValue {}

impl PartialOrd for BinValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BinValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Grouping dimensions: the arm label always, the cluster optionally, plus
/// zero or more numeric bucket columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBy {
    pub by_cluster: bool,
    pub buckets: Vec<String>,
}

impl GroupBy {
    /// (arm, cluster): the grouping every hypothesis test consumes
    pub fn clusters() -> Self {
        Self {
            by_cluster: true,
            buckets: Vec::new(),
        }
    }

    /// Arm only, plus the given bucket columns
    pub fn arm_and_buckets(buckets: Vec<String>) -> Self {
        Self {
            by_cluster: false,
            buckets,
        }
    }

    pub fn with_bucket(mut self, column: impl Into<String>) -> Self {
        self.buckets.push(column.into());
        self
    }

    /// Key of a row, or `None` if a bucket column is not numeric
    fn key_of(&self, row: &EventRow) -> Option<GroupKey> {
        let buckets = self
            .buckets
            .iter()
            .map(|column| row.number(column).map(BinValue))
            .collect::<Option<Vec<_>>>()?;
        Some(GroupKey {
            arm: row.arm.clone(),
            cluster: self.by_cluster.then(|| row.cluster.clone()),
            buckets,
        })
    }
}

impl Default for GroupBy {
    fn default() -> Self {
        Self::clusters()
    }
}

/// Identity of one aggregated group
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GroupKey {
    pub arm: String,
    pub cluster: Option<ClusterId>,
    pub buckets: Vec<BinValue>,
}

impl std::hash::Hash for BinValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// One row of the wide table: a group and its aggregate values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterAggregate {
    pub key: GroupKey,
    pub values: BTreeMap<String, Option<f64>>,
}

impl ClusterAggregate {
    /// Value of an aggregate column; `None` for no data or unknown column
    pub fn value(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied().flatten()
    }
}

/// Wide aggregate table, rows ordered by group key
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterAggregateTable {
    columns: Vec<String>,
    rows: Vec<ClusterAggregate>,
}

impl ClusterAggregateTable {
    pub fn new(columns: Vec<String>, rows: Vec<ClusterAggregate>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn rows(&self) -> &[ClusterAggregate] {
        &self.rows
    }

    pub fn rows_for_arm<'a>(&'a self, arm: &'a str) -> impl Iterator<Item = &'a ClusterAggregate> {
        self.rows.iter().filter(move |r| r.key.arm == arm)
    }

    pub fn arms(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|r| r.key.arm.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

enum Accumulator {
    Distinct(HashSet<String>),
    Count(u64),
    Sum(f64),
}

impl Accumulator {
    fn new(reduction: Reduction) -> Self {
        match reduction {
            Reduction::CountDistinct => Accumulator::Distinct(HashSet::new()),
            Reduction::CountTrue | Reduction::CountRows => Accumulator::Count(0),
            Reduction::Sum => Accumulator::Sum(0.0),
        }
    }

    fn push(&mut self, spec: &AggregateSpec, row: &EventRow) {
        let column = spec.column.as_deref().unwrap_or_default();
        match (self, spec.reduction) {
            (Accumulator::Distinct(seen), _) => {
                if let Some(key) = row.distinct_key(column) {
                    seen.insert(key);
                }
            }
            (Accumulator::Count(n), Reduction::CountTrue) => {
                if row.flag(column) {
                    *n += 1;
                }
            }
            (Accumulator::Count(n), _) => *n += 1,
            (Accumulator::Sum(total), _) => {
                if let Some(x) = row.number(column) {
                    *total += x;
                }
            }
        }
    }

    fn finish(self) -> f64 {
        match self {
            Accumulator::Distinct(seen) => seen.len() as f64,
            Accumulator::Count(n) => n as f64,
            Accumulator::Sum(total) => total,
        }
    }
}

/// Reduce one aggregate spec. Only groups with at least one accepted row appear.
pub fn reduce(tables: &EventTables, spec: &AggregateSpec, group_by: &GroupBy) -> BTreeMap<GroupKey, f64> {
    let mut groups: BTreeMap<GroupKey, Accumulator> = BTreeMap::new();
    for row in tables.rows(&spec.source) {
        if !spec.accepts(row) {
            continue;
        }
        let Some(key) = group_by.key_of(row) else {
            continue;
        };
        groups
            .entry(key)
            .or_insert_with(|| Accumulator::new(spec.reduction))
            .push(spec, row);
    }
    groups.into_iter().map(|(k, acc)| (k, acc.finish())).collect()
}

/// Compute every aggregate and left-join them onto the base (first) aggregate
///
/// # Example
/// ```
/// use switchback::aggregate::{aggregate, GroupBy};
/// use switchback::catalog::MetricCatalog;
/// use switchback::events::{ClusterId, EventRow, EventTables};
///
/// let mut tables = EventTables::new();
/// tables.insert("calcprices", vec![
///     EventRow::new("Control", ClusterId::new("10:00", "10:30")).with_text("calcprice_uuid", "c1"),
/// ]);
/// let catalog = MetricCatalog::default_catalog().unwrap();
/// let table = aggregate(&tables, catalog.aggregates(), &GroupBy::clusters());
/// assert_eq!(table.len(), 1);
/// assert_eq!(table.rows()[0].value("calcprices_count"), Some(1.0));
/// assert_eq!(table.rows()[0].value("orders_count"), None);
/// ```
pub fn aggregate(
    tables: &EventTables,
    specs: &[AggregateSpec],
    group_by: &GroupBy,
) -> ClusterAggregateTable {
    let Some(base) = specs.first() else {
        return ClusterAggregateTable::default();
    };

    let reduced: Vec<BTreeMap<GroupKey, f64>> =
        specs.iter().map(|spec| reduce(tables, spec, group_by)).collect();

    let rows: Vec<ClusterAggregate> = reduced[0]
        .keys()
        .map(|key| {
            let values = specs
                .iter()
                .zip(&reduced)
                .map(|(spec, column)| (spec.name.clone(), column.get(key).copied()))
                .collect();
            ClusterAggregate {
                key: key.clone(),
                values,
            }
        })
        .collect();

    tracing::debug!(
        "aggregated {} rows into {} groups ({} aggregates, base '{}')",
        tables.total_rows(),
        rows.len(),
        specs.len(),
        base.name
    );

    ClusterAggregateTable::new(specs.iter().map(|s| s.name.clone()).collect(), rows)
}
