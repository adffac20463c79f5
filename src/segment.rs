//! Segmentation sweep over (primary bin, secondary bin) cells
//!
//! Rows are enriched with the bin fields they lack, filtered by the lower
//! bound, binned on both axes, then every cell of the grid is aggregated and
//! assembled on its own. Cells are evaluated outer axis first and reported
//! sorted by coordinates, whether or not the sweep ran in parallel.

use crate::aggregate::{aggregate, BinValue, GroupBy};
use crate::assemble::{assemble_validated, check_groups, ResultsTable};
use crate::catalog::MetricCatalog;
use crate::config::Groups;
use crate::error::ConfigError;
use crate::events::{EventRow, EventTables, FieldPropagation, FieldValue, BEFORE_LABEL};
use crate::hypothesis::TestConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One binning axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinAxis {
    /// Axis name; the bin column is `<name>_bin`
    pub name: String,

    /// Raw numeric field the bin is computed from
    pub field: String,

    /// Bin width
    pub step: f64,

    /// Bins reported by the sweep, ascending. Values above the largest edge
    /// fall into it.
    pub edges: Vec<f64>,
}

impl BinAxis {
    pub fn new(name: impl Into<String>, field: impl Into<String>, step: f64, edges: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            step,
            edges,
        }
    }

    /// Default primary axis: dynamic surge in 0.5 steps, 2.0 and above pooled
    pub fn surge() -> Self {
        Self::new("surge", "original_dynamic_surge_updated", 0.5, vec![1.0, 1.5, 2.0])
    }

    /// Default secondary axis: order distance in whole kilometres, 25+ pooled
    pub fn distance() -> Self {
        Self::new(
            "orders_distance",
            "distance_in_km",
            1.0,
            (0..=25).map(f64::from).collect(),
        )
    }

    pub fn bin_field(&self) -> String {
        format!("{}_bin", self.name)
    }

    fn max_edge(&self) -> f64 {
        self.edges.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// `min(floor(x / step) * step, max(edges))`
    pub fn bin_of(&self, x: f64) -> f64 {
        ((x / self.step).floor() * self.step).min(self.max_edge())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidSegmentation(format!("axis '{}': {reason}", self.name));
        if self.name.is_empty() || self.field.is_empty() {
            return Err(invalid("empty name or field".to_string()));
        }
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(invalid(format!("step must be positive, got {}", self.step)));
        }
        if self.edges.is_empty() {
            return Err(invalid("no bin edges".to_string()));
        }
        if self.edges.iter().any(|e| !e.is_finite()) {
            return Err(invalid("non-finite bin edge".to_string()));
        }
        if self.edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(invalid("bin edges must be strictly ascending".to_string()));
        }
        Ok(())
    }
}

/// Rows kept by the sweep have `field > value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowerBound {
    pub field: String,
    pub value: f64,
}

/// Sweep configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Optional pre-filter; `None` keeps every row that has both bin fields
    pub lower_bound: Option<LowerBound>,

    /// Outer axis (rows of the heatmap)
    pub primary: BinAxis,

    /// Inner axis (columns of the heatmap)
    pub secondary: BinAxis,

    /// Copy bin fields between tables before binning
    pub propagate: Vec<FieldPropagation>,

    /// Evaluate cells on scoped worker threads
    pub parallel: bool,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            lower_bound: Some(LowerBound {
                field: "original_dynamic_surge_updated".to_string(),
                value: 1.0,
            }),
            primary: BinAxis::surge(),
            secondary: BinAxis::distance(),
            propagate: vec![
                FieldPropagation {
                    from: "orders".to_string(),
                    to: "calcprices".to_string(),
                    key: "calcprice_uuid".to_string(),
                    field: "distance_in_km".to_string(),
                },
                FieldPropagation {
                    from: "calcprices".to_string(),
                    to: "orders".to_string(),
                    key: "calcprice_uuid".to_string(),
                    field: "original_dynamic_surge_updated".to_string(),
                },
            ],
            parallel: false,
        }
    }
}

impl SegmentationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.primary.validate()?;
        self.secondary.validate()?;
        if self.primary.bin_field() == self.secondary.bin_field() {
            return Err(ConfigError::InvalidSegmentation(format!(
                "both axes are named '{}'",
                self.primary.name
            )));
        }
        if let Some(bound) = &self.lower_bound {
            if !bound.value.is_finite() {
                return Err(ConfigError::InvalidSegmentation(
                    "lower bound must be finite".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Number of cells in the sweep grid
    pub fn cell_count(&self) -> usize {
        self.primary.edges.len() * self.secondary.edges.len()
    }

    fn bin_row(&self, row: &EventRow) -> Option<EventRow> {
        if let Some(bound) = &self.lower_bound {
            if !row.number(&bound.field).is_some_and(|x| x > bound.value) {
                return None;
            }
        }
        let primary = self.primary.bin_of(row.number(&self.primary.field)?);
        let secondary = self.secondary.bin_of(row.number(&self.secondary.field)?);
        let mut row = row.clone();
        row.fields
            .insert(self.primary.bin_field(), FieldValue::Number(primary));
        row.fields
            .insert(self.secondary.bin_field(), FieldValue::Number(secondary));
        Some(row)
    }
}

/// Propagate, filter and bin every table. Rows lacking either bin field or
/// failing the lower bound are dropped.
pub fn binned_tables(tables: &EventTables, segmentation: &SegmentationConfig) -> EventTables {
    let binned = tables
        .propagated(&segmentation.propagate)
        .filter_map(|row| segmentation.bin_row(row));
    tracing::debug!(
        "binned {} of {} rows on '{}' x '{}'",
        binned.total_rows(),
        tables.total_rows(),
        segmentation.primary.bin_field(),
        segmentation.secondary.bin_field()
    );
    binned
}

/// Results of one grid cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentCell {
    pub primary_bin: f64,
    pub secondary_bin: f64,
    pub results: ResultsTable,
}

/// Results of a sweep, sorted by (primary_bin, secondary_bin)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentedResults {
    pub primary_axis: String,
    pub secondary_axis: String,
    pub cells: Vec<SegmentCell>,
}

/// Statistic shown in a heatmap
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatmapStat {
    UpliftAbs,
    UpliftRel,
    Pvalue,
    ControlValue,
    ExperimentalValue,
}

impl HeatmapStat {
    pub fn as_str(self) -> &'static str {
        match self {
            HeatmapStat::UpliftAbs => "uplift_abs",
            HeatmapStat::UpliftRel => "uplift_rel",
            HeatmapStat::Pvalue => "pvalue",
            HeatmapStat::ControlValue => "control_value",
            HeatmapStat::ExperimentalValue => "experimental_value",
        }
    }
}

/// Pivot of one metric statistic: rows are primary bins, columns secondary bins
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heatmap {
    pub metric: String,
    pub stat: HeatmapStat,
    pub row_bins: Vec<f64>,
    pub column_bins: Vec<f64>,
    pub values: Vec<Vec<Option<f64>>>,
    pub significant: Vec<Vec<bool>>,
}

impl SegmentedResults {
    pub fn cell(&self, primary_bin: f64, secondary_bin: f64) -> Option<&SegmentCell> {
        self.cells
            .iter()
            .find(|c| c.primary_bin == primary_bin && c.secondary_bin == secondary_bin)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Pivot one metric; `None` when the metric is not in the results
    pub fn heatmap(&self, metric: &str, stat: HeatmapStat) -> Option<Heatmap> {
        let mut row_bins: Vec<f64> = Vec::new();
        let mut column_bins: Vec<f64> = Vec::new();
        for cell in &self.cells {
            if !row_bins.contains(&cell.primary_bin) {
                row_bins.push(cell.primary_bin);
            }
            if !column_bins.contains(&cell.secondary_bin) {
                column_bins.push(cell.secondary_bin);
            }
        }
        row_bins.sort_by(f64::total_cmp);
        column_bins.sort_by(f64::total_cmp);

        let mut values = vec![vec![None; column_bins.len()]; row_bins.len()];
        let mut significant = vec![vec![false; column_bins.len()]; row_bins.len()];
        let mut found = false;

        for cell in &self.cells {
            let Some(result) = cell.results.row(metric) else {
                continue;
            };
            found = true;
            let i = row_bins.iter().position(|b| *b == cell.primary_bin);
            let j = column_bins.iter().position(|b| *b == cell.secondary_bin);
            if let (Some(i), Some(j)) = (i, j) {
                values[i][j] = match stat {
                    HeatmapStat::UpliftAbs => result.uplift_abs,
                    HeatmapStat::UpliftRel => result.uplift_rel,
                    HeatmapStat::Pvalue => result.pvalue,
                    HeatmapStat::ControlValue => result.control_value,
                    HeatmapStat::ExperimentalValue => result.experimental_value,
                };
                significant[i][j] = result.significant();
            }
        }

        found.then(|| Heatmap {
            metric: metric.to_string(),
            stat,
            row_bins,
            column_bins,
            values,
            significant,
        })
    }
}

type CellKey = (BinValue, BinValue);

/// Split binned tables into one table set per cell
fn partition(binned: &EventTables, segmentation: &SegmentationConfig) -> BTreeMap<CellKey, EventTables> {
    let primary = segmentation.primary.bin_field();
    let secondary = segmentation.secondary.bin_field();
    let mut cells: BTreeMap<CellKey, BTreeMap<String, Vec<EventRow>>> = BTreeMap::new();

    for name in binned.names() {
        for row in binned.rows(name) {
            let (Some(p), Some(s)) = (row.number(&primary), row.number(&secondary)) else {
                continue;
            };
            cells
                .entry((BinValue(p), BinValue(s)))
                .or_default()
                .entry(name.to_string())
                .or_default()
                .push(row.clone());
        }
    }

    cells
        .into_iter()
        .map(|(key, named)| {
            let mut tables = EventTables::new();
            for (name, rows) in named {
                tables.insert(name, rows);
            }
            (key, tables)
        })
        .collect()
}

fn evaluate_cell(
    key: CellKey,
    tables: &EventTables,
    catalog: &MetricCatalog,
    groups: &Groups,
    config: &TestConfig,
) -> SegmentCell {
    let table = aggregate(tables, catalog.aggregates(), &GroupBy::clusters());
    tracing::debug!(
        "cell ({}, {}): {} cluster rows",
        key.0 .0,
        key.1 .0,
        table.len()
    );
    SegmentCell {
        primary_bin: key.0 .0,
        secondary_bin: key.1 .0,
        results: assemble_validated(catalog, &table, groups, config),
    }
}

/// Scoped workers for `cells` cells: one per available core, never more than cells
fn worker_count(cells: usize) -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
        .min(cells)
        .max(1)
}

/// Run the full catalog in every (primary, secondary) cell of the grid
///
/// Every configured edge pair yields a cell, empty or not; an empty cell
/// holds failed (`missing_data`) rows.
///
/// # Errors
/// Fatal `ConfigError` for an invalid catalog, test config, groups or
/// segmentation, or group labels absent from the input.
pub fn sweep(
    tables: &EventTables,
    catalog: &MetricCatalog,
    groups: &Groups,
    segmentation: &SegmentationConfig,
    config: &TestConfig,
) -> Result<SegmentedResults, ConfigError> {
    catalog.validate()?;
    config.validate()?;
    segmentation.validate()?;
    check_groups(groups, &tables.arms())?;

    let binned = binned_tables(tables, segmentation);
    let mut partitions = partition(&binned, segmentation);

    let keys: Vec<CellKey> = segmentation
        .primary
        .edges
        .iter()
        .flat_map(|&p| {
            segmentation
                .secondary
                .edges
                .iter()
                .map(move |&s| (BinValue(p), BinValue(s)))
        })
        .collect();
    let work: Vec<(CellKey, EventTables)> = keys
        .into_iter()
        .map(|key| (key, partitions.remove(&key).unwrap_or_default()))
        .collect();

    let mut cells: Vec<SegmentCell> = if segmentation.parallel {
        let workers = worker_count(work.len());
        let chunk_size = work.len().div_ceil(workers).max(1);
        tracing::debug!("evaluating {} cells on {} workers", work.len(), workers);
        crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = work
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move |_| {
                        chunk
                            .iter()
                            .map(|(key, cell_tables)| evaluate_cell(*key, cell_tables, catalog, groups, config))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        })
        .unwrap_or_else(|e| std::panic::resume_unwind(e))
    } else {
        work.iter()
            .map(|(key, cell_tables)| evaluate_cell(*key, cell_tables, catalog, groups, config))
            .collect()
    };

    cells.sort_by(|a, b| {
        a.primary_bin
            .total_cmp(&b.primary_bin)
            .then(a.secondary_bin.total_cmp(&b.secondary_bin))
    });

    tracing::debug!(
        "sweep finished: {} cells x {} metrics",
        cells.len(),
        catalog.metrics().len()
    );

    Ok(SegmentedResults {
        primary_axis: segmentation.primary.name.clone(),
        secondary_axis: segmentation.secondary.name.clone(),
        cells,
    })
}

/// Pooled metric value of one arm in one cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfilePoint {
    pub metric: String,
    pub arm: String,
    pub primary_bin: f64,
    pub secondary_bin: f64,
    /// `None` when the denominator is missing or zero
    pub value: Option<f64>,
}

/// Pooled value of every catalog metric per (arm, primary bin, secondary bin),
/// pre-period rows excluded
pub fn arm_profile(
    tables: &EventTables,
    catalog: &MetricCatalog,
    segmentation: &SegmentationConfig,
) -> Result<Vec<ProfilePoint>, ConfigError> {
    catalog.validate()?;
    segmentation.validate()?;

    let binned = binned_tables(tables, segmentation).filter(|row| row.arm != BEFORE_LABEL);
    let group_by = GroupBy::arm_and_buckets(vec![
        segmentation.primary.bin_field(),
        segmentation.secondary.bin_field(),
    ]);
    let table = aggregate(&binned, catalog.aggregates(), &group_by);

    let mut points = Vec::with_capacity(table.len() * catalog.metrics().len());
    for definition in catalog.metrics() {
        for row in table.rows() {
            let [primary, secondary] = row.key.buckets.as_slice() else {
                continue;
            };
            let value = match (row.value(&definition.numerator), row.value(&definition.denominator)) {
                (_, None) => None,
                (_, Some(d)) if d == 0.0 => None,
                (n, Some(d)) => Some(n.unwrap_or(0.0) / d),
            };
            points.push(ProfilePoint {
                metric: definition.name.clone(),
                arm: row.key.arm.clone(),
                primary_bin: primary.0,
                secondary_bin: secondary.0,
                value,
            });
        }
    }
    Ok(points)
}
