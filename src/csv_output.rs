//! CSV output for results tables and sweeps
//!
//! One line per metric (per cell for sweeps). Missing statistics are empty
//! fields so spreadsheets read them as blanks.

use crate::assemble::ResultsTable;
use crate::hypothesis::{Outcome, TestResult};
use crate::segment::SegmentedResults;

const RESULT_COLUMNS: [&str; 14] = [
    "metric",
    "numerator",
    "denominator",
    "control_value",
    "experimental_value",
    "uplift_abs",
    "uplift_rel",
    "variance_control",
    "variance_experimental",
    "test_statistic",
    "pvalue",
    "is_significant",
    "status",
    "failure",
];

/// CSV output formatter
#[derive(Debug)]
pub struct CsvOutput {
    /// Leading coordinate columns (empty for a plain results table)
    coordinate_columns: Vec<String>,
    lines: Vec<String>,
}

impl CsvOutput {
    pub fn new() -> Self {
        Self {
            coordinate_columns: Vec::new(),
            lines: Vec::new(),
        }
    }

    pub fn from_results(results: &ResultsTable) -> Self {
        let mut output = Self::new();
        for row in &results.rows {
            output.add_row(&[], row);
        }
        output
    }

    /// Columns `<primary>_bin,<secondary>_bin` precede the result columns
    pub fn from_sweep(results: &SegmentedResults) -> Self {
        let mut output = Self {
            coordinate_columns: vec![
                format!("{}_bin", results.primary_axis),
                format!("{}_bin", results.secondary_axis),
            ],
            lines: Vec::new(),
        };
        for cell in &results.cells {
            let coordinates = [cell.primary_bin, cell.secondary_bin];
            for row in &cell.results.rows {
                output.add_row(&coordinates, row);
            }
        }
        output
    }

    fn header(&self) -> String {
        self.coordinate_columns
            .iter()
            .map(String::as_str)
            .chain(RESULT_COLUMNS)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Escape CSV field (commas, quotes, newlines)
    fn escape_field(field: &str) -> String {
        if field.contains(',') || field.contains('"') || field.contains('\n') {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }

    fn number(value: Option<f64>) -> String {
        value.map(|v| v.to_string()).unwrap_or_default()
    }

    fn add_row(&mut self, coordinates: &[f64], row: &TestResult) {
        let (status, failure) = match &row.outcome {
            Outcome::Succeeded => ("succeeded", String::new()),
            Outcome::Failed { kind, .. } => ("failed", kind.to_string()),
        };

        let mut fields: Vec<String> = coordinates.iter().map(|c| c.to_string()).collect();
        fields.extend([
            Self::escape_field(&row.metric_name),
            Self::escape_field(&row.numerator),
            Self::escape_field(&row.denominator),
            Self::number(row.control_value),
            Self::number(row.experimental_value),
            Self::number(row.uplift_abs),
            Self::number(row.uplift_rel),
            Self::number(row.variance_control),
            Self::number(row.variance_experimental),
            Self::number(row.test_statistic),
            Self::number(row.pvalue),
            row.is_significant.map(|b| b.to_string()).unwrap_or_default(),
            status.to_string(),
            failure,
        ]);
        self.lines.push(fields.join(","));
    }

    pub fn to_csv(&self) -> String {
        let mut output = self.header();
        output.push('\n');
        for line in &self.lines {
            output.push_str(line);
            output.push('\n');
        }
        output
    }
}

impl Default for CsvOutput {
    fn default() -> Self {
        Self::new()
    }
}
