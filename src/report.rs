//! Human-readable reports: results table, sweep summary and heatmap grids

use crate::assemble::ResultsTable;
use crate::hypothesis::{Outcome, TestResult};
use crate::segment::{Heatmap, SegmentedResults};

fn fmt_value(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{v:.precision$}"),
        None => "-".to_string(),
    }
}

fn fmt_percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:+.2}%", v * 100.0),
        None => "-".to_string(),
    }
}

fn metric_line(row: &TestResult) -> String {
    let marker = match (&row.outcome, row.significant()) {
        (Outcome::Failed { .. }, _) => "⚠️ ",
        (_, true) => "📈",
        (_, false) => "  ",
    };
    let mut line = format!(
        "{} {:<40} control={:<10} treatment={:<10} uplift={:<9} p={}",
        marker,
        row.metric_name,
        fmt_value(row.control_value, 4),
        fmt_value(row.experimental_value, 4),
        fmt_percent(row.uplift_rel),
        fmt_value(row.pvalue, 4),
    );
    if let Outcome::Failed { kind, .. } = &row.outcome {
        line.push_str(&format!(" [{kind}]"));
    }
    line
}

/// Text report for one comparison
pub fn results_report(results: &ResultsTable) -> String {
    let significant: Vec<&str> = results.significant().map(|r| r.metric_name.as_str()).collect();
    let failed: Vec<&TestResult> = results.failed().collect();
    let mut report = String::new();

    if significant.is_empty() {
        report.push_str("✅ NO SIGNIFICANT DIFFERENCE\n\n");
    } else {
        report.push_str(&format!(
            "📊 SIGNIFICANT DIFFERENCE ({} metrics)\n\n",
            significant.len()
        ));
        report.push_str(&format!("Significant metrics: {}\n", significant.join(", ")));
    }
    report.push_str(&format!(
        "Comparison: {} vs {}\n",
        results.treatment, results.control
    ));
    report.push_str(&format!(
        "Significance level: {} ({}% confidence)\n",
        results.alpha,
        (1.0 - results.alpha) * 100.0
    ));
    report.push_str(&format!("Metrics tested: {}\n", results.len()));

    report.push_str("\n📋 Metrics:\n");
    for row in &results.rows {
        report.push_str(&metric_line(row));
        report.push('\n');
    }

    if !failed.is_empty() {
        report.push_str(&format!("\n⚠️  Failed metrics ({}):\n", failed.len()));
        for row in failed {
            if let Outcome::Failed { detail, .. } = &row.outcome {
                report.push_str(&format!("  - {}: {}\n", row.metric_name, detail));
            }
        }
    }

    report
}

/// One-line-per-cell summary of a sweep
pub fn sweep_report(results: &SegmentedResults) -> String {
    let mut report = format!(
        "🧭 SEGMENTED RESULTS ({} cells, {} x {})\n\n",
        results.len(),
        results.primary_axis,
        results.secondary_axis
    );
    for cell in &results.cells {
        let significant: Vec<&str> = cell
            .results
            .significant()
            .map(|r| r.metric_name.as_str())
            .collect();
        report.push_str(&format!(
            "  {}={} {}={}: {} significant, {} failed",
            results.primary_axis,
            cell.primary_bin,
            results.secondary_axis,
            cell.secondary_bin,
            significant.len(),
            cell.results.failed().count()
        ));
        if !significant.is_empty() {
            report.push_str(&format!(" ({})", significant.join(", ")));
        }
        report.push('\n');
    }
    report
}

/// Heatmap as a text grid; significant cells carry a trailing `*`
pub fn heatmap_grid(heatmap: &Heatmap) -> String {
    let cells: Vec<Vec<String>> = heatmap
        .values
        .iter()
        .zip(&heatmap.significant)
        .map(|(values, stars)| {
            values
                .iter()
                .zip(stars)
                .map(|(value, &star)| match value {
                    Some(v) if star => format!("{v:.2}*"),
                    Some(v) => format!("{v:.2}"),
                    None => "-".to_string(),
                })
                .collect()
        })
        .collect();

    let row_labels: Vec<String> = heatmap.row_bins.iter().map(|b| b.to_string()).collect();
    let column_labels: Vec<String> = heatmap.column_bins.iter().map(|b| b.to_string()).collect();

    let label_width = row_labels.iter().map(String::len).max().unwrap_or(0);
    let cell_width = cells
        .iter()
        .flatten()
        .chain(&column_labels)
        .map(String::len)
        .max()
        .unwrap_or(1);

    let mut out = format!("{}, {}\n", heatmap.metric, heatmap.stat.as_str());
    out.push_str(&" ".repeat(label_width));
    for label in &column_labels {
        out.push_str(&format!(" {label:>cell_width$}"));
    }
    out.push('\n');

    for (label, row) in row_labels.iter().zip(&cells) {
        out.push_str(&format!("{label:>label_width$}"));
        for cell in row {
            out.push_str(&format!(" {cell:>cell_width$}"));
        }
        out.push('\n');
    }
    out
}
