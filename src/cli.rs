//! CLI argument parsing for switchback

use crate::segment::HeatmapStat;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
    /// CSV format for spreadsheet analysis
    Csv,
}

#[derive(Parser, Debug)]
#[command(name = "switchback")]
#[command(version)]
#[command(about = "Ratio-metric significance testing for switchback experiments", long_about = None)]
pub struct Cli {
    /// Event tables as JSON ({"tables": {"calcprices": [...], "orders": [...], "full": [...]}})
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Analysis configuration (TOML)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Metric catalog (TOML); overrides the config file and the embedded default
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Significance level, e.g. 0.05
    #[arg(short = 'a', long, value_name = "ALPHA")]
    pub alpha: Option<f64>,

    /// Control arm label
    #[arg(long, value_name = "LABEL")]
    pub control: Option<String>,

    /// Treatment arm label
    #[arg(long, value_name = "LABEL")]
    pub treatment: Option<String>,

    /// Only test these metrics (repeatable; catalog order is kept)
    #[arg(short, long = "metric", value_name = "NAME")]
    pub metrics: Vec<String>,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Run the (surge bin x distance bin) sweep in addition to the totals
    #[arg(short, long)]
    pub segment: bool,

    /// Print a heatmap for this metric (repeatable; implies --segment)
    #[arg(long = "heatmap", value_name = "METRIC")]
    pub heatmaps: Vec<String>,

    /// Statistic shown in heatmaps
    #[arg(long = "heatmap-stat", value_enum, default_value = "uplift-rel")]
    pub heatmap_stat: HeatmapStat,

    /// Per-arm pooled metric values per bin (implies --segment)
    #[arg(long)]
    pub profile: bool,

    /// Evaluate sweep cells in parallel
    #[arg(long)]
    pub parallel: bool,

    /// Print the metric catalog and exit
    #[arg(long = "list-metrics")]
    pub list_metrics: bool,

    /// Enable debug logging to stderr
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Whether the sweep has to run
    pub fn wants_sweep(&self) -> bool {
        self.segment || self.profile || !self.heatmaps.is_empty()
    }
}
