// Ratio-Metric Hypothesis Testing for Switchback Experiments
//
// Compares one ratio metric (sum of numerator / sum of denominator) between a
// control and a treatment arm. Randomization happens per switchback interval,
// so every arm sample is a set of per-interval (numerator, denominator) pairs
// and the variance is clustered at that level.
//
// Flow per metric:
// - ratio::estimate for each arm (pooled ratio, delta-method variance)
// - statistics::compare_ratios (Welch t or z, two-sided)
// - result::TestResult, one row per metric, failed or not
//
// Significance is p < alpha. No fixed uplift thresholds.
//
// Implementation:
// - Uses statrs for the Student-t and normal CDFs
// - Per-metric failures are values (Outcome::Failed), never panics or aborts

mod config;
mod pipeline;
mod result;
mod statistics;

pub use config::{TestConfig, TestKind};
pub use pipeline::{run_test, PipelineState, RatioMetricPipeline};
pub use result::{Outcome, ResultFlag, TestResult};
pub use statistics::{compare_ratios, welch_df, StatisticalTest};

#[cfg(test)]
mod tests;
