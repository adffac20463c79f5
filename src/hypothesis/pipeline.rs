// Ratio-metric hypothesis-testing pipeline
//
// One pipeline per (metric, comparison):
//   Initialized -> Computed -> Succeeded | Failed(kind)
// Both arm samples are extracted and estimated (Computed), then the two-sample
// test runs. Failures are terminal for this metric only; nothing is retried
// since every step is a deterministic computation.

use crate::aggregate::ClusterAggregateTable;
use crate::catalog::MetricDefinition;
use crate::config::Groups;
use crate::error::{FailureKind, MetricError};
use crate::hypothesis::config::TestConfig;
use crate::hypothesis::result::TestResult;
use crate::hypothesis::statistics::compare_ratios;
use crate::ratio::{estimate, ArmSample, RatioEstimate};

/// Lifecycle of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Initialized,
    Computed,
    Succeeded,
    Failed(FailureKind),
}

/// Estimate one arm, enforcing the configured minimum cluster count
fn estimate_arm(sample: &ArmSample, config: &TestConfig) -> Result<RatioEstimate, MetricError> {
    let estimate = estimate(sample)?;
    if estimate.clusters < config.min_clusters {
        return Err(MetricError::InsufficientClusters {
            arm: sample.arm.clone(),
            found: estimate.clusters,
            required: config.min_clusters,
        });
    }
    Ok(estimate)
}

/// Run the comparison on already-extracted arm samples
///
/// Never fails: every statistical error becomes a result with null statistics.
///
/// # Example
/// ```
/// use switchback::catalog::MetricDefinition;
/// use switchback::hypothesis::{run_test, TestConfig};
/// use switchback::ratio::ArmSample;
///
/// let def = MetricDefinition::new("cp2order", "orders_count", "calcprices_count");
/// let control = ArmSample::new("Control", &[(30.0, 100.0), (28.0, 90.0), (35.0, 110.0)]);
/// let treatment = ArmSample::new("A", &[(30.0, 100.0), (28.0, 90.0), (35.0, 110.0)]);
///
/// let result = run_test(&def, &control, &treatment, &TestConfig::default());
/// assert_eq!(result.uplift_rel, Some(0.0));
/// assert_eq!(result.is_significant, Some(false));
/// ```
pub fn run_test(
    definition: &MetricDefinition,
    control: &ArmSample,
    treatment: &ArmSample,
    config: &TestConfig,
) -> TestResult {
    let mut pipeline = RatioMetricPipeline::from_samples(
        definition,
        Ok(control.clone()),
        Ok(treatment.clone()),
        config,
    );
    pipeline.run()
}

/// Per-metric pipeline over the wide aggregate table
#[derive(Debug)]
pub struct RatioMetricPipeline<'a> {
    definition: &'a MetricDefinition,
    config: &'a TestConfig,
    control: Result<ArmSample, MetricError>,
    treatment: Result<ArmSample, MetricError>,
    state: PipelineState,
    result: Option<TestResult>,
}

impl<'a> RatioMetricPipeline<'a> {
    /// Prepare a pipeline; arm samples are extracted from the table now, and
    /// extraction failures are reported when the pipeline runs
    pub fn new(
        definition: &'a MetricDefinition,
        table: &ClusterAggregateTable,
        groups: &Groups,
        config: &'a TestConfig,
    ) -> Self {
        let control =
            ArmSample::from_table(table, &groups.control, definition, config.missing_policy);
        let treatment =
            ArmSample::from_table(table, &groups.treatment, definition, config.missing_policy);
        Self::from_samples(definition, control, treatment, config)
    }

    fn from_samples(
        definition: &'a MetricDefinition,
        control: Result<ArmSample, MetricError>,
        treatment: Result<ArmSample, MetricError>,
        config: &'a TestConfig,
    ) -> Self {
        Self {
            definition,
            config,
            control,
            treatment,
            state: PipelineState::Initialized,
            result: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Run to a terminal state. Calling again returns the same result.
    pub fn run(&mut self) -> TestResult {
        if let Some(result) = &self.result {
            return result.clone();
        }

        let result = match self.compute() {
            Ok((control, treatment)) => {
                self.state = PipelineState::Computed;
                let computed = TestResult::computed(self.definition, &control, &treatment);
                match compare_ratios(&control, &treatment, self.config.test_kind) {
                    Ok(test) => computed.with_test(&test, self.config.significance_level),
                    Err(e) => {
                        self.log_failure(&e);
                        computed.with_failure(&e)
                    }
                }
            }
            Err(e) => {
                self.log_failure(&e);
                TestResult::failed(self.definition, &e)
            }
        };

        self.state = match result.failure_kind() {
            None => PipelineState::Succeeded,
            Some(kind) => PipelineState::Failed(kind),
        };
        self.result = Some(result.clone());
        result
    }

    fn compute(&self) -> Result<(RatioEstimate, RatioEstimate), MetricError> {
        let control = self.control.as_ref().map_err(Clone::clone)?;
        let treatment = self.treatment.as_ref().map_err(Clone::clone)?;
        Ok((
            estimate_arm(control, self.config)?,
            estimate_arm(treatment, self.config)?,
        ))
    }

    fn log_failure(&self, error: &MetricError) {
        tracing::warn!(
            "metric '{}' ({} / {}) failed: {}",
            self.definition.name,
            self.definition.numerator,
            self.definition.denominator,
            error
        );
    }
}
