// Per-metric test result
//
// A result row exists for every catalog metric. Failed metrics carry a tagged
// failure and null test statistics, so consumers can render "no data" instead
// of silently dropping the row.

use crate::catalog::MetricDefinition;
use crate::error::{FailureKind, MetricError};
use crate::hypothesis::statistics::StatisticalTest;
use crate::ratio::RatioEstimate;
use serde::Serialize;

/// Terminal outcome of one metric's pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed { kind: FailureKind, detail: String },
}

/// Non-fatal conditions noted on a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultFlag {
    /// Control estimate is zero, relative uplift left null
    DivisionByZero,
}

/// Comparison of one ratio metric between control and treatment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    pub metric_name: String,
    pub numerator: String,
    pub denominator: String,
    pub control_value: Option<f64>,
    pub experimental_value: Option<f64>,
    pub uplift_abs: Option<f64>,
    pub uplift_rel: Option<f64>,
    pub variance_control: Option<f64>,
    pub variance_experimental: Option<f64>,
    pub test_statistic: Option<f64>,
    pub pvalue: Option<f64>,
    pub df: Option<f64>,
    pub is_significant: Option<bool>,
    pub control_clusters: usize,
    pub treatment_clusters: usize,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<ResultFlag>,
}

impl TestResult {
    fn empty(definition: &MetricDefinition, outcome: Outcome) -> Self {
        Self {
            metric_name: definition.name.clone(),
            numerator: definition.numerator.clone(),
            denominator: definition.denominator.clone(),
            control_value: None,
            experimental_value: None,
            uplift_abs: None,
            uplift_rel: None,
            variance_control: None,
            variance_experimental: None,
            test_statistic: None,
            pvalue: None,
            df: None,
            is_significant: None,
            control_clusters: 0,
            treatment_clusters: 0,
            outcome,
            flags: Vec::new(),
        }
    }

    /// Failure before either arm could be estimated
    pub fn failed(definition: &MetricDefinition, error: &MetricError) -> Self {
        Self::empty(
            definition,
            Outcome::Failed {
                kind: error.kind(),
                detail: error.to_string(),
            },
        )
    }

    /// Both arms estimated; fills point estimates and uplift. The test fields are
    /// filled by [`TestResult::with_test`] or left null by [`TestResult::with_failure`].
    pub fn computed(
        definition: &MetricDefinition,
        control: &RatioEstimate,
        treatment: &RatioEstimate,
    ) -> Self {
        let mut result = Self::empty(definition, Outcome::Succeeded);
        let uplift_abs = treatment.point_estimate - control.point_estimate;

        result.control_value = Some(control.point_estimate);
        result.experimental_value = Some(treatment.point_estimate);
        result.uplift_abs = Some(uplift_abs);
        if control.point_estimate == 0.0 {
            result.flags.push(ResultFlag::DivisionByZero);
        } else {
            result.uplift_rel = Some(uplift_abs / control.point_estimate);
        }
        result.variance_control = Some(control.variance);
        result.variance_experimental = Some(treatment.variance);
        result.control_clusters = control.clusters;
        result.treatment_clusters = treatment.clusters;
        result
    }

    pub fn with_test(mut self, test: &StatisticalTest, alpha: f64) -> Self {
        self.test_statistic = Some(test.statistic);
        self.pvalue = Some(test.pvalue);
        self.df = test.df;
        self.is_significant = Some(test.pvalue < alpha);
        self.outcome = Outcome::Succeeded;
        self
    }

    pub fn with_failure(mut self, error: &MetricError) -> Self {
        self.test_statistic = None;
        self.pvalue = None;
        self.df = None;
        self.is_significant = None;
        self.outcome = Outcome::Failed {
            kind: error.kind(),
            detail: error.to_string(),
        };
        self
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            Outcome::Succeeded => None,
            Outcome::Failed { kind, .. } => Some(*kind),
        }
    }

    /// Significant at the configured alpha; failed metrics are never significant
    pub fn significant(&self) -> bool {
        self.is_significant == Some(true)
    }
}
