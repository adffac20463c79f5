// Two-sample test on the difference of two ratio estimates
//
// The statistic is (R_t - R_c) / sqrt(Var(R_c) + Var(R_t)) with the delta-method
// variances from the ratio estimator (Welch-style: variances are not pooled).
// The p-value is two-sided, against Student-t with Welch–Satterthwaite degrees
// of freedom (cluster counts as sample sizes) or against the standard normal.

use crate::error::MetricError;
use crate::hypothesis::config::TestKind;
use crate::ratio::RatioEstimate;
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Result of comparing control and treatment ratio estimates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticalTest {
    /// Standardized difference (treatment minus control)
    pub statistic: f64,

    /// Two-sided p-value
    pub pvalue: f64,

    /// Degrees of freedom; `None` for the z-test
    pub df: Option<f64>,

    /// sqrt(Var(R_c) + Var(R_t))
    pub standard_error: f64,
}

/// Welch–Satterthwaite degrees of freedom with cluster counts as sample sizes
pub fn welch_df(control: &RatioEstimate, treatment: &RatioEstimate) -> f64 {
    let (vc, vt) = (control.variance, treatment.variance);
    let nc = control.clusters as f64;
    let nt = treatment.clusters as f64;
    let denom = vc * vc / (nc - 1.0) + vt * vt / (nt - 1.0);
    let df = (vc + vt).powi(2) / denom;
    if df.is_finite() && df > 0.0 {
        df
    } else {
        // Degenerate variances: fall back to the pooled count
        (nc + nt - 2.0).max(1.0)
    }
}

/// Compare two ratio estimates
///
/// # Errors
/// `UndefinedMetric` when the standard error is zero but the estimates differ
/// (the statistic would be infinite) or the reference distribution cannot be built.
pub fn compare_ratios(
    control: &RatioEstimate,
    treatment: &RatioEstimate,
    kind: TestKind,
) -> Result<StatisticalTest, MetricError> {
    let difference = treatment.point_estimate - control.point_estimate;
    let standard_error = (control.variance + treatment.variance).sqrt();
    let df = match kind {
        TestKind::Welch => Some(welch_df(control, treatment)),
        TestKind::Z => None,
    };

    if standard_error == 0.0 {
        if difference == 0.0 {
            return Ok(StatisticalTest {
                statistic: 0.0,
                pvalue: 1.0,
                df,
                standard_error,
            });
        }
        return Err(MetricError::UndefinedMetric {
            arm: "treatment-control".to_string(),
            reason: "zero standard error with non-zero difference".to_string(),
        });
    }

    let statistic = difference / standard_error;
    let tail = match df {
        Some(df) => {
            let dist = StudentsT::new(0.0, 1.0, df).map_err(|e| MetricError::UndefinedMetric {
                arm: "treatment-control".to_string(),
                reason: format!("invalid t distribution: {e}"),
            })?;
            1.0 - dist.cdf(statistic.abs())
        }
        None => {
            let dist = Normal::new(0.0, 1.0).map_err(|e| MetricError::UndefinedMetric {
                arm: "treatment-control".to_string(),
                reason: format!("invalid normal distribution: {e}"),
            })?;
            1.0 - dist.cdf(statistic.abs())
        }
    };
    let pvalue = (2.0 * tail).clamp(0.0, 1.0);

    Ok(StatisticalTest {
        statistic,
        pvalue,
        df,
        standard_error,
    })
}
