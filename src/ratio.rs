//! Ratio estimator for cluster-randomized designs
//!
//! A ratio metric is compared at the pooled level: for each arm the point
//! estimate is `sum(N) / sum(D)` over its clusters, never the mean of
//! per-cluster ratios. Clusters (switchback intervals) are the i.i.d. unit, so
//! the sampling variance of the ratio comes from the delta method applied to
//! the per-cluster `(N_i, D_i)` pairs:
//!
//! ```text
//! Var(R) ~ [ Var(N)/D^2 - 2 N Cov(N,D)/D^3 + N^2 Var(D)/D^4 ] / n
//! ```
//!
//! with `N`, `D` the per-cluster means and `Var`/`Cov` the (n-1) sample moments.

use crate::aggregate::ClusterAggregateTable;
use crate::catalog::MetricDefinition;
use crate::error::MetricError;
use serde::{Deserialize, Serialize};

/// Smallest number of clusters with a defined sample variance
pub const MIN_CLUSTERS: usize = 2;

/// How a cluster row with only one of numerator/denominator present is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// An absent aggregate means zero underlying events
    #[default]
    ZeroFill,
    /// Drop the cluster from the sample
    SkipCluster,
}

/// One cluster's contribution to an arm
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterPoint {
    pub numerator: f64,
    pub denominator: f64,
}

/// All clusters of one arm for one metric
#[derive(Debug, Clone, PartialEq)]
pub struct ArmSample {
    pub arm: String,
    pub clusters: Vec<ClusterPoint>,
}

impl ArmSample {
    pub fn new(arm: impl Into<String>, pairs: &[(f64, f64)]) -> Self {
        Self {
            arm: arm.into(),
            clusters: pairs
                .iter()
                .map(|&(numerator, denominator)| ClusterPoint {
                    numerator,
                    denominator,
                })
                .collect(),
        }
    }

    /// Extract an arm's `(numerator, denominator)` pairs from the aggregate table
    ///
    /// A cluster row with both cells missing contributes nothing. A row with one
    /// cell missing is zero-filled or skipped according to `policy`.
    ///
    /// # Errors
    /// `MissingData` when the table never computed a column, or when the arm has
    /// no non-missing value for the numerator or the denominator.
    pub fn from_table(
        table: &ClusterAggregateTable,
        arm: &str,
        definition: &MetricDefinition,
        policy: MissingPolicy,
    ) -> Result<Self, MetricError> {
        let missing = |field: &str| MetricError::MissingData {
            arm: arm.to_string(),
            field: field.to_string(),
        };

        for field in [&definition.numerator, &definition.denominator] {
            if !table.has_column(field) {
                return Err(missing(field));
            }
        }

        let mut clusters = Vec::new();
        let (mut seen_numerator, mut seen_denominator) = (false, false);

        for row in table.rows_for_arm(arm) {
            let numerator = row.value(&definition.numerator);
            let denominator = row.value(&definition.denominator);
            seen_numerator |= numerator.is_some();
            seen_denominator |= denominator.is_some();

            let point = match (numerator, denominator, policy) {
                (None, None, _) => continue,
                (Some(n), Some(d), _) => ClusterPoint {
                    numerator: n,
                    denominator: d,
                },
                (_, _, MissingPolicy::SkipCluster) => continue,
                (n, d, MissingPolicy::ZeroFill) => ClusterPoint {
                    numerator: n.unwrap_or(0.0),
                    denominator: d.unwrap_or(0.0),
                },
            };
            clusters.push(point);
        }

        if !seen_numerator {
            return Err(missing(&definition.numerator));
        }
        if !seen_denominator || clusters.is_empty() {
            return Err(missing(&definition.denominator));
        }

        Ok(Self {
            arm: arm.to_string(),
            clusters,
        })
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn numerator_sum(&self) -> f64 {
        self.clusters.iter().map(|c| c.numerator).sum()
    }

    pub fn denominator_sum(&self) -> f64 {
        self.clusters.iter().map(|c| c.denominator).sum()
    }
}

/// Pooled ratio and its delta-method variance for one arm
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatioEstimate {
    pub point_estimate: f64,
    pub variance: f64,
    pub clusters: usize,
    pub numerator_sum: f64,
    pub denominator_sum: f64,
}

impl RatioEstimate {
    pub fn standard_error(&self) -> f64 {
        self.variance.sqrt()
    }
}

/// Estimate the pooled ratio of an arm and its clustered variance
///
/// # Example
/// ```
/// use switchback::ratio::{estimate, ArmSample};
///
/// // Pooled 2/10, not the mean of per-cluster ratios (1.0 and 0.11)
/// let sample = ArmSample::new("A", &[(1.0, 1.0), (1.0, 9.0)]);
/// let est = estimate(&sample).unwrap();
/// assert!((est.point_estimate - 0.2).abs() < 1e-12);
/// ```
pub fn estimate(sample: &ArmSample) -> Result<RatioEstimate, MetricError> {
    let n = sample.len();
    if n == 0 {
        return Err(MetricError::MissingData {
            arm: sample.arm.clone(),
            field: "clusters".to_string(),
        });
    }

    let numerator_sum = sample.numerator_sum();
    let denominator_sum = sample.denominator_sum();
    if denominator_sum == 0.0 {
        return Err(MetricError::UndefinedMetric {
            arm: sample.arm.clone(),
            reason: "denominator sums to zero".to_string(),
        });
    }

    if n < MIN_CLUSTERS {
        return Err(MetricError::InsufficientClusters {
            arm: sample.arm.clone(),
            found: n,
            required: MIN_CLUSTERS,
        });
    }

    let count = n as f64;
    let mean_n = numerator_sum / count;
    let mean_d = denominator_sum / count;
    let ratio = numerator_sum / denominator_sum;

    let (mut ss_n, mut ss_d, mut sp_nd) = (0.0, 0.0, 0.0);
    for c in &sample.clusters {
        let dn = c.numerator - mean_n;
        let dd = c.denominator - mean_d;
        ss_n += dn * dn;
        ss_d += dd * dd;
        sp_nd += dn * dd;
    }
    let var_n = ss_n / (count - 1.0);
    let var_d = ss_d / (count - 1.0);
    let cov_nd = sp_nd / (count - 1.0);

    // Linearized residual variance, scaled to the mean denominator
    let variance =
        ((var_n - 2.0 * ratio * cov_nd + ratio * ratio * var_d) / (mean_d * mean_d * count)).max(0.0);

    if !ratio.is_finite() || !variance.is_finite() {
        return Err(MetricError::UndefinedMetric {
            arm: sample.arm.clone(),
            reason: "non-finite estimate".to_string(),
        });
    }

    Ok(RatioEstimate {
        point_estimate: ratio,
        variance,
        clusters: n,
        numerator_sum,
        denominator_sum,
    })
}
