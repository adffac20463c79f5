// Configuration for ratio-metric hypothesis tests
//
// Significance is a p-value threshold, not a fixed uplift percentage: the
// clustered variance decides how large a difference has to be.

use crate::error::ConfigError;
use crate::ratio::{MissingPolicy, MIN_CLUSTERS};
use serde::{Deserialize, Serialize};

/// Reference distribution for the two-sample statistic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    /// Student-t with Welch–Satterthwaite degrees of freedom from cluster counts
    #[default]
    Welch,
    /// Standard normal; fine when both arms have many clusters
    Z,
}

/// Configuration for the per-metric two-sample test
///
/// # Example
/// ```
/// use switchback::hypothesis::TestConfig;
///
/// let config = TestConfig::default();
/// assert_eq!(config.significance_level, 0.05); // 95% confidence
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    /// Significance level (alpha); a metric is significant when p < alpha
    ///
    /// - 0.05 (default): 95% confidence
    /// - 0.01: stricter, fewer false positives
    /// - 0.10: looser, catches small effects earlier
    pub significance_level: f64,

    /// Reference distribution (Welch t by default)
    pub test_kind: TestKind,

    /// Minimum clusters per arm; fewer makes the metric fail with
    /// `InsufficientClusters` instead of reporting an unreliable p-value
    ///
    /// Default: 2 (the smallest count with a sample variance)
    pub min_clusters: usize,

    /// Treatment of cluster rows where only one side of the ratio has data
    pub missing_policy: MissingPolicy,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            significance_level: 0.05,
            test_kind: TestKind::Welch,
            min_clusters: MIN_CLUSTERS,
            missing_policy: MissingPolicy::ZeroFill,
        }
    }
}

impl TestConfig {
    /// Strict configuration: 99% confidence, at least 10 intervals per arm
    pub fn strict() -> Self {
        Self {
            significance_level: 0.01,
            test_kind: TestKind::Welch,
            min_clusters: 10,
            missing_policy: MissingPolicy::SkipCluster,
        }
    }

    /// Permissive configuration: 90% confidence, normal approximation
    pub fn permissive() -> Self {
        Self {
            significance_level: 0.10,
            test_kind: TestKind::Z,
            min_clusters: MIN_CLUSTERS,
            missing_policy: MissingPolicy::ZeroFill,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.significance_level = alpha;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.significance_level > 0.0 && self.significance_level < 1.0) {
            return Err(ConfigError::InvalidAlpha(self.significance_level));
        }

        if self.min_clusters < MIN_CLUSTERS {
            return Err(ConfigError::InvalidTest(format!(
                "min_clusters must be >= {}, got {}",
                MIN_CLUSTERS, self.min_clusters
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TestConfig::default();
        assert_eq!(config.significance_level, 0.05);
        assert_eq!(config.test_kind, TestKind::Welch);
        assert_eq!(config.min_clusters, 2);
        assert_eq!(config.missing_policy, MissingPolicy::ZeroFill);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_strict_config() {
        let config = TestConfig::strict();
        assert_eq!(config.significance_level, 0.01);
        assert_eq!(config.min_clusters, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_permissive_config() {
        let config = TestConfig::permissive();
        assert_eq!(config.significance_level, 0.10);
        assert_eq!(config.test_kind, TestKind::Z);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_significance_level() {
        assert_eq!(
            TestConfig::default().with_alpha(1.5).validate(),
            Err(ConfigError::InvalidAlpha(1.5))
        );
        assert!(TestConfig::default().with_alpha(0.0).validate().is_err());
        assert!(TestConfig::default().with_alpha(f64::NAN).validate().is_err());
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_invalid_min_clusters() {
        let mut config = TestConfig::default();
        config.min_clusters = 1;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTest(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TestConfig = toml::from_str("significance_level = 0.01\ntest_kind = \"z\"").unwrap();
        assert_eq!(config.significance_level, 0.01);
        assert_eq!(config.test_kind, TestKind::Z);
        assert_eq!(config.min_clusters, 2);
    }
}
