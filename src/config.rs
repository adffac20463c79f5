//! Analysis configuration: test settings, arm labels and segmentation
//!
//! Loaded from TOML; every section is optional and falls back to defaults.
//!
//! ```toml
//! catalog = "metrics.toml"
//!
//! [test]
//! significance_level = 0.05
//! test_kind = "welch"
//!
//! [groups]
//! control = "Control"
//! treatment = "A"
//!
//! [segmentation]
//! parallel = true
//! ```

use crate::error::ConfigError;
use crate::events::BEFORE_LABEL;
use crate::hypothesis::TestConfig;
use crate::segment::SegmentationConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Control and treatment arm labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Groups {
    pub control: String,
    pub treatment: String,
}

impl Default for Groups {
    fn default() -> Self {
        Self {
            control: "Control".to_string(),
            treatment: "A".to_string(),
        }
    }
}

impl Groups {
    pub fn new(control: impl Into<String>, treatment: impl Into<String>) -> Self {
        Self {
            control: control.into(),
            treatment: treatment.into(),
        }
    }

    /// Labels must be non-empty, distinct, and never the pre-period label
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.control.is_empty() || self.treatment.is_empty() {
            return Err(ConfigError::InvalidGroups("empty group label".to_string()));
        }
        if self.control == self.treatment {
            return Err(ConfigError::InvalidGroups(format!(
                "control and treatment are both '{}'",
                self.control
            )));
        }
        if self.control == BEFORE_LABEL || self.treatment == BEFORE_LABEL {
            return Err(ConfigError::InvalidGroups(format!(
                "'{BEFORE_LABEL}' rows are never compared"
            )));
        }
        Ok(())
    }
}

/// Top-level analysis configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub test: TestConfig,
    pub groups: Groups,

    /// Metric catalog file; the embedded default catalog when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<PathBuf>,

    /// Sweep settings; `None` means totals only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<SegmentationConfig>,
}

impl AnalysisConfig {
    pub fn strict() -> Self {
        Self {
            test: TestConfig::strict(),
            ..Self::default()
        }
    }

    pub fn permissive() -> Self {
        Self {
            test: TestConfig::permissive(),
            ..Self::default()
        }
    }

    /// Load from a TOML file. A relative `catalog` path resolves against the
    /// config file's directory.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        if let (Some(catalog), Some(dir)) = (config.catalog.as_mut(), path.parent()) {
            if catalog.is_relative() {
                *catalog = dir.join(&*catalog);
            }
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse analysis config TOML")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.test.validate()?;
        self.groups.validate()?;
        if let Some(segmentation) = &self.segmentation {
            segmentation.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypothesis::TestKind;
    use crate::ratio::MissingPolicy;
    use std::io::Write;

    #[test]
    fn test_default_groups() {
        let groups = Groups::default();
        assert_eq!(groups.control, "Control");
        assert_eq!(groups.treatment, "A");
        assert!(groups.validate().is_ok());
    }

    #[test]
    fn test_invalid_groups() {
        assert!(matches!(
            Groups::new("A", "A").validate(),
            Err(ConfigError::InvalidGroups(_))
        ));
        assert!(Groups::new("Before", "A").validate().is_err());
        assert!(Groups::new("Control", "").validate().is_err());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = AnalysisConfig::from_toml_str("").unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_toml() {
        let config = AnalysisConfig::from_toml_str(
            r#"
            [test]
            significance_level = 0.1
            test_kind = "z"
            missing_policy = "skip_cluster"

            [groups]
            control = "B"
            treatment = "C"

            [segmentation]
            parallel = true

            [segmentation.secondary]
            name = "distance"
            field = "distance_in_km"
            step = 5.0
            edges = [0.0, 5.0, 10.0]
            "#,
        )
        .unwrap();

        assert_eq!(config.test.significance_level, 0.1);
        assert_eq!(config.test.test_kind, TestKind::Z);
        assert_eq!(config.test.missing_policy, MissingPolicy::SkipCluster);
        assert_eq!(config.groups, Groups::new("B", "C"));

        let segmentation = config.segmentation.as_ref().unwrap();
        assert!(segmentation.parallel);
        assert_eq!(segmentation.secondary.edges.len(), 3);
        // Untouched axis keeps its default
        assert_eq!(segmentation.primary.step, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_alpha_rejected() {
        let config = AnalysisConfig::from_toml_str("[test]\nsignificance_level = 2.0").unwrap();
        assert_eq!(config.validate(), Err(ConfigError::InvalidAlpha(2.0)));
    }

    #[test]
    fn test_unknown_key_is_parse_error() {
        assert!(AnalysisConfig::from_toml_str("alpha = 0.05").is_err());
    }

    #[test]
    fn test_relative_catalog_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "catalog = \"metrics.toml\"").unwrap();

        let config = AnalysisConfig::from_toml(&path).unwrap();
        assert_eq!(config.catalog, Some(dir.path().join("metrics.toml")));
    }

    #[test]
    fn test_presets() {
        assert_eq!(AnalysisConfig::strict().test.significance_level, 0.01);
        assert_eq!(AnalysisConfig::permissive().test.significance_level, 0.10);
    }
}
