//! JSON output for results tables and sweeps
//!
//! The document carries a SHA-256 fingerprint of its results so two runs can
//! be compared without diffing the whole file.

use crate::assemble::ResultsTable;
use crate::segment::{ProfilePoint, SegmentedResults};
use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Top-level JSON document
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    /// Crate version that produced the document
    pub version: String,
    /// Format name
    pub format: String,
    /// Hex SHA-256 over the serialized `totals`, `segments` and `profile`
    pub fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totals: Option<ResultsTable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<SegmentedResults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Vec<ProfilePoint>>,
}

#[derive(Serialize)]
struct Fingerprinted<'a> {
    totals: &'a Option<ResultsTable>,
    segments: &'a Option<SegmentedResults>,
    profile: &'a Option<Vec<ProfilePoint>>,
}

impl JsonOutput {
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "switchback-json-v1".to_string(),
            fingerprint: String::new(),
            totals: None,
            segments: None,
            profile: None,
        }
    }

    pub fn set_totals(&mut self, totals: ResultsTable) {
        self.totals = Some(totals);
    }

    pub fn set_segments(&mut self, segments: SegmentedResults) {
        self.segments = Some(segments);
    }

    pub fn set_profile(&mut self, profile: Vec<ProfilePoint>) {
        self.profile = Some(profile);
    }

    /// Fingerprint of the current contents
    pub fn compute_fingerprint(&self) -> Result<String> {
        let payload = serde_json::to_vec(&Fingerprinted {
            totals: &self.totals,
            segments: &self.segments,
            profile: &self.profile,
        })
        .context("Failed to serialize results for fingerprinting")?;
        Ok(hex::encode(Sha256::digest(&payload)))
    }

    /// Serialize to pretty JSON, fingerprint included
    pub fn to_json(&self) -> Result<String> {
        let mut document = self.clone();
        document.fingerprint = self.compute_fingerprint()?;
        serde_json::to_string_pretty(&document).context("Failed to serialize JSON output")
    }
}

impl Default for JsonOutput {
    fn default() -> Self {
        Self::new()
    }
}
