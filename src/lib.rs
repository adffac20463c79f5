//! Switchback - ratio-metric significance testing for switchback experiments
//!
//! Event rows tagged with an experiment arm and a switchback interval are
//! aggregated per (arm, interval), every catalog metric is estimated as a
//! pooled ratio with a cluster-level delta-method variance, and treatment is
//! compared to control with a Welch t-test (or z-test). Results can be swept
//! over a (surge bin x distance bin) grid.

pub mod aggregate;
pub mod assemble;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod csv_output;
pub mod error;
pub mod events;
pub mod hypothesis;
pub mod json_output;
pub mod ratio;
pub mod report;
pub mod segment;
