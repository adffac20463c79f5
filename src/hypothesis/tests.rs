// Scenario tests for ratio-metric hypothesis testing
//
// Realistic switchback shapes: ~30-minute intervals, a few hundred price
// calculations per interval, conversion rates in the 20-40% range.

use super::*;
use crate::aggregate::{ClusterAggregate, ClusterAggregateTable, GroupKey};
use crate::catalog::MetricDefinition;
use crate::config::Groups;
use crate::error::{FailureKind, MetricError};
use crate::events::ClusterId;
use crate::ratio::ArmSample;
use std::collections::BTreeMap;

fn cp2order() -> MetricDefinition {
    MetricDefinition::new("cp2order", "orders_count", "calcprices_count")
}

fn pairs(rate: f64, denominators: &[f64]) -> Vec<(f64, f64)> {
    denominators
        .iter()
        .enumerate()
        .map(|(i, &d)| {
            // Small deterministic jitter around the target rate
            let jitter = if i % 2 == 0 { 0.01 } else { -0.01 };
            ((rate + jitter) * d, d)
        })
        .collect()
}

const SIZES: [f64; 12] = [
    310.0, 290.0, 305.0, 320.0, 280.0, 300.0, 295.0, 315.0, 285.0, 300.0, 310.0, 290.0,
];

/// Scenario: treatment lifts conversion from 30% to 36%
/// Expected: significant positive uplift of about +20%
#[test]
fn test_clear_uplift_is_significant() {
    let control = ArmSample::new("Control", &pairs(0.30, &SIZES));
    let treatment = ArmSample::new("A", &pairs(0.36, &SIZES));

    let result = run_test(&cp2order(), &control, &treatment, &TestConfig::default());

    assert!(result.succeeded());
    assert!(result.significant());
    assert!(result.test_statistic.unwrap() > 0.0);
    let rel = result.uplift_rel.unwrap();
    assert!((rel - 0.2).abs() < 0.01, "uplift_rel = {rel}");
    assert_eq!(result.control_clusters, 12);
    assert_eq!(result.treatment_clusters, 12);
    assert!(result.df.unwrap() > 1.0);
}

/// Scenario: same rate in both arms with interval-level noise
/// Expected: not significant
#[test]
fn test_no_effect_is_not_significant() {
    let control = ArmSample::new("Control", &pairs(0.30, &SIZES));
    let mut shifted = pairs(0.30, &SIZES);
    shifted.rotate_left(1);
    let treatment = ArmSample::new("A", &shifted);

    let result = run_test(&cp2order(), &control, &treatment, &TestConfig::default());
    assert!(result.succeeded());
    assert!(!result.significant());
    assert!(result.pvalue.unwrap() > 0.05);
}

/// Identical arms: zero uplift, p = 1
#[test]
fn test_identical_arms() {
    let sample = pairs(0.25, &SIZES);
    let result = run_test(
        &cp2order(),
        &ArmSample::new("Control", &sample),
        &ArmSample::new("A", &sample),
        &TestConfig::default(),
    );
    assert_eq!(result.uplift_abs, Some(0.0));
    assert_eq!(result.uplift_rel, Some(0.0));
    assert_eq!(result.test_statistic, Some(0.0));
    assert!((result.pvalue.unwrap() - 1.0).abs() < 1e-12);
    assert_eq!(result.is_significant, Some(false));
}

/// A stricter alpha can only remove significance
#[test]
fn test_alpha_monotonicity() {
    let control = ArmSample::new("Control", &pairs(0.30, &SIZES));
    let treatment = ArmSample::new("A", &pairs(0.315, &SIZES));

    let loose = run_test(&cp2order(), &control, &treatment, &TestConfig::permissive());
    let strict = run_test(&cp2order(), &control, &treatment, &TestConfig::strict());
    if strict.significant() {
        assert!(loose.significant());
    }
}

/// Zero orders in control: relative uplift undefined, flagged, row still succeeds
#[test]
fn test_zero_control_flags_division_by_zero() {
    let control = ArmSample::new("Control", &[(0.0, 100.0), (0.0, 120.0), (0.0, 90.0)]);
    let treatment = ArmSample::new("A", &[(3.0, 100.0), (5.0, 120.0), (2.0, 90.0)]);

    let result = run_test(&cp2order(), &control, &treatment, &TestConfig::default());
    assert_eq!(result.control_value, Some(0.0));
    assert!(result.uplift_rel.is_none());
    assert_eq!(result.flags, vec![ResultFlag::DivisionByZero]);
    assert!(result.succeeded());
}

/// Zero denominator in treatment: UndefinedMetric, null statistics
#[test]
fn test_zero_denominator_fails_metric() {
    let control = ArmSample::new("Control", &pairs(0.3, &SIZES));
    let treatment = ArmSample::new("A", &[(0.0, 0.0), (0.0, 0.0)]);

    let result = run_test(&cp2order(), &control, &treatment, &TestConfig::default());
    assert_eq!(result.failure_kind(), Some(FailureKind::UndefinedMetric));
    assert!(result.pvalue.is_none());
    assert!(result.is_significant.is_none());
    assert!(!result.significant());
}

/// Configured minimum cluster count is enforced per arm
#[test]
fn test_min_clusters_enforced() {
    let control = ArmSample::new("Control", &pairs(0.3, &SIZES[..5]));
    let treatment = ArmSample::new("A", &pairs(0.3, &SIZES));

    let result = run_test(&cp2order(), &control, &treatment, &TestConfig::strict());
    assert_eq!(result.failure_kind(), Some(FailureKind::InsufficientClusters));
    match &result.outcome {
        Outcome::Failed { detail, .. } => assert!(detail.contains("Control")),
        Outcome::Succeeded => panic!("expected failure"),
    }
}

fn table_with(rows: &[(&str, u32, f64, Option<f64>)]) -> ClusterAggregateTable {
    let rows = rows
        .iter()
        .map(|&(arm, n, calcprices, orders)| {
            let mut values = BTreeMap::new();
            values.insert("calcprices_count".to_string(), Some(calcprices));
            values.insert("orders_count".to_string(), orders);
            ClusterAggregate {
                key: GroupKey {
                    arm: arm.to_string(),
                    cluster: Some(ClusterId::new(format!("{n:02}:00"), format!("{n:02}:30"))),
                    buckets: vec![],
                },
                values,
            }
        })
        .collect();
    ClusterAggregateTable::new(
        vec!["calcprices_count".to_string(), "orders_count".to_string()],
        rows,
    )
}

#[test]
fn test_pipeline_state_transitions() {
    let table = table_with(&[
        ("Control", 0, 100.0, Some(30.0)),
        ("Control", 1, 110.0, Some(31.0)),
        ("Control", 2, 90.0, Some(28.0)),
        ("A", 0, 100.0, Some(35.0)),
        ("A", 1, 105.0, Some(36.0)),
        ("A", 2, 95.0, Some(33.0)),
    ]);
    let def = cp2order();
    let groups = Groups::default();
    let config = TestConfig::default();

    let mut pipeline = RatioMetricPipeline::new(&def, &table, &groups, &config);
    assert_eq!(pipeline.state(), PipelineState::Initialized);

    let first = pipeline.run();
    assert_eq!(pipeline.state(), PipelineState::Succeeded);
    assert!(first.succeeded());

    // One-shot: a second run returns the cached result
    let second = pipeline.run();
    assert_eq!(first, second);
}

#[test]
fn test_pipeline_missing_numerator_fails_with_missing_data() {
    let table = table_with(&[
        ("Control", 0, 100.0, None),
        ("Control", 1, 110.0, None),
        ("A", 0, 100.0, Some(35.0)),
        ("A", 1, 105.0, Some(36.0)),
    ]);
    let def = cp2order();
    let config = TestConfig::default();
    let mut pipeline = RatioMetricPipeline::new(&def, &table, &Groups::default(), &config);

    let result = pipeline.run();
    assert_eq!(pipeline.state(), PipelineState::Failed(FailureKind::MissingData));
    assert!(result.control_value.is_none());
    assert_eq!(result.metric_name, "cp2order");
}

#[test]
fn test_failed_row_serializes_status() {
    let err = MetricError::MissingData {
        arm: "A".to_string(),
        field: "orders_count".to_string(),
    };
    let row = TestResult::failed(&cp2order(), &err);
    let json = serde_json::to_value(&row).unwrap();
    assert_eq!(json["outcome"]["status"], "failed");
    assert_eq!(json["outcome"]["kind"], "missing_data");
    assert!(json["pvalue"].is_null());
    assert!(json.get("flags").is_none());
}
