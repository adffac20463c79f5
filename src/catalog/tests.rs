// Catalog loading and fail-fast validation

use super::*;
use crate::error::ConfigError;

const SMALL_CATALOG: &str = r#"
[[aggregate]]
name = "calcprices_count"
source = "calcprices"
reduction = "count_distinct"
column = "calcprice_uuid"

[[aggregate]]
name = "orders_count"
source = "orders"
reduction = "count_distinct"
column = "order_uuid"

[[metric]]
name = "cp2order"
numerator = "orders_count"
denominator = "calcprices_count"
"#;

#[test]
fn test_default_catalog_is_valid() {
    let catalog = MetricCatalog::default_catalog().unwrap();
    assert!(catalog.validate().is_ok());
    assert_eq!(catalog.aggregates()[0].name, "calcprices_count");
    assert!(catalog.metrics().len() >= 40);
}

#[test]
fn test_default_catalog_order_starts_with_funnel() {
    let catalog = MetricCatalog::default_catalog().unwrap();
    let names: Vec<&str> = catalog.metrics().iter().map(|m| m.name.as_str()).collect();
    assert_eq!(&names[..3], &["cp2order", "order2bid", "order2start_price_bid"]);
    assert!(names.contains(&"balance"));
    assert!(names.contains(&"surge_le_1_cp2done"));
}

#[test]
fn test_default_catalog_segment_filters() {
    let catalog = MetricCatalog::default_catalog().unwrap();
    let spec = catalog
        .aggregates()
        .iter()
        .find(|a| a.name == "surge_gr_1_rides_count")
        .unwrap();
    assert_eq!(spec.source, "full");
    assert_eq!(spec.reduction, Reduction::CountDistinct);
    assert!(matches!(spec.filter, Some(Predicate::All(_))));
}

#[test]
fn test_from_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.toml");
    std::fs::write(&path, SMALL_CATALOG).unwrap();

    let catalog = MetricCatalog::from_toml(&path).unwrap();
    assert_eq!(catalog.metrics().len(), 1);
    assert_eq!(catalog.aggregate_names().collect::<Vec<_>>().len(), 2);
    assert!(catalog.validate().is_ok());
}

#[test]
fn test_from_toml_missing_file() {
    assert!(MetricCatalog::from_toml("/nonexistent/metrics.toml").is_err());
}

#[test]
fn test_unknown_field_is_config_error() {
    let toml = format!(
        "{}\n[[metric]]\nname = \"order2done\"\nnumerator = \"rides_count\"\ndenominator = \"orders_count\"\n",
        SMALL_CATALOG
    );
    let catalog = MetricCatalog::from_toml_str(&toml).unwrap();
    assert_eq!(
        catalog.validate(),
        Err(ConfigError::UnknownField {
            metric: "order2done".to_string(),
            field: "rides_count".to_string(),
        })
    );
}

#[test]
fn test_duplicate_metric_rejected() {
    let toml = format!(
        "{}\n[[metric]]\nname = \"cp2order\"\nnumerator = \"orders_count\"\ndenominator = \"calcprices_count\"\n",
        SMALL_CATALOG
    );
    let catalog = MetricCatalog::from_toml_str(&toml).unwrap();
    assert!(matches!(
        catalog.validate(),
        Err(ConfigError::Duplicate { kind: "metric", .. })
    ));
}

#[test]
fn test_invalid_identifier_rejected() {
    let catalog = MetricCatalog::new(
        vec![],
        vec![MetricDefinition::new("CP 2 order", "a", "b")],
    );
    assert!(matches!(
        catalog.validate(),
        Err(ConfigError::InvalidIdentifier(_))
    ));
}

#[test]
fn test_validate_is_repeatable() {
    let good = MetricCatalog::from_toml_str(SMALL_CATALOG).unwrap();
    let bad = MetricCatalog::new(vec![], vec![MetricDefinition::new("9lives", "a", "b")]);
    // The identifier pattern is compiled once and shared across calls
    for _ in 0..3 {
        assert!(good.validate().is_ok());
        assert!(matches!(bad.validate(), Err(ConfigError::InvalidIdentifier(name)) if name == "9lives"));
    }
}

#[test]
fn test_sum_without_column_rejected() {
    let catalog = MetricCatalog::new(
        vec![AggregateSpec {
            name: "price_sum".to_string(),
            source: "orders".to_string(),
            reduction: Reduction::Sum,
            column: None,
            filter: None,
        }],
        vec![],
    );
    assert!(matches!(
        catalog.validate(),
        Err(ConfigError::InvalidAggregate { .. })
    ));
}

#[test]
fn test_select_keeps_catalog_order() {
    let catalog = MetricCatalog::default_catalog().unwrap();
    let selected = catalog
        .select(&["balance".to_string(), "cp2order".to_string()])
        .unwrap();
    let names: Vec<&str> = selected.metrics().iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["cp2order", "balance"]);
    assert_eq!(selected.aggregates().len(), catalog.aggregates().len());
}

#[test]
fn test_select_unknown_metric() {
    let catalog = MetricCatalog::default_catalog().unwrap();
    assert_eq!(
        catalog.select(&["nope".to_string()]),
        Err(ConfigError::UnknownMetric("nope".to_string()))
    );
}
