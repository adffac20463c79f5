// Metric catalog: the ordered list of ratio metrics under test
//
// Each metric is a pair of aggregate columns (numerator, denominator). The
// aggregates themselves are declared next to the metrics so the catalog can be
// validated as a whole: a metric that references a column the aggregator never
// computes is a configuration error, reported before any arm is estimated.
//
// The default catalog is embedded from metrics-default.toml; alternative
// catalogs load from TOML without recompilation.

mod definition;
mod registry;

pub use definition::{AggregateSpec, MetricDefinition, Predicate, Reduction};
pub use registry::MetricCatalog;

#[cfg(test)]
mod tests;
