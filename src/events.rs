//! Raw event tables delivered by the extraction layer
//!
//! Each row is one unit-level observation (a price calculation, an order, a
//! joined order+price row) tagged with an experiment arm and the switchback
//! interval it fell into. Field values are loosely typed, mirroring what a
//! warehouse export carries.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

/// Arm label for pre-experiment rows; never part of a comparison
pub const BEFORE_LABEL: &str = "Before";

/// A single field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Total order: null, then booleans, numbers, text
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        fn rank(value: &FieldValue) -> u8 {
            match value {
                FieldValue::Null => 0,
                FieldValue::Bool(_) => 1,
                FieldValue::Number(_) => 2,
                FieldValue::Text(_) => 3,
            }
        }
        match (self, other) {
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
            (FieldValue::Number(a), FieldValue::Number(b)) => a.total_cmp(b),
            (FieldValue::Text(a), FieldValue::Text(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

/// Switchback interval: the randomization unit
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterId {
    pub switch_start: String,
    pub switch_finish: String,
}

impl ClusterId {
    pub fn new(switch_start: impl Into<String>, switch_finish: impl Into<String>) -> Self {
        Self {
            switch_start: switch_start.into(),
            switch_finish: switch_finish.into(),
        }
    }
}

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.switch_start, self.switch_finish)
    }
}

/// One unit-level observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    pub arm: String,
    #[serde(flatten)]
    pub cluster: ClusterId,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl EventRow {
    pub fn new(arm: impl Into<String>, cluster: ClusterId) -> Self {
        Self {
            arm: arm.into(),
            cluster,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter
    pub fn with(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    pub fn with_number(self, field: impl Into<String>, value: f64) -> Self {
        self.with(field, FieldValue::Number(value))
    }

    pub fn with_flag(self, field: impl Into<String>, value: bool) -> Self {
        self.with(field, FieldValue::Bool(value))
    }

    pub fn with_text(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(field, FieldValue::Text(value.into()))
    }

    /// Numeric view of a field. Booleans count as 0/1, text and null are missing.
    pub fn number(&self, field: &str) -> Option<f64> {
        match self.fields.get(field)? {
            FieldValue::Number(n) if n.is_finite() => Some(*n),
            FieldValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Truthiness of a flag column. Missing flags are false.
    pub fn flag(&self, field: &str) -> bool {
        match self.fields.get(field) {
            Some(FieldValue::Bool(b)) => *b,
            Some(FieldValue::Number(n)) => *n != 0.0,
            _ => false,
        }
    }

    /// Identity of a value for distinct counting. Null and absent values have none.
    pub fn distinct_key(&self, field: &str) -> Option<String> {
        match self.fields.get(field)? {
            FieldValue::Null => None,
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::Number(n) => Some(n.to_string()),
            FieldValue::Text(s) => Some(s.clone()),
        }
    }
}

/// Enrichment step: copy `field` from rows of table `from` onto rows of table
/// `to`, matching on `key` (left join, one row per match)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPropagation {
    pub from: String,
    pub to: String,
    pub key: String,
    pub field: String,
}

/// Named source tables (e.g. `calcprices`, `orders`, `full`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventTables {
    #[serde(default)]
    tables: BTreeMap<String, Vec<EventRow>>,
}

impl EventTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load tables from a JSON document `{"tables": {"name": [rows...]}}`
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read event tables: {}", path.as_ref().display())
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse event tables JSON")
    }

    pub fn insert(&mut self, name: impl Into<String>, rows: Vec<EventRow>) {
        self.tables.insert(name.into(), rows);
    }

    /// Rows of a table; an unknown table reads as empty
    pub fn rows(&self, name: &str) -> &[EventRow] {
        self.tables.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    /// Distinct arm labels across every table
    pub fn arms(&self) -> BTreeSet<String> {
        self.tables
            .values()
            .flatten()
            .map(|row| row.arm.clone())
            .collect()
    }

    /// New tables holding only the rows accepted by `keep`
    pub fn filter<F>(&self, keep: F) -> EventTables
    where
        F: Fn(&EventRow) -> bool,
    {
        let tables = self
            .tables
            .iter()
            .map(|(name, rows)| {
                let kept = rows.iter().filter(|row| keep(row)).cloned().collect();
                (name.clone(), kept)
            })
            .collect();
        EventTables { tables }
    }

    /// New tables with every row passed through `f` (rows mapped to `None` are dropped)
    pub fn filter_map<F>(&self, f: F) -> EventTables
    where
        F: Fn(&EventRow) -> Option<EventRow>,
    {
        let tables = self
            .tables
            .iter()
            .map(|(name, rows)| (name.clone(), rows.iter().filter_map(&f).collect()))
            .collect();
        EventTables { tables }
    }

    /// Apply a [`FieldPropagation`], reading matches from `source`.
    ///
    /// Left join: a target row with `n` matching source rows becomes `n`
    /// rows, one per matched value, ordered by value so the output does not
    /// depend on source row order. Target rows without a match are kept as
    /// they are.
    pub fn propagate_field(&mut self, source: &EventTables, step: &FieldPropagation) {
        let mut lookup: HashMap<String, Vec<FieldValue>> = HashMap::new();
        for row in source.rows(&step.from) {
            let (Some(key), Some(value)) = (row.distinct_key(&step.key), row.fields.get(&step.field))
            else {
                continue;
            };
            lookup.entry(key).or_default().push(value.clone());
        }
        for values in lookup.values_mut() {
            values.sort_by(FieldValue::total_cmp);
        }

        let Some(target) = self.tables.get_mut(&step.to) else {
            tracing::warn!("propagation target table '{}' not found", step.to);
            return;
        };

        let before = target.len();
        let mut matched = 0usize;
        let mut joined = Vec::with_capacity(before);
        for row in target.drain(..) {
            let values = row
                .distinct_key(&step.key)
                .and_then(|key| lookup.get(&key));
            match values {
                Some(values) => {
                    matched += 1;
                    for value in values {
                        let mut row = row.clone();
                        row.fields.insert(step.field.clone(), value.clone());
                        joined.push(row);
                    }
                }
                None => joined.push(row),
            }
        }
        *target = joined;

        tracing::debug!(
            "propagated '{}' from '{}' to '{}' on '{}': {}/{} rows matched, {} rows out",
            step.field,
            step.from,
            step.to,
            step.key,
            matched,
            before,
            target.len()
        );
    }

    /// Apply every step in order. Each step reads from the tables as they
    /// were before any step ran, so an earlier fan-out never multiplies a
    /// later one.
    pub fn propagated(&self, steps: &[FieldPropagation]) -> EventTables {
        let mut enriched = self.clone();
        for step in steps {
            enriched.propagate_field(self, step);
        }
        enriched
    }
}
