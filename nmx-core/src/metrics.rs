//! Per-event scalar metrics and the engine contract that produces them.

use crate::{Event, Settings};
use std::collections::BTreeMap;

/// One scalar metric value with its description.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricValue {
    pub value: f64,
    pub description: String,
}

impl MetricValue {
    #[must_use]
    pub fn new(value: f64, description: &str) -> Self {
        Self {
            value,
            description: description.to_string(),
        }
    }
}

/// Ordered name → metric mapping.
///
/// Iteration order is by name, so two sets built from identical inputs
/// always iterate identically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSet {
    data: BTreeMap<String, MetricValue>,
}

impl MetricSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Sets a metric value and description.
    pub fn set(&mut self, name: &str, value: f64, description: &str) {
        self.data
            .insert(name.to_string(), MetricValue::new(value, description));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.data.get(name)
    }

    #[must_use]
    pub fn value(&self, name: &str) -> Option<f64> {
        self.data.get(name).map(|m| m.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricValue)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copies `other` in, prefixing each name.
    pub fn merge(&mut self, other: &MetricSet, prepend: &str) {
        for (name, value) in &other.data {
            self.data.insert(format!("{prepend}{name}"), value.clone());
        }
    }
}

/// Computes scalar metrics for one raw event.
///
/// Implementations must be pure: the same event and parameters always
/// yield the same metric names in the same order.
pub trait MetricEngine {
    /// Parameters an analysis starts out with.
    fn default_parameters(&self) -> Settings;

    /// Computes all metrics for `event`.
    fn compute(&self, event: &Event, params: &Settings) -> MetricSet;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_is_name_ordered() {
        let mut m = MetricSet::new();
        m.set("y_center", 2.0, "");
        m.set("x_center", 1.0, "");
        let names: Vec<_> = m.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["x_center", "y_center"]);
    }

    #[test]
    fn test_merge_with_prefix() {
        let mut plane = MetricSet::new();
        plane.set("integral", 10.0, "sum of adc");
        let mut all = MetricSet::new();
        all.merge(&plane, "x_");
        assert_eq!(all.value("x_integral"), Some(10.0));
        assert_eq!(all.get("x_integral").unwrap().description, "sum of adc");
    }
}
