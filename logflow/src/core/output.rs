//! Task output: the hand-off value a successful task passes downstream.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The output of a successful task attempt.
///
/// Downstream tasks receive read-only views of these values; nothing a task
/// returns can be mutated once the executor has stored it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    /// Hand-off values keyed by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, serde_json::Value>,

    /// Numeric metrics copied into the persisted run record.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, f64>,
}

impl TaskOutput {
    /// Creates an output with no data.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates an output with a single JSON value.
    #[must_use]
    pub fn value(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self::empty().with_value(key, value)
    }

    /// Adds a JSON value.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Serializes `value` and stores it under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be represented as JSON.
    pub fn with_typed<T: Serialize>(
        mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        self.data.insert(key.into(), serde_json::to_value(value)?);
        Ok(self)
    }

    /// Adds a metric.
    #[must_use]
    pub fn with_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    /// Gets a raw value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Deserializes the value stored under `key`.
    ///
    /// Returns `Ok(None)` when the key is absent.
    pub fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        self.data
            .get(key)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
    }

    /// Gets a metric.
    #[must_use]
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_and_get() {
        let output = TaskOutput::value("objects", serde_json::json!(["a.tsv", "b.tsv"]));
        assert_eq!(output.get("objects").unwrap()[1], "b.tsv");
        assert!(output.get("missing").is_none());
    }

    #[test]
    fn test_typed_round_trip() {
        let objects = vec!["logs/a.tsv".to_string()];
        let output = TaskOutput::empty().with_typed("objects", &objects).unwrap();

        let decoded: Option<Vec<String>> = output.get_typed("objects").unwrap();
        assert_eq!(decoded, Some(objects));

        let missing: Option<Vec<String>> = output.get_typed("nope").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_typed_mismatch_is_error() {
        let output = TaskOutput::value("count", serde_json::json!("three"));
        assert!(output.get_typed::<u64>("count").is_err());
    }

    #[test]
    fn test_metrics() {
        let output = TaskOutput::empty()
            .with_metric("records_accepted", 10.0)
            .with_metric("records_rejected", 2.0);
        assert_eq!(output.metric("records_accepted"), Some(10.0));
        assert_eq!(output.metric("rows_written"), None);
    }
}
