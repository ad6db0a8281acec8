//! Structured progress events emitted by the executor.

use super::TaskState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Event type emitted on every task state change.
pub const TASK_STATE_CHANGED: &str = "task.state_changed";
/// Event type emitted when a run starts.
pub const RUN_STARTED: &str = "run.started";
/// Event type emitted when a run reaches its terminal status.
pub const RUN_COMPLETED: &str = "run.completed";

/// An observability event produced during a DAG run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    /// The event type (e.g., "task.state_changed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// When the event occurred (RFC 3339, UTC).
    pub timestamp: String,

    /// The event payload data.
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
}

impl RunEvent {
    /// Creates a new event stamped with the current time.
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: crate::utils::iso_timestamp(),
            data: BTreeMap::new(),
        }
    }

    /// Adds a data field to the event.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Creates a "task.state_changed" event.
    #[must_use]
    pub fn state_changed(
        run_id: &str,
        task: &str,
        from: TaskState,
        to: TaskState,
        attempt: u32,
    ) -> Self {
        Self::new(TASK_STATE_CHANGED)
            .add_data("run_id", serde_json::json!(run_id))
            .add_data("task", serde_json::json!(task))
            .add_data("from", serde_json::json!(from))
            .add_data("to", serde_json::json!(to))
            .add_data("attempt", serde_json::json!(attempt))
    }

    /// Creates a "run.started" event.
    #[must_use]
    pub fn run_started(run_id: &str, dag: &str, task_count: usize) -> Self {
        Self::new(RUN_STARTED)
            .add_data("run_id", serde_json::json!(run_id))
            .add_data("dag", serde_json::json!(dag))
            .add_data("task_count", serde_json::json!(task_count))
    }

    /// Returns the payload as a JSON object, with `timestamp` folded in.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        let mut map: serde_json::Map<String, serde_json::Value> =
            self.data.clone().into_iter().collect();
        map.insert("timestamp".to_string(), serde_json::json!(self.timestamp));
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_changed_event() {
        let event = RunEvent::state_changed("run-1", "extract", TaskState::Ready, TaskState::Running, 1);

        assert_eq!(event.event_type, TASK_STATE_CHANGED);
        assert_eq!(event.data["task"], "extract");
        assert_eq!(event.data["from"], "READY");
        assert_eq!(event.data["to"], "RUNNING");
        assert_eq!(event.data["attempt"], 1);
    }

    #[test]
    fn test_payload_includes_timestamp() {
        let event = RunEvent::run_started("run-1", "logs", 4);
        let payload = event.payload();

        assert_eq!(payload["dag"], "logs");
        assert_eq!(payload["task_count"], 4);
        assert!(payload["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_event_serialization_renames_type() {
        let event = RunEvent::new(RUN_COMPLETED);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], RUN_COMPLETED);
    }
}
