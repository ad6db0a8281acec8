//! Results of one DAG run.

use crate::core::{RunStatus, TaskOutput, TaskState};
use crate::errors::TaskError;
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Final bookkeeping for one task of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Final state.
    pub state: TaskState,
    /// Number of attempts started.
    pub attempts: u32,
    /// The error of the last failed attempt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<TaskError>,
    /// Total time spent in attempts, in milliseconds.
    pub duration_ms: f64,
    /// Metrics reported by the successful attempt.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, f64>,
}

impl TaskRecord {
    /// Creates a record for a task that has not run.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            state: TaskState::Pending,
            attempts: 0,
            last_error: None,
            duration_ms: 0.0,
            metrics: BTreeMap::new(),
        }
    }
}

/// The outcome of a DAG run.
#[derive(Debug, Clone)]
pub struct DagRunReport {
    /// Unique id of the run.
    pub run_id: String,
    /// The DAG name.
    pub dag: String,
    /// When the run started.
    pub started_at: Timestamp,
    /// When the run reached its terminal status.
    pub finished_at: Timestamp,
    /// Terminal status.
    pub status: RunStatus,
    /// Why the run failed, if it did.
    pub reason: Option<String>,
    /// Per-task records keyed by task name.
    pub tasks: BTreeMap<String, TaskRecord>,
    /// Outputs of the tasks that succeeded.
    pub outputs: BTreeMap<String, Arc<TaskOutput>>,
}

impl DagRunReport {
    /// Returns true if every task succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Returns the record of a task.
    #[must_use]
    pub fn task(&self, name: &str) -> Option<&TaskRecord> {
        self.tasks.get(name)
    }

    /// Returns the state of a task.
    #[must_use]
    pub fn state_of(&self, name: &str) -> Option<TaskState> {
        self.tasks.get(name).map(|record| record.state)
    }

    /// Returns the output of a task that succeeded.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&TaskOutput> {
        self.outputs.get(name).map(AsRef::as_ref)
    }

    /// Returns the names of tasks in a given state.
    #[must_use]
    pub fn tasks_in(&self, state: TaskState) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|(_, record)| record.state == state)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Returns the run duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn report() -> DagRunReport {
        let mut tasks = BTreeMap::new();
        tasks.insert(
            "extract".to_string(),
            TaskRecord {
                state: TaskState::Succeeded,
                attempts: 1,
                ..TaskRecord::pending()
            },
        );
        tasks.insert(
            "load".to_string(),
            TaskRecord {
                state: TaskState::Failed,
                attempts: 2,
                last_error: Some(TaskError::transient("503")),
                ..TaskRecord::pending()
            },
        );
        let now = Utc::now();
        DagRunReport {
            run_id: "run-1".to_string(),
            dag: "logs".to_string(),
            started_at: now,
            finished_at: now,
            status: RunStatus::Failed,
            reason: Some("task 'load' failed".to_string()),
            tasks,
            outputs: BTreeMap::from([("extract".to_string(), Arc::new(TaskOutput::empty()))]),
        }
    }

    #[test]
    fn test_report_accessors() {
        let report = report();
        assert!(!report.is_success());
        assert_eq!(report.state_of("load"), Some(TaskState::Failed));
        assert_eq!(report.task("load").unwrap().attempts, 2);
        assert_eq!(report.tasks_in(TaskState::Succeeded), vec!["extract"]);
        assert!(report.output("extract").is_some());
        assert!(report.output("load").is_none());
        assert_eq!(report.duration_ms(), 0);
    }

    #[test]
    fn test_task_record_serialization() {
        let record = report().tasks["load"].clone();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["state"], "FAILED");
        assert_eq!(json["last_error"]["kind"], "transient");
        assert!(json.get("metrics").is_none());

        let back: TaskRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
