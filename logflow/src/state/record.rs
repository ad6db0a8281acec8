//! Persistent summary of a run.

use crate::core::{RunStatus, TaskState};
use crate::dag::{DagRunReport, TaskRecord};
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metric name for records that became feature rows.
pub const RECORDS_ACCEPTED: &str = "records_accepted";
/// Metric name for records dropped by the transform.
pub const RECORDS_REJECTED: &str = "records_rejected";
/// Metric name for rows written by the sink.
pub const ROWS_WRITTEN: &str = "rows_written";

/// What the run store keeps for each run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique id of the run.
    pub run_id: String,
    /// The DAG name.
    pub dag: String,
    /// When the run started.
    pub started_at: Timestamp,
    /// When the run finished.
    pub finished_at: Timestamp,
    /// Terminal status.
    pub status: RunStatus,
    /// Why the run failed, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Per-task records.
    pub tasks: BTreeMap<String, TaskRecord>,
    /// Records accepted across all tasks.
    #[serde(default)]
    pub records_accepted: u64,
    /// Records rejected across all tasks.
    #[serde(default)]
    pub records_rejected: u64,
    /// Rows written to the sink.
    #[serde(default)]
    pub rows_written: u64,
}

impl RunRecord {
    /// Summarizes a report, totalling the batch metrics of every task.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_report(report: &DagRunReport) -> Self {
        let total = |metric: &str| -> u64 {
            let sum: f64 = report
                .tasks
                .values()
                .filter_map(|record| record.metrics.get(metric))
                .sum();
            sum.max(0.0).round() as u64
        };

        Self {
            run_id: report.run_id.clone(),
            dag: report.dag.clone(),
            started_at: report.started_at,
            finished_at: report.finished_at,
            status: report.status,
            reason: report.reason.clone(),
            tasks: report.tasks.clone(),
            records_accepted: total(RECORDS_ACCEPTED),
            records_rejected: total(RECORDS_REJECTED),
            rows_written: total(ROWS_WRITTEN),
        }
    }

    /// Returns the state of a task.
    #[must_use]
    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.tasks.get(task).map(|record| record.state)
    }
}
