//! Test assertions for run reports.

use crate::core::{RunStatus, TaskState};
use crate::dag::DagRunReport;

/// Asserts that the run succeeded.
pub fn assert_run_succeeded(report: &DagRunReport) {
    assert_eq!(
        report.status,
        RunStatus::Success,
        "Expected run to succeed, got reason: {:?}",
        report.reason
    );
}

/// Asserts that the run failed.
pub fn assert_run_failed(report: &DagRunReport) {
    assert_eq!(
        report.status,
        RunStatus::Failed,
        "Expected run to fail, task states: {:?}",
        report.tasks.iter().map(|(n, r)| (n, r.state)).collect::<Vec<_>>()
    );
}

/// Asserts the final state of a task.
pub fn assert_task_state(report: &DagRunReport, task: &str, expected: TaskState) {
    assert_eq!(
        report.state_of(task),
        Some(expected),
        "Expected task '{task}' to be {expected}"
    );
}

/// Asserts the number of attempts a task made.
pub fn assert_task_attempts(report: &DagRunReport, task: &str, expected: u32) {
    let actual = report.task(task).map(|record| record.attempts);
    assert_eq!(
        actual,
        Some(expected),
        "Expected task '{task}' to make {expected} attempt(s)"
    );
}
