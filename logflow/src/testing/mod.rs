//! Testing utilities for logflow DAGs.
//!
//! This module provides:
//! - Scripted tasks and a concurrency probe
//! - Assertions over run reports
//! - Sample log objects

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_run_failed, assert_run_succeeded, assert_task_attempts, assert_task_state};
pub use fixtures::{sample_rows, SAMPLE_LOG_CSV, SAMPLE_LOG_TSV};
pub use mocks::{AttemptRecord, ConcurrencyProbe, ScriptedTask};
