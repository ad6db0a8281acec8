//! Core domain model types for logflow.
//!
//! This module contains the fundamental types shared by the executor and
//! the tasks it runs:
//! - Task state and run status enums
//! - Task output (the hand-off value)
//! - Run progress events

mod event;
mod output;
mod status;

pub use event::{RunEvent, RUN_COMPLETED, RUN_STARTED, TASK_STATE_CHANGED};
pub use output::TaskOutput;
pub use status::{RunStatus, TaskState};
