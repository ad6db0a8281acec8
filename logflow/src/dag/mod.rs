//! DAG definition, validation and execution.
//!
//! A [`DagBuilder`] collects [`TaskSpec`]s in any order and validates
//! them into a [`Dag`]. A [`DagExecutor`] runs the DAG: tasks start once
//! all their upstream tasks succeeded, independent tasks run
//! concurrently, failed attempts are retried per their [`RetryPolicy`],
//! and a terminal failure marks every descendant UPSTREAM_FAILED.

mod builder;
mod executor;
mod graph;
mod retry;
mod run;
mod spec;


pub use builder::DagBuilder;
pub use executor::DagExecutor;
pub use graph::Dag;
pub use retry::{BackoffStrategy, JitterStrategy, RetryDecision, RetryPolicy};
pub use run::{DagRunReport, TaskRecord};
pub use spec::TaskSpec;
