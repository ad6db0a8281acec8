//! # Logflow
//!
//! DAG-orchestrated log ETL: raw log objects are listed and read from a
//! bucket, turned into typed feature rows, and loaded into a partitioned,
//! clustered analytical table.
//!
//! Logflow provides:
//!
//! - **DAG execution**: validated task graphs, retry with backoff, timeouts,
//!   downstream failure propagation and cancellation
//! - **Record transform**: pure parsing and feature derivation with
//!   per-record rejection instead of batch failure
//! - **Collaborator traits**: object store, table sink, notifier and run
//!   store, each with in-memory and local-filesystem implementations
//! - **Observability**: run events and structured `tracing` logs
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use logflow::prelude::*;
//! use std::sync::Arc;
//!
//! let config = EtlConfig::load(None)?;
//! let collaborators = EtlCollaborators::new(
//!     Arc::new(LocalDirObjectStore::new("./buckets")),
//!     Arc::new(JsonlTableSink::open("features.jsonl").await?),
//! );
//! let report = build_log_etl_executor(&config, &collaborators)?.run().await;
//! assert!(report.is_success());
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod alert;
pub mod cancellation;
pub mod config;
pub mod core;
pub mod dag;
pub mod errors;
pub mod etl;
pub mod events;
pub mod observability;
pub mod state;
pub mod tasks;
pub mod testing;
pub mod transform;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::alert::{CollectingNotifier, FailureNotice, LoggingNotifier, Notifier};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::EtlConfig;
    pub use crate::core::{RunEvent, RunStatus, TaskOutput, TaskState};
    pub use crate::dag::{Dag, DagBuilder, DagExecutor, DagRunReport, RetryPolicy, TaskSpec};
    pub use crate::errors::{ConfigError, DagValidationError, LogflowError, TaskError};
    pub use crate::etl::{
        build_log_etl_dag, build_log_etl_executor, EtlCollaborators, InMemoryObjectStore, InMemoryTableSink,
        JsonlTableSink, LocalDirObjectStore, ObjectStore, TableRef, TableSink,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_logging, LogConfig, LogFormat};
    pub use crate::state::{InMemoryRunStore, JsonlRunStore, RunRecord, RunStore};
    pub use crate::tasks::{FnTask, Task, TaskContext};
    pub use crate::transform::{FeatureRow, LogLevel, TransformConfig};
    pub use crate::utils::{generate_run_id, iso_timestamp, Timestamp};
}
