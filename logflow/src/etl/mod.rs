//! The log ETL pipeline: object storage to feature rows to a table.
//!
//! Collaborators are traits ([`ObjectStore`], [`TableSink`]) with
//! in-memory and local-filesystem implementations, so the whole DAG runs
//! offline.

mod pipeline;
mod sink;
mod storage;
mod tasks;

pub use pipeline::{build_log_etl_dag, build_log_etl_executor, EtlCollaborators, TASK_ORDER};
pub use sink::{InMemoryTableSink, JsonlTableSink, SinkError, TableRef, TableSink};
pub use storage::{InMemoryObjectStore, LocalDirObjectStore, ObjectStore, StorageError};
pub use tasks::{
    ListObjectsTask, LoadFeaturesTask, LogObjectsTask, TransformLogsTask, LIST_LOG_FILES, LOAD_FEATURES,
    LOG_LOG_FILES, OBJECTS_KEY, ROWS_KEY, STATS_KEY, TRANSFORM_LOGS,
};

#[cfg(test)]
pub use sink::MockTableSink;
#[cfg(test)]
pub use storage::MockObjectStore;
