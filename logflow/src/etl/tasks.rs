//! The four tasks of the log ETL DAG.
//!
//! Each task holds its collaborators and reads its inputs only from the
//! outputs of its declared upstream tasks.

use super::sink::{TableRef, TableSink};
use super::storage::ObjectStore;
use crate::core::TaskOutput;
use crate::errors::TaskError;
use crate::state::{RECORDS_ACCEPTED, RECORDS_REJECTED, ROWS_WRITTEN};
use crate::tasks::{Task, TaskContext};
use crate::transform::{process_object, BatchStats, FeatureRow, TransformConfig};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Name of the listing task.
pub const LIST_LOG_FILES: &str = "list_log_files";
/// Name of the task that logs the listed objects.
pub const LOG_LOG_FILES: &str = "log_log_files";
/// Name of the transform task.
pub const TRANSFORM_LOGS: &str = "transform_logs";
/// Name of the load task.
pub const LOAD_FEATURES: &str = "load_features";

/// Output key holding the listed object names.
pub const OBJECTS_KEY: &str = "objects";
/// Output key holding the transformed rows.
pub const ROWS_KEY: &str = "rows";
/// Output key holding the transform counts.
pub const STATS_KEY: &str = "stats";

fn typed_output<T: serde::Serialize>(key: &str, value: &T) -> Result<TaskOutput, TaskError> {
    TaskOutput::empty()
        .with_typed(key, value)
        .map_err(|err| TaskError::permanent(format!("cannot encode '{key}': {err}")))
}

fn read_objects(ctx: &TaskContext) -> Result<Vec<String>, TaskError> {
    ctx.upstream()
        .require(LIST_LOG_FILES)?
        .get_typed::<Vec<String>>(OBJECTS_KEY)?
        .ok_or_else(|| TaskError::permanent(format!("'{LIST_LOG_FILES}' produced no object list")))
}

/// Lists the log objects in the source bucket.
pub struct ListObjectsTask {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
}

impl ListObjectsTask {
    /// Creates the task.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }
}

impl fmt::Debug for ListObjectsTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListObjectsTask")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Task for ListObjectsTask {
    fn name(&self) -> &str {
        LIST_LOG_FILES
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        let objects = self.store.list_objects(&self.bucket, &self.prefix).await?;
        info!(
            run_id = %ctx.run_id(),
            bucket = %self.bucket,
            prefix = %self.prefix,
            count = objects.len(),
            "Listed log objects"
        );
        #[allow(clippy::cast_precision_loss)]
        let count = objects.len() as f64;
        Ok(typed_output(OBJECTS_KEY, &objects)?.with_metric("objects_listed", count))
    }
}

/// Logs every listed object name.
#[derive(Debug, Clone, Default)]
pub struct LogObjectsTask;

impl LogObjectsTask {
    /// Creates the task.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Task for LogObjectsTask {
    fn name(&self) -> &str {
        LOG_LOG_FILES
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        let objects = read_objects(ctx)?;
        if objects.is_empty() {
            info!(run_id = %ctx.run_id(), "No log objects found");
        }
        for object in &objects {
            info!(run_id = %ctx.run_id(), object = %object, "Found log object");
        }
        Ok(TaskOutput::empty())
    }
}

/// Reads every listed object and turns its records into feature rows.
///
/// Malformed records are rejected and counted; only an unreadable object
/// or a header without the required columns fails the task.
pub struct TransformLogsTask {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    config: TransformConfig,
}

impl TransformLogsTask {
    /// Creates the task.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, config: TransformConfig) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            config,
        }
    }
}

impl fmt::Debug for TransformLogsTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformLogsTask")
            .field("bucket", &self.bucket)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Task for TransformLogsTask {
    fn name(&self) -> &str {
        TRANSFORM_LOGS
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        let objects = read_objects(ctx)?;
        let mut rows: Vec<FeatureRow> = Vec::new();
        let mut stats = BatchStats::default();

        for object in &objects {
            let bytes = self.store.read_object(&self.bucket, object).await?;
            let batch = process_object(object, &bytes, &self.config)?;
            info!(
                run_id = %ctx.run_id(),
                object = %object,
                accepted = batch.stats.accepted,
                rejected = batch.stats.rejected,
                "Transformed log object"
            );
            stats.merge(&batch.stats);
            rows.extend(batch.rows);
        }

        if stats.rejected > 0 {
            warn!(
                run_id = %ctx.run_id(),
                rejected = stats.rejected,
                by_reason = ?stats.rejected_by_reason,
                "Some log records were rejected"
            );
        }

        #[allow(clippy::cast_precision_loss)]
        let (accepted, rejected) = (stats.accepted as f64, stats.rejected as f64);
        Ok(typed_output(ROWS_KEY, &rows)?
            .with_typed(STATS_KEY, &stats)?
            .with_metric(RECORDS_ACCEPTED, accepted)
            .with_metric(RECORDS_REJECTED, rejected))
    }
}

/// Loads the transformed rows into the destination table.
pub struct LoadFeaturesTask {
    sink: Arc<dyn TableSink>,
    table: TableRef,
}

impl LoadFeaturesTask {
    /// Creates the task.
    #[must_use]
    pub fn new(sink: Arc<dyn TableSink>, table: TableRef) -> Self {
        Self { sink, table }
    }
}

impl fmt::Debug for LoadFeaturesTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadFeaturesTask")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Task for LoadFeaturesTask {
    fn name(&self) -> &str {
        LOAD_FEATURES
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        let rows: Vec<FeatureRow> = ctx
            .upstream()
            .require(TRANSFORM_LOGS)?
            .get_typed(ROWS_KEY)?
            .ok_or_else(|| TaskError::permanent(format!("'{TRANSFORM_LOGS}' produced no rows")))?;

        let written = self.sink.append_rows(&self.table, &rows).await?;
        info!(
            run_id = %ctx.run_id(),
            table = %self.table.name(),
            rows = rows.len(),
            written,
            "Loaded feature rows"
        );
        #[allow(clippy::cast_precision_loss)]
        let written = written as f64;
        Ok(TaskOutput::empty().with_metric(ROWS_WRITTEN, written))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::etl::sink::{InMemoryTableSink, MockTableSink, SinkError};
    use crate::etl::storage::{InMemoryObjectStore, MockObjectStore, StorageError};
    use crate::tasks::UpstreamOutputs;
    use crate::testing::{SAMPLE_LOG_CSV, SAMPLE_LOG_TSV};
    use pretty_assertions::assert_eq;
    use std::collections::{BTreeMap, BTreeSet};

    fn context(task: &str, upstream: Vec<(&str, TaskOutput)>) -> TaskContext {
        let declared: BTreeSet<String> = upstream.iter().map(|(name, _)| (*name).to_string()).collect();
        let outputs: BTreeMap<String, Arc<TaskOutput>> = upstream
            .into_iter()
            .map(|(name, output)| (name.to_string(), Arc::new(output)))
            .collect();
        TaskContext::new(
            "run-1",
            task,
            1,
            UpstreamOutputs::new(task, declared, outputs),
            Arc::new(CancellationToken::new()),
        )
    }

    fn listed(objects: &[&str]) -> TaskOutput {
        TaskOutput::empty().with_typed(OBJECTS_KEY, &objects).unwrap()
    }

    #[tokio::test]
    async fn test_list_objects() {
        let store = Arc::new(
            InMemoryObjectStore::new()
                .with_object("raw", "2024/a.csv", "")
                .with_object("raw", "other.csv", ""),
        );
        let task = ListObjectsTask::new(store, "raw", "2024/");

        let output = task.execute(&TaskContext::detached(LIST_LOG_FILES)).await.unwrap();
        let objects: Vec<String> = output.get_typed(OBJECTS_KEY).unwrap().unwrap();
        assert_eq!(objects, vec!["2024/a.csv"]);
        assert_eq!(output.metric("objects_listed"), Some(1.0));
    }

    #[tokio::test]
    async fn test_list_objects_maps_storage_errors() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .returning(|bucket, _| Err(StorageError::NotFound(format!("bucket '{bucket}'"))));
        let task = ListObjectsTask::new(Arc::new(store), "raw", "");

        let err = task.execute(&TaskContext::detached(LIST_LOG_FILES)).await.unwrap_err();
        assert_eq!(err, TaskError::not_found("bucket 'raw'"));
    }

    #[tokio::test]
    async fn test_log_objects_requires_listing() {
        let task = LogObjectsTask::new();
        let ok = task
            .execute(&context(LOG_LOG_FILES, vec![(LIST_LOG_FILES, listed(&["a.csv"]))]))
            .await;
        assert!(ok.is_ok());

        let err = task.execute(&TaskContext::detached(LOG_LOG_FILES)).await.unwrap_err();
        assert_eq!(err.kind(), "permanent");
    }

    #[tokio::test]
    async fn test_transform_reads_every_object() {
        let store = Arc::new(
            InMemoryObjectStore::new()
                .with_object("raw", "day1.csv", SAMPLE_LOG_CSV)
                .with_object("raw", "day2.csv", "2024-01-02T09:00:00Z,svcB,INFO,hello\n"),
        );
        let task = TransformLogsTask::new(store, "raw", TransformConfig::new());

        let output = task
            .execute(&context(
                TRANSFORM_LOGS,
                vec![(LIST_LOG_FILES, listed(&["day1.csv", "day2.csv"]))],
            ))
            .await
            .unwrap();

        let rows: Vec<FeatureRow> = output.get_typed(ROWS_KEY).unwrap().unwrap();
        let stats: BatchStats = output.get_typed(STATS_KEY).unwrap().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].source_object, "day2.csv");
        assert_eq!(stats.total, 4);
        assert_eq!(output.metric(RECORDS_ACCEPTED), Some(3.0));
        assert_eq!(output.metric(RECORDS_REJECTED), Some(1.0));
    }

    #[tokio::test]
    async fn test_transform_bad_header_is_permanent() {
        let store = Arc::new(InMemoryObjectStore::new().with_object(
            "raw",
            "sample_logs.csv",
            "timestamp\tservice\tmessage\n2024-01-01T10:00:00Z\tauth\tok\n",
        ));
        let config = TransformConfig::new().with_delimiter('\t').with_header(true);
        let task = TransformLogsTask::new(store, "raw", config);

        let err = task
            .execute(&context(TRANSFORM_LOGS, vec![(LIST_LOG_FILES, listed(&["sample_logs.csv"]))]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "permanent");
        assert!(err.to_string().contains("level"));
    }

    #[tokio::test]
    async fn test_transform_header_file() {
        let store = Arc::new(InMemoryObjectStore::new().with_object("raw", "sample_logs.csv", SAMPLE_LOG_TSV));
        let config = TransformConfig::new().with_delimiter('\t').with_header(true);
        let task = TransformLogsTask::new(store, "raw", config);

        let output = task
            .execute(&context(TRANSFORM_LOGS, vec![(LIST_LOG_FILES, listed(&["sample_logs.csv"]))]))
            .await
            .unwrap();
        let rows: Vec<FeatureRow> = output.get_typed(ROWS_KEY).unwrap().unwrap();
        assert!(rows.iter().all(|row| row.user_id.is_some()));
    }

    #[tokio::test]
    async fn test_transform_read_failure_is_transient() {
        let mut store = MockObjectStore::new();
        store
            .expect_read_object()
            .times(1)
            .returning(|_, _| Err(StorageError::Transient("connection reset".into())));
        let task = TransformLogsTask::new(Arc::new(store), "raw", TransformConfig::new());

        let err = task
            .execute(&context(TRANSFORM_LOGS, vec![(LIST_LOG_FILES, listed(&["a.csv"]))]))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_load_writes_rows() {
        let rows = crate::testing::sample_rows();
        let sink = Arc::new(InMemoryTableSink::new());
        let task = LoadFeaturesTask::new(sink.clone(), TableRef::new("features"));
        let upstream = TaskOutput::empty().with_typed(ROWS_KEY, &rows).unwrap();

        let output = task
            .execute(&context(LOAD_FEATURES, vec![(TRANSFORM_LOGS, upstream.clone())]))
            .await
            .unwrap();
        assert_eq!(output.metric(ROWS_WRITTEN), Some(2.0));
        assert_eq!(sink.rows("features").len(), 2);

        let again = task
            .execute(&context(LOAD_FEATURES, vec![(TRANSFORM_LOGS, upstream)]))
            .await
            .unwrap();
        assert_eq!(again.metric(ROWS_WRITTEN), Some(0.0));
    }

    #[tokio::test]
    async fn test_load_failure_is_retryable() {
        let mut sink = MockTableSink::new();
        sink.expect_append_rows()
            .returning(|_, _| Err(SinkError::Transient("quota exceeded".into())));
        let task = LoadFeaturesTask::new(Arc::new(sink), TableRef::new("features"));
        let upstream = TaskOutput::empty().with_typed(ROWS_KEY, &Vec::<FeatureRow>::new()).unwrap();

        let err = task
            .execute(&context(LOAD_FEATURES, vec![(TRANSFORM_LOGS, upstream)]))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
