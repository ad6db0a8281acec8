//! Analytical table the feature rows are loaded into.
//!
//! Loads are at-least-once: a retried load may deliver rows that already
//! landed. Every sink upserts by [`FeatureRow::row_key`], so repeating a
//! load never duplicates a row.

use crate::errors::TaskError;
use crate::transform::FeatureRow;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// A destination table with its layout.
///
/// Sinks keep rows and dedup keys apart per table name. The partitioning
/// and clustering columns describe the layout a warehouse table should be
/// created with; the local sinks record them but store rows unpartitioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    name: String,
    partition_field: String,
    cluster_fields: Vec<String>,
}

impl TableRef {
    /// Creates a reference partitioned by `event_date` and clustered by
    /// `service, log_level`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_field: "event_date".to_string(),
            cluster_fields: vec!["service".to_string(), "log_level".to_string()],
        }
    }

    /// Sets the partitioning column.
    #[must_use]
    pub fn with_partition_field(mut self, field: impl Into<String>) -> Self {
        self.partition_field = field.into();
        self
    }

    /// Sets the clustering columns.
    #[must_use]
    pub fn with_cluster_fields(mut self, fields: Vec<String>) -> Self {
        self.cluster_fields = fields;
        self
    }

    /// Fully qualified table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Partitioning column.
    #[must_use]
    pub fn partition_field(&self) -> &str {
        &self.partition_field
    }

    /// Clustering columns.
    #[must_use]
    pub fn cluster_fields(&self) -> &[String] {
        &self.cluster_fields
    }
}

/// Errors from a table sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The load failed in a way worth retrying.
    #[error("transient sink error: {0}")]
    Transient(String),

    /// Reading or writing the backing file failed.
    #[error("sink I/O error at {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A row could not be encoded or decoded.
    #[error("sink serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<SinkError> for TaskError {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::Transient(_) | SinkError::Io { .. } => Self::transient(err.to_string()),
            SinkError::Serialization(_) => Self::permanent(err.to_string()),
        }
    }
}

/// Appends feature rows to a table.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TableSink: Send + Sync {
    /// Writes `rows`, skipping any whose key is already in the table.
    ///
    /// Returns the number of rows newly written.
    async fn append_rows(&self, table: &TableRef, rows: &[FeatureRow]) -> Result<usize, SinkError>;
}

#[derive(Debug, Default)]
struct MemoryTable {
    keys: HashSet<String>,
    rows: Vec<FeatureRow>,
}

/// A table sink held in memory.
#[derive(Debug, Default)]
pub struct InMemoryTableSink {
    tables: RwLock<BTreeMap<String, MemoryTable>>,
    failing_appends: AtomicU32,
}

impl InMemoryTableSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the rows of `table` in write order.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<FeatureRow> {
        self.tables
            .read()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Makes the next `times` appends fail with a transient error.
    pub fn fail_next_appends(&self, times: u32) {
        self.failing_appends.store(times, Ordering::SeqCst);
    }
}

#[async_trait]
impl TableSink for InMemoryTableSink {
    async fn append_rows(&self, table: &TableRef, rows: &[FeatureRow]) -> Result<usize, SinkError> {
        let failing = self
            .failing_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(SinkError::Transient(format!("load into '{}' was rejected", table.name())));
        }

        let mut tables = self.tables.write();
        let target = tables.entry(table.name().to_string()).or_default();
        let mut written = 0;
        for row in rows {
            if target.keys.insert(row.row_key.clone()) {
                target.rows.push(row.clone());
                written += 1;
            }
        }
        Ok(written)
    }
}

#[derive(Deserialize)]
struct StoredKey {
    #[serde(default)]
    table: String,
    row_key: String,
}

#[derive(Serialize)]
struct StoredRow<'a> {
    table: &'a str,
    #[serde(flatten)]
    row: &'a FeatureRow,
}

/// A table sink writing one JSON object per line to a local file.
///
/// Every line carries the name of its table next to the row fields, and
/// keys are tracked per table. Keys already present in the file are loaded
/// on open, so rows from an earlier run are not written again.
#[derive(Debug)]
pub struct JsonlTableSink {
    path: PathBuf,
    keys: Mutex<HashMap<String, HashSet<String>>>,
}

impl JsonlTableSink {
    /// Opens the sink, reading the keys of any rows already in `path`.
    ///
    /// A trailing line without a newline is the remains of an interrupted
    /// write; it is cut from the file before any new rows are appended.
    ///
    /// # Errors
    ///
    /// Returns a `SinkError` if the existing file cannot be read or holds
    /// a complete line that is not a stored row.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        let mut keys: HashMap<String, HashSet<String>> = HashMap::new();

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => return Err(SinkError::Io { path, source }),
        };

        let complete = contents.rfind('\n').map_or(0, |idx| idx + 1);
        for line in contents[..complete].lines().filter(|l| !l.trim().is_empty()) {
            let stored: StoredKey = serde_json::from_str(line)?;
            keys.entry(stored.table).or_default().insert(stored.row_key);
        }

        if complete < contents.len() {
            warn!(
                path = %path.display(),
                dropped_bytes = contents.len() - complete,
                "Discarding incomplete trailing line"
            );
            truncate(&path, complete as u64).await?;
        }

        let existing: usize = keys.values().map(HashSet::len).sum();
        debug!(path = %path.display(), existing, "Opened JSONL table sink");
        Ok(Self {
            path,
            keys: Mutex::new(keys),
        })
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of distinct rows in the file, across all tables.
    pub async fn row_count(&self) -> usize {
        self.keys.lock().await.values().map(HashSet::len).sum()
    }

    /// Number of distinct rows stored for `table`.
    pub async fn table_row_count(&self, table: &str) -> usize {
        self.keys.lock().await.get(table).map_or(0, HashSet::len)
    }
}

async fn truncate(path: &Path, len: u64) -> Result<(), SinkError> {
    let io_err = |source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(io_err)?;
    file.set_len(len).await.map_err(io_err)
}

#[async_trait]
impl TableSink for JsonlTableSink {
    async fn append_rows(&self, table: &TableRef, rows: &[FeatureRow]) -> Result<usize, SinkError> {
        let io_err = |source| SinkError::Io {
            path: self.path.clone(),
            source,
        };

        let mut tables = self.keys.lock().await;
        let keys = tables.entry(table.name().to_string()).or_default();
        let mut batch_keys = HashSet::new();
        let mut buffer = String::new();
        for row in rows {
            if keys.contains(&row.row_key) || !batch_keys.insert(row.row_key.as_str()) {
                continue;
            }
            let stored = StoredRow {
                table: table.name(),
                row,
            };
            buffer.push_str(&serde_json::to_string(&stored)?);
            buffer.push('\n');
        }

        let written = batch_keys.len();
        if written > 0 {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
            }
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
                .map_err(io_err)?;
            let committed = file.metadata().await.map_err(io_err)?.len();

            let result = match file.write_all(buffer.as_bytes()).await {
                Ok(()) => file.flush().await,
                Err(err) => Err(err),
            };
            if let Err(source) = result {
                if let Err(rollback) = file.set_len(committed).await {
                    warn!(path = %self.path.display(), error = %rollback, "Could not roll back partial append");
                }
                return Err(io_err(source));
            }
            keys.extend(batch_keys.into_iter().map(String::from));
        }

        info!(
            table = %table.name(),
            path = %self.path.display(),
            written,
            skipped = rows.len() - written,
            "Appended rows"
        );
        Ok(written)
    }
}
