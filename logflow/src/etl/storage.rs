//! Object storage the raw logs are read from.

use crate::errors::TaskError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;
use tracing::debug;

/// Errors from an object store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Network trouble, throttling or another failure worth retrying.
    #[error("transient storage error: {0}")]
    Transient(String),

    /// The bucket or object does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<StorageError> for TaskError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Transient(message) => Self::transient(message),
            StorageError::NotFound(message) => Self::not_found(message),
        }
    }
}

/// Read access to a bucket of log objects.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Lists object names in `bucket` starting with `prefix`, sorted.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Reads the full contents of one object.
    async fn read_object(&self, bucket: &str, object: &str) -> Result<Vec<u8>, StorageError>;
}

/// Object store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    buckets: RwLock<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
    failing_lists: AtomicU32,
}

impl InMemoryObjectStore {
    /// Creates an empty store with no buckets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty bucket.
    #[must_use]
    pub fn with_bucket(self, bucket: impl Into<String>) -> Self {
        self.buckets.write().entry(bucket.into()).or_default();
        self
    }

    /// Adds an object, creating the bucket if needed.
    #[must_use]
    pub fn with_object(self, bucket: &str, object: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.put(bucket, object, contents);
        self
    }

    /// Adds or replaces an object.
    pub fn put(&self, bucket: &str, object: &str, contents: impl Into<Vec<u8>>) {
        self.buckets
            .write()
            .entry(bucket.to_string())
            .or_default()
            .insert(object.to_string(), contents.into());
    }

    /// Makes the next `times` listings fail with a transient error.
    pub fn fail_next_lists(&self, times: u32) {
        self.failing_lists.store(times, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        let failing = self
            .failing_lists
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(StorageError::Transient(format!("listing bucket '{bucket}' timed out")));
        }

        let buckets = self.buckets.read();
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::NotFound(format!("bucket '{bucket}'")))?;
        Ok(objects.keys().filter(|name| name.starts_with(prefix)).cloned().collect())
    }

    async fn read_object(&self, bucket: &str, object: &str) -> Result<Vec<u8>, StorageError> {
        self.buckets
            .read()
            .get(bucket)
            .and_then(|objects| objects.get(object))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("object '{bucket}/{object}'")))
    }
}

/// Object store backed by a local directory.
///
/// By default every bucket is a subdirectory of the root. With
/// [`LocalDirObjectStore::single_bucket`] the directory itself is the
/// bucket, whatever name is asked for. Object names are paths relative to
/// the bucket directory, separated by `/`.
#[derive(Debug, Clone)]
pub struct LocalDirObjectStore {
    root: PathBuf,
    single_bucket: bool,
}

impl LocalDirObjectStore {
    /// Creates a store whose buckets are subdirectories of `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            single_bucket: false,
        }
    }

    /// Creates a store serving `dir` as its only bucket.
    #[must_use]
    pub fn single_bucket(dir: impl Into<PathBuf>) -> Self {
        Self {
            root: dir.into(),
            single_bucket: true,
        }
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        if self.single_bucket {
            self.root.clone()
        } else {
            self.root.join(bucket)
        }
    }
}

fn io_error(err: &io::Error, what: &Path) -> StorageError {
    if err.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound(what.display().to_string())
    } else {
        StorageError::Transient(format!("{}: {err}", what.display()))
    }
}

#[async_trait]
impl ObjectStore for LocalDirObjectStore {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        let base = self.bucket_dir(bucket);
        let mut objects = Vec::new();
        let mut pending = vec![base.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| io_error(&e, &dir))?;
            while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&e, &dir))? {
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(|e| io_error(&e, &path))?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&base) else {
                    continue;
                };
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if name.starts_with(prefix) {
                    objects.push(name);
                }
            }
        }

        objects.sort();
        debug!(bucket, prefix, count = objects.len(), "Listed local objects");
        Ok(objects)
    }

    async fn read_object(&self, bucket: &str, object: &str) -> Result<Vec<u8>, StorageError> {
        let path = object
            .split('/')
            .fold(self.bucket_dir(bucket), |path, part| path.join(part));
        tokio::fs::read(&path).await.map_err(|e| io_error(&e, &path))
    }
}
