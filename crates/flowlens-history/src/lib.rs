#![warn(missing_docs)]
//! # flowlens-history
//!
//! ## Purpose
//! Keeps generated guides for later retrieval.
//!
//! ## Responsibilities
//! - Assign ids and creation timestamps to saved guides.
//! - Keep at most [`DEFAULT_CAPACITY`] records, newest first, evicting the
//!   oldest.
//! - Offer a volatile store and a durable JSON-file store behind one
//!   [`HistoryStore`] trait.
//!
//! ## Data flow
//! Session applies a generated guide -> [`HistoryStore::save`] -> record
//! prepended and log truncated -> presentation reads [`HistoryStore::list`].
//!
//! ## Error model
//! I/O, codec, and lock failures return [`HistoryError`]. The session logs
//! them and keeps showing the guide.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use flowlens_core::{Guide, HistoryRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of records kept by default.
pub const DEFAULT_CAPACITY: usize = 50;

/// Capacity-bounded guide history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Saves a guide as the newest record.
    ///
    /// # Errors
    /// Returns [`HistoryError`] when the record cannot be stored.
    async fn save(&self, guide: &Guide) -> Result<HistoryRecord, HistoryError>;

    /// Lists stored records, newest first.
    ///
    /// # Errors
    /// Returns [`HistoryError`] when records cannot be read.
    async fn list(&self) -> Result<Vec<HistoryRecord>, HistoryError>;

    /// Removes every record.
    ///
    /// # Errors
    /// Returns [`HistoryError`] when the store cannot be emptied.
    async fn clear(&self) -> Result<(), HistoryError>;
}

/// In-memory record log shared by both store implementations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryLog {
    capacity: usize,
    records: Vec<HistoryRecord>,
}

impl HistoryLog {
    /// Creates an empty log.
    ///
    /// # Errors
    /// Returns [`HistoryError::InvalidCapacity`] when `capacity == 0`.
    pub fn new(capacity: usize) -> Result<Self, HistoryError> {
        if capacity == 0 {
            return Err(HistoryError::InvalidCapacity);
        }
        Ok(Self {
            capacity,
            records: Vec::new(),
        })
    }

    /// Prepends a record and evicts anything beyond capacity.
    pub fn push(&mut self, record: HistoryRecord) {
        self.records.insert(0, record);
        self.records.truncate(self.capacity);
    }

    /// Records, newest first.
    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    /// Drops every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    fn restore(capacity: usize, mut records: Vec<HistoryRecord>) -> Self {
        records.truncate(capacity);
        Self { capacity, records }
    }
}

/// Builds a new record with a random id and the current time.
pub fn new_record(guide: &Guide) -> HistoryRecord {
    let timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default();
    let entropy: [u8; 8] = rand::random();

    HistoryRecord {
        id: format!("{timestamp_ms:x}-{}", hex::encode(entropy)),
        guide: guide.clone(),
        timestamp_ms,
    }
}

/// Volatile history store.
#[derive(Debug)]
pub struct InMemoryHistory {
    log: Mutex<HistoryLog>,
}

impl InMemoryHistory {
    /// Creates a store with [`DEFAULT_CAPACITY`].
    pub fn new() -> Self {
        Self {
            log: Mutex::new(HistoryLog::restore(DEFAULT_CAPACITY, Vec::new())),
        }
    }

    /// Creates a store with a custom capacity.
    ///
    /// # Errors
    /// Returns [`HistoryError::InvalidCapacity`] when `capacity == 0`.
    pub fn with_capacity(capacity: usize) -> Result<Self, HistoryError> {
        Ok(Self {
            log: Mutex::new(HistoryLog::new(capacity)?),
        })
    }
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn save(&self, guide: &Guide) -> Result<HistoryRecord, HistoryError> {
        let record = new_record(guide);
        lock_log(&self.log)?.push(record.clone());
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        Ok(lock_log(&self.log)?.records().to_vec())
    }

    async fn clear(&self) -> Result<(), HistoryError> {
        lock_log(&self.log)?.clear();
        Ok(())
    }
}

/// History store persisted as one JSON document.
///
/// # Notes
/// Every mutation rewrites the whole file through a sibling temp file and a
/// rename, so a crash mid-write leaves the previous document intact. The
/// in-memory log only changes after the file write succeeds.
#[derive(Debug)]
pub struct JsonFileHistory {
    path: PathBuf,
    log: tokio::sync::Mutex<HistoryLog>,
}

impl JsonFileHistory {
    /// Opens (or lazily creates) the history file at `path`.
    ///
    /// A file that cannot be parsed is logged and treated as empty; it is
    /// overwritten on the next save.
    ///
    /// # Errors
    /// Returns [`HistoryError::InvalidCapacity`] for zero capacity and
    /// [`HistoryError::Io`] when an existing file cannot be read.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Result<Self, HistoryError> {
        if capacity == 0 {
            return Err(HistoryError::InvalidCapacity);
        }

        let path = path.into();
        let records = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            match serde_json::from_str::<Vec<HistoryRecord>>(&raw) {
                Ok(records) => records,
                Err(error) => {
                    tracing::warn!(
                        path = %path.display(),
                        %error,
                        "history file is unreadable; starting empty"
                    );
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        tracing::info!(path = %path.display(), records = records.len(), "history opened");
        Ok(Self {
            path,
            log: tokio::sync::Mutex::new(HistoryLog::restore(capacity, records)),
        })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `next` to disk on the blocking pool.
    ///
    /// The caller holds the log lock for the whole write, so writes never
    /// interleave, and only commits `next` to memory once this returns `Ok`.
    async fn persist(&self, next: &HistoryLog) -> Result<(), HistoryError> {
        let path = self.path.clone();
        let records = next.records().to_vec();
        tokio::task::spawn_blocking(move || write_records(&path, &records))
            .await
            .map_err(|error| HistoryError::Worker(error.to_string()))?
    }
}

fn write_records(path: &Path, records: &[HistoryRecord]) -> Result<(), HistoryError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let serialized = serde_json::to_vec_pretty(records)?;
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, serialized)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

#[async_trait]
impl HistoryStore for JsonFileHistory {
    async fn save(&self, guide: &Guide) -> Result<HistoryRecord, HistoryError> {
        let record = new_record(guide);
        let mut log = self.log.lock().await;
        let mut next = log.clone();
        next.push(record.clone());
        self.persist(&next).await?;
        *log = next;
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        Ok(self.log.lock().await.records().to_vec())
    }

    async fn clear(&self) -> Result<(), HistoryError> {
        let mut log = self.log.lock().await;
        let mut next = log.clone();
        next.clear();
        self.persist(&next).await?;
        *log = next;
        Ok(())
    }
}

fn lock_log(log: &Mutex<HistoryLog>) -> Result<MutexGuard<'_, HistoryLog>, HistoryError> {
    log.lock().map_err(|_| HistoryError::Poisoned)
}

/// History store errors.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Capacity must be strictly positive.
    #[error("history capacity must be greater than zero")]
    InvalidCapacity,
    /// File system failure.
    #[error("history i/o failure: {0}")]
    Io(#[from] std::io::Error),
    /// JSON encoding failure.
    #[error("history codec failure: {0}")]
    Codec(#[from] serde_json::Error),
    /// Blocking file writer did not complete.
    #[error("history writer failed: {0}")]
    Worker(String),
    /// Record lock was poisoned by a panicking writer.
    #[error("history lock poisoned")]
    Poisoned,
}
