//! # Upload Cache
//!
//! Persisted ledger of which photo files each remote record has already
//! received.
//!
//! ## Overview
//!
//! The ledger maps a record id to a [`CacheEntry`]. It is loaded at the start
//! of every sweep and saved at the end (or after every record, see
//! [`CacheFlushPolicy`](crate::config::CacheFlushPolicy)). Expiry is lazy:
//! entries past `expire_at` are dropped while loading, so the next save removes
//! them from storage.
//!
//! ## Failure model
//!
//! The cache fails open. An unreadable or corrupt file loads as an empty
//! ledger and a failed write is logged; the worst outcome is a redundant
//! upload, never a stalled pipeline.
//!
//! ## File format
//!
//! ```json
//! {
//!   "rec123": {
//!     "barcode": "216789",
//!     "uploaded_files": ["a.jpg", "b.jpg"],
//!     "upload_time": "2025-01-01T08:00:00Z",
//!     "expire_at": "2025-01-02T08:00:00Z"
//!   }
//! }
//! ```

use crate::barcode::normalize;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Upload state of one remote record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Barcode the photos were found under
    pub barcode: String,
    /// Basenames already transferred; only ever grows
    pub uploaded_files: BTreeSet<String>,
    pub upload_time: DateTime<Utc>,
    /// Always `upload_time + ttl`
    pub expire_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expire_at
    }
}

/// Raw persistence of the ledger.
///
/// Implementations only move bytes; expiry and merging live in
/// [`UploadLedger`].
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Stored entries. A missing store is an empty map, not an error.
    async fn read(&self) -> Result<BTreeMap<String, CacheEntry>>;

    /// Replace the stored entries.
    async fn write(&self, entries: &BTreeMap<String, CacheEntry>) -> Result<()>;
}

/// In-memory view of the cache for one sweep
#[derive(Debug, Clone, PartialEq)]
pub struct UploadLedger {
    entries: BTreeMap<String, CacheEntry>,
    ttl: Duration,
    evicted: usize,
    dirty: bool,
}

impl UploadLedger {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: BTreeMap::new(),
            ttl,
            evicted: 0,
            dirty: false,
        }
    }

    /// Load from `store`, dropping entries that expired before `now`.
    ///
    /// Read failures are logged and produce an empty ledger.
    pub async fn load(store: &dyn CacheStore, ttl: Duration, now: DateTime<Utc>) -> Self {
        let stored = match store.read().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Upload cache unreadable, starting empty");
                BTreeMap::new()
            }
        };

        let total = stored.len();
        let entries: BTreeMap<String, CacheEntry> = stored
            .into_iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .collect();
        let evicted = total - entries.len();

        info!(entries = entries.len(), evicted, "Loaded upload cache");

        Self {
            entries,
            ttl,
            evicted,
            dirty: evicted > 0,
        }
    }

    /// Persist all entries. Returns `false` (after logging) when the write fails.
    pub async fn save(&mut self, store: &dyn CacheStore) -> bool {
        match store.write(&self.entries).await {
            Ok(()) => {
                debug!(entries = self.entries.len(), "Saved upload cache");
                self.dirty = false;
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to save upload cache");
                false
            }
        }
    }

    /// Entry exists and was refreshed less than one TTL ago.
    pub fn is_recent(&self, record_id: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .get(record_id)
            .map(|entry| now - entry.upload_time < self.ttl)
            .unwrap_or(false)
    }

    /// Record `files` as uploaded for `record_id`.
    ///
    /// Existing basenames are kept; timestamps move to `now`.
    pub fn put<I, S>(&mut self, record_id: &str, barcode: &str, files: I, now: DateTime<Utc>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let expire_at = now + self.ttl;
        let entry = self
            .entries
            .entry(record_id.to_string())
            .or_insert_with(|| CacheEntry {
                barcode: barcode.to_string(),
                uploaded_files: BTreeSet::new(),
                upload_time: now,
                expire_at,
            });

        entry.barcode = barcode.to_string();
        entry.uploaded_files.extend(files.into_iter().map(Into::into));
        entry.upload_time = now;
        entry.expire_at = expire_at;
        self.dirty = true;
    }

    pub fn get(&self, record_id: &str) -> Option<&CacheEntry> {
        self.entries.get(record_id)
    }

    /// Most recently refreshed entry whose barcode normalizes to the same key.
    pub fn find_by_barcode(&self, barcode: &str) -> Option<(&str, &CacheEntry)> {
        let key = normalize(barcode);
        self.entries
            .iter()
            .filter(|(_, entry)| normalize(&entry.barcode) == key)
            .max_by_key(|(_, entry)| entry.upload_time)
            .map(|(id, entry)| (id.as_str(), entry))
    }

    pub fn entries(&self) -> &BTreeMap<String, CacheEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries dropped as expired during [`UploadLedger::load`]
    pub fn evicted(&self) -> usize {
        self.evicted
    }

    /// Changed since load or last successful save
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// JSON file store
///
/// Writes go to a sibling temp file which is then renamed over the target.
#[derive(Debug, Clone)]
pub struct JsonFileCacheStore {
    path: PathBuf,
}

impl JsonFileCacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CacheStore for JsonFileCacheStore {
    async fn read(&self) -> Result<BTreeMap<String, CacheEntry>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(SyncError::io(&self.path, e)),
        };

        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        let document: Map<String, Value> = serde_json::from_str(&raw)
            .map_err(|e| SyncError::Cache(format!("{}: {}", self.path.display(), e)))?;

        let mut entries = BTreeMap::new();
        for (record_id, value) in document {
            match serde_json::from_value::<CacheEntry>(value) {
                Ok(entry) => {
                    entries.insert(record_id, entry);
                }
                Err(e) => warn!(record_id = %record_id, error = %e, "Dropping unreadable cache entry"),
            }
        }
        Ok(entries)
    }

    async fn write(&self, entries: &BTreeMap<String, CacheEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::io(parent, e))?;
        }

        let body = serde_json::to_string_pretty(entries)
            .map_err(|e| SyncError::Cache(e.to_string()))?;

        let temp = self.temp_path();
        tokio::fs::write(&temp, body)
            .await
            .map_err(|e| SyncError::io(&temp, e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| SyncError::io(&self.path, e))?;
        Ok(())
    }
}

/// Process-local store, used when no cache file is configured and in tests
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<BTreeMap<String, CacheEntry>>,
    writes: Mutex<usize>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: BTreeMap<String, CacheEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            writes: Mutex::new(0),
        }
    }

    pub async fn snapshot(&self) -> BTreeMap<String, CacheEntry> {
        self.entries.lock().await.clone()
    }

    /// Number of completed writes
    pub async fn write_count(&self) -> usize {
        *self.writes.lock().await
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn read(&self) -> Result<BTreeMap<String, CacheEntry>> {
        Ok(self.entries.lock().await.clone())
    }

    async fn write(&self, entries: &BTreeMap<String, CacheEntry>) -> Result<()> {
        *self.entries.lock().await = entries.clone();
        *self.writes.lock().await += 1;
        Ok(())
    }
}
