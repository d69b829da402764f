//! Runtime settings for sweeps and the monitor.

use crate::error::{Result, SyncError};
use chrono::Duration;
use std::path::PathBuf;
use std::time::Duration as StdDuration;

/// When the upload ledger is written back during a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheFlushPolicy {
    /// Once, after the last record
    #[default]
    EndOfSweep,
    /// After every record whose photos were uploaded, then once more at the end
    AfterEachRecord,
}

/// Settings shared by the reconciliation and compensation sweeps
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory whose subdirectories hold photos per barcode
    pub watch_root: PathBuf,

    /// Lifetime of a ledger entry after its last upload
    pub cache_ttl: Duration,

    /// Pause after each record that reached the remote store
    pub record_delay: StdDuration,

    /// Compensation only rescans directories modified within this window
    pub compensation_window: Duration,

    /// Logical key of the attachment field
    pub attachment_field: String,

    /// Logical key of the barcode field
    pub barcode_field: String,

    /// Logical key of the abnormal flag
    pub flag_field: String,

    pub flush_policy: CacheFlushPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            watch_root: PathBuf::from("watch_folder"),
            cache_ttl: Duration::hours(24),
            record_delay: StdDuration::from_millis(1500),
            compensation_window: Duration::hours(24),
            attachment_field: "abnormalPhotos".to_string(),
            barcode_field: "packageNo".to_string(),
            flag_field: "abnormal".to_string(),
            flush_policy: CacheFlushPolicy::EndOfSweep,
        }
    }
}

impl PipelineConfig {
    pub fn new(watch_root: impl Into<PathBuf>) -> Self {
        Self {
            watch_root: watch_root.into(),
            ..Self::default()
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_record_delay(mut self, delay: StdDuration) -> Self {
        self.record_delay = delay;
        self
    }

    pub fn with_compensation_window(mut self, window: Duration) -> Self {
        self.compensation_window = window;
        self
    }

    pub fn with_attachment_field(mut self, field: impl Into<String>) -> Self {
        self.attachment_field = field.into();
        self
    }

    pub fn with_barcode_field(mut self, field: impl Into<String>) -> Self {
        self.barcode_field = field.into();
        self
    }

    pub fn with_flag_field(mut self, field: impl Into<String>) -> Self {
        self.flag_field = field.into();
        self
    }

    pub fn with_flush_policy(mut self, policy: CacheFlushPolicy) -> Self {
        self.flush_policy = policy;
        self
    }

    /// # Errors
    ///
    /// `SyncError::Config` for a non-positive TTL or compensation window, or
    /// an empty field key.
    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl <= Duration::zero() {
            return Err(SyncError::Config("cache TTL must be positive".to_string()));
        }
        if self.compensation_window <= Duration::zero() {
            return Err(SyncError::Config(
                "compensation window must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("attachment field", &self.attachment_field),
            ("barcode field", &self.barcode_field),
            ("flag field", &self.flag_field),
        ] {
            if value.trim().is_empty() {
                return Err(SyncError::Config(format!("{} cannot be empty", name)));
            }
        }
        Ok(())
    }
}

/// Scheduling of the background monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Pause between the end of one cycle and the start of the next
    pub interval: StdDuration,
    /// Bounded wait for the running cycle on stop
    pub stop_timeout: StdDuration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: StdDuration::from_secs(600),
            stop_timeout: StdDuration::from_secs(30),
        }
    }
}

impl MonitorConfig {
    pub fn with_interval(mut self, interval: StdDuration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: StdDuration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}
