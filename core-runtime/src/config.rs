//! # Application Configuration
//!
//! File- and environment-driven configuration for the photo sync service.
//!
//! ## Overview
//!
//! Configuration is read from a TOML file whose sections are all optional and
//! fall back to built-in defaults. Secrets and the watch root may be overridden
//! from the environment so the file can be checked in without credentials.
//! [`AppConfig::validate`] fails fast on anything that would prevent the
//! monitor from doing useful work.
//!
//! ## Example file
//!
//! ```toml
//! [watch]
//! root = "D:/watch_folder"
//!
//! [remote]
//! datasheet_id = "dstsnDVylQhjuBiSEo"
//! # api_token comes from PHOTO_SYNC_API_TOKEN
//!
//! [pipeline]
//! cache_file = "logs/attachment_cache.json"
//! cache_ttl_hours = 24
//! interval_secs = 600
//!
//! [logging]
//! level = "info"
//! format = "compact"
//!
//! [logging.file]
//! directory = "logs"
//! ```

use crate::error::{Error, Result};
use crate::logging::{redact_if_sensitive, LoggingConfig};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable holding the remote API token
pub const ENV_API_TOKEN: &str = "PHOTO_SYNC_API_TOKEN";

/// Environment variable overriding `[watch] root`
pub const ENV_WATCH_ROOT: &str = "PHOTO_SYNC_WATCH_ROOT";

/// Shortest allowed monitor interval
pub const MIN_INTERVAL_SECS: u64 = 60;

/// Default Vika datasheet (receiving records)
pub const DEFAULT_DATASHEET_ID: &str = "dstsnDVylQhjuBiSEo";

fn default_watch_root() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\watch_folder")
    } else {
        PathBuf::from("./watch_folder")
    }
}

/// Local photo drop folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Directory whose immediate subdirectories are named by barcode
    pub root: PathBuf,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: default_watch_root(),
        }
    }
}

/// Remote record store connection
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub api_token: String,
    pub datasheet_id: String,
    pub view_id: Option<String>,
    pub base_url: String,
    /// Minimum spacing between API calls
    pub min_interval_ms: u64,
    /// Random extra spacing, uniform in `0..=jitter_ms`
    pub jitter_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            datasheet_id: DEFAULT_DATASHEET_ID.to_string(),
            view_id: None,
            base_url: "https://api.vika.cn/fusion/v1".to_string(),
            min_interval_ms: 1200,
            jitter_ms: 400,
            request_timeout_secs: 30,
        }
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("api_token", &redact_if_sensitive("api_token", &self.api_token))
            .field("datasheet_id", &self.datasheet_id)
            .field("view_id", &self.view_id)
            .field("base_url", &self.base_url)
            .field("min_interval_ms", &self.min_interval_ms)
            .field("jitter_ms", &self.jitter_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Reconciliation / compensation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Persisted upload ledger
    pub cache_file: PathBuf,
    pub cache_ttl_hours: i64,
    /// Pause after each record that reached the remote store
    pub record_delay_ms: u64,
    /// Pause between monitor cycles
    pub interval_secs: u64,
    /// Directories modified longer ago than this are not rescanned
    pub compensation_window_hours: i64,
    /// Logical key of the attachment field
    pub attachment_field: String,
    /// Logical key of the package barcode field
    pub barcode_field: String,
    /// Logical key of the abnormal flag
    pub flag_field: String,
    /// Write the ledger after every uploaded record instead of once per sweep
    pub flush_each_record: bool,
    /// Bounded wait for the current cycle when stopping
    pub stop_timeout_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            cache_file: PathBuf::from("logs/attachment_cache.json"),
            cache_ttl_hours: 24,
            record_delay_ms: 1500,
            interval_secs: 600,
            compensation_window_hours: 24,
            attachment_field: "abnormalPhotos".to_string(),
            barcode_field: "packageNo".to_string(),
            flag_field: "abnormal".to_string(),
            flush_each_record: false,
            stop_timeout_secs: 30,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub watch: WatchConfig,
    pub remote: RemoteConfig,
    pub pipeline: PipelineSettings,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))
    }

    /// Read a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Load from an optional file, apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        config.resolve_watch_root()?;
        Ok(config)
    }

    /// Replace the watch root with its absolute, canonical form.
    pub fn resolve_watch_root(&mut self) -> Result<()> {
        self.watch.root = std::fs::canonicalize(&self.watch.root).map_err(|e| {
            Error::Config(format!(
                "Cannot resolve watch root {}: {}",
                self.watch.root.display(),
                e
            ))
        })?;
        Ok(())
    }

    /// Apply `PHOTO_SYNC_*` overrides using the given lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(ENV_API_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.remote.api_token = token.trim().to_string();
        }
        if let Some(root) = lookup(ENV_WATCH_ROOT).filter(|v| !v.trim().is_empty()) {
            self.watch.root = PathBuf::from(root.trim());
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if:
    /// - The API token or datasheet id is empty
    /// - The watch root is not an existing directory
    /// - The cache TTL or compensation window is not positive
    /// - The monitor interval is below one minute
    pub fn validate(&self) -> Result<()> {
        if self.remote.api_token.trim().is_empty() {
            return Err(Error::Config(format!(
                "API token is required; set remote.api_token or {}",
                ENV_API_TOKEN
            )));
        }

        if self.remote.datasheet_id.trim().is_empty() {
            return Err(Error::Config("Datasheet id cannot be empty".to_string()));
        }

        if !self.watch.root.is_dir() {
            return Err(Error::Config(format!(
                "Watch root {} is not a directory",
                self.watch.root.display()
            )));
        }

        if self.pipeline.cache_ttl_hours <= 0 {
            return Err(Error::Config(
                "Cache TTL must be greater than 0 hours".to_string(),
            ));
        }

        if self.pipeline.compensation_window_hours <= 0 {
            return Err(Error::Config(
                "Compensation window must be greater than 0 hours".to_string(),
            ));
        }

        if self.pipeline.interval_secs < MIN_INTERVAL_SECS {
            return Err(Error::Config(format!(
                "Monitor interval must be at least {} seconds",
                MIN_INTERVAL_SECS
            )));
        }

        if self.pipeline.attachment_field.trim().is_empty()
            || self.pipeline.barcode_field.trim().is_empty()
            || self.pipeline.flag_field.trim().is_empty()
        {
            return Err(Error::Config("Field keys cannot be empty".to_string()));
        }

        Ok(())
    }
}
