//! # Logging & Tracing Infrastructure
//!
//! Provides structured logging with `tracing` crate, supporting:
//! - Pretty, compact and JSON console output
//! - Module-level filtering
//! - An optional daily rolling log file
//! - Span contexts so every line of a sweep carries its `sweep_id`
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, FileLogConfig, LogFormat, LogLevel, LoggingConfig};
//!
//! let config = LoggingConfig::default()
//!     .with_format(LogFormat::Compact)
//!     .with_level(LogLevel::Debug)
//!     .with_file(FileLogConfig::new("logs"));
//!
//! // Keep the guard alive for the lifetime of the process so the file writer flushes.
//! let _guard = init_logging(config)?;
//! tracing::info!("Monitor starting");
//! ```

use crate::error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Minimum level of emitted events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable pretty format with colors
    Pretty,
    /// Structured JSON format for machine parsing
    Json,
    /// Compact format for production
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        return Self::Pretty;

        #[cfg(not(debug_assertions))]
        return Self::Compact;
    }
}

/// Daily rolling log file next to the console output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLogConfig {
    /// Directory that receives the log files
    pub directory: PathBuf,
    /// File name prefix; the date is appended on rotation
    pub file_name_prefix: String,
}

impl FileLogConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    pub fn with_file_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_name_prefix = prefix.into();
        self
    }
}

impl Default for FileLogConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file_name_prefix: "attachment.log".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Minimum log level
    pub level: LogLevel,
    /// Custom filter string (e.g., "core_sync=debug,provider_vika=trace")
    pub filter: Option<String>,
    /// Enable span contexts
    pub enable_spans: bool,
    /// Display target module in logs
    pub display_target: bool,
    /// Display thread info
    pub display_thread_info: bool,
    /// Optional rolling file output
    pub file: Option<FileLogConfig>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            enable_spans: true,
            display_target: true,
            display_thread_info: false,
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Set log format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set minimum log level
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Set custom filter string
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Enable or disable span contexts
    pub fn with_spans(mut self, enable: bool) -> Self {
        self.enable_spans = enable;
        self
    }

    /// Enable or disable target display
    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }

    /// Enable or disable thread info
    pub fn with_thread_info(mut self, display: bool) -> Self {
        self.display_thread_info = display;
        self
    }

    /// Also write to a daily rolling file
    pub fn with_file(mut self, file: FileLogConfig) -> Self {
        self.file = Some(file);
        self
    }
}

/// Initialize the logging system
///
/// This should be called once during application startup. Subsequent calls
/// will return an error.
///
/// Returns the file writer guard when file output is enabled; dropping it
/// flushes and stops the background writer.
///
/// # Errors
///
/// Returns an error if:
/// - Logging is already initialized
/// - The filter string is invalid
/// - The log directory cannot be created
pub fn init_logging(config: LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(&config)?;
    let (file_writer, guard) = match open_log_file(&config)? {
        Some((writer, guard)) => (Some(writer), Some(guard)),
        None => (None, None),
    };

    match config.format {
        LogFormat::Pretty => init_pretty_logging(&config, filter, file_writer)?,
        LogFormat::Json => init_json_logging(&config, filter, file_writer)?,
        LogFormat::Compact => init_compact_logging(&config, filter, file_writer)?,
    }

    Ok(guard)
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let base_level = config.level.as_str();

    let filter_string = if let Some(custom_filter) = &config.filter {
        custom_filter.clone()
    } else {
        // Default filter: our crates at specified level, dependencies at warn
        format!(
            "abnormal_photo_sync={},core_runtime={},core_sync={},core_service={},\
             provider_vika={},bridge_desktop={},h2=warn,hyper=warn,reqwest=warn,rustls=warn",
            base_level, base_level, base_level, base_level, base_level, base_level
        )
    };

    EnvFilter::try_new(filter_string)
        .map_err(|e| Error::Config(format!("Invalid log filter: {}", e)))
}

fn open_log_file(config: &LoggingConfig) -> Result<Option<(NonBlocking, WorkerGuard)>> {
    let Some(file) = &config.file else {
        return Ok(None);
    };

    std::fs::create_dir_all(&file.directory).map_err(|e| {
        Error::Config(format!(
            "Failed to create log directory {}: {}",
            file.directory.display(),
            e
        ))
    })?;

    let appender = tracing_appender::rolling::daily(&file.directory, &file.file_name_prefix);
    Ok(Some(tracing_appender::non_blocking(appender)))
}

fn span_events(config: &LoggingConfig) -> tracing_subscriber::fmt::format::FmtSpan {
    if config.enable_spans {
        tracing_subscriber::fmt::format::FmtSpan::CLOSE
    } else {
        tracing_subscriber::fmt::format::FmtSpan::NONE
    }
}

fn init_pretty_logging(
    config: &LoggingConfig,
    filter: EnvFilter,
    file_writer: Option<NonBlocking>,
) -> Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_target(config.display_target)
        .with_thread_ids(config.display_thread_info)
        .with_thread_names(config.display_thread_info)
        .with_span_events(span_events(config))
        .with_writer(io::stdout);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(file_writer.map(|writer| {
            // Plain text on disk
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
        }))
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

fn init_json_logging(
    config: &LoggingConfig,
    filter: EnvFilter,
    file_writer: Option<NonBlocking>,
) -> Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(config.enable_spans)
        .with_span_list(config.enable_spans)
        .with_target(config.display_target)
        .with_thread_ids(config.display_thread_info)
        .with_thread_names(config.display_thread_info)
        .with_writer(io::stdout);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(file_writer.map(|writer| {
            // Plain text on disk
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
        }))
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

fn init_compact_logging(
    config: &LoggingConfig,
    filter: EnvFilter,
    file_writer: Option<NonBlocking>,
) -> Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(config.display_target)
        .with_thread_ids(config.display_thread_info)
        .with_thread_names(config.display_thread_info)
        .with_writer(io::stdout);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(file_writer.map(|writer| {
            // Plain text on disk
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
        }))
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

/// Helper function to redact sensitive field values
///
/// ```
/// use core_runtime::logging::redact_if_sensitive;
///
/// assert_eq!(redact_if_sensitive("api_token", "usk123"), "[REDACTED]");
/// assert_eq!(redact_if_sensitive("barcode", "B1"), "B1");
/// ```
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    const SENSITIVE_FIELDS: &[&str] = &[
        "token",
        "password",
        "secret",
        "api_key",
        "authorization",
        "bearer",
    ];

    let field_lower = field_name.to_lowercase();
    if SENSITIVE_FIELDS.iter().any(|&f| field_lower.contains(f)) {
        "[REDACTED]".to_string()
    } else if value.contains('@') && value.contains('.') {
        // Likely an email - redact domain but keep first char
        if let Some(at_pos) = value.find('@') {
            format!("{}***@[REDACTED]", &value[..1.min(at_pos)])
        } else {
            value.to_string()
        }
    } else {
        value.to_string()
    }
}

/// Strip full file paths to basename only
///
/// ```
/// use core_runtime::logging::strip_path;
///
/// assert_eq!(strip_path("C:\\watch_folder\\B1\\a.jpg"), "a.jpg");
/// ```
pub fn strip_path(path: &str) -> &str {
    path.rsplit('/')
        .next()
        .unwrap_or(path)
        .rsplit('\\')
        .next()
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_builder() {
        let config = LoggingConfig::default()
            .with_format(LogFormat::Json)
            .with_level(LogLevel::Debug)
            .with_filter("core_sync=trace")
            .with_spans(true)
            .with_target(true)
            .with_thread_info(true)
            .with_file(FileLogConfig::new("/tmp/logs").with_file_name_prefix("sync.log"));

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.filter, Some("core_sync=trace".to_string()));
        assert!(config.enable_spans);
        assert!(config.display_target);
        assert!(config.display_thread_info);
        let file = config.file.unwrap();
        assert_eq!(file.directory, PathBuf::from("/tmp/logs"));
        assert_eq!(file.file_name_prefix, "sync.log");
    }

    #[test]
    fn test_redact_if_sensitive() {
        assert_eq!(redact_if_sensitive("api_token", "usk123"), "[REDACTED]");
        assert_eq!(redact_if_sensitive("Authorization", "Bearer x"), "[REDACTED]");

        let redacted = redact_if_sensitive("email", "user@example.com");
        assert!(redacted.starts_with('u'));
        assert!(redacted.contains("[REDACTED]"));

        assert_eq!(redact_if_sensitive("record_id", "rec123"), "rec123");
    }

    #[test]
    fn test_strip_path() {
        assert_eq!(strip_path("/srv/watch/B1/a.jpg"), "a.jpg");
        assert_eq!(strip_path("C:\\watch_folder\\B1\\b.JPG"), "b.JPG");
        assert_eq!(strip_path("a.jpg"), "a.jpg");
        assert_eq!(strip_path("/var/log/"), "");
    }

    #[test]
    fn test_build_filter() {
        let config = LoggingConfig::default().with_level(LogLevel::Debug);
        let filter = build_filter(&config).unwrap();
        assert!(filter.to_string().contains("core_sync=debug"));
    }

    #[test]
    fn test_build_custom_filter() {
        let config = LoggingConfig::default().with_filter("provider_vika=trace,core_sync=debug");
        let filter = build_filter(&config).unwrap();
        assert!(filter.to_string().contains("provider_vika=trace"));
    }

    #[test]
    fn test_invalid_filter_is_config_error() {
        let config = LoggingConfig::default().with_filter("core_sync=notalevel");
        assert!(matches!(build_filter(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_logging_section_from_toml() {
        let config: LoggingConfig = toml::from_str(
            r#"
            level = "warn"
            format = "json"

            [file]
            directory = "var/log"
            "#,
        )
        .unwrap();

        assert_eq!(config.level, LogLevel::Warn);
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.enable_spans);
        let file = config.file.unwrap();
        assert_eq!(file.directory, PathBuf::from("var/log"));
        assert_eq!(file.file_name_prefix, "attachment.log");
    }
}
