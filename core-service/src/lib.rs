//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP client, remote
//! record store, clock, cache persistence) into the photo pipeline. Desktop
//! builds enable the `desktop-shims` feature (which depends on
//! `bridge-desktop`) to build every dependency straight from an
//! [`AppConfig`].

pub mod abnormal;
pub mod error;

pub use abnormal::{AbnormalMarker, MarkOutcome};
pub use error::{CoreError, Result};

use std::sync::Arc;
use std::time::Duration as StdDuration;

use bridge_traits::{Clock, RecordStore};
use core_runtime::config::AppConfig;
use core_runtime::events::{CoreEvent, EventBus, EventSeverity, EventStream, Receiver};
use core_sync::{
    CacheFlushPolicy, CacheStore, CompensationTask, CycleOutcome, MonitorConfig, MonitorState,
    PipelineConfig, ReconciliationTask, SweepContext, SweepMonitor, SweepOutcome,
};

/// Aggregated handle to all bridge dependencies the core requires.
#[derive(Clone)]
pub struct ServiceDependencies {
    pub record_store: Arc<dyn RecordStore>,
    pub cache_store: Arc<dyn CacheStore>,
    pub clock: Arc<dyn Clock>,
    pub events: Arc<EventBus>,
}

impl ServiceDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        record_store: Arc<dyn RecordStore>,
        cache_store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            record_store,
            cache_store,
            clock,
            events,
        }
    }

    /// Desktop bridges: reqwest HTTP, Vika connector behind a shared rate
    /// limiter, JSON cache file and the system clock.
    #[cfg(feature = "desktop-shims")]
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        use bridge_desktop::ReqwestHttpClient;
        use bridge_traits::SystemClock;
        use core_sync::JsonFileCacheStore;
        use provider_vika::{FieldSchema, RateLimiter, VikaConfig, VikaConnector};

        let remote = &config.remote;
        let http = ReqwestHttpClient::with_timeout(StdDuration::from_secs(remote.request_timeout_secs))
            .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let rate_limiter = Arc::new(RateLimiter::new(
            StdDuration::from_millis(remote.min_interval_ms),
            StdDuration::from_millis(remote.jitter_ms),
            clock.clone(),
        ));

        let mut vika = VikaConfig::new(remote.api_token.clone(), remote.datasheet_id.clone())
            .with_base_url(remote.base_url.clone())
            .with_schema(FieldSchema::for_datasheet(&remote.datasheet_id));
        if let Some(view_id) = &remote.view_id {
            vika = vika.with_view_id(view_id.clone());
        }

        let connector = VikaConnector::new(Arc::new(http), rate_limiter, vika);

        Ok(Self::new(
            Arc::new(connector),
            Arc::new(JsonFileCacheStore::new(config.pipeline.cache_file.clone())),
            clock,
            Arc::new(EventBus::default()),
        ))
    }
}

/// Pipeline settings from the `[watch]` and `[pipeline]` sections
pub fn pipeline_config(config: &AppConfig) -> PipelineConfig {
    let pipeline = &config.pipeline;
    let flush_policy = if pipeline.flush_each_record {
        CacheFlushPolicy::AfterEachRecord
    } else {
        CacheFlushPolicy::EndOfSweep
    };

    PipelineConfig::new(config.watch.root.clone())
        .with_cache_ttl(chrono::Duration::hours(pipeline.cache_ttl_hours))
        .with_record_delay(StdDuration::from_millis(pipeline.record_delay_ms))
        .with_compensation_window(chrono::Duration::hours(pipeline.compensation_window_hours))
        .with_attachment_field(pipeline.attachment_field.clone())
        .with_barcode_field(pipeline.barcode_field.clone())
        .with_flag_field(pipeline.flag_field.clone())
        .with_flush_policy(flush_policy)
}

/// Monitor schedule from the `[pipeline]` section
pub fn monitor_config(config: &AppConfig) -> MonitorConfig {
    MonitorConfig::default()
        .with_interval(StdDuration::from_secs(config.pipeline.interval_secs))
        .with_stop_timeout(StdDuration::from_secs(config.pipeline.stop_timeout_secs))
}

/// Primary façade exposed to the binary.
pub struct PhotoSyncService {
    deps: ServiceDependencies,
    reconcile: Arc<ReconciliationTask>,
    monitor: SweepMonitor,
    marker: AbnormalMarker,
}

impl PhotoSyncService {
    /// Create a new service from the provided dependencies.
    ///
    /// Every task shares one sweep lock, so scheduled sweeps and one-off
    /// barcode triggers never overlap.
    pub fn new(config: &AppConfig, deps: ServiceDependencies) -> Result<Self> {
        let pipeline = pipeline_config(config);
        pipeline.validate()?;

        let ctx = SweepContext::new(
            deps.record_store.clone(),
            deps.cache_store.clone(),
            deps.clock.clone(),
            deps.events.clone(),
            pipeline,
        );
        let reconcile = Arc::new(ReconciliationTask::new(ctx.clone()));
        let compensate = Arc::new(CompensationTask::new(ctx));
        let monitor = SweepMonitor::new(
            reconcile.clone(),
            compensate,
            deps.events.clone(),
            monitor_config(config),
        );
        let marker = AbnormalMarker::new(
            deps.record_store.clone(),
            config.pipeline.barcode_field.clone(),
            config.pipeline.flag_field.clone(),
        );

        Ok(Self {
            deps,
            reconcile,
            monitor,
            marker,
        })
    }

    /// Validate the configuration, resolve the watch root to an absolute
    /// path and build the desktop dependencies.
    #[cfg(feature = "desktop-shims")]
    pub fn bootstrap(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let mut config = config.clone();
        config.resolve_watch_root()?;
        let config = &config;
        let deps = ServiceDependencies::from_config(config)?;
        tracing::info!(
            watch_root = %config.watch.root.display(),
            datasheet = %config.remote.datasheet_id,
            "Photo sync service initialized"
        );
        Self::new(config, deps)
    }

    /// Access the bridge dependencies being used by the service.
    pub fn dependencies(&self) -> &ServiceDependencies {
        &self.deps
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.deps.events.subscribe()
    }

    /// Events at or above `min_severity`, e.g. for an operator-facing log.
    pub fn event_stream(&self, min_severity: EventSeverity) -> EventStream {
        EventStream::new(self.subscribe()).filter(move |event| event.severity() >= min_severity)
    }

    /// Start the background monitor; `false` if it was already running.
    pub async fn start_monitor(&self) -> bool {
        self.monitor.start().await
    }

    pub async fn stop_monitor(&self) -> Result<()> {
        Ok(self.monitor.stop().await?)
    }

    pub async fn monitor_state(&self) -> MonitorState {
        self.monitor.state().await
    }

    /// One reconciliation + compensation cycle in the caller's task.
    pub async fn run_once(&self) -> CycleOutcome {
        self.monitor.run_cycle().await
    }

    pub async fn sync_barcode(&self, barcode: &str) -> Result<SweepOutcome> {
        Ok(self.reconcile.sync_barcode(barcode).await?)
    }

    pub async fn mark_abnormal(&self, package_no: &str, abnormal: bool) -> Result<MarkOutcome> {
        self.marker.mark(package_no, abnormal).await
    }
}
