//! Collaborators and steps shared by every sweep.

use crate::cache::{CacheStore, UploadLedger};
use crate::config::{CacheFlushPolicy, PipelineConfig};
use crate::lock::SweepLock;
use crate::report::{SweepKind, SweepReport};
use crate::resolver::{basename, list_images};
use crate::Result;
use bridge_traits::{Clock, RecordMatch, RecordStore};
use core_runtime::events::{CoreEvent, EventBus, SweepEvent};
use core_runtime::logging::strip_path;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything a sweep needs, injected rather than global.
///
/// Cloning is cheap and clones share the same lock, so a reconciliation task
/// and a compensation task built from one context exclude each other.
#[derive(Clone)]
pub struct SweepContext {
    pub store: Arc<dyn RecordStore>,
    pub cache: Arc<dyn CacheStore>,
    pub clock: Arc<dyn Clock>,
    pub events: Arc<EventBus>,
    pub lock: SweepLock,
    pub config: PipelineConfig,
}

/// How one record or directory ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ItemOutcome {
    Uploaded {
        record_id: String,
        barcode: String,
        files: u32,
    },
    Skipped,
    Failed,
}

impl SweepContext {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            cache,
            clock,
            events,
            lock: SweepLock::new(),
            config,
        }
    }

    /// Share an existing lock instead of the context's own
    pub fn with_lock(mut self, lock: SweepLock) -> Self {
        self.lock = lock;
        self
    }

    pub(crate) fn emit(&self, event: SweepEvent) {
        self.events.emit(CoreEvent::Sweep(event)).ok();
    }

    pub(crate) async fn load_ledger(&self) -> UploadLedger {
        UploadLedger::load(
            self.cache.as_ref(),
            self.config.cache_ttl,
            self.clock.now(),
        )
        .await
    }

    /// Upload `photos`, append them to the record, then delete the local copies.
    ///
    /// Any upload or append failure abandons the whole batch: nothing is
    /// deleted and the record is retried next cycle. Local deletion failures
    /// are only logged. Returns the basenames that reached the record.
    pub(crate) async fn transfer(&self, record_id: &str, photos: &[PathBuf]) -> Result<Vec<String>> {
        let mut handles = Vec::with_capacity(photos.len());
        for photo in photos {
            let handle = self.store.upload_attachment(photo).await?;
            debug!(record_id, file = %basename(photo), "Uploaded photo");
            handles.push(handle);
        }

        self.store
            .append_attachments(
                &RecordMatch::RecordId(record_id.to_string()),
                &self.config.attachment_field,
                &handles,
            )
            .await?;
        info!(record_id, files = handles.len(), "Attached photos to record");

        for photo in photos {
            if let Err(e) = tokio::fs::remove_file(photo).await {
                warn!(
                    file = %strip_path(&photo.to_string_lossy()),
                    error = %e,
                    "Uploaded photo could not be deleted"
                );
            }
        }

        Ok(photos.iter().map(|p| basename(p)).collect())
    }

    /// Remove `dir` if it no longer holds photos. Failures are logged.
    pub(crate) async fn remove_directory_if_done(&self, dir: &Path) {
        match list_images(dir) {
            Ok(remaining) if remaining.is_empty() => {}
            Ok(remaining) => {
                debug!(dir = %dir.display(), remaining = remaining.len(), "Directory still has photos");
                return;
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Cannot list directory for cleanup");
                return;
            }
        }

        match tokio::fs::remove_dir(dir).await {
            Ok(()) => info!(dir = %dir.display(), "Removed photo directory"),
            Err(e) => warn!(dir = %dir.display(), error = %e, "Photo directory not removed"),
        }
    }

    /// Apply one item's outcome to the report, persisting per the flush policy.
    pub(crate) async fn record_outcome(
        &self,
        outcome: ItemOutcome,
        ledger: &mut UploadLedger,
        report: &mut SweepReport,
    ) {
        match outcome {
            ItemOutcome::Uploaded {
                record_id,
                barcode,
                files,
            } => {
                report.records_uploaded += 1;
                report.files_uploaded += files;
                self.emit(SweepEvent::RecordUploaded {
                    sweep_id: report.sweep_id.to_string(),
                    record_id,
                    barcode,
                    files,
                });
                if self.config.flush_policy == CacheFlushPolicy::AfterEachRecord {
                    report.cache_saved &= ledger.save(self.cache.as_ref()).await;
                }
                self.throttle().await;
            }
            ItemOutcome::Skipped => report.records_skipped += 1,
            ItemOutcome::Failed => {
                report.records_failed += 1;
                self.throttle().await;
            }
        }
    }

    async fn throttle(&self) {
        if !self.config.record_delay.is_zero() {
            tokio::time::sleep(self.config.record_delay).await;
        }
    }

    pub(crate) fn emit_skipped(&self, kind: SweepKind) {
        info!(kind = %kind, "Another sweep is running, skipping");
        self.emit(SweepEvent::Skipped {
            kind: kind.to_string(),
        });
    }

    /// Final save (if anything changed) and completion event.
    pub(crate) async fn finish(
        &self,
        mut ledger: UploadLedger,
        mut report: SweepReport,
        started: Instant,
    ) -> SweepReport {
        if ledger.is_dirty() {
            report.cache_saved &= ledger.save(self.cache.as_ref()).await;
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        self.emit(SweepEvent::Completed {
            sweep_id: report.sweep_id.to_string(),
            kind: report.kind.to_string(),
            records_uploaded: report.records_uploaded,
            files_uploaded: report.files_uploaded,
            records_failed: report.records_failed,
            duration_ms,
        });
        info!(
            records_seen = report.records_seen,
            records_uploaded = report.records_uploaded,
            files_uploaded = report.files_uploaded,
            records_skipped = report.records_skipped,
            records_failed = report.records_failed,
            cache_entries = ledger.len(),
            duration_ms,
            "Sweep finished"
        );
        report
    }
}
