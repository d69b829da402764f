//! # Reconciliation Sweep
//!
//! The primary pass: every record flagged abnormal whose attachment field is
//! still empty gets the photos found under its barcode.
//!
//! ## Workflow
//!
//! 1. Take the sweep lock without waiting; if it is held, return `Skipped`
//! 2. Load the upload ledger (expired entries drop out)
//! 3. Query `flag = true AND attachments empty`
//! 4. Per record, in query order:
//!    - skip when the id or barcode is missing, or no photos are found
//!    - upload every photo, append the handles to the record by id
//!    - delete the local photos, then the directory if it is left empty
//!    - record the basenames in the ledger
//!    - pause for the configured inter-record delay
//! 5. Save the ledger once and release the lock
//!
//! A failure on one record is logged and counted; the sweep moves on and the
//! record is picked up again next cycle because its attachment field is still
//! empty.

use crate::cache::UploadLedger;
use crate::error::{Result, SyncError};
use crate::pipeline::{ItemOutcome, SweepContext};
use crate::report::{SweepId, SweepKind, SweepOutcome, SweepReport};
use crate::resolver::find_photos;
use bridge_traits::{RecordFilter, RemoteRecord};
use chrono::{DateTime, Utc};
use core_runtime::events::SweepEvent;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

pub struct ReconciliationTask {
    ctx: SweepContext,
}

impl ReconciliationTask {
    pub fn new(ctx: SweepContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &SweepContext {
        &self.ctx
    }

    /// Server-side filter for records that still need photos
    pub fn pending_filter(&self) -> RecordFilter {
        RecordFilter::and(vec![
            RecordFilter::is_true(&self.ctx.config.flag_field),
            RecordFilter::is_empty(&self.ctx.config.attachment_field),
        ])
    }

    /// Run one reconciliation sweep.
    ///
    /// # Errors
    ///
    /// Only a failed remote query aborts the sweep. Per-record failures are
    /// counted in the report.
    pub async fn run(&self) -> Result<SweepOutcome> {
        let Some(_guard) = self.ctx.lock.try_acquire() else {
            self.ctx.emit_skipped(SweepKind::Reconcile);
            return Ok(SweepOutcome::Skipped);
        };

        let report = self
            .sweep(SweepId::new(), SweepKind::Reconcile, self.pending_filter(), false)
            .await?;
        Ok(SweepOutcome::Completed(report))
    }

    /// Upload photos for flagged records carrying `barcode`, outside the schedule.
    ///
    /// Shares the sweep lock with scheduled sweeps. Records synced within the
    /// cache TTL are skipped, so repeated triggers do not upload twice.
    ///
    /// # Errors
    ///
    /// `SyncError::InvalidInput` for a blank barcode; remote query failures.
    pub async fn sync_barcode(&self, barcode: &str) -> Result<SweepOutcome> {
        let barcode = barcode.trim();
        if barcode.is_empty() {
            return Err(SyncError::InvalidInput("barcode cannot be empty".to_string()));
        }

        let Some(_guard) = self.ctx.lock.try_acquire() else {
            self.ctx.emit_skipped(SweepKind::Barcode);
            return Ok(SweepOutcome::Skipped);
        };

        let filter = RecordFilter::and(vec![
            RecordFilter::eq(&self.ctx.config.barcode_field, barcode),
            RecordFilter::is_true(&self.ctx.config.flag_field),
        ]);
        let report = self
            .sweep(SweepId::new(), SweepKind::Barcode, filter, true)
            .await?;
        Ok(SweepOutcome::Completed(report))
    }

    #[instrument(skip_all, fields(sweep_id = %sweep_id, kind = %kind))]
    async fn sweep(
        &self,
        sweep_id: SweepId,
        kind: SweepKind,
        filter: RecordFilter,
        skip_recent: bool,
    ) -> Result<SweepReport> {
        let started = Instant::now();
        self.ctx.emit(SweepEvent::Started {
            sweep_id: sweep_id.to_string(),
            kind: kind.to_string(),
        });

        let mut ledger = self.ctx.load_ledger().await;
        let now = self.ctx.clock.now();
        let mut report = SweepReport::new(sweep_id, kind);
        report.cache_evicted = ledger.evicted() as u32;

        let records = match self.ctx.store.query_records(&filter).await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Querying abnormal records failed");
                self.ctx.emit(SweepEvent::Failed {
                    sweep_id: sweep_id.to_string(),
                    kind: kind.to_string(),
                    message: e.to_string(),
                });
                return Err(e.into());
            }
        };
        info!(count = records.len(), "Found abnormal records");

        for record in &records {
            report.records_seen += 1;
            let outcome = self
                .process_record(record, &mut ledger, skip_recent, now)
                .await;
            self.ctx
                .record_outcome(outcome, &mut ledger, &mut report)
                .await;
        }

        Ok(self.ctx.finish(ledger, report, started).await)
    }

    async fn process_record(
        &self,
        record: &RemoteRecord,
        ledger: &mut UploadLedger,
        skip_recent: bool,
        now: DateTime<Utc>,
    ) -> ItemOutcome {
        let record_id = record.record_id.trim();
        if record_id.is_empty() {
            warn!("Record without id, skipping");
            return ItemOutcome::Skipped;
        }

        let Some(barcode) = record.text(&self.ctx.config.barcode_field) else {
            warn!(record_id, "Record has no barcode, skipping");
            return ItemOutcome::Skipped;
        };

        if skip_recent && ledger.is_recent(record_id, now) {
            info!(record_id, barcode = %barcode, "Synced within the cache TTL, skipping");
            return ItemOutcome::Skipped;
        }

        let photos = find_photos(&self.ctx.config.watch_root, &barcode);
        if photos.is_empty() {
            info!(record_id, barcode = %barcode, "No photos found");
            return ItemOutcome::Skipped;
        }

        info!(record_id, barcode = %barcode, count = photos.len(), "Uploading photos");
        match self.ctx.transfer(record_id, &photos).await {
            Ok(files) => {
                if let Some(dir) = photos[0].parent() {
                    self.ctx.remove_directory_if_done(dir).await;
                }
                let count = files.len() as u32;
                ledger.put(record_id, &barcode, files, now);
                ItemOutcome::Uploaded {
                    record_id: record_id.to_string(),
                    barcode,
                    files: count,
                }
            }
            Err(e) => {
                error!(record_id, barcode = %barcode, error = %e, "Photo upload failed");
                ItemOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::config::PipelineConfig;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{AttachmentHandle, BridgeError, ManualClock, RecordMatch, RecordStore};
    use chrono::TimeZone;
    use core_runtime::events::EventBus;
    use mockall::mock;
    use serde_json::{Map, Value};
    use std::path::Path;
    use std::sync::Arc;

    mock! {
        Store {}

        #[async_trait]
        impl RecordStore for Store {
            async fn query_records(&self, filter: &RecordFilter) -> BridgeResult<Vec<RemoteRecord>>;
            async fn get_record(&self, record_id: &str) -> BridgeResult<Option<RemoteRecord>>;
            async fn update_fields(&self, record_id: &str, fields: Map<String, Value>) -> BridgeResult<()>;
            async fn upload_attachment(&self, path: &Path) -> BridgeResult<AttachmentHandle>;
            async fn append_attachments(
                &self,
                target: &RecordMatch,
                field: &str,
                handles: &[AttachmentHandle],
            ) -> BridgeResult<()>;
        }
    }

    fn context(store: MockStore, cache: Arc<MemoryCacheStore>, root: &Path) -> SweepContext {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap());
        SweepContext::new(
            Arc::new(store),
            cache,
            Arc::new(clock),
            Arc::new(EventBus::default()),
            PipelineConfig::new(root).with_record_delay(std::time::Duration::ZERO),
        )
    }

    #[tokio::test]
    async fn test_query_uses_flag_and_empty_attachment_filter() {
        let root = tempfile::tempdir().unwrap();
        let mut store = MockStore::new();
        store
            .expect_query_records()
            .withf(|filter| {
                *filter
                    == RecordFilter::and(vec![
                        RecordFilter::is_true("abnormal"),
                        RecordFilter::is_empty("abnormalPhotos"),
                    ])
            })
            .times(1)
            .returning(|_| Ok(vec![]));

        let task = ReconciliationTask::new(context(store, Arc::new(MemoryCacheStore::new()), root.path()));
        let outcome = task.run().await.unwrap();
        assert_eq!(outcome.report().unwrap().records_seen, 0);
    }

    #[tokio::test]
    async fn test_query_failure_aborts_without_cache_write() {
        let root = tempfile::tempdir().unwrap();
        let mut store = MockStore::new();
        store
            .expect_query_records()
            .returning(|_| Err(BridgeError::OperationFailed("HTTP 500".to_string())));
        store.expect_upload_attachment().never();

        let cache = Arc::new(MemoryCacheStore::new());
        let task = ReconciliationTask::new(context(store, cache.clone(), root.path()));

        let err = task.run().await.unwrap_err();
        assert!(matches!(err, SyncError::Remote(_)));
        assert_eq!(cache.write_count().await, 0);
        assert!(!task.context().lock.is_held());
    }

    #[tokio::test]
    async fn test_records_without_id_or_barcode_are_skipped() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("B1")).unwrap();
        std::fs::write(root.path().join("B1").join("a.jpg"), b"jpeg").unwrap();

        let mut store = MockStore::new();
        store.expect_query_records().returning(|_| {
            Ok(vec![
                RemoteRecord::new("").with_field("packageNo", Value::from("B1")),
                RemoteRecord::new("R2"),
                RemoteRecord::new("R3").with_field("packageNo", Value::from("  ")),
            ])
        });
        store.expect_upload_attachment().never();

        let task = ReconciliationTask::new(context(store, Arc::new(MemoryCacheStore::new()), root.path()));
        let report = task.run().await.unwrap().report().cloned().unwrap();

        assert_eq!(report.records_seen, 3);
        assert_eq!(report.records_skipped, 3);
        assert!(root.path().join("B1").join("a.jpg").exists());
    }

    #[tokio::test]
    async fn test_sync_barcode_rejects_blank_input() {
        let root = tempfile::tempdir().unwrap();
        let task = ReconciliationTask::new(context(
            MockStore::new(),
            Arc::new(MemoryCacheStore::new()),
            root.path(),
        ));

        assert!(matches!(
            task.sync_barcode("  ").await,
            Err(SyncError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_sync_barcode_filters_by_barcode() {
        let root = tempfile::tempdir().unwrap();
        let mut store = MockStore::new();
        store
            .expect_query_records()
            .withf(|filter| {
                *filter
                    == RecordFilter::and(vec![
                        RecordFilter::eq("packageNo", "B9"),
                        RecordFilter::is_true("abnormal"),
                    ])
            })
            .times(1)
            .returning(|_| Ok(vec![]));

        let task = ReconciliationTask::new(context(store, Arc::new(MemoryCacheStore::new()), root.path()));
        let outcome = task.sync_barcode(" B9 ").await.unwrap();
        assert_eq!(outcome.report().unwrap().kind, SweepKind::Barcode);
    }
}
