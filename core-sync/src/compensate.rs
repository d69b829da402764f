//! # Compensation Sweep
//!
//! Catches photos that land on disk after the primary sweep already handled
//! their record. Once a record has any attachment the reconciliation filter no
//! longer matches it, so late photos are found from the filesystem side.
//!
//! Only directories modified inside the compensation window are examined, and
//! only when the ledger already knows a record for their barcode. Files whose
//! basename the ledger lists are never uploaded again.

use crate::cache::UploadLedger;
use crate::error::Result;
use crate::pipeline::{ItemOutcome, SweepContext};
use crate::report::{SweepId, SweepKind, SweepOutcome, SweepReport};
use crate::resolver::{basename, list_images, recent_directories};
use chrono::{DateTime, Utc};
use core_runtime::events::SweepEvent;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

pub struct CompensationTask {
    ctx: SweepContext,
}

impl CompensationTask {
    pub fn new(ctx: SweepContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &SweepContext {
        &self.ctx
    }

    /// Run one compensation sweep. Never touches the remote store for
    /// directories it cannot map to a known record.
    pub async fn run(&self) -> Result<SweepOutcome> {
        let Some(_guard) = self.ctx.lock.try_acquire() else {
            self.ctx.emit_skipped(SweepKind::Compensate);
            return Ok(SweepOutcome::Skipped);
        };

        let report = self.sweep(SweepId::new()).await;
        Ok(SweepOutcome::Completed(report))
    }

    #[instrument(skip_all, fields(sweep_id = %sweep_id, kind = "compensate"))]
    async fn sweep(&self, sweep_id: SweepId) -> SweepReport {
        let started = Instant::now();
        self.ctx.emit(SweepEvent::Started {
            sweep_id: sweep_id.to_string(),
            kind: SweepKind::Compensate.to_string(),
        });

        let mut ledger = self.ctx.load_ledger().await;
        let now = self.ctx.clock.now();
        let mut report = SweepReport::new(sweep_id, SweepKind::Compensate);
        report.cache_evicted = ledger.evicted() as u32;

        let since = now - self.ctx.config.compensation_window;
        let directories = if ledger.is_empty() {
            debug!("Upload cache is empty, nothing to compensate");
            Vec::new()
        } else {
            recent_directories(&self.ctx.config.watch_root, since)
        };
        debug!(count = directories.len(), "Recently modified directories");

        for dir in &directories {
            report.records_seen += 1;
            let outcome = self.process_directory(dir, &mut ledger, now).await;
            self.ctx
                .record_outcome(outcome, &mut ledger, &mut report)
                .await;
        }

        self.ctx.finish(ledger, report, started).await
    }

    async fn process_directory(
        &self,
        dir: &Path,
        ledger: &mut UploadLedger,
        now: DateTime<Utc>,
    ) -> ItemOutcome {
        let name = basename(dir);
        let Some((record_id, entry)) = ledger.find_by_barcode(&name) else {
            debug!(dir = %name, "No known record for directory");
            return ItemOutcome::Skipped;
        };
        let record_id = record_id.to_string();
        let barcode = entry.barcode.clone();

        let current = match list_images(dir) {
            Ok(images) => images,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Cannot list directory");
                return ItemOutcome::Skipped;
            }
        };
        let new_files: Vec<PathBuf> = current
            .into_iter()
            .filter(|path| !entry.uploaded_files.contains(&basename(path)))
            .collect();

        if new_files.is_empty() {
            debug!(record_id = %record_id, dir = %name, "No new photos");
            return ItemOutcome::Skipped;
        }

        info!(
            record_id = %record_id,
            barcode = %barcode,
            count = new_files.len(),
            "Uploading late photos"
        );
        match self.ctx.transfer(&record_id, &new_files).await {
            Ok(files) => {
                self.ctx.remove_directory_if_done(dir).await;
                let count = files.len() as u32;
                ledger.put(&record_id, &barcode, files, now);
                ItemOutcome::Uploaded {
                    record_id,
                    barcode,
                    files: count,
                }
            }
            Err(e) => {
                error!(record_id = %record_id, error = %e, "Late photo upload failed");
                ItemOutcome::Failed
            }
        }
    }
}
