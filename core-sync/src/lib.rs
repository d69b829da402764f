//! # Photo Sync Pipeline
//!
//! Matches remotely flagged abnormal-package records to locally captured
//! photos and uploads them.
//!
//! ## Overview
//!
//! - A **reconciliation sweep** queries records flagged abnormal whose
//!   attachment field is empty, finds the photo folder for each barcode,
//!   uploads the photos, deletes the local copies and records what was sent.
//! - A **compensation sweep** rescans recently modified folders of records the
//!   ledger already knows and uploads only files it has not seen.
//! - The **monitor** runs both on an interval until cancelled.
//!
//! ## Components
//!
//! - **Barcode Normalizer** (`barcode`): canonical barcode from scanner payloads
//! - **Directory Resolver** (`resolver`): barcode → photo files, exact then normalized
//! - **Upload Cache** (`cache`): TTL ledger of uploaded basenames per record
//! - **Sweep Lock** (`lock`): at most one sweep at a time, acquired without waiting
//! - **Reconciliation Task** (`reconcile`): the primary sweep and one-off barcode sync
//! - **Compensation Task** (`compensate`): incremental catch-up sweep
//! - **Sweep Monitor** (`monitor`): the scheduling loop

pub mod barcode;
pub mod cache;
pub mod compensate;
pub mod config;
pub mod error;
pub mod lock;
pub mod monitor;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod resolver;

pub use cache::{CacheEntry, CacheStore, JsonFileCacheStore, MemoryCacheStore, UploadLedger};
pub use compensate::CompensationTask;
pub use config::{CacheFlushPolicy, MonitorConfig, PipelineConfig};
pub use error::{Result, SyncError};
pub use lock::{SweepGuard, SweepLock};
pub use monitor::{CycleOutcome, MonitorState, SweepMonitor};
pub use pipeline::SweepContext;
pub use reconcile::ReconciliationTask;
pub use report::{SweepId, SweepKind, SweepOutcome, SweepReport};
