//! Sweep identity and per-sweep results.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one sweep, carried by its tracing span and events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SweepId(Uuid);

impl SweepId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SweepId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SweepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SweepId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// What a sweep was looking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepKind {
    /// Flagged records with an empty attachment field
    Reconcile,
    /// Recently modified directories of already-seen records
    Compensate,
    /// One barcode, triggered outside the schedule
    Barcode,
}

impl SweepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepKind::Reconcile => "reconcile",
            SweepKind::Compensate => "compensate",
            SweepKind::Barcode => "barcode",
        }
    }
}

impl fmt::Display for SweepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one completed sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub sweep_id: SweepId,
    pub kind: SweepKind,
    /// Records (or directories, for compensation) examined
    pub records_seen: u32,
    pub records_uploaded: u32,
    pub files_uploaded: u32,
    /// Missing id/barcode, no photos, nothing new, or recently synced
    pub records_skipped: u32,
    /// Remote or filesystem failure; retried next cycle
    pub records_failed: u32,
    /// Ledger entries dropped as expired on load
    pub cache_evicted: u32,
    /// Whether the final ledger write succeeded (true when nothing needed writing)
    pub cache_saved: bool,
}

impl SweepReport {
    pub fn new(sweep_id: SweepId, kind: SweepKind) -> Self {
        Self {
            sweep_id,
            kind,
            records_seen: 0,
            records_uploaded: 0,
            files_uploaded: 0,
            records_skipped: 0,
            records_failed: 0,
            cache_evicted: 0,
            cache_saved: true,
        }
    }
}

/// Result of asking for a sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    Completed(SweepReport),
    /// Another sweep held the lock; nothing was touched
    Skipped,
}

impl SweepOutcome {
    pub fn report(&self) -> Option<&SweepReport> {
        match self {
            SweepOutcome::Completed(report) => Some(report),
            SweepOutcome::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, SweepOutcome::Skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_ids_are_unique() {
        assert_ne!(SweepId::new(), SweepId::new());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(SweepKind::Reconcile.to_string(), "reconcile");
        assert_eq!(
            serde_json::to_value(SweepKind::Compensate).unwrap(),
            serde_json::json!("compensate")
        );
    }

    #[test]
    fn test_outcome_accessors() {
        let report = SweepReport::new(SweepId::new(), SweepKind::Barcode);
        assert!(report.cache_saved);
        assert_eq!(SweepOutcome::Completed(report.clone()).report(), Some(&report));
        assert!(SweepOutcome::Skipped.is_skipped());
        assert!(SweepOutcome::Skipped.report().is_none());
    }
}
