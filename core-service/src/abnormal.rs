//! Abnormal flag marking.
//!
//! Receiving staff flag a package as abnormal by its package number. A
//! package that is already flagged cannot be flagged again; the flag is the
//! trigger for the photo pipeline, which only looks at flagged records.

use crate::error::{CoreError, Result};
use bridge_traits::{RecordFilter, RecordStore};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, instrument};

/// Result of a marking request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkOutcome {
    /// No record carries this package number
    NotFound,
    /// The record is already flagged abnormal
    AlreadyMarked { record_id: String },
    /// The flag already has the requested value
    Unchanged { record_id: String },
    /// The flag was written
    Updated { record_id: String, abnormal: bool },
}

pub struct AbnormalMarker {
    store: Arc<dyn RecordStore>,
    barcode_field: String,
    flag_field: String,
}

impl AbnormalMarker {
    pub fn new(
        store: Arc<dyn RecordStore>,
        barcode_field: impl Into<String>,
        flag_field: impl Into<String>,
    ) -> Self {
        Self {
            store,
            barcode_field: barcode_field.into(),
            flag_field: flag_field.into(),
        }
    }

    /// Set the abnormal flag of the first record whose package number matches.
    ///
    /// # Errors
    ///
    /// `CoreError::InvalidInput` for a blank package number; remote failures.
    #[instrument(skip(self))]
    pub async fn mark(&self, package_no: &str, abnormal: bool) -> Result<MarkOutcome> {
        let package_no = package_no.trim();
        if package_no.is_empty() {
            return Err(CoreError::InvalidInput(
                "package number cannot be empty".to_string(),
            ));
        }

        let records = self
            .store
            .query_records(&RecordFilter::eq(&self.barcode_field, package_no))
            .await?;
        let Some(record) = records.into_iter().next() else {
            info!("Package not found");
            return Ok(MarkOutcome::NotFound);
        };
        let record_id = record.record_id.clone();
        let current = record.flag(&self.flag_field);

        if current == Some(true) {
            info!(record_id = %record_id, "Package already flagged abnormal");
            return Ok(MarkOutcome::AlreadyMarked { record_id });
        }
        if current == Some(abnormal) {
            return Ok(MarkOutcome::Unchanged { record_id });
        }

        let mut fields = Map::new();
        fields.insert(self.flag_field.clone(), Value::Bool(abnormal));
        self.store.update_fields(&record_id, fields).await?;
        info!(record_id = %record_id, abnormal, "Abnormal flag updated");

        Ok(MarkOutcome::Updated {
            record_id,
            abnormal,
        })
    }
}
