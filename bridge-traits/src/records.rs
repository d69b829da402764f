//! Remote Record Store Abstractions
//!
//! The contract between the photo pipeline and the remote datasheet that holds
//! abnormal-package records. Implementations must:
//! - report query failure distinctly from "zero matches"
//! - fail loudly on attachment upload errors
//! - merge (never replace) attachment lists when appending
//! - look records up by primary id directly, never through a field formula

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::error::Result;

/// Scalar value used in filter predicates and field matches
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Bool(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Number(value)
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Text(s) => write!(f, "{}", s),
            FilterValue::Number(n) => write!(f, "{}", n),
            FilterValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Server-side boolean filter over named record fields.
///
/// Field names are logical keys (e.g. `abnormal`, `abnormalPhotos`); providers
/// translate them to their own column names.
///
/// # Example
///
/// ```
/// use bridge_traits::records::RecordFilter;
///
/// let filter = RecordFilter::and(vec![
///     RecordFilter::is_true("abnormal"),
///     RecordFilter::is_empty("abnormalPhotos"),
/// ]);
/// assert_eq!(filter.fields(), vec!["abnormal", "abnormalPhotos"]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RecordFilter {
    /// `field = value`
    Equals { field: String, value: FilterValue },
    /// Field has no value (empty text, empty attachment list, unset)
    IsEmpty(String),
    /// Field has a value
    IsNotEmpty(String),
    And(Vec<RecordFilter>),
    Or(Vec<RecordFilter>),
}

impl RecordFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        RecordFilter::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn is_true(field: impl Into<String>) -> Self {
        Self::eq(field, true)
    }

    pub fn is_empty(field: impl Into<String>) -> Self {
        RecordFilter::IsEmpty(field.into())
    }

    pub fn is_not_empty(field: impl Into<String>) -> Self {
        RecordFilter::IsNotEmpty(field.into())
    }

    pub fn and(filters: Vec<RecordFilter>) -> Self {
        RecordFilter::And(filters)
    }

    pub fn or(filters: Vec<RecordFilter>) -> Self {
        RecordFilter::Or(filters)
    }

    /// All field names referenced by this filter, in order of appearance.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            RecordFilter::Equals { field, .. }
            | RecordFilter::IsEmpty(field)
            | RecordFilter::IsNotEmpty(field) => out.push(field.as_str()),
            RecordFilter::And(children) | RecordFilter::Or(children) => {
                for child in children {
                    child.collect_fields(out);
                }
            }
        }
    }
}

/// How to locate the record an attachment append targets
#[derive(Debug, Clone, PartialEq)]
pub enum RecordMatch {
    /// Direct primary-id lookup
    RecordId(String),
    /// First record whose field equals the value
    Field { field: String, value: FilterValue },
}

/// A record fetched from the remote store.
///
/// Fields are keyed by logical name after provider translation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteRecord {
    pub record_id: String,
    pub fields: HashMap<String, Value>,
}

impl RemoteRecord {
    pub fn new(record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Trimmed, non-empty text value of a field. Numbers are rendered as text.
    pub fn text(&self, key: &str) -> Option<String> {
        let text = match self.fields.get(key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }

    /// Raw attachment entries of a field; empty when unset or not a list.
    pub fn attachments(&self, key: &str) -> Vec<Value> {
        match self.fields.get(key) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }
}

/// Remote handle of an uploaded attachment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentHandle {
    /// Remote file id (token)
    #[serde(default)]
    pub id: Option<String>,

    /// File name
    pub name: String,

    /// Size in bytes
    #[serde(default)]
    pub size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Provider-specific keys preserved verbatim on write-back
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AttachmentHandle {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            size: None,
            mime_type: None,
            url: None,
            extra: Map::new(),
        }
    }
}

/// Remote record store used by the photo pipeline.
///
/// Every call is expected to pass through the provider's shared rate limiter.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Records matching a server-side filter. `Ok(vec![])` means zero matches;
    /// transport or API failure is `Err`.
    async fn query_records(&self, filter: &RecordFilter) -> Result<Vec<RemoteRecord>>;

    /// Direct primary-id lookup
    async fn get_record(&self, record_id: &str) -> Result<Option<RemoteRecord>>;

    /// Overwrite the given fields of one record
    async fn update_fields(&self, record_id: &str, fields: Map<String, Value>) -> Result<()>;

    /// Upload one local file and return its remote handle
    async fn upload_attachment(&self, path: &Path) -> Result<AttachmentHandle>;

    /// Append handles to a record's attachment field (existing + new, no dedup)
    async fn append_attachments(
        &self,
        target: &RecordMatch,
        field: &str,
        handles: &[AttachmentHandle],
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_collects_nested_fields() {
        let filter = RecordFilter::or(vec![
            RecordFilter::and(vec![
                RecordFilter::is_true("abnormal"),
                RecordFilter::is_empty("abnormalPhotos"),
            ]),
            RecordFilter::eq("packageNo", "B1"),
        ]);

        assert_eq!(filter.fields(), vec!["abnormal", "abnormalPhotos", "packageNo"]);
    }

    #[test]
    fn test_record_text_trims_and_rejects_blank() {
        let record = RemoteRecord::new("rec1")
            .with_field("packageNo", json!("  B1 "))
            .with_field("remark", json!("   "))
            .with_field("packageQty", json!(3));

        assert_eq!(record.text("packageNo"), Some("B1".to_string()));
        assert_eq!(record.text("remark"), None);
        assert_eq!(record.text("packageQty"), Some("3".to_string()));
        assert_eq!(record.text("missing"), None);
    }

    #[test]
    fn test_attachment_handle_preserves_unknown_keys() {
        let raw = json!({
            "id": "atcXYZ",
            "name": "a.jpg",
            "size": 2048,
            "mimeType": "image/jpeg",
            "token": "space/2025/a.jpg",
            "width": 640,
            "height": 480,
            "url": "https://s1.example.com/space/2025/a.jpg"
        });

        let handle: AttachmentHandle = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(handle.name, "a.jpg");
        assert_eq!(handle.size, Some(2048));
        assert_eq!(handle.extra.get("token"), Some(&json!("space/2025/a.jpg")));

        let back = serde_json::to_value(&handle).unwrap();
        assert_eq!(back, raw);
    }
}
