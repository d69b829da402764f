//! Vika Fusion API wire types

use bridge_traits::records::AttachmentHandle;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Standard response envelope
///
/// `{"success": true, "code": 200, "message": "SUCCESS", "data": {...}}`
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub code: Option<i64>,

    #[serde(default)]
    pub message: Option<String>,

    pub data: Option<T>,
}

/// `data` of a records listing
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPage {
    #[serde(default)]
    pub total: u64,

    #[serde(default)]
    pub page_num: u32,

    #[serde(default)]
    pub page_size: u32,

    #[serde(default)]
    pub records: Vec<VikaRecord>,
}

/// A datasheet row keyed by column name
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VikaRecord {
    pub record_id: String,

    #[serde(default)]
    pub fields: Map<String, Value>,

    #[serde(default)]
    pub created_at: Option<i64>,

    #[serde(default)]
    pub updated_at: Option<i64>,
}

/// Body of `PATCH /records`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecordsRequest {
    pub records: Vec<RecordUpdate>,
    pub field_key: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpdate {
    pub record_id: String,
    pub fields: Map<String, Value>,
}

/// `data` of an attachment upload; some deployments wrap it in a list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum UploadData {
    One(AttachmentHandle),
    Many(Vec<AttachmentHandle>),
}

impl UploadData {
    pub fn into_first(self) -> Option<AttachmentHandle> {
        match self {
            UploadData::One(handle) => Some(handle),
            UploadData::Many(handles) => handles.into_iter().next(),
        }
    }
}
