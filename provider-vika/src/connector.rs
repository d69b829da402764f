//! Vika Fusion API connector implementation
//!
//! Implements the `RecordStore` trait for a single datasheet.

use async_trait::async_trait;
use bridge_traits::error::BridgeError;
use bridge_traits::http::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, MultipartFile, RetryPolicy,
};
use bridge_traits::records::{AttachmentHandle, RecordFilter, RecordMatch, RecordStore, RemoteRecord};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, VikaError};
use crate::formula::{self, RECORD_ID_KEY};
use crate::rate_limiter::RateLimiter;
use crate::schema::FieldSchema;
use crate::types::{ApiEnvelope, RecordPage, RecordUpdate, UpdateRecordsRequest, UploadData, VikaRecord};

/// Vika Fusion API base URL
pub const VIKA_API_BASE: &str = "https://api.vika.cn/fusion/v1";

/// Maximum records per page (Vika API limit)
const MAX_PAGE_SIZE: u32 = 1000;

/// Address fields by column name rather than field id
const FIELD_KEY: &str = "name";

const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Connection settings for one datasheet
#[derive(Clone)]
pub struct VikaConfig {
    pub api_token: String,
    pub datasheet_id: String,
    pub view_id: Option<String>,
    pub base_url: String,
    pub schema: FieldSchema,
    pub page_size: u32,
    pub max_attempts: u32,
}

impl VikaConfig {
    /// Settings for `datasheet_id`, using its known schema if there is one.
    pub fn new(api_token: impl Into<String>, datasheet_id: impl Into<String>) -> Self {
        let datasheet_id = datasheet_id.into();
        Self {
            api_token: api_token.into(),
            schema: FieldSchema::for_datasheet(&datasheet_id),
            datasheet_id,
            view_id: None,
            base_url: VIKA_API_BASE.to_string(),
            page_size: MAX_PAGE_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_view_id(mut self, view_id: impl Into<String>) -> Self {
        self.view_id = Some(view_id.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_schema(mut self, schema: FieldSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

impl fmt::Debug for VikaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VikaConfig")
            .field("api_token", &"***")
            .field("datasheet_id", &self.datasheet_id)
            .field("view_id", &self.view_id)
            .field("base_url", &self.base_url)
            .field("page_size", &self.page_size)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

/// Vika datasheet connector
///
/// # Features
///
/// - Paged record queries with schema translation
/// - Attachment upload and merge-append
/// - Every HTTP attempt passes through the shared [`RateLimiter`]
/// - Exponential backoff on 429 and 5xx responses
///
/// # Example
///
/// ```ignore
/// use provider_vika::{VikaConfig, VikaConnector, RateLimiter};
///
/// let config = VikaConfig::new(token, "dstsnDVylQhjuBiSEo");
/// let connector = VikaConnector::new(http_client, rate_limiter, config);
/// let records = connector.query_records(&RecordFilter::is_true("abnormal")).await?;
/// ```
pub struct VikaConnector {
    http_client: Arc<dyn HttpClient>,
    rate_limiter: Arc<RateLimiter>,
    config: VikaConfig,
}

impl VikaConnector {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        rate_limiter: Arc<RateLimiter>,
        config: VikaConfig,
    ) -> Self {
        Self {
            http_client,
            rate_limiter,
            config,
        }
    }

    pub fn config(&self) -> &VikaConfig {
        &self.config
    }

    fn records_url(&self) -> String {
        format!(
            "{}/datasheets/{}/records",
            self.config.base_url, self.config.datasheet_id
        )
    }

    fn attachments_url(&self) -> String {
        format!(
            "{}/datasheets/{}/attachments",
            self.config.base_url, self.config.datasheet_id
        )
    }

    fn convert_record(&self, record: VikaRecord) -> RemoteRecord {
        RemoteRecord {
            record_id: record.record_id,
            fields: self.config.schema.to_logical(record.fields),
        }
    }

    /// Execute a request with rate limiting and retry.
    ///
    /// Retries are owned here, so the underlying client is asked for a single attempt.
    #[instrument(skip(self, request), fields(method = ?request.method, url = %request.url))]
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let max_attempts = self.config.max_attempts;
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.rate_limiter.acquire().await;

            let outcome = self
                .http_client
                .execute_with_retry(request.clone(), RetryPolicy::no_retry())
                .await;

            match outcome {
                Ok(response) if response.is_success() => {
                    debug!("API request succeeded: status={}", response.status);
                    return Ok(response);
                }
                Ok(response) if response.status == 429 || response.is_server_error() => {
                    if attempt >= max_attempts {
                        warn!(
                            "API request failed after {} attempts: status={}",
                            attempt, response.status
                        );
                        return Err(VikaError::RetriesExhausted {
                            attempts: attempt,
                            status_code: response.status,
                        });
                    }
                    warn!(
                        "API request failed (attempt {}/{}): status={}",
                        attempt, max_attempts, response.status
                    );
                }
                Ok(response) => {
                    warn!("API request failed: status={}", response.status);
                    return Err(Self::error_from_response(&response));
                }
                Err(e) if !is_transient(&e) => {
                    warn!("API request failed without retry: {}", e);
                    return Err(e.into());
                }
                Err(e) => {
                    if attempt >= max_attempts {
                        warn!("API request failed after {} attempts: {}", attempt, e);
                        return Err(e.into());
                    }
                    warn!(
                        "API request failed (attempt {}/{}): {}",
                        attempt, max_attempts, e
                    );
                }
            }

            let backoff_ms = 100u64 * 2u64.pow(attempt);
            debug!("Retrying in {}ms", backoff_ms);
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        }
    }

    /// Non-retryable failure; prefers the API's own code and message.
    fn error_from_response(response: &HttpResponse) -> VikaError {
        match serde_json::from_slice::<ApiEnvelope<Value>>(&response.body) {
            Ok(ApiEnvelope {
                code,
                message: Some(message),
                ..
            }) => VikaError::ApiError {
                code: code.unwrap_or(i64::from(response.status)),
                message,
            },
            _ => VikaError::HttpError {
                status_code: response.status,
                message: String::from_utf8_lossy(&response.body).to_string(),
            },
        }
    }

    /// Decode the envelope and reject `success: false`.
    fn parse_envelope<T: DeserializeOwned>(response: &HttpResponse) -> Result<ApiEnvelope<T>> {
        let envelope: ApiEnvelope<T> = serde_json::from_slice(&response.body)
            .map_err(|e| VikaError::ParseError(format!("Invalid JSON from Vika: {}", e)))?;

        if !envelope.success {
            return Err(VikaError::ApiError {
                code: envelope.code.unwrap_or(i64::from(response.status)),
                message: envelope.message.unwrap_or_default(),
            });
        }
        Ok(envelope)
    }

    fn parse_data<T: DeserializeOwned>(response: &HttpResponse) -> Result<T> {
        Self::parse_envelope::<T>(response)?
            .data
            .ok_or_else(|| VikaError::ParseError("Response envelope has no data".to_string()))
    }

    fn records_request(&self, page_num: u32) -> HttpRequest {
        HttpRequest::new(HttpMethod::Get, self.records_url())
            .bearer_token(&self.config.api_token)
            .header("Accept", "application/json")
            .query("fieldKey", FIELD_KEY)
            .query("pageSize", self.config.page_size.to_string())
            .query("pageNum", page_num.to_string())
            .timeout(Duration::from_secs(15))
    }

    /// All records matching a filter, following pages until `total` is reached.
    #[instrument(skip(self, filter))]
    pub async fn find_records(&self, filter: &RecordFilter) -> Result<Vec<RemoteRecord>> {
        let formula = formula::render(filter, &self.config.schema)?;
        debug!(formula = %formula, "Querying records");

        let mut records = Vec::new();
        let mut page_num = 1;

        loop {
            let mut request = self
                .records_request(page_num)
                .query("filterByFormula", formula.as_str());
            if let Some(view_id) = &self.config.view_id {
                request = request.query("viewId", view_id.as_str());
            }

            let response = self.send(request).await?;
            let page: RecordPage = Self::parse_data(&response)?;

            let fetched = page.records.len();
            records.extend(page.records.into_iter().map(|r| self.convert_record(r)));

            if fetched == 0 || records.len() as u64 >= page.total {
                break;
            }
            page_num += 1;
        }

        info!("Fetched {} records", records.len());
        Ok(records)
    }

    /// Primary-id lookup via `recordIds`; never expressed as a formula.
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, record_id: &str) -> Result<Option<RemoteRecord>> {
        let request = self.records_request(1).query("recordIds", record_id);

        let response = self.send(request).await?;
        let page: RecordPage = Self::parse_data(&response)?;

        Ok(page
            .records
            .into_iter()
            .find(|r| r.record_id == record_id)
            .map(|r| self.convert_record(r)))
    }

    async fn locate(&self, target: &RecordMatch) -> Result<RemoteRecord> {
        match target {
            RecordMatch::RecordId(record_id) => self
                .find_by_id(record_id)
                .await?
                .ok_or_else(|| VikaError::RecordNotFound(record_id.clone())),
            RecordMatch::Field { field, value } => {
                if field == RECORD_ID_KEY {
                    return Err(VikaError::UnsupportedFilter(format!(
                        "`{}` must be matched with a direct id lookup",
                        RECORD_ID_KEY
                    )));
                }
                self.find_records(&RecordFilter::eq(field.as_str(), value.clone()))
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| VikaError::RecordNotFound(format!("{}={}", field, value)))
            }
        }
    }

    /// Overwrite fields (logical keys) of one record.
    #[instrument(skip(self, fields))]
    pub async fn write_fields(&self, record_id: &str, fields: Map<String, Value>) -> Result<()> {
        let body = UpdateRecordsRequest {
            records: vec![RecordUpdate {
                record_id: record_id.to_string(),
                fields: self.config.schema.to_columns(fields),
            }],
            field_key: FIELD_KEY,
        };

        let request = HttpRequest::new(HttpMethod::Patch, self.records_url())
            .bearer_token(&self.config.api_token)
            .json(&body)?
            .timeout(Duration::from_secs(30));

        let response = self.send(request).await?;
        Self::parse_envelope::<Value>(&response)?;

        info!("Updated record");
        Ok(())
    }

    /// Upload one file and return its attachment handle.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn upload_file(&self, path: &Path) -> Result<AttachmentHandle> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| VikaError::FileRead {
                path: path.display().to_string(),
                message: "path has no file name".to_string(),
            })?;

        let data = tokio::fs::read(path).await.map_err(|e| VikaError::FileRead {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let size = data.len();

        let request = HttpRequest::new(HttpMethod::Post, self.attachments_url())
            .bearer_token(&self.config.api_token)
            .multipart_file(MultipartFile {
                field_name: "file".to_string(),
                content_type: content_type_for(path).to_string(),
                file_name,
                data: Bytes::from(data),
            })
            .timeout(Duration::from_secs(60));

        let response = self.send(request).await?;
        let handle = Self::parse_data::<UploadData>(&response)?
            .into_first()
            .ok_or_else(|| {
                VikaError::ParseError("Upload response contained no attachment".to_string())
            })?;

        info!("Uploaded {} ({} bytes)", handle.name, size);
        Ok(handle)
    }

    /// Append handles to a record's attachment field, keeping existing entries verbatim.
    #[instrument(skip(self, handles), fields(count = handles.len()))]
    pub async fn append_to_record(
        &self,
        target: &RecordMatch,
        field: &str,
        handles: &[AttachmentHandle],
    ) -> Result<()> {
        let record = self.locate(target).await?;

        let mut merged = record.attachments(field);
        let existing = merged.len();
        for handle in handles {
            let value = serde_json::to_value(handle)
                .map_err(|e| VikaError::ParseError(format!("Invalid attachment: {}", e)))?;
            merged.push(value);
        }

        let mut fields = Map::new();
        fields.insert(field.to_string(), Value::Array(merged));
        self.write_fields(&record.record_id, fields).await?;

        info!(
            record_id = %record.record_id,
            "Appended {} attachments ({} existing)",
            handles.len(),
            existing
        );
        Ok(())
    }
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl RecordStore for VikaConnector {
    async fn query_records(
        &self,
        filter: &RecordFilter,
    ) -> bridge_traits::error::Result<Vec<RemoteRecord>> {
        Ok(self.find_records(filter).await?)
    }

    async fn get_record(
        &self,
        record_id: &str,
    ) -> bridge_traits::error::Result<Option<RemoteRecord>> {
        Ok(self.find_by_id(record_id).await?)
    }

    async fn update_fields(
        &self,
        record_id: &str,
        fields: Map<String, Value>,
    ) -> bridge_traits::error::Result<()> {
        Ok(self.write_fields(record_id, fields).await?)
    }

    async fn upload_attachment(&self, path: &Path) -> bridge_traits::error::Result<AttachmentHandle> {
        Ok(self.upload_file(path).await?)
    }

    async fn append_attachments(
        &self,
        target: &RecordMatch,
        field: &str,
        handles: &[AttachmentHandle],
    ) -> bridge_traits::error::Result<()> {
        Ok(self.append_to_record(target, field, handles).await?)
    }
}

/// Network failures and timeouts; malformed requests fail the same way again.
fn is_transient(error: &BridgeError) -> bool {
    matches!(error, BridgeError::OperationFailed(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bridge_traits::time::SystemClock;
    use mockall::mock;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    fn json_response(status: u16, body: Value) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn page(total: u64, records: Value) -> HttpResponse {
        json_response(
            200,
            json!({"success": true, "code": 200, "message": "SUCCESS",
                   "data": {"total": total, "pageNum": 1, "pageSize": 100, "records": records}}),
        )
    }

    fn connector(http: MockHttpClient, config: VikaConfig) -> VikaConnector {
        VikaConnector::new(
            Arc::new(http),
            Arc::new(RateLimiter::unthrottled(Arc::new(SystemClock))),
            config,
        )
    }

    fn receiving_config() -> VikaConfig {
        VikaConfig::new("test_token", crate::schema::RECEIVING_DATASHEET_ID)
    }

    #[tokio::test]
    async fn test_query_follows_pages_and_translates_fields() {
        let mut mock_http = MockHttpClient::new();

        mock_http.expect_execute().times(2).returning(|req| {
            assert_eq!(req.method, HttpMethod::Get);
            assert!(req.url.ends_with("/datasheets/dstsnDVylQhjuBiSEo/records"));
            assert_eq!(req.query_value("fieldKey"), Some("name"));
            assert_eq!(req.query_value("pageSize"), Some("2"));
            assert_eq!(
                req.query_value("filterByFormula"),
                Some("AND({异常}=TRUE(), {异常图片}=BLANK())")
            );
            assert_eq!(
                req.headers.get("Authorization"),
                Some(&"Bearer test_token".to_string())
            );

            match req.query_value("pageNum") {
                Some("1") => Ok(page(
                    3,
                    json!([
                        {"recordId": "rec1", "fields": {"入仓包裹单号": "B1", "异常": true}},
                        {"recordId": "rec2", "fields": {"入仓包裹单号": "B2", "异常": "1"}}
                    ]),
                )),
                Some("2") => Ok(page(
                    3,
                    json!([{"recordId": "rec3", "fields": {"入仓包裹单号": "B3"}}]),
                )),
                other => panic!("unexpected page {:?}", other),
            }
        });

        let connector = connector(mock_http, receiving_config().with_page_size(2));
        let filter = RecordFilter::and(vec![
            RecordFilter::is_true("abnormal"),
            RecordFilter::is_empty("abnormalPhotos"),
        ]);
        let records = connector.query_records(&filter).await.unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].record_id, "rec1");
        assert_eq!(records[0].text("packageNo"), Some("B1".to_string()));
        assert_eq!(records[1].flag("abnormal"), Some(true));
        assert_eq!(records[2].text("packageNo"), Some("B3".to_string()));
    }

    #[tokio::test]
    async fn test_query_reports_api_failure() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|_| {
            Ok(json_response(
                200,
                json!({"success": false, "code": 400, "message": "Invalid formula"}),
            ))
        });

        let connector = connector(mock_http, receiving_config());
        let err = connector
            .find_records(&RecordFilter::is_true("abnormal"))
            .await
            .unwrap_err();

        assert!(matches!(err, VikaError::ApiError { code: 400, .. }));
    }

    #[tokio::test]
    async fn test_query_rejects_invalid_json() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: Bytes::from_static(b"<html>gateway</html>"),
            })
        });

        let connector = connector(mock_http, receiving_config());
        let err = connector
            .find_records(&RecordFilter::is_true("abnormal"))
            .await
            .unwrap_err();

        assert!(matches!(err, VikaError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_get_record_uses_direct_id_lookup() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.query_value("recordIds"), Some("rec9"));
            assert_eq!(req.query_value("filterByFormula"), None);
            Ok(page(1, json!([{"recordId": "rec9", "fields": {"备注": "x"}}])))
        });

        let connector = connector(mock_http, receiving_config().with_view_id("viwA"));
        let record = connector.get_record("rec9").await.unwrap().unwrap();

        assert_eq!(record.record_id, "rec9");
        assert_eq!(record.text("remark"), Some("x".to_string()));
    }

    #[tokio::test]
    async fn test_append_by_id_merges_existing_attachments() {
        let patched = Arc::new(std::sync::Mutex::new(None::<Value>));
        let captured = patched.clone();

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(2).returning(move |req| match req.method {
            HttpMethod::Get => Ok(page(
                1,
                json!([{
                    "recordId": "rec1",
                    "fields": {"异常图片": [{"id": "atc1", "name": "old.jpg", "token": "space/old.jpg"}]}
                }]),
            )),
            HttpMethod::Patch => {
                let body: Value = serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
                *captured.lock().unwrap() = Some(body);
                Ok(json_response(200, json!({"success": true, "code": 200, "data": {}})))
            }
            other => panic!("unexpected method {:?}", other),
        });

        let connector = connector(mock_http, receiving_config());
        let handles = vec![AttachmentHandle::named("a.jpg"), AttachmentHandle::named("b.jpg")];
        connector
            .append_attachments(&RecordMatch::RecordId("rec1".to_string()), "abnormalPhotos", &handles)
            .await
            .unwrap();

        let body = patched.lock().unwrap().take().unwrap();
        assert_eq!(body["fieldKey"], json!("name"));
        assert_eq!(body["records"][0]["recordId"], json!("rec1"));
        let attachments = body["records"][0]["fields"]["异常图片"].as_array().unwrap();
        assert_eq!(attachments.len(), 3);
        assert_eq!(attachments[0]["token"], json!("space/old.jpg"));
        assert_eq!(attachments[1]["name"], json!("a.jpg"));
        assert_eq!(attachments[2]["name"], json!("b.jpg"));
    }

    #[tokio::test]
    async fn test_append_by_record_id_field_is_unsupported() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(0);

        let connector = connector(mock_http, receiving_config());
        let target = RecordMatch::Field {
            field: RECORD_ID_KEY.to_string(),
            value: "rec1".into(),
        };
        let err = connector
            .append_attachments(&target, "abnormalPhotos", &[AttachmentHandle::named("a.jpg")])
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_append_to_missing_record_is_not_found() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(page(0, json!([]))));

        let connector = connector(mock_http, receiving_config());
        let target = RecordMatch::Field {
            field: "packageNo".to_string(),
            value: "B404".into(),
        };
        let err = connector
            .append_attachments(&target, "abnormalPhotos", &[AttachmentHandle::named("a.jpg")])
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_upload_sends_multipart_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Photo1.JPG");
        std::fs::write(&path, b"jpeg-bytes").unwrap();

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.method, HttpMethod::Post);
            assert!(req.url.ends_with("/attachments"));
            let file = req.multipart.as_ref().unwrap();
            assert_eq!(file.field_name, "file");
            assert_eq!(file.file_name, "Photo1.JPG");
            assert_eq!(file.content_type, "image/jpeg");
            assert_eq!(&file.data[..], b"jpeg-bytes");

            Ok(json_response(
                200,
                json!({"success": true, "code": 200, "data": {
                    "id": "atcA", "name": "Photo1.JPG", "size": 10,
                    "mimeType": "image/jpeg", "token": "space/p1.jpg",
                    "width": 1, "height": 1, "url": "https://s1.vika.cn/space/p1.jpg"
                }}),
            ))
        });

        let connector = connector(mock_http, receiving_config());
        let handle = connector.upload_attachment(&path).await.unwrap();

        assert_eq!(handle.id.as_deref(), Some("atcA"));
        assert_eq!(handle.size, Some(10));
        assert_eq!(handle.extra.get("token"), Some(&json!("space/p1.jpg")));
    }

    #[tokio::test]
    async fn test_upload_missing_file_fails_without_request() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(0);

        let connector = connector(mock_http, receiving_config());
        let err = connector
            .upload_file(Path::new("/definitely/not/here.jpg"))
            .await
            .unwrap_err();

        assert!(matches!(err, VikaError::FileRead { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_rate_limited_requests() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(2).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(json_response(429, json!({"success": false, "code": 429})))
            } else {
                Ok(page(0, json!([])))
            }
        });

        let connector = connector(mock_http, receiving_config());
        let records = connector
            .query_records(&RecordFilter::is_true("abnormal"))
            .await
            .unwrap();

        assert!(records.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(3)
            .returning(|_| Ok(json_response(503, json!({}))));

        let connector = connector(mock_http, receiving_config());
        let err = connector.find_by_id("rec1").await.unwrap_err();

        assert!(matches!(
            err,
            VikaError::RetriesExhausted {
                attempts: 3,
                status_code: 503
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transport_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(2).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(BridgeError::OperationFailed("Request timed out".to_string()))
            } else {
                Ok(page(0, json!([])))
            }
        });

        let connector = connector(mock_http, receiving_config());
        let records = connector
            .query_records(&RecordFilter::is_true("abnormal"))
            .await
            .unwrap();

        assert!(records.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalid_request_is_not_retried() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|_| {
            Err(BridgeError::InvalidInput(
                "Invalid content type: not a mime".to_string(),
            ))
        });

        let connector = connector(mock_http, receiving_config());
        let err = connector.find_by_id("rec1").await.unwrap_err();

        assert!(matches!(
            err,
            VikaError::BridgeError(BridgeError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_update_fields_uses_column_names() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.method, HttpMethod::Patch);
            let body: Value = serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
            assert_eq!(
                body,
                json!({"records": [{"recordId": "rec1", "fields": {"异常": true}}], "fieldKey": "name"})
            );
            Ok(json_response(200, json!({"success": true, "code": 200})))
        });

        let connector = connector(mock_http, receiving_config());
        let mut fields = Map::new();
        fields.insert("abnormal".to_string(), json!(true));
        connector.update_fields("rec1", fields).await.unwrap();
    }

    #[test]
    fn test_config_debug_redacts_token() {
        let rendered = format!("{:?}", VikaConfig::new("secret-token", "dst1"));
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("dst1"));
    }
}
