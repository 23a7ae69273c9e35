//! Zotero API connector implementation
//!
//! Authenticated request execution against the Zotero Web API v3: versioned
//! listings, batched fetches, write requests, templates, deletions and the
//! three-step file upload. Endpoint addresses are built by
//! [`LibraryUrl`](crate::url::LibraryUrl); this module owns headers, bodies
//! and response decoding.

use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bytes::{Bytes, BytesMut};
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, ZoteroError};
use crate::types::{KeyPermissions, RemoteItem, UploadAuthorization, WriteResponse};
use crate::url::{self, LibraryUrl};

/// Zotero API protocol version, sent with every request.
const API_VERSION: &str = "3";

/// Request timeout. Between a typical host default (10 s) and Zotero's own
/// upper limit (30 s), to fail fast without starving the remote service.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Timeout for raw file transfers to the storage backend.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// A local file staged for upload to a Zotero attachment.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub bytes: Bytes,
    pub filename: String,
    /// File modification time, Unix epoch milliseconds.
    pub mtime_ms: i64,
}

/// Result of a file upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The file was transferred and registered.
    Uploaded,
    /// A file with the same hash already exists server-side; nothing was
    /// transferred.
    AlreadyExists,
}

/// Zotero Web API connector
///
/// Every request carries the protocol version header and, when an API key is
/// configured, bearer authorization. A non-success response aborts the
/// calling operation with [`ZoteroError::RequestFailed`]; there is no retry.
pub struct ZoteroConnector {
    http: Arc<dyn HttpClient>,
    api_key: Option<String>,
}

impl ZoteroConnector {
    pub fn new(http: Arc<dyn HttpClient>, api_key: Option<String>) -> Self {
        Self { http, api_key }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Generate a fresh write token: 32 lowercase hex characters, unique per
    /// write request.
    pub fn write_token() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Extract the URL for `rel` from a `Link` response header.
    ///
    /// Possible rel values are first, prev, next, last, alternate.
    pub fn link_header(response: &HttpResponse, rel: &str) -> Option<String> {
        let header = response.header("Link")?;
        let re = Regex::new(r#"<([^>]+)>; rel="([^"]+)""#).ok()?;
        let url = re
            .captures_iter(header)
            .find(|caps| &caps[2] == rel)
            .map(|caps| caps[1].to_string());
        url
    }

    /// Parse the `Last-Modified-Version` response header.
    pub fn last_modified_version(response: &HttpResponse) -> Option<i64> {
        response
            .header("Last-Modified-Version")
            .and_then(|v| v.trim().parse().ok())
    }

    fn base_request(&self, method: HttpMethod, url: &str) -> HttpRequest {
        let mut request =
            HttpRequest::new(method, url).header("Zotero-API-Version", API_VERSION);
        if let Some(key) = &self.api_key {
            request = request.bearer_token(key);
        }
        request.timeout(REQUEST_TIMEOUT)
    }

    /// Execute a request, turning any non-success status into
    /// [`ZoteroError::RequestFailed`].
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = request.url.clone();
        let response = self.http.execute(request).await?;
        if response.is_success() {
            debug!(url = %url, status = response.status, "API request succeeded");
            Ok(response)
        } else {
            let body = response.text().unwrap_or_default().trim().to_string();
            warn!(url = %url, status = response.status, "API request failed");
            Err(ZoteroError::RequestFailed {
                url,
                status: response.status,
                body,
            })
        }
    }

    /// GET a URL with the standard headers.
    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.send(self.base_request(HttpMethod::Get, url)).await
    }

    fn decode<T: serde::de::DeserializeOwned>(response: &HttpResponse, what: &str) -> Result<T> {
        serde_json::from_slice(&response.body)
            .map_err(|e| ZoteroError::ParseError(format!("Failed to parse {}: {}", what, e)))
    }

    /// Fetch a lightweight `format=versions` listing. The response object's
    /// key order follows the listing's sort parameter; it is preserved here.
    /// Returns the ordered item keys and the library version from the
    /// `Last-Modified-Version` header.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn changed_versions(&self, url: &str) -> Result<(Vec<String>, Option<i64>)> {
        let response = self.get(url).await?;
        let version = Self::last_modified_version(&response);

        let listing: serde_json::Map<String, serde_json::Value> =
            Self::decode(&response, "versions listing")?;
        let keys: Vec<String> = listing.keys().cloned().collect();

        info!(count = keys.len(), version = ?version, "Listed changed items");
        Ok((keys, version))
    }

    /// Full fetch of specific items, at most one chunk's worth of keys.
    ///
    /// The API key is also passed as a query parameter so Zotero includes
    /// enclosure links in the response; an attachment can only be downloaded
    /// when an enclosure link is present.
    #[instrument(skip(self, library, keys), fields(count = keys.len()))]
    pub async fn items_by_keys(
        &self,
        library: &LibraryUrl,
        keys: &[String],
    ) -> Result<Vec<RemoteItem>> {
        let joined = keys.join(",");
        let mut params = vec![("itemKey", joined.as_str())];
        if let Some(key) = &self.api_key {
            params.push(("key", key.as_str()));
        }
        let url = library.items(&params);

        let response = self.get(&url).await?;
        Self::decode(&response, "item list")
    }

    /// Fetch the child items (attachments, notes) of one item.
    #[instrument(skip(self, library))]
    pub async fn item_children(
        &self,
        library: &LibraryUrl,
        item_key: &str,
    ) -> Result<Vec<RemoteItem>> {
        let url = library.item_children(item_key, &[]);
        let response = self.get(&url).await?;
        Self::decode(&response, "item children")
    }

    /// POST a batch of item payloads as one write request, carrying a fresh
    /// write token so transport-level replays cannot create duplicates.
    /// Returns the positional outcome buckets and the new library version.
    #[instrument(skip(self, library, items), fields(count = items.len()))]
    pub async fn write_items(
        &self,
        library: &LibraryUrl,
        items: &[serde_json::Value],
    ) -> Result<(WriteResponse, Option<i64>)> {
        let url = library.items(&[]);
        let request = self
            .base_request(HttpMethod::Post, &url)
            .header("Zotero-Write-Token", Self::write_token())
            .json(&items)?;

        let response = self.send(request).await?;
        let version = Self::last_modified_version(&response);
        let write_response: WriteResponse = Self::decode(&response, "write response")?;

        info!(
            success = write_response.success.len(),
            unchanged = write_response.unchanged.len(),
            failed = write_response.failed.len(),
            "Write request completed"
        );
        Ok((write_response, version))
    }

    /// Delete one remote item, guarded by its last known version.
    #[instrument(skip(self, library))]
    pub async fn delete_item(&self, library: &LibraryUrl, item_key: &str, version: i64) -> Result<()> {
        let url = library.item(item_key);
        let request = self
            .base_request(HttpMethod::Delete, &url)
            .header("If-Unmodified-Since-Version", version.to_string());
        self.send(request).await?;
        Ok(())
    }

    /// Fetch the new-item template for an item type. Templates are static
    /// per (type, link mode); callers cache them for the duration of a job.
    #[instrument(skip(self))]
    pub async fn template(
        &self,
        item_type: &str,
        link_mode: Option<&str>,
    ) -> Result<serde_json::Map<String, serde_json::Value>> {
        let url = url::template(item_type, link_mode);
        let response = self.get(&url).await?;
        Self::decode(&response, "item template")
    }

    /// Upload a file to an existing attachment item.
    ///
    /// Three steps: authorize (hash, name, size, mtime), transfer the raw
    /// bytes wrapped in the storage backend's prefix/suffix, register the
    /// completed upload. When the backend already has a file with the same
    /// hash, the authorization short-circuits and nothing is transferred.
    ///
    /// See: https://www.zotero.org/support/dev/web_api/v3/file_upload
    #[instrument(skip(self, library, file), fields(filename = %file.filename, size = file.bytes.len()))]
    pub async fn upload_file(
        &self,
        library: &LibraryUrl,
        attachment_key: &str,
        file: &FileUpload,
    ) -> Result<UploadOutcome> {
        let url = library.item_file(attachment_key, &[]);
        let digest = format!("{:x}", md5::compute(&file.bytes));

        // Step 1: get upload authorization.
        let form = form_encode(&[
            ("md5", &digest),
            ("filename", &file.filename),
            ("filesize", &file.bytes.len().to_string()),
            ("mtime", &file.mtime_ms.to_string()),
        ]);
        let request = self
            .base_request(HttpMethod::Post, &url)
            .header("If-None-Match", "*")
            .form(form);
        let response = self.send(request).await?;

        let authorization: UploadAuthorization = Self::decode(&response, "upload authorization")?;
        let target = match authorization {
            UploadAuthorization::Exists { .. } => {
                // Another client may have uploaded the same file before.
                info!("File already exists server-side, skipping transfer");
                return Ok(UploadOutcome::AlreadyExists);
            }
            UploadAuthorization::Pending(target) => target,
        };

        // Step 2: post the raw bytes to the storage backend. This is not a
        // Zotero endpoint, so no version or authorization headers.
        let mut body = BytesMut::with_capacity(
            target.prefix.len() + file.bytes.len() + target.suffix.len(),
        );
        body.extend_from_slice(target.prefix.as_bytes());
        body.extend_from_slice(&file.bytes);
        body.extend_from_slice(target.suffix.as_bytes());

        let transfer = HttpRequest::new(HttpMethod::Post, &target.url)
            .header("Content-Type", &target.content_type)
            .body(body.freeze())
            .timeout(UPLOAD_TIMEOUT);
        let response = self.http.execute(transfer).await?;
        if !response.is_success() {
            let body = response.text().unwrap_or_default().trim().to_string();
            return Err(ZoteroError::RequestFailed {
                url: target.url,
                status: response.status,
                body,
            });
        }

        // Step 3: register the completed upload.
        let request = self
            .base_request(HttpMethod::Post, &url)
            .header("If-None-Match", "*")
            .form(form_encode(&[("upload", &target.upload_key)]));
        self.send(request).await?;

        info!("File upload registered");
        Ok(UploadOutcome::Uploaded)
    }

    /// Introspect an API key: owning user id and per-library access grants.
    #[instrument(skip(self, api_key))]
    pub async fn key_permissions(&self, api_key: &str) -> Result<KeyPermissions> {
        let response = self.get(&url::key(api_key)).await?;
        Self::decode(&response, "key permissions")
    }
}

/// Percent-encode pairs as an `application/x-www-form-urlencoded` body.
fn form_encode(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::LibraryType;
    use async_trait::async_trait;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    fn ok_response(body: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn library() -> LibraryUrl {
        LibraryUrl::new(LibraryType::User, 475425)
    }

    #[test]
    fn test_write_token_shape() {
        let a = ZoteroConnector::write_token();
        let b = ZoteroConnector::write_token();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_link_header_extraction() {
        let mut headers = HashMap::new();
        headers.insert(
            "Link".to_string(),
            "<https://api.zotero.org/users/1/items?start=50>; rel=\"next\", \
             <https://api.zotero.org/users/1/items?start=100>; rel=\"last\""
                .to_string(),
        );
        let response = HttpResponse {
            status: 200,
            headers,
            body: Bytes::new(),
        };

        assert_eq!(
            ZoteroConnector::link_header(&response, "next").as_deref(),
            Some("https://api.zotero.org/users/1/items?start=50")
        );
        assert_eq!(
            ZoteroConnector::link_header(&response, "last").as_deref(),
            Some("https://api.zotero.org/users/1/items?start=100")
        );
        assert_eq!(ZoteroConnector::link_header(&response, "prev"), None);
    }

    #[tokio::test]
    async fn test_changed_versions_preserves_listing_order() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|request| {
            assert_eq!(
                request.headers.get("Zotero-API-Version").map(String::as_str),
                Some("3")
            );
            assert_eq!(
                request.headers.get("Authorization").map(String::as_str),
                Some("Bearer secret")
            );

            let mut headers = HashMap::new();
            headers.insert("Last-Modified-Version".to_string(), "312".to_string());
            Ok(HttpResponse {
                status: 200,
                headers,
                body: Bytes::from(r#"{"ZKEY2": 310, "ZKEY1": 311, "ZKEY3": 312}"#),
            })
        });

        let connector = ZoteroConnector::new(Arc::new(mock_http), Some("secret".to_string()));
        let url = library().items(&[("since", "0"), ("format", "versions")]);
        let (keys, version) = connector.changed_versions(&url).await.unwrap();

        assert_eq!(keys, vec!["ZKEY2", "ZKEY1", "ZKEY3"]);
        assert_eq!(version, Some(312));
    }

    #[tokio::test]
    async fn test_items_by_keys_passes_api_key_param() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|request| {
            assert!(request.url.contains("itemKey=A%2CB"));
            assert!(request.url.contains("key=secret"));
            Ok(ok_response(r#"[{"key": "A", "data": {"itemType": "book"}}]"#))
        });

        let connector = ZoteroConnector::new(Arc::new(mock_http), Some("secret".to_string()));
        let items = connector
            .items_by_keys(&library(), &["A".to_string(), "B".to_string()])
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].key, "A");
    }

    #[tokio::test]
    async fn test_non_success_aborts_with_status_and_body() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse {
                status: 403,
                headers: HashMap::new(),
                body: Bytes::from("  Invalid key  "),
            })
        });

        let connector = ZoteroConnector::new(Arc::new(mock_http), None);
        let result = connector.get(&library().items(&[])).await;

        match result {
            Err(ZoteroError::RequestFailed { status, body, .. }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "Invalid key");
            }
            other => panic!("expected RequestFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_write_items_sends_fresh_token_and_parses_buckets() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|request| {
            let token = request.headers.get("Zotero-Write-Token").unwrap();
            assert_eq!(token.len(), 32);
            assert_eq!(
                request.headers.get("Content-Type").map(String::as_str),
                Some("application/json")
            );

            let mut headers = HashMap::new();
            headers.insert("Last-Modified-Version".to_string(), "400".to_string());
            Ok(HttpResponse {
                status: 200,
                headers,
                body: Bytes::from(
                    r#"{"success": {"0": "NEWKEY"}, "unchanged": {}, "failed": {"1": {"code": 400, "message": "bad"}}}"#,
                ),
            })
        });

        let connector = ZoteroConnector::new(Arc::new(mock_http), Some("secret".to_string()));
        let items = vec![
            serde_json::json!({"itemType": "book", "title": "One"}),
            serde_json::json!({"itemType": "book"}),
        ];
        let (response, version) = connector.write_items(&library(), &items).await.unwrap();

        assert_eq!(response.key_for(0), Some("NEWKEY"));
        assert!(response.failure_for(1).is_some());
        assert_eq!(version, Some(400));
    }

    #[tokio::test]
    async fn test_delete_item_sends_version_guard() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|request| {
            assert_eq!(request.method, HttpMethod::Delete);
            assert!(request.url.ends_with("/items/ZKEY1"));
            assert_eq!(
                request
                    .headers
                    .get("If-Unmodified-Since-Version")
                    .map(String::as_str),
                Some("312")
            );
            Ok(HttpResponse {
                status: 204,
                headers: HashMap::new(),
                body: Bytes::new(),
            })
        });

        let connector = ZoteroConnector::new(Arc::new(mock_http), Some("secret".to_string()));
        connector
            .delete_item(&library(), "ZKEY1", 312)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_upload_short_circuits_when_file_exists() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|request| {
            assert!(request.url.ends_with("/items/ATTKEY/file"));
            assert_eq!(
                request.headers.get("If-None-Match").map(String::as_str),
                Some("*")
            );
            let body = String::from_utf8(request.body.unwrap().to_vec()).unwrap();
            assert!(body.contains("md5="));
            assert!(body.contains("filename=paper.pdf"));
            Ok(ok_response(r#"{"exists": 1}"#))
        });

        let connector = ZoteroConnector::new(Arc::new(mock_http), Some("secret".to_string()));
        let file = FileUpload {
            bytes: Bytes::from_static(b"pdf bytes"),
            filename: "paper.pdf".to_string(),
            mtime_ms: 1709287200000,
        };
        let outcome = connector
            .upload_file(&library(), "ATTKEY", &file)
            .await
            .unwrap();

        assert_eq!(outcome, UploadOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn test_upload_runs_three_steps() {
        let mut mock_http = MockHttpClient::new();
        let mut seq = mockall::Sequence::new();

        // Authorization.
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|request| {
                assert!(request.url.ends_with("/items/ATTKEY/file"));
                Ok(ok_response(
                    r#"{"url": "https://storage.example.org/up", "contentType": "application/pdf",
                        "prefix": "PRE", "suffix": "SUF", "uploadKey": "UPKEY"}"#,
                ))
            });

        // Raw transfer to the storage backend: wrapped body, no API headers.
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|request| {
                assert_eq!(request.url, "https://storage.example.org/up");
                assert!(!request.headers.contains_key("Zotero-API-Version"));
                assert!(!request.headers.contains_key("Authorization"));
                let body = request.body.unwrap();
                assert!(body.starts_with(b"PRE"));
                assert!(body.ends_with(b"SUF"));
                Ok(ok_response(""))
            });

        // Registration.
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|request| {
                assert!(request.url.ends_with("/items/ATTKEY/file"));
                let body = String::from_utf8(request.body.unwrap().to_vec()).unwrap();
                assert_eq!(body, "upload=UPKEY");
                Ok(ok_response(""))
            });

        let connector = ZoteroConnector::new(Arc::new(mock_http), Some("secret".to_string()));
        let file = FileUpload {
            bytes: Bytes::from_static(b"pdf bytes"),
            filename: "paper.pdf".to_string(),
            mtime_ms: 1709287200000,
        };
        let outcome = connector
            .upload_file(&library(), "ATTKEY", &file)
            .await
            .unwrap();

        assert_eq!(outcome, UploadOutcome::Uploaded);
    }

    #[tokio::test]
    async fn test_template_fetch() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|request| {
            assert_eq!(
                request.url,
                "https://api.zotero.org/items/new?itemType=book"
            );
            Ok(ok_response(
                r#"{"itemType": "book", "title": "", "creators": [], "abstractNote": ""}"#,
            ))
        });

        let connector = ZoteroConnector::new(Arc::new(mock_http), None);
        let template = connector.template("book", None).await.unwrap();

        assert!(template.contains_key("title"));
        assert!(template.contains_key("abstractNote"));
    }

    #[tokio::test]
    async fn test_key_permissions_fetch() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|request| {
            assert!(request.url.starts_with("https://api.zotero.org/keys/"));
            Ok(ok_response(
                r#"{"userID": 475425, "access": {"user": {"library": true}}}"#,
            ))
        });

        let connector = ZoteroConnector::new(Arc::new(mock_http), None);
        let perms = connector.key_permissions("somekey").await.unwrap();

        assert_eq!(perms.user_id, Some(475425));
        assert!(perms.grants_library_access(LibraryType::User, 475425));
    }
}
