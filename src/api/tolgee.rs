//! Tolgee REST API backend
//!
//! This module talks to a Tolgee server (cloud or self-hosted) over HTTPS.
//!
//! # Authentication
//!
//! Every request carries the project API key in the `X-API-Key` header. The key is
//! read from the settings file or from the `TOLGEE_API_KEY` environment variable.
//! Create one under "Integrate" in the Tolgee project dashboard.
//!
//! # Example
//!
//! ```ignore
//! use tolgee_sync::api::{TolgeeClient, TranslationBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = TolgeeClient::from_env()?;
//!     let info = client.current_api_key().await?;
//!     println!("project {}", info.project_id);
//!     Ok(())
//! }
//! ```

use crate::api::backend::{TranslationBackend, translations_url};
use crate::api::data::{
    ApiKeyInfo, ComplexUpdatePayload, DeleteKeysPayload, ExportRequest, ImportKeysPayload,
    PoFileUpload, ProjectStats, TranslationsPage,
};
use crate::config::{DEFAULT_API_URL, Settings};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

/// Value of the `X-Tolgee-SDK-Type` header
pub const SDK_TYPE: &str = "Rust";

/// Value of the `X-Tolgee-SDK-Version` header
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// HTTP client for the Tolgee v2 API
#[derive(Clone)]
pub struct TolgeeClient {
    /// API key for authentication
    api_key: String,
    /// HTTP client for async requests
    client: reqwest::Client,
    /// Server root without trailing slash, e.g. `https://app.tolgee.io`
    base_url: String,
}

impl TolgeeClient {
    /// Per-request timeout. Bounds how long a fetch can hold the in-progress flag.
    const REQUEST_TIMEOUT_SECS: u64 = 30;

    /// Create a client for the given server and API key
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - New client
    /// * `Err(SyncError::Configuration)` - If the key or URL is empty
    /// * `Err(SyncError::Transport)` - If the HTTP client cannot be built
    pub fn new(api_url: &str, api_key: String) -> SyncResult<Self> {
        if api_key.trim().is_empty() {
            return Err(SyncError::Configuration(
                "API key cannot be empty".to_string(),
            ));
        }

        let base_url = api_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(SyncError::Configuration(
                "API URL cannot be empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(Self::REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| SyncError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            client,
            base_url,
        })
    }

    /// Create a client from loaded settings, refusing to build one that cannot send requests
    pub fn from_settings(settings: &Settings) -> SyncResult<Self> {
        if !settings.is_ready_to_send_requests() {
            return Err(SyncError::Configuration(
                "Settings are not set up properly: API key and URL are required".to_string(),
            ));
        }
        Self::new(&settings.api_url, settings.api_key.clone())
    }

    /// Create a client from `TOLGEE_API_KEY` and (optionally) `TOLGEE_API_URL`
    pub fn from_env() -> SyncResult<Self> {
        let api_key = std::env::var("TOLGEE_API_KEY").map_err(|_| {
            SyncError::Configuration("TOLGEE_API_KEY environment variable not set".to_string())
        })?;
        let api_url =
            std::env::var("TOLGEE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        Self::new(&api_url, api_key)
    }

    /// Full URL of an API endpoint
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("X-API-Key", &self.api_key)
            .header("X-Tolgee-SDK-Type", SDK_TYPE)
            .header("X-Tolgee-SDK-Version", SDK_VERSION)
    }

    /// Send a request and return the body of a 2xx response
    async fn send(&self, request: reqwest::RequestBuilder) -> SyncResult<String> {
        let response = request.send().await?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::Transport(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(SyncError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        trace!(status = status.as_u16(), bytes = body.len(), "response received");
        Ok(body)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> SyncResult<T> {
        let body = self.send(self.request(reqwest::Method::GET, url)).await?;
        serde_json::from_str(&body).map_err(|e| {
            SyncError::Deserialization(format!("Could not deserialize response: {}", e))
        })
    }
}

impl std::fmt::Debug for TolgeeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TolgeeClient")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl TranslationBackend for TolgeeClient {
    async fn fetch_translations_page(
        &self,
        languages: &[String],
        cursor: Option<&str>,
    ) -> SyncResult<TranslationsPage> {
        let url = translations_url(&self.endpoint("v2/projects/translations"), languages, cursor)?;
        debug!(url = %url, "fetching translations page");

        self.get_json(url.as_str()).await
    }

    async fn import_keys(&self, payload: &ImportKeysPayload) -> SyncResult<()> {
        let url = self.endpoint("v2/projects/keys/import");
        self.send(self.request(reqwest::Method::POST, &url).json(payload))
            .await?;
        Ok(())
    }

    async fn complex_update(
        &self,
        key_id: i64,
        payload: &ComplexUpdatePayload,
    ) -> SyncResult<()> {
        let url = self.endpoint(&format!("v2/projects/keys/{}/complex-update", key_id));
        self.send(self.request(reqwest::Method::PUT, &url).json(payload))
            .await?;
        Ok(())
    }

    async fn delete_keys(&self, payload: &DeleteKeysPayload) -> SyncResult<()> {
        let url = self.endpoint("v2/projects/keys");
        self.send(self.request(reqwest::Method::DELETE, &url).json(payload))
            .await?;
        Ok(())
    }

    async fn project_stats(&self) -> SyncResult<ProjectStats> {
        self.get_json(&self.endpoint("v2/projects/stats")).await
    }

    async fn current_api_key(&self) -> SyncResult<ApiKeyInfo> {
        self.get_json(&self.endpoint("v2/api-keys/current")).await
    }

    async fn import_po_file(&self, project_id: i64, upload: &PoFileUpload) -> SyncResult<String> {
        let url = self.endpoint(&format!("v2/projects/{}/single-step-import", project_id));
        let params = serde_json::to_string(&upload.params)?;
        let form = Form::new().text("params", params).part(
            "files",
            Part::text(upload.content.clone()).file_name(upload.file_name.clone()),
        );

        debug!(url = %url, file = %upload.file_name, "importing PO file");
        self.send(self.request(reqwest::Method::POST, &url).multipart(form))
            .await
    }

    async fn export_po_file(&self, project_id: i64, locale: &str) -> SyncResult<String> {
        let url = self.endpoint(&format!("v2/projects/{}/export", project_id));
        debug!(url = %url, locale, "exporting PO file");
        self.send(self.request(reqwest::Method::POST, &url).json(&ExportRequest::po(locale)))
            .await
    }

    fn backend_name(&self) -> &str {
        "Tolgee"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one canned HTTP response and hand back the raw request
    async fn serve_once(response: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let content_length = text[..end]
                        .lines()
                        .find_map(|line| {
                            let lower = line.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + content_length {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).to_string()
        });

        (format!("http://{}", addr), handle)
    }

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
    }

    // ========== Initialization Tests ==========

    #[test]
    fn test_new_with_valid_key() {
        let client = TolgeeClient::new("https://app.tolgee.io/", "tgpak_test".to_string());
        assert!(client.is_ok());
        assert_eq!(client.unwrap().backend_name(), "Tolgee");
    }

    #[test]
    fn test_new_with_empty_key() {
        let result = TolgeeClient::new("https://app.tolgee.io", "  ".to_string());
        match result {
            Err(SyncError::Configuration(msg)) => assert!(msg.contains("empty")),
            _ => panic!("Expected Configuration error"),
        }
    }

    #[test]
    fn test_new_with_empty_url() {
        let result = TolgeeClient::new("/", "tgpak_test".to_string());
        assert!(matches!(result, Err(SyncError::Configuration(_))));
    }

    #[test]
    fn test_from_settings_not_ready() {
        let settings = Settings::default();
        let result = TolgeeClient::from_settings(&settings);
        assert!(matches!(result, Err(SyncError::Configuration(_))));
    }

    #[test]
    fn test_endpoint_trims_slashes() {
        let client = TolgeeClient::new("https://tolgee.example.com//", "k".to_string()).unwrap();
        assert_eq!(
            client.endpoint("/v2/projects/stats"),
            "https://tolgee.example.com/v2/projects/stats"
        );
    }

    #[test]
    fn test_debug_output_masks_key() {
        let client = TolgeeClient::new("https://app.tolgee.io", "secret-key".to_string()).unwrap();
        let debug_str = format!("{:?}", client);
        assert!(debug_str.contains("***"));
        assert!(!debug_str.contains("secret-key"));
    }

    // ========== Wire Tests (local socket) ==========

    #[tokio::test]
    async fn test_fetch_page_sends_headers_and_query() {
        let body = r#"{"nextCursor":"c1","_embedded":{"keys":[{"keyId":1,"keyName":"a","keyNamespace":"ns","keyTags":[],"translations":{"en":{"id":9,"text":"A"}}}]}}"#;
        let (url, handle) = serve_once(http_response("200 OK", body)).await;

        let client = TolgeeClient::new(&url, "tgpak_abc".to_string()).unwrap();
        let languages = vec!["en".to_string(), "de".to_string()];
        let page = client
            .fetch_translations_page(&languages, Some("c0"))
            .await
            .unwrap();

        assert_eq!(page.cursor(), Some("c1"));
        assert_eq!(page.into_keys().len(), 1);

        let request = handle.await.unwrap();
        let request_lower = request.to_ascii_lowercase();
        assert!(request.starts_with("GET /v2/projects/translations?cursor=c0&languages=en&languages=de "));
        assert!(request_lower.contains("x-api-key: tgpak_abc"));
        assert!(request_lower.contains("x-tolgee-sdk-type: rust"));
        assert!(request_lower.contains("x-tolgee-sdk-version:"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_reported() {
        let (url, handle) = serve_once(http_response("403 Forbidden", r#"{"code":"forbidden"}"#)).await;

        let client = TolgeeClient::new(&url, "k".to_string()).unwrap();
        let result = client.project_stats().await;
        handle.await.unwrap();

        match result {
            Err(SyncError::HttpStatus { status, body }) => {
                assert_eq!(status, 403);
                assert!(body.contains("forbidden"));
            }
            other => panic!("Expected HttpStatus error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_deserialization_error() {
        let (url, handle) = serve_once(http_response("200 OK", "not json")).await;

        let client = TolgeeClient::new(&url, "k".to_string()).unwrap();
        let result = client.current_api_key().await;
        handle.await.unwrap();

        assert!(matches!(result, Err(SyncError::Deserialization(_))));
    }

    #[tokio::test]
    async fn test_delete_sends_json_body() {
        let (url, handle) = serve_once(http_response("200 OK", "")).await;

        let client = TolgeeClient::new(&url, "k".to_string()).unwrap();
        client
            .delete_keys(&DeleteKeysPayload { ids: vec![4, 5] })
            .await
            .unwrap();

        let request = handle.await.unwrap();
        assert!(request.starts_with("DELETE /v2/projects/keys "));
        assert!(request.ends_with(r#"{"ids":[4,5]}"#));
    }

    #[tokio::test]
    async fn test_complex_update_path() {
        let (url, handle) = serve_once(http_response("200 OK", "{}")).await;

        let client = TolgeeClient::new(&url, "k".to_string()).unwrap();
        let payload = ComplexUpdatePayload {
            name: "a".to_string(),
            namespace: "ns".to_string(),
            tags: vec!["OriginalHash:1".to_string()],
        };
        client.complex_update(17, &payload).await.unwrap();

        let request = handle.await.unwrap();
        assert!(request.starts_with("PUT /v2/projects/keys/17/complex-update "));
    }

    #[tokio::test]
    async fn test_import_po_file_sends_multipart() {
        let (url, handle) = serve_once(http_response("200 OK", r#"{"unresolvedConflicts":[]}"#)).await;

        let client = TolgeeClient::new(&url, "k".to_string()).unwrap();
        let upload = PoFileUpload {
            file_name: "de.po".to_string(),
            content: "msgid \"Start\"\nmsgstr \"Starten\"\n".to_string(),
            params: crate::api::data::SingleStepImportParams::for_file("de.po", true),
        };
        let response = client.import_po_file(12, &upload).await.unwrap();
        assert!(response.contains("unresolvedConflicts"));

        let request = handle.await.unwrap();
        assert!(request.starts_with("POST /v2/projects/12/single-step-import "));
        assert!(request.to_ascii_lowercase().contains("content-type: multipart/form-data; boundary="));
        assert!(request.contains(r#"name="params""#));
        assert!(request.contains(r#""forceMode":"KEEP""#));
        assert!(request.contains(r#"name="files"; filename="de.po""#));
        assert!(request.contains(r#"msgstr "Starten""#));
    }

    #[tokio::test]
    async fn test_export_po_file_returns_body() {
        let (url, handle) = serve_once(http_response("200 OK", "msgid \"Quit\"\nmsgstr \"Beenden\"\n")).await;

        let client = TolgeeClient::new(&url, "k".to_string()).unwrap();
        let content = client.export_po_file(12, "de").await.unwrap();
        assert!(content.contains(r#"msgstr "Beenden""#));

        let request = handle.await.unwrap();
        assert!(request.starts_with("POST /v2/projects/12/export "));
        assert!(request.ends_with(
            r#"{"escapeHtml":false,"format":"PO","supportArrays":false,"zip":false,"languages":["de"]}"#
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = TolgeeClient::new(&format!("http://{}", addr), "k".to_string()).unwrap();
        let result = client.project_stats().await;
        assert!(matches!(result, Err(SyncError::Transport(_))));
    }

    // ========== Integration Tests (require a real project) ==========

    #[tokio::test]
    #[ignore] // Run with: cargo test --ignored
    async fn test_real_api_current_key() {
        if std::env::var("TOLGEE_API_KEY").is_err() {
            eprintln!("Skipping: TOLGEE_API_KEY not set");
            return;
        }

        let client = TolgeeClient::from_env().unwrap();
        let info = client.current_api_key().await.unwrap();
        assert!(info.project_id > 0);
    }
}
