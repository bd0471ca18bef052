//! Translation backend trait
//!
//! This module defines the `TranslationBackend` trait for backend abstraction,
//! so the fetcher and the sync flow can run against the real Tolgee API or an
//! in-memory mock without knowing which one they talk to.
//!
//! # Example
//!
//! ```ignore
//! use tolgee_sync::api::{TranslationBackend, TolgeeClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = TolgeeClient::from_env()?;
//!
//!     let languages = vec!["en".to_string(), "de".to_string()];
//!     let page = client.fetch_translations_page(&languages, None).await?;
//!     println!("next cursor: {:?}", page.cursor());
//!
//!     Ok(())
//! }
//! ```

use crate::api::data::{
    ApiKeyInfo, ComplexUpdatePayload, DeleteKeysPayload, ImportKeysPayload, PoFileUpload,
    ProjectStats, TranslationsPage,
};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use reqwest::Url;

/// Operations the sync pipeline needs from a translation-management backend.
///
/// All methods are async since every real implementation is network-bound.
/// Implementations report transport failures, non-2xx statuses and malformed
/// bodies as distinct `SyncError` variants.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    /// Fetch one page of project keys with their translations.
    ///
    /// # Arguments
    ///
    /// * `languages` - Locales to include translations for
    /// * `cursor` - Cursor returned by the previous page, `None` for the first page
    async fn fetch_translations_page(
        &self,
        languages: &[String],
        cursor: Option<&str>,
    ) -> SyncResult<TranslationsPage>;

    /// Create new keys, each with its tags and initial translations
    async fn import_keys(&self, payload: &ImportKeysPayload) -> SyncResult<()>;

    /// Replace the metadata (name, namespace, tags) of one key
    async fn complex_update(&self, key_id: i64, payload: &ComplexUpdatePayload)
    -> SyncResult<()>;

    /// Delete keys by id
    async fn delete_keys(&self, payload: &DeleteKeysPayload) -> SyncResult<()>;

    /// Per-language statistics, used to poll for staleness
    async fn project_stats(&self) -> SyncResult<ProjectStats>;

    /// Information about the API key in use, including its project
    async fn current_api_key(&self) -> SyncResult<ApiKeyInfo>;

    /// Import a PO file into the project in one step.
    ///
    /// Returns the backend's response body, which describes the import result.
    async fn import_po_file(&self, project_id: i64, upload: &PoFileUpload) -> SyncResult<String>;

    /// Export one locale of the project as PO file content
    async fn export_po_file(&self, project_id: i64, locale: &str) -> SyncResult<String>;

    /// Name used in logs to identify the backend
    fn backend_name(&self) -> &str;
}

/// URL of one page of the translations endpoint.
///
/// `cursor` comes first when present, then one `languages` pair per locale. No
/// parameters means no `?` at all.
pub fn translations_url(endpoint: &str, languages: &[String], cursor: Option<&str>) -> SyncResult<Url> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| SyncError::Configuration(format!("Invalid API URL '{}': {}", endpoint, e)))?;

    {
        let mut query = url.query_pairs_mut();
        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            query.append_pair("cursor", cursor);
        }
        for language in languages {
            query.append_pair("languages", language);
        }
    }

    if url.query().is_some_and(str::is_empty) {
        url.set_query(None);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENDPOINT: &str = "https://x/v2/projects/translations";

    #[test]
    fn test_url_without_parameters() {
        let url = translations_url(ENDPOINT, &[], None).unwrap();
        assert_eq!(url.as_str(), ENDPOINT);
    }

    #[test]
    fn test_url_first_page() {
        let languages = vec!["en".to_string(), "de".to_string()];
        let url = translations_url(ENDPOINT, &languages, None).unwrap();
        assert_eq!(url.query(), Some("languages=en&languages=de"));
    }

    #[test]
    fn test_url_with_cursor() {
        let languages = vec!["en".to_string()];
        let url = translations_url(ENDPOINT, &languages, Some("WyJrZXkiXQ==")).unwrap();
        assert_eq!(url.query(), Some("cursor=WyJrZXkiXQ%3D%3D&languages=en"));
    }

    #[test]
    fn test_url_ignores_empty_cursor() {
        let languages = vec!["en".to_string()];
        let url = translations_url(ENDPOINT, &languages, Some("")).unwrap();
        assert_eq!(url.query(), Some("languages=en"));
    }

    #[test]
    fn test_url_encodes_values() {
        let languages = vec!["zh-Hans_CN".to_string(), "a b&c".to_string()];
        let url = translations_url(ENDPOINT, &languages, None).unwrap();
        assert_eq!(url.query(), Some("languages=zh-Hans_CN&languages=a+b%26c"));

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[1], ("languages".to_string(), "a b&c".to_string()));
    }

    #[test]
    fn test_url_rejects_invalid_endpoint() {
        let result = translations_url("not a url", &[], None);
        assert!(matches!(result, Err(SyncError::Configuration(_))));
    }
}
