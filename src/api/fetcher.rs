//! Paginated retrieval of every key in the project
//!
//! Pages are requested strictly one after another since each request needs the
//! previous page's cursor. A busy flag makes overlapping fetches a logged no-op
//! instead of interleaving them.

use crate::api::backend::TranslationBackend;
use crate::error::SyncResult;
use crate::model::RemoteKeyWithTranslations;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Fetches the complete remote key set, following cursors until exhausted
pub struct RemoteKeyFetcher {
    backend: Arc<dyn TranslationBackend>,
    busy: watch::Sender<bool>,
}

/// Sole ownership of the fetch-in-progress flag; clears it when dropped.
///
/// Dropping also happens when the owning future is cancelled, so an abandoned
/// fetch never leaves the flag set.
#[derive(Debug)]
pub struct FetchGuard<'a> {
    busy: &'a watch::Sender<bool>,
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.busy.send_replace(false);
    }
}

impl RemoteKeyFetcher {
    pub fn new(backend: Arc<dyn TranslationBackend>) -> Self {
        let (busy, _) = watch::channel(false);
        Self { backend, busy }
    }

    pub fn backend(&self) -> &Arc<dyn TranslationBackend> {
        &self.backend
    }

    pub fn is_fetch_in_progress(&self) -> bool {
        *self.busy.borrow()
    }

    /// Try to take the busy flag. `None` means another fetch is running.
    pub fn begin_fetch(&self) -> Option<FetchGuard<'_>> {
        let acquired = self.busy.send_if_modified(|busy| {
            if *busy {
                false
            } else {
                *busy = true;
                true
            }
        });
        acquired.then_some(FetchGuard { busy: &self.busy })
    }

    /// Wait until no fetch is in progress
    pub async fn wait_until_idle(&self) {
        let mut receiver = self.busy.subscribe();
        // The sender lives in `self`, so this can only end once the flag is clear
        let _ = receiver.wait_for(|busy| !*busy).await;
    }

    /// Fetch every key with translations for `languages`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(keys))` - All pages, concatenated in page order
    /// * `Ok(None)` - Another fetch was already running; nothing was requested
    /// * `Err(SyncError)` - A page failed; no partial result is returned
    pub async fn fetch_all_keys(
        &self,
        languages: &[String],
    ) -> SyncResult<Option<Vec<RemoteKeyWithTranslations>>> {
        let Some(_guard) = self.begin_fetch() else {
            info!("Fetch skipped, an update is already in progress.");
            return Ok(None);
        };

        self.collect_pages(languages).await.map(Some)
    }

    /// Request pages until the cursor runs out. Callers must hold a `FetchGuard`.
    pub(crate) async fn collect_pages(
        &self,
        languages: &[String],
    ) -> SyncResult<Vec<RemoteKeyWithTranslations>> {
        let mut keys = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page_index = 0usize;

        loop {
            let page = self
                .backend
                .fetch_translations_page(languages, cursor.as_deref())
                .await
                .inspect_err(|e| {
                    error!(
                        backend = self.backend.backend_name(),
                        page = page_index,
                        "Request to fetch translations failed: {}",
                        e
                    )
                })?;

            let next_cursor = page.cursor().map(str::to_string);
            let page_keys = page.into_keys();
            debug!(page = page_index, keys = page_keys.len(), "fetched translations page");

            keys.extend(page_keys.into_iter().map(|record| record.into_remote()));
            page_index += 1;

            match next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        info!(pages = page_index, keys = keys.len(), "All translations fetched");
        Ok(keys)
    }
}

impl std::fmt::Debug for RemoteKeyFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteKeyFetcher")
            .field("backend", &self.backend.backend_name())
            .field("in_progress", &self.is_fetch_in_progress())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{BackendCall, MockBackend, MockFailure, mock_key};
    use crate::error::SyncError;

    fn backend(count: i64, page_size: usize) -> Arc<MockBackend> {
        let keys = (1..=count)
            .map(|i| mock_key(i, &format!("key{}", i), "ns", "text", &[("en", "text")]))
            .collect();
        Arc::new(MockBackend::new().with_keys(keys).with_page_size(page_size))
    }

    // ========== Pagination Tests ==========

    #[tokio::test]
    async fn test_fetch_concatenates_pages_in_order() {
        let mock = backend(7, 3);
        let fetcher = RemoteKeyFetcher::new(mock.clone());

        let keys = fetcher
            .fetch_all_keys(&["en".to_string()])
            .await
            .unwrap()
            .unwrap();

        let names: Vec<_> = keys.iter().map(|k| k.key.name.as_str()).collect();
        assert_eq!(names, vec!["key1", "key2", "key3", "key4", "key5", "key6", "key7"]);
        // 3 + 3 + 1
        assert_eq!(mock.page_requests(), 3);
        assert!(!fetcher.is_fetch_in_progress());
    }

    #[tokio::test]
    async fn test_cursor_chain_and_languages_are_forwarded() {
        let mock = backend(4, 2);
        let fetcher = RemoteKeyFetcher::new(mock.clone());
        let languages = vec!["en".to_string(), "de".to_string()];

        fetcher.fetch_all_keys(&languages).await.unwrap();

        let calls = mock.calls();
        assert_eq!(
            calls,
            vec![
                BackendCall::FetchPage {
                    languages: languages.clone(),
                    cursor: None
                },
                BackendCall::FetchPage {
                    languages: languages.clone(),
                    cursor: Some("2".to_string())
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_project_single_request() {
        let mock = backend(0, 5);
        let fetcher = RemoteKeyFetcher::new(mock.clone());

        let keys = fetcher.fetch_all_keys(&[]).await.unwrap().unwrap();
        assert!(keys.is_empty());
        assert_eq!(mock.page_requests(), 1);
    }

    // ========== Failure Tests ==========

    #[tokio::test]
    async fn test_page_failure_aborts_whole_fetch() {
        let mock = Arc::new(
            MockBackend::new()
                .with_keys(
                    (1..=6)
                        .map(|i| mock_key(i, &format!("k{}", i), "ns", "t", &[]))
                        .collect(),
                )
                .with_page_size(2)
                .failing_page(1, MockFailure::Malformed),
        );
        let fetcher = RemoteKeyFetcher::new(mock.clone());

        let result = fetcher.fetch_all_keys(&[]).await;
        assert!(matches!(result, Err(SyncError::Deserialization(_))));
        assert_eq!(mock.page_requests(), 2);
        assert!(!fetcher.is_fetch_in_progress());
    }

    // ========== Busy Flag Tests ==========

    #[tokio::test]
    async fn test_concurrent_fetch_is_skipped() {
        let mock = Arc::new(
            MockBackend::new()
                .with_keys(vec![mock_key(1, "a", "ns", "A", &[])])
                .with_delay(50),
        );
        let fetcher = RemoteKeyFetcher::new(mock.clone());

        let (first, second) = tokio::join!(fetcher.fetch_all_keys(&[]), async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            fetcher.fetch_all_keys(&[]).await
        });

        assert_eq!(first.unwrap().unwrap().len(), 1);
        assert!(second.unwrap().is_none());
        assert_eq!(mock.page_requests(), 1);
    }

    #[tokio::test]
    async fn test_guard_clears_flag_on_drop() {
        let fetcher = RemoteKeyFetcher::new(backend(0, 1));
        {
            let guard = fetcher.begin_fetch();
            assert!(guard.is_some());
            assert!(fetcher.is_fetch_in_progress());
            assert!(fetcher.begin_fetch().is_none());
        }
        assert!(!fetcher.is_fetch_in_progress());
    }

    #[tokio::test]
    async fn test_wait_until_idle_returns_after_fetch() {
        let mock = Arc::new(MockBackend::new().with_delay(30));
        let fetcher = RemoteKeyFetcher::new(mock);

        let (fetched, ()) = tokio::join!(fetcher.fetch_all_keys(&[]), async {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            assert!(fetcher.is_fetch_in_progress());
            fetcher.wait_until_idle().await;
            assert!(!fetcher.is_fetch_in_progress());
        });
        assert!(fetched.unwrap().is_some());
    }
}
