//! Single-writer cache of the last fetched (or loaded) translations
//!
//! Readers take cheap `Arc` snapshots and are never blocked by an in-flight fetch.
//! The content is only replaced while holding the fetcher's busy flag, and always
//! wholesale. Every replacement is published on a `watch` channel so hosts can
//! re-resolve their resources.

use crate::api::backend::TranslationBackend;
use crate::api::fetcher::RemoteKeyFetcher;
use crate::dictionary::LocalizedDictionary;
use crate::error::{SyncError, SyncResult};
use crate::model::{RemoteKey, RemoteKeyWithTranslations};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Immutable view of the cached state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslationSnapshot {
    /// Flattened `(key, locale)` rows consumed by the injector
    pub dictionary: LocalizedDictionary,
    /// One entry per remote key, used for reconciliation
    pub keys: Vec<RemoteKey>,
    /// Incremented on every replacement; 0 means nothing was loaded yet
    pub revision: u64,
}

impl TranslationSnapshot {
    pub fn has_data(&self) -> bool {
        self.revision > 0
    }

    fn from_fetch(keys: &[RemoteKeyWithTranslations], revision: u64) -> Self {
        Self {
            dictionary: LocalizedDictionary::from_remote_keys(keys),
            keys: keys.iter().map(|k| k.key.clone()).collect(),
            revision,
        }
    }

    fn from_dictionary(dictionary: LocalizedDictionary, revision: u64) -> Self {
        let keys = dictionary.remote_keys();
        Self {
            dictionary,
            keys,
            revision,
        }
    }
}

pub struct TranslationStore {
    fetcher: RemoteKeyFetcher,
    languages: Vec<String>,
    state: watch::Sender<Arc<TranslationSnapshot>>,
}

impl TranslationStore {
    pub fn new(backend: Arc<dyn TranslationBackend>, languages: Vec<String>) -> Self {
        let (state, _) = watch::channel(Arc::new(TranslationSnapshot::default()));
        Self {
            fetcher: RemoteKeyFetcher::new(backend),
            languages,
            state,
        }
    }

    pub fn fetcher(&self) -> &RemoteKeyFetcher {
        &self.fetcher
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Current state; may be stale while a fetch runs
    pub fn snapshot(&self) -> Arc<TranslationSnapshot> {
        self.state.borrow().clone()
    }

    /// Receive every future snapshot. Stands in for the host's resource refresh.
    pub fn subscribe(&self) -> watch::Receiver<Arc<TranslationSnapshot>> {
        self.state.subscribe()
    }

    fn replace(&self, build: impl FnOnce(u64) -> TranslationSnapshot) {
        let revision = self.state.borrow().revision + 1;
        let snapshot = build(revision);
        debug!(
            revision,
            keys = snapshot.keys.len(),
            rows = snapshot.dictionary.len(),
            "replacing cached translations"
        );
        self.state.send_replace(Arc::new(snapshot));
    }

    /// Fetch everything and replace the cache.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Fetched and applied
    /// * `Ok(false)` - Skipped because another fetch holds the busy flag
    /// * `Err(SyncError)` - Fetch failed; the previous state is kept
    pub async fn refresh(&self) -> SyncResult<bool> {
        let Some(_guard) = self.fetcher.begin_fetch() else {
            info!("Fetch skipped, an update is already in progress.");
            return Ok(false);
        };

        let keys = self.fetcher.collect_pages(&self.languages).await?;
        self.replace(|revision| TranslationSnapshot::from_fetch(&keys, revision));
        Ok(true)
    }

    /// Fetch and do not return before this call's own fetch has been applied.
    ///
    /// If another fetch is running, waits for it to finish and fetches again so the
    /// result is never older than the call. Bounded by `timeout`.
    pub async fn refresh_and_wait(&self, timeout: Duration) -> SyncResult<Arc<TranslationSnapshot>> {
        let fetch = async {
            loop {
                if self.refresh().await? {
                    return Ok::<_, SyncError>(self.snapshot());
                }
                self.fetcher.wait_until_idle().await;
            }
        };

        tokio::time::timeout(timeout, fetch)
            .await
            .map_err(|_| SyncError::FetchTimeout(timeout))?
    }

    /// Replace the cache with a snapshot file
    pub fn load_local_data(&self, path: &Path) -> SyncResult<bool> {
        let Some(_guard) = self.fetcher.begin_fetch() else {
            warn!("Not loading {:?}, a fetch is in progress.", path);
            return Ok(false);
        };

        let dictionary = LocalizedDictionary::load_from_file(path)?;
        info!(rows = dictionary.len(), "Loaded translations from {:?}", path);
        self.replace(|revision| TranslationSnapshot::from_dictionary(dictionary, revision));
        Ok(true)
    }

    /// Write the cached rows to `path`, waiting up to `timeout` for a first fetch
    pub async fn export(&self, path: &Path, timeout: Duration) -> SyncResult<()> {
        let mut receiver = self.state.subscribe();
        let snapshot = tokio::time::timeout(timeout, async {
            receiver
                .wait_for(|snapshot| snapshot.has_data())
                .await
                .map(|snapshot| snapshot.clone())
        })
        .await
        .map_err(|_| SyncError::FetchTimeout(timeout))?
        .map_err(|e| SyncError::Aborted(e.to_string()))?;

        snapshot.dictionary.save_to_file(path)?;
        info!(rows = snapshot.dictionary.len(), "Exported translations to {:?}", path);
        Ok(())
    }
}

impl std::fmt::Debug for TranslationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationStore")
            .field("fetcher", &self.fetcher)
            .field("languages", &self.languages)
            .field("revision", &self.state.borrow().revision)
            .finish()
    }
}
