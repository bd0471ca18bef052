//! Live translation updates
//!
//! Instead of downloading every key on each tick, the monitor polls the project
//! statistics and only refreshes the store when the newest `translationsUpdatedAt`
//! among the watched languages moves forward.

use crate::api::data::ProjectStats;
use crate::config::Settings;
use crate::error::SyncResult;
use crate::store::TranslationStore;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub struct UpdateMonitor {
    store: Arc<TranslationStore>,
    last_seen: Mutex<Option<i64>>,
}

impl UpdateMonitor {
    const MIN_INTERVAL: Duration = Duration::from_millis(1);

    pub fn new(store: Arc<TranslationStore>) -> Self {
        Self {
            store,
            last_seen: Mutex::new(None),
        }
    }

    /// Newest change timestamp among the watched languages (all when none are configured)
    pub fn newest_update(stats: &ProjectStats, languages: &[String]) -> Option<i64> {
        stats
            .language_stats
            .iter()
            .filter(|stat| languages.is_empty() || languages.contains(&stat.language_tag))
            .filter_map(|stat| stat.translations_updated_at)
            .max()
    }

    fn last_seen(&self) -> Option<i64> {
        *self.last_seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_last_seen(&self, value: Option<i64>) {
        *self.last_seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = value;
    }

    /// Poll the statistics and refresh if anything changed since the last refresh.
    ///
    /// The first call always refreshes. Returns whether a refresh was applied.
    pub async fn check_for_updates(&self) -> SyncResult<bool> {
        let stats = self.store.fetcher().backend().project_stats().await?;
        let newest = Self::newest_update(&stats, self.store.languages());

        let first = !self.store.snapshot().has_data();
        let advanced = match (self.last_seen(), newest) {
            (Some(seen), Some(newest)) => newest > seen,
            (None, Some(_)) => true,
            (_, None) => false,
        };

        if !first && !advanced {
            debug!(?newest, "translations unchanged");
            return Ok(false);
        }

        let applied = self.store.refresh().await?;
        if applied {
            info!(?newest, "Translations refreshed");
            self.set_last_seen(newest);
        }
        Ok(applied)
    }

    /// Check every `interval` until `shutdown` turns true or its sender is dropped.
    ///
    /// Intervals below one millisecond are raised to one millisecond.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval.max(Self::MIN_INTERVAL));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.check_for_updates().await {
                        error!("Checking for translation updates failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("update monitor stopped");
                        return;
                    }
                }
            }
        }
    }
}

/// Fill the store at startup: live from the backend or from the snapshot on disk
pub async fn load_initial_data(store: &TranslationStore, settings: &Settings) -> SyncResult<()> {
    if settings.live_translation_updates {
        if !settings.is_ready_to_send_requests() {
            warn!("Settings are not set up properly. Fetch request will be skipped.");
            return Ok(());
        }
        store.refresh().await.map(|_| ())
    } else {
        store.load_local_data(&settings.snapshot_path).map(|_| ())
    }
}

/// Project id and per-language change times
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectStatus {
    pub project_id: i64,
    /// `(language, translationsUpdatedAt)` as reported
    pub languages: Vec<(String, Option<i64>)>,
}

/// Ask the backend which project the key belongs to and how fresh each language is
pub async fn project_status(store: &TranslationStore) -> SyncResult<ProjectStatus> {
    let backend = store.fetcher().backend();
    let info = backend.current_api_key().await?;
    let stats = backend.project_stats().await?;

    Ok(ProjectStatus {
        project_id: info.project_id,
        languages: stats
            .language_stats
            .into_iter()
            .map(|stat| (stat.language_tag, stat.translations_updated_at))
            .collect(),
    })
}
