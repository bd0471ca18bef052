//! In-memory translation backend for testing
//!
//! This module provides a deterministic, network-free backend that behaves like a
//! small Tolgee project: it paginates its keys, applies imports, updates and
//! deletes to its own state, and records every call it receives.
//!
//! # Example
//!
//! ```ignore
//! use tolgee_sync::api::{MockBackend, TranslationBackend, mock_key};
//!
//! #[tokio::test]
//! async fn test_fetch() {
//!     let backend = MockBackend::new()
//!         .with_keys(vec![mock_key(1, "start", "menu", "Start", &[("de", "Starten")])])
//!         .with_page_size(10);
//!     let page = backend.fetch_translations_page(&["de".to_string()], None).await.unwrap();
//!     assert_eq!(page.into_keys().len(), 1);
//! }
//! ```

use crate::api::backend::TranslationBackend;
use crate::api::data::{
    ApiKeyInfo, ComplexUpdatePayload, DeleteKeysPayload, ImportKeysPayload, KeyRecord,
    PoFileUpload, ProjectStats, TagRecord, TranslationRecord, TranslationsPage,
};
use crate::error::{SyncError, SyncResult};
use crate::hash::hash_tag;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Failure a mock call can be told to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Behave as if the connection dropped
    Transport,
    /// Answer with the given non-2xx status
    Status(u16),
    /// Answer 200 with a body that is not valid JSON
    Malformed,
}

impl MockFailure {
    fn into_error(self) -> SyncError {
        match self {
            MockFailure::Transport => SyncError::Transport("mock connection reset".to_string()),
            MockFailure::Status(status) => SyncError::HttpStatus {
                status,
                body: "mock failure".to_string(),
            },
            MockFailure::Malformed => {
                SyncError::Deserialization("mock malformed body".to_string())
            }
        }
    }
}

/// Write operations whose failure can be injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    Import,
    ComplexUpdate,
    Delete,
    Stats,
    PoImport,
    PoExport,
}

/// A call received by the mock, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    FetchPage {
        languages: Vec<String>,
        cursor: Option<String>,
    },
    Import(ImportKeysPayload),
    ComplexUpdate {
        key_id: i64,
        payload: ComplexUpdatePayload,
    },
    Delete(DeleteKeysPayload),
    Stats,
    CurrentApiKey,
    PoImport {
        project_id: i64,
        upload: PoFileUpload,
    },
    PoExport {
        project_id: i64,
        locale: String,
    },
}

#[derive(Debug, Default)]
struct MockState {
    keys: Vec<KeyRecord>,
    next_id: i64,
    calls: Vec<BackendCall>,
    failing_pages: HashMap<usize, MockFailure>,
    failing_operations: HashMap<MockOperation, MockFailure>,
    stats: ProjectStats,
    project_id: i64,
    /// Locale -> PO content served by exports
    po_exports: HashMap<String, String>,
}

/// Mock backend holding a project's keys in memory
#[derive(Debug)]
pub struct MockBackend {
    state: Mutex<MockState>,
    page_size: usize,
    /// Optional simulated network delay (in milliseconds)
    delay_ms: u64,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create an empty project with a page size of 100
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_id: 1,
                project_id: 1,
                ..MockState::default()
            }),
            page_size: 100,
            delay_ms: 0,
        }
    }

    /// Seed the project with keys. New ids continue after the highest seeded id.
    pub fn with_keys(self, keys: Vec<KeyRecord>) -> Self {
        {
            let mut state = self.lock();
            let max_id = keys.iter().filter_map(|k| k.id).max().unwrap_or(0);
            state.next_id = state.next_id.max(max_id + 1);
            state.keys = keys;
        }
        self
    }

    /// Number of keys served per page (at least 1)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Delay applied before answering every call
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_project_id(self, project_id: i64) -> Self {
        self.lock().project_id = project_id;
        self
    }

    pub fn with_stats(self, stats: ProjectStats) -> Self {
        self.set_stats(stats);
        self
    }

    /// Serve `content` when `locale` is exported as PO
    pub fn with_po_export(self, locale: &str, content: &str) -> Self {
        self.lock()
            .po_exports
            .insert(locale.to_string(), content.to_string());
        self
    }

    /// Make the page at `index` (0-based) fail
    pub fn failing_page(self, index: usize, failure: MockFailure) -> Self {
        self.lock().failing_pages.insert(index, failure);
        self
    }

    /// Make every call of `operation` fail
    pub fn failing_operation(self, operation: MockOperation, failure: MockFailure) -> Self {
        self.lock().failing_operations.insert(operation, failure);
        self
    }

    /// Replace the statistics served by `project_stats`
    pub fn set_stats(&self, stats: ProjectStats) {
        self.lock().stats = stats;
    }

    /// Snapshot of the project's keys
    pub fn keys(&self) -> Vec<KeyRecord> {
        self.lock().keys.clone()
    }

    /// Every call received so far
    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    /// Number of page requests received so far
    pub fn page_requests(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, BackendCall::FetchPage { .. }))
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not cascade into every other assertion
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn apply_delay(&self) {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
    }

    fn check_project(state: &MockState, project_id: i64) -> SyncResult<()> {
        if project_id == state.project_id {
            Ok(())
        } else {
            Err(SyncError::HttpStatus {
                status: 404,
                body: format!("project {} not found", project_id),
            })
        }
    }

    fn check_failure(state: &MockState, operation: MockOperation) -> SyncResult<()> {
        match state.failing_operations.get(&operation) {
            Some(failure) => Err(failure.into_error()),
            None => Ok(()),
        }
    }
}

/// Build a key record tagged with the hash of `source_text`.
///
/// `translations` pairs a locale with its text.
pub fn mock_key(
    id: i64,
    name: &str,
    namespace: &str,
    source_text: &str,
    translations: &[(&str, &str)],
) -> KeyRecord {
    KeyRecord {
        id: Some(id),
        name: name.to_string(),
        namespace: Some(namespace.to_string()),
        tags: Some(vec![TagRecord {
            id: None,
            name: hash_tag(source_text),
        }]),
        translations: Some(
            translations
                .iter()
                .enumerate()
                .map(|(i, (locale, text))| {
                    (
                        locale.to_string(),
                        TranslationRecord {
                            id: Some(id * 100 + i as i64),
                            text: Some(text.to_string()),
                        },
                    )
                })
                .collect(),
        ),
    }
}

#[async_trait]
impl TranslationBackend for MockBackend {
    async fn fetch_translations_page(
        &self,
        languages: &[String],
        cursor: Option<&str>,
    ) -> SyncResult<TranslationsPage> {
        self.apply_delay().await;

        let mut state = self.lock();
        state.calls.push(BackendCall::FetchPage {
            languages: languages.to_vec(),
            cursor: cursor.map(str::to_string),
        });

        let offset = match cursor {
            None => 0,
            Some(c) => c.parse::<usize>().map_err(|_| SyncError::HttpStatus {
                status: 400,
                body: format!("invalid cursor '{}'", c),
            })?,
        };

        if let Some(failure) = state.failing_pages.get(&(offset / self.page_size)) {
            return Err(failure.into_error());
        }

        let end = (offset + self.page_size).min(state.keys.len());
        let keys = state
            .keys
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .cloned()
            .map(|mut key| {
                if !languages.is_empty() {
                    if let Some(translations) = key.translations.as_mut() {
                        translations.retain(|locale, _| languages.contains(locale));
                    }
                }
                key
            })
            .collect();

        let next_cursor = (end < state.keys.len()).then(|| end.to_string());
        Ok(TranslationsPage::new(keys, next_cursor))
    }

    async fn import_keys(&self, payload: &ImportKeysPayload) -> SyncResult<()> {
        self.apply_delay().await;

        let mut state = self.lock();
        state.calls.push(BackendCall::Import(payload.clone()));
        Self::check_failure(&state, MockOperation::Import)?;

        for item in &payload.keys {
            let id = state.next_id;
            state.next_id += 1;

            let translations: BTreeMap<String, TranslationRecord> = item
                .translations
                .iter()
                .map(|(locale, text)| {
                    (
                        locale.clone(),
                        TranslationRecord {
                            id: None,
                            text: Some(text.clone()),
                        },
                    )
                })
                .collect();

            state.keys.push(KeyRecord {
                id: Some(id),
                name: item.name.clone(),
                namespace: Some(item.namespace.clone()),
                tags: Some(
                    item.tags
                        .iter()
                        .map(|name| TagRecord {
                            id: None,
                            name: name.clone(),
                        })
                        .collect(),
                ),
                translations: Some(translations),
            });
        }
        Ok(())
    }

    async fn complex_update(
        &self,
        key_id: i64,
        payload: &ComplexUpdatePayload,
    ) -> SyncResult<()> {
        self.apply_delay().await;

        let mut state = self.lock();
        state.calls.push(BackendCall::ComplexUpdate {
            key_id,
            payload: payload.clone(),
        });
        Self::check_failure(&state, MockOperation::ComplexUpdate)?;

        let key = state
            .keys
            .iter_mut()
            .find(|k| k.id == Some(key_id))
            .ok_or_else(|| SyncError::HttpStatus {
                status: 404,
                body: format!("key {} not found", key_id),
            })?;

        key.name = payload.name.clone();
        key.namespace = Some(payload.namespace.clone());
        key.tags = Some(
            payload
                .tags
                .iter()
                .map(|name| TagRecord {
                    id: None,
                    name: name.clone(),
                })
                .collect(),
        );
        Ok(())
    }

    async fn delete_keys(&self, payload: &DeleteKeysPayload) -> SyncResult<()> {
        self.apply_delay().await;

        let mut state = self.lock();
        state.calls.push(BackendCall::Delete(payload.clone()));
        Self::check_failure(&state, MockOperation::Delete)?;

        state
            .keys
            .retain(|k| !k.id.is_some_and(|id| payload.ids.contains(&id)));
        Ok(())
    }

    async fn project_stats(&self) -> SyncResult<ProjectStats> {
        self.apply_delay().await;

        let mut state = self.lock();
        state.calls.push(BackendCall::Stats);
        Self::check_failure(&state, MockOperation::Stats)?;
        Ok(state.stats.clone())
    }

    async fn current_api_key(&self) -> SyncResult<ApiKeyInfo> {
        let mut state = self.lock();
        state.calls.push(BackendCall::CurrentApiKey);
        Ok(ApiKeyInfo {
            project_id: state.project_id,
        })
    }

    async fn import_po_file(&self, project_id: i64, upload: &PoFileUpload) -> SyncResult<String> {
        self.apply_delay().await;

        let mut state = self.lock();
        state.calls.push(BackendCall::PoImport {
            project_id,
            upload: upload.clone(),
        });
        Self::check_project(&state, project_id)?;
        Self::check_failure(&state, MockOperation::PoImport)?;
        Ok(r#"{"unresolvedConflicts":[]}"#.to_string())
    }

    async fn export_po_file(&self, project_id: i64, locale: &str) -> SyncResult<String> {
        self.apply_delay().await;

        let mut state = self.lock();
        state.calls.push(BackendCall::PoExport {
            project_id,
            locale: locale.to_string(),
        });
        Self::check_project(&state, project_id)?;
        Self::check_failure(&state, MockOperation::PoExport)?;
        state
            .po_exports
            .get(locale)
            .cloned()
            .ok_or_else(|| SyncError::HttpStatus {
                status: 400,
                body: format!("language {} not in project", locale),
            })
    }

    fn backend_name(&self) -> &str {
        "Mock Backend"
    }
}
