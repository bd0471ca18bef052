//! End-to-end key synchronization
//!
//! A sync run walks `Idle -> GatheringLocal -> FetchingRemote -> Reconciling ->
//! AwaitingConfirmation -> Executing -> Idle`. Any failure before `Executing`
//! returns straight to `Idle`. Once executing, every backend call is best-effort:
//! a failed call is logged and recorded, the remaining calls still run, and
//! nothing already applied is rolled back.

use crate::api::data::{ComplexUpdatePayload, DeleteKeysPayload, ImportKeyItem, ImportKeysPayload};
use crate::config::Settings;
use crate::error::{SyncError, SyncResult};
use crate::gather::LocalKeyGatherer;
use crate::hash::{hash_tag, text_tag};
use crate::model::{LocalizationKey, RemoteKey};
use crate::reconcile::{Reconciliation, reconcile};
use crate::store::TranslationStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    Idle,
    GatheringLocal,
    FetchingRemote,
    Reconciling,
    AwaitingConfirmation,
    Executing,
}

/// Categories the operator agreed to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSelection {
    pub add: bool,
    pub update: bool,
    pub delete: bool,
}

impl SyncSelection {
    pub fn all() -> Self {
        Self {
            add: true,
            update: true,
            delete: true,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        !(self.add || self.update || self.delete)
    }
}

/// Counts shown to the operator before anything is changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub to_add: usize,
    pub to_update: usize,
    pub to_delete: usize,
}

impl From<&Reconciliation> for SyncSummary {
    fn from(reconciliation: &Reconciliation) -> Self {
        let (to_add, to_update, to_delete) = reconciliation.counts();
        Self {
            to_add,
            to_update,
            to_delete,
        }
    }
}

/// Asks the operator which categories to execute
#[async_trait]
pub trait Confirmation: Send + Sync {
    async fn confirm(&self, summary: &SyncSummary) -> SyncSelection;
}

/// Non-interactive confirmation with a preset answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoConfirm(pub SyncSelection);

#[async_trait]
impl Confirmation for AutoConfirm {
    async fn confirm(&self, summary: &SyncSummary) -> SyncSelection {
        info!(
            add = summary.to_add,
            update = summary.to_update,
            delete = summary.to_delete,
            "Running pending operations without confirmation"
        );
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    Upload,
    Update,
    Delete,
}

impl std::fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncOperation::Upload => write!(f, "upload new keys"),
            SyncOperation::Update => write!(f, "update outdated keys"),
            SyncOperation::Delete => write!(f, "delete unused keys"),
        }
    }
}

/// What the executing phase actually did
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub uploaded: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Keys left alone because they have no remote id
    pub skipped: Vec<RemoteKey>,
    pub failures: Vec<(SyncOperation, SyncError)>,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
pub enum SyncOutcome {
    /// Local and remote keys already agree
    UpToDate,
    /// The operator selected no category
    NothingSelected,
    Executed(ExecutionReport),
}

#[derive(Debug)]
pub struct SyncReport {
    pub summary: SyncSummary,
    pub outcome: SyncOutcome,
    /// Every state entered, in order, ending with `Idle`
    pub transitions: Vec<SyncState>,
}

/// Resets the published state to `Idle` however the run ends
struct IdleOnDrop<'a>(&'a watch::Sender<SyncState>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.send_replace(SyncState::Idle);
    }
}

pub struct SyncOrchestrator {
    store: Arc<TranslationStore>,
    gatherer: Arc<dyn LocalKeyGatherer>,
    settings: Settings,
    state: watch::Sender<SyncState>,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<TranslationStore>,
        gatherer: Arc<dyn LocalKeyGatherer>,
        settings: Settings,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            store,
            gatherer,
            settings,
            state,
        }
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    fn enter(&self, state: SyncState, transitions: &mut Vec<SyncState>) {
        self.state.send_replace(state);
        transitions.push(state);
    }

    fn begin(&self) -> SyncResult<IdleOnDrop<'_>> {
        if !self.settings.is_ready_to_send_requests() {
            return Err(SyncError::Configuration(
                "Settings are not set up properly: API key and URL are required".to_string(),
            ));
        }

        let started = self.state.send_if_modified(|state| {
            if *state == SyncState::Idle {
                *state = SyncState::GatheringLocal;
                true
            } else {
                false
            }
        });

        if started {
            Ok(IdleOnDrop(&self.state))
        } else {
            Err(SyncError::Aborted("A sync is already running".to_string()))
        }
    }

    /// Gather, fetch and reconcile without changing anything remotely
    pub async fn diff(&self) -> SyncResult<Reconciliation> {
        let _idle = self.begin()?;
        let mut transitions = vec![SyncState::GatheringLocal];
        self.prepare(&mut transitions).await
    }

    async fn prepare(&self, transitions: &mut Vec<SyncState>) -> SyncResult<Reconciliation> {
        let local_keys = self.gatherer.gather().inspect_err(|e| {
            error!("Gathering local keys failed: {}", e);
        })?;
        info!(keys = local_keys.len(), "Gathered local keys");

        self.enter(SyncState::FetchingRemote, transitions);
        let snapshot = self
            .store
            .refresh_and_wait(self.settings.fetch_timeout())
            .await?;

        self.enter(SyncState::Reconciling, transitions);
        Ok(reconcile(&local_keys, &snapshot.keys))
    }

    /// Run a complete sync, asking `confirmation` before changing anything
    pub async fn sync(&self, confirmation: &dyn Confirmation) -> SyncResult<SyncReport> {
        let idle = self.begin()?;
        let mut transitions = vec![SyncState::GatheringLocal];

        let reconciliation = self.prepare(&mut transitions).await?;
        let summary = SyncSummary::from(&reconciliation);

        let outcome = if reconciliation.is_empty() {
            info!("Everything is up to date.");
            SyncOutcome::UpToDate
        } else {
            self.enter(SyncState::AwaitingConfirmation, &mut transitions);
            let selection = confirmation.confirm(&summary).await;

            if selection.is_empty() {
                info!("No operation selected, nothing was changed.");
                SyncOutcome::NothingSelected
            } else {
                self.enter(SyncState::Executing, &mut transitions);
                SyncOutcome::Executed(self.execute(&reconciliation, selection).await)
            }
        };

        drop(idle);
        transitions.push(SyncState::Idle);

        Ok(SyncReport {
            summary,
            outcome,
            transitions,
        })
    }

    /// Apply the selected categories in order: upload, update, delete
    pub async fn execute(
        &self,
        reconciliation: &Reconciliation,
        selection: SyncSelection,
    ) -> ExecutionReport {
        let mut report = ExecutionReport::default();

        if selection.add && !reconciliation.to_add.is_empty() {
            match self.upload_keys(&reconciliation.to_add).await {
                Ok(count) => report.uploaded = count,
                Err(e) => report.failures.push((SyncOperation::Upload, e)),
            }
        }

        if selection.update && !reconciliation.to_update.is_empty() {
            self.update_keys(&reconciliation.to_update, &mut report).await;
        }

        if selection.delete && !reconciliation.to_delete.is_empty() {
            match self.delete_keys(&reconciliation.to_delete, &mut report.skipped).await {
                Ok(count) => report.deleted = count,
                Err(e) => report.failures.push((SyncOperation::Delete, e)),
            }
        }

        report
    }

    fn key_tags(&self, key: &LocalizationKey) -> Vec<String> {
        let mut tags = vec![hash_tag(&key.default_text)];
        if self.settings.tag_original_text {
            tags.push(text_tag(&key.default_text));
        }
        tags
    }

    fn import_payload(&self, keys: &[LocalizationKey]) -> ImportKeysPayload {
        let locale = self.settings.default_locale();
        ImportKeysPayload {
            keys: keys
                .iter()
                .map(|key| ImportKeyItem {
                    name: key.name.clone(),
                    namespace: key.namespace.clone(),
                    tags: self.key_tags(key),
                    translations: BTreeMap::from([(locale.to_string(), key.default_text.clone())]),
                })
                .collect(),
        }
    }

    async fn upload_keys(&self, keys: &[LocalizationKey]) -> SyncResult<usize> {
        info!("Upload request payload:");
        for key in keys {
            info!("- namespace:{} key:{} default:{}", key.namespace, key.name, key.default_text);
        }

        let payload = self.import_payload(keys);
        self.call(SyncOperation::Upload, self.backend().import_keys(&payload))
            .await?;
        Ok(keys.len())
    }

    async fn update_keys(&self, pairs: &[(LocalizationKey, RemoteKey)], report: &mut ExecutionReport) {
        for (local, remote) in pairs {
            let Some(key_id) = remote.remote_id else {
                warn!(
                    "- namespace:{} key:{} -> Cannot be updated: Invalid id.",
                    remote.namespace, remote.name
                );
                report.skipped.push(remote.clone());
                continue;
            };

            info!("Update request payload:");
            info!("- id:{} namespace:{} key:{}", key_id, remote.namespace, remote.name);

            let payload = ComplexUpdatePayload {
                name: remote.name.clone(),
                namespace: remote.namespace.clone(),
                tags: self.key_tags(local),
            };

            match self
                .call(SyncOperation::Update, self.backend().complex_update(key_id, &payload))
                .await
            {
                Ok(()) => report.updated += 1,
                Err(e) => report.failures.push((SyncOperation::Update, e)),
            }
        }
    }

    async fn delete_keys(&self, keys: &[RemoteKey], skipped: &mut Vec<RemoteKey>) -> SyncResult<usize> {
        info!("Delete request payload:");
        let mut ids = Vec::with_capacity(keys.len());
        for key in keys {
            match key.remote_id {
                Some(id) => {
                    info!("- id:{} namespace:{} key:{}", id, key.namespace, key.name);
                    ids.push(id);
                }
                None => {
                    warn!(
                        "- namespace:{} key:{} -> Cannot be deleted: Invalid id.",
                        key.namespace, key.name
                    );
                    skipped.push(key.clone());
                }
            }
        }

        if ids.is_empty() {
            warn!("No key with a valid id to delete, skipping request.");
            return Ok(0);
        }

        let count = ids.len();
        let payload = DeleteKeysPayload { ids };
        self.call(SyncOperation::Delete, self.backend().delete_keys(&payload))
            .await?;
        Ok(count)
    }

    fn backend(&self) -> &dyn crate::api::backend::TranslationBackend {
        self.store.fetcher().backend().as_ref()
    }

    /// Await one backend call, log its outcome and refresh the cache on success
    async fn call(
        &self,
        operation: SyncOperation,
        request: impl std::future::Future<Output = SyncResult<()>>,
    ) -> SyncResult<()> {
        if let Err(e) = request.await {
            error!("Request to {} was unsuccessful: {}", operation, e);
            return Err(e);
        }

        info!("Request to {} succeeded.", operation);
        if let Err(e) = self.store.refresh().await {
            warn!("Refreshing translations after {} failed: {}", operation, e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{BackendCall, MockBackend, MockFailure, MockOperation, mock_key};
    use crate::gather::StaticGatherer;
    use crate::hash::translation_hash;
    use std::collections::BTreeSet;

    fn settings() -> Settings {
        Settings {
            api_key: "test-key".to_string(),
            languages: vec!["de".to_string(), "en".to_string()],
            fetch_timeout_secs: 5,
            ..Settings::default()
        }
    }

    fn orchestrator(backend: Arc<MockBackend>, local: Vec<LocalizationKey>) -> SyncOrchestrator {
        let store = Arc::new(TranslationStore::new(backend, vec!["de".to_string()]));
        SyncOrchestrator::new(store, Arc::new(StaticGatherer::new(local)), settings())
    }

    fn remote_seed() -> Vec<crate::api::data::KeyRecord> {
        vec![
            mock_key(1, "a", "ns1", "A", &[("de", "A-de")]),
            mock_key(2, "c", "ns1", "C", &[]),
            mock_key(3, "d", "ns1", "old", &[]),
        ]
    }

    fn local_keys() -> Vec<LocalizationKey> {
        vec![
            LocalizationKey::new("a", "ns1", "A"),
            LocalizationKey::new("b", "ns1", "B"),
            LocalizationKey::new("d", "ns1", "new"),
        ]
    }

    struct FailingGatherer;

    impl LocalKeyGatherer for FailingGatherer {
        fn gather(&self) -> SyncResult<Vec<LocalizationKey>> {
            Err(SyncError::Extraction("no targets".to_string()))
        }
    }

    // ========== Flow Tests ==========

    #[tokio::test]
    async fn test_full_sync_runs_in_order() {
        let backend = Arc::new(MockBackend::new().with_keys(remote_seed()));
        let sync = orchestrator(backend.clone(), local_keys());

        let report = sync.sync(&AutoConfirm(SyncSelection::all())).await.unwrap();

        assert_eq!(
            report.summary,
            SyncSummary {
                to_add: 1,
                to_update: 1,
                to_delete: 1
            }
        );
        assert_eq!(
            report.transitions,
            vec![
                SyncState::GatheringLocal,
                SyncState::FetchingRemote,
                SyncState::Reconciling,
                SyncState::AwaitingConfirmation,
                SyncState::Executing,
                SyncState::Idle,
            ]
        );
        assert_eq!(sync.state(), SyncState::Idle);

        let SyncOutcome::Executed(execution) = report.outcome else {
            panic!("expected execution");
        };
        assert_eq!((execution.uploaded, execution.updated, execution.deleted), (1, 1, 1));
        assert!(execution.is_success());

        let writes: Vec<_> = backend
            .calls()
            .into_iter()
            .filter(|c| !matches!(c, BackendCall::FetchPage { .. }))
            .collect();
        assert!(matches!(writes[0], BackendCall::Import(_)));
        assert!(matches!(writes[1], BackendCall::ComplexUpdate { key_id: 3, .. }));
        assert_eq!(writes[2], BackendCall::Delete(DeleteKeysPayload { ids: vec![2] }));
    }

    #[tokio::test]
    async fn test_upload_payload_tags_and_locale() {
        let backend = Arc::new(MockBackend::new());
        let store = Arc::new(TranslationStore::new(backend.clone(), vec!["de".to_string()]));
        let settings = Settings {
            tag_original_text: true,
            ..settings()
        };
        let sync = SyncOrchestrator::new(
            store,
            Arc::new(StaticGatherer::new(vec![LocalizationKey::new("hi", "ui", "hello")])),
            settings,
        );

        sync.sync(&AutoConfirm(SyncSelection::all())).await.unwrap();

        let import = backend
            .calls()
            .into_iter()
            .find_map(|c| match c {
                BackendCall::Import(payload) => Some(payload),
                _ => None,
            })
            .unwrap();
        let item = &import.keys[0];
        assert_eq!(item.name, "hi");
        assert_eq!(item.namespace, "ui");
        assert_eq!(
            item.tags,
            vec![format!("OriginalHash:{}", translation_hash("hello")), "OriginalText:hello".to_string()]
        );
        assert_eq!(item.translations, BTreeMap::from([("de".to_string(), "hello".to_string())]));
    }

    #[tokio::test]
    async fn test_update_retags_with_new_hash() {
        let backend = Arc::new(MockBackend::new().with_keys(vec![mock_key(7, "a", "ns", "goodbye", &[])]));
        let sync = orchestrator(backend.clone(), vec![LocalizationKey::new("a", "ns", "hello")]);

        sync.sync(&AutoConfirm(SyncSelection::all())).await.unwrap();

        let update = backend
            .calls()
            .into_iter()
            .find_map(|c| match c {
                BackendCall::ComplexUpdate { key_id, payload } => Some((key_id, payload)),
                _ => None,
            })
            .unwrap();
        assert_eq!(update.0, 7);
        assert_eq!(
            update.1,
            ComplexUpdatePayload {
                name: "a".to_string(),
                namespace: "ns".to_string(),
                tags: vec![format!("OriginalHash:{}", translation_hash("hello"))],
            }
        );
    }

    #[tokio::test]
    async fn test_up_to_date_skips_confirmation() {
        let backend = Arc::new(MockBackend::new().with_keys(vec![mock_key(1, "a", "ns", "A", &[])]));
        let sync = orchestrator(backend.clone(), vec![LocalizationKey::new("a", "ns", "A")]);

        let report = sync.sync(&AutoConfirm(SyncSelection::all())).await.unwrap();

        assert!(matches!(report.outcome, SyncOutcome::UpToDate));
        assert!(!report.transitions.contains(&SyncState::AwaitingConfirmation));
        assert_eq!(backend.page_requests(), 1);
    }

    #[tokio::test]
    async fn test_empty_selection_changes_nothing() {
        let backend = Arc::new(MockBackend::new().with_keys(remote_seed()));
        let sync = orchestrator(backend.clone(), local_keys());

        let report = sync.sync(&AutoConfirm(SyncSelection::none())).await.unwrap();

        assert!(matches!(report.outcome, SyncOutcome::NothingSelected));
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_selection_is_per_category() {
        let backend = Arc::new(MockBackend::new().with_keys(remote_seed()));
        let sync = orchestrator(backend.clone(), local_keys());

        let selection = SyncSelection {
            add: false,
            update: false,
            delete: true,
        };
        sync.sync(&AutoConfirm(selection)).await.unwrap();

        let writes: Vec<_> = backend
            .calls()
            .into_iter()
            .filter(|c| !matches!(c, BackendCall::FetchPage { .. }))
            .collect();
        assert_eq!(writes, vec![BackendCall::Delete(DeleteKeysPayload { ids: vec![2] })]);
    }

    // ========== Failure Tests ==========

    #[tokio::test]
    async fn test_gather_failure_issues_no_requests() {
        let backend = Arc::new(MockBackend::new());
        let store = Arc::new(TranslationStore::new(backend.clone(), vec![]));
        let sync = SyncOrchestrator::new(store, Arc::new(FailingGatherer), settings());

        let result = sync.sync(&AutoConfirm(SyncSelection::all())).await;

        assert!(matches!(result, Err(SyncError::Extraction(_))));
        assert!(backend.calls().is_empty());
        assert_eq!(sync.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_missing_configuration_short_circuits() {
        let backend = Arc::new(MockBackend::new());
        let store = Arc::new(TranslationStore::new(backend.clone(), vec![]));
        let sync = SyncOrchestrator::new(store, Arc::new(StaticGatherer::default()), Settings::default());

        let result = sync.diff().await;

        assert!(matches!(result, Err(SyncError::Configuration(_))));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_returns_to_idle() {
        let backend = Arc::new(MockBackend::new().failing_page(0, MockFailure::Status(401)));
        let sync = orchestrator(backend, local_keys());

        let result = sync.sync(&AutoConfirm(SyncSelection::all())).await;

        assert!(matches!(result, Err(SyncError::HttpStatus { status: 401, .. })));
        assert_eq!(sync.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_failed_call_does_not_abort_siblings() {
        let backend = Arc::new(
            MockBackend::new()
                .with_keys(remote_seed())
                .failing_operation(MockOperation::Import, MockFailure::Status(500)),
        );
        let sync = orchestrator(backend.clone(), local_keys());

        let report = sync.sync(&AutoConfirm(SyncSelection::all())).await.unwrap();

        let SyncOutcome::Executed(execution) = report.outcome else {
            panic!("expected execution");
        };
        assert_eq!(execution.uploaded, 0);
        assert_eq!(execution.updated, 1);
        assert_eq!(execution.deleted, 1);
        assert_eq!(execution.failures.len(), 1);
        assert_eq!(execution.failures[0].0, SyncOperation::Upload);
    }

    #[tokio::test]
    async fn test_keys_without_id_are_skipped() {
        let sync = orchestrator(Arc::new(MockBackend::new()), vec![]);
        let no_id = RemoteKey::from_tags(None, "x", "ns", BTreeSet::new());
        let reconciliation = Reconciliation {
            to_add: vec![],
            to_update: vec![(LocalizationKey::new("x", "ns", "X"), no_id.clone())],
            to_delete: vec![no_id.clone()],
        };

        let report = sync.execute(&reconciliation, SyncSelection::all()).await;

        assert_eq!(report.skipped, vec![no_id.clone(), no_id]);
        assert_eq!((report.updated, report.deleted), (0, 0));
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_delete_with_no_valid_id_sends_nothing() {
        let backend = Arc::new(MockBackend::new());
        let sync = orchestrator(backend.clone(), vec![]);
        let reconciliation = Reconciliation {
            to_delete: vec![RemoteKey::from_tags(None, "x", "ns", BTreeSet::new())],
            ..Reconciliation::default()
        };

        sync.execute(&reconciliation, SyncSelection::all()).await;

        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_successful_call_refreshes_store() {
        let backend = Arc::new(MockBackend::new());
        let sync = orchestrator(backend.clone(), vec![]);
        let reconciliation = Reconciliation {
            to_add: vec![LocalizationKey::new("new", "ns", "New")],
            ..Reconciliation::default()
        };

        sync.execute(&reconciliation, SyncSelection::all()).await;

        let snapshot = sync.store.snapshot();
        assert_eq!(snapshot.keys.len(), 1);
        assert_eq!(snapshot.keys[0].name, "new");
        assert_eq!(snapshot.keys[0].content_hash, translation_hash("New"));
    }
}
