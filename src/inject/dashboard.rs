//! Injection data served by the Tolgee API, through the translation store

use crate::error::SyncResult;
use crate::inject::{InjectionEntry, TextId};
use crate::store::TranslationStore;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct DashboardSource {
    store: Arc<TranslationStore>,
}

impl DashboardSource {
    pub fn new(store: Arc<TranslationStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<TranslationStore> {
        &self.store
    }

    /// Refresh the store. A refresh skipped because one is running is not an error.
    pub async fn fetch_translations(&self) -> SyncResult<()> {
        self.store.refresh().await.map(|_| ())
    }

    /// Current dictionary rows grouped by locale, each carrying its uploaded hash
    pub fn data_to_inject(&self) -> BTreeMap<String, Vec<InjectionEntry>> {
        let snapshot = self.store.snapshot();
        let mut data: BTreeMap<String, Vec<InjectionEntry>> = BTreeMap::new();
        for row in &snapshot.dictionary.keys {
            data.entry(row.locale.clone()).or_default().push(InjectionEntry {
                id: TextId::new(row.namespace.clone(), row.name.clone()),
                hash: row.hash,
                text: row.translation.clone(),
            });
        }
        data
    }
}
