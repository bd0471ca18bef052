//! Flattened translation dictionary and its JSON snapshot
//!
//! Every fetched key contributes one row per locale it has a translation in. The
//! same rows are what gets written to (and read back from) the snapshot file, so
//! a packaged build can run without reaching the backend.

use crate::error::SyncResult;
use crate::model::{RemoteKey, RemoteKeyWithTranslations};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// One `(key, locale)` row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizedKey {
    pub name: String,
    pub namespace: String,
    /// Source text hash read from the key's tags
    pub hash: u32,
    pub locale: String,
    pub translation: String,
    #[serde(default)]
    pub remote_id: Option<i64>,
}

/// All rows of a fetch or a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedDictionary {
    #[serde(default)]
    pub keys: Vec<LocalizedKey>,
}

impl LocalizedDictionary {
    /// Flatten fetched keys into rows, keeping the fetch order
    pub fn from_remote_keys(keys: &[RemoteKeyWithTranslations]) -> Self {
        let keys = keys
            .iter()
            .flat_map(|entry| {
                entry.translations.iter().map(|translation| LocalizedKey {
                    name: entry.key.name.clone(),
                    namespace: entry.key.namespace.clone(),
                    hash: entry.key.content_hash,
                    locale: translation.locale_id.clone(),
                    translation: translation.text.clone(),
                    remote_id: entry.key.remote_id,
                })
            })
            .collect();
        Self { keys }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Collapse rows back into one remote key per `(namespace, name)`.
    ///
    /// The first row of each key decides its hash and id. Tags other than the hash
    /// are not part of the snapshot, so only `OriginalHash:` is restored.
    pub fn remote_keys(&self) -> Vec<RemoteKey> {
        let mut seen = BTreeSet::new();
        self.keys
            .iter()
            .filter(|row| seen.insert((row.namespace.as_str(), row.name.as_str())))
            .map(|row| RemoteKey {
                remote_id: row.remote_id,
                name: row.name.clone(),
                namespace: row.namespace.clone(),
                content_hash: row.hash,
                tags: BTreeSet::from([crate::hash::hash_value_tag(row.hash)]),
            })
            .collect()
    }

    /// Locales present in the dictionary, sorted
    pub fn locales(&self) -> BTreeSet<&str> {
        self.keys.iter().map(|row| row.locale.as_str()).collect()
    }

    /// Translation for a key, first matching locale in priority order wins
    pub fn translation_for(
        &self,
        namespace: &str,
        name: &str,
        prioritized_locales: &[String],
    ) -> Option<&LocalizedKey> {
        prioritized_locales.iter().find_map(|locale| {
            self.keys.iter().find(|row| {
                row.namespace == namespace && row.name == name && &row.locale == locale
            })
        })
    }

    /// Read a snapshot written by [`save_to_file`](Self::save_to_file)
    pub fn load_from_file(path: &Path) -> SyncResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let dictionary = serde_json::from_str(&content)?;
        Ok(dictionary)
    }

    /// Write the snapshot, creating missing parent directories
    pub fn save_to_file(&self, path: &Path) -> SyncResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
