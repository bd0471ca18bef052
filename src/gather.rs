//! Local key extraction
//!
//! The sync flow only needs `(name, namespace, default text)` triples; where they come
//! from is behind [`LocalKeyGatherer`]. [`ManifestGatherer`] reads the JSON
//! localization manifests produced by the engine's text gathering step.

use crate::config::Settings;
use crate::error::{SyncError, SyncResult};
use crate::model::LocalizationKey;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Source of the local key set
pub trait LocalKeyGatherer: Send + Sync {
    /// Extract every translatable key of the project.
    ///
    /// Fails with `SyncError::Extraction` when the extraction targets are
    /// misconfigured or nothing could be read.
    fn gather(&self) -> SyncResult<Vec<LocalizationKey>>;
}

/// Gatherer over a fixed list of keys
#[derive(Debug, Clone, Default)]
pub struct StaticGatherer {
    keys: Vec<LocalizationKey>,
}

impl StaticGatherer {
    pub fn new(keys: Vec<LocalizationKey>) -> Self {
        Self { keys }
    }
}

impl LocalKeyGatherer for StaticGatherer {
    fn gather(&self) -> SyncResult<Vec<LocalizationKey>> {
        Ok(self.keys.clone())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ManifestNode {
    namespace: String,
    children: Vec<ManifestEntry>,
    subnamespaces: Vec<ManifestNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ManifestEntry {
    source: ManifestSource,
    keys: Vec<ManifestContext>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ManifestSource {
    text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ManifestContext {
    key: String,
}

impl ManifestNode {
    fn collect_keys(&self, namespace: &str, out: &mut Vec<LocalizationKey>) {
        for entry in &self.children {
            for context in &entry.keys {
                out.push(LocalizationKey::new(
                    context.key.clone(),
                    namespace,
                    entry.source.text.clone(),
                ));
            }
        }

        for child in &self.subnamespaces {
            let child_namespace = if namespace.is_empty() {
                child.namespace.clone()
            } else {
                format!("{}.{}", namespace, child.namespace)
            };
            child.collect_keys(&child_namespace, out);
        }
    }
}

/// Reads keys from localization manifest files
#[derive(Debug, Clone)]
pub struct ManifestGatherer {
    manifests: Vec<PathBuf>,
    ignore_generated_keys: bool,
}

impl ManifestGatherer {
    pub fn new(manifests: Vec<PathBuf>, ignore_generated_keys: bool) -> Self {
        Self {
            manifests,
            ignore_generated_keys,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.manifests.clone(), settings.ignore_generated_keys)
    }

    fn read_manifest(path: &Path) -> SyncResult<Vec<LocalizationKey>> {
        let content = std::fs::read_to_string(path)?;
        let root: ManifestNode = serde_json::from_str(&content)?;

        let mut keys = Vec::new();
        root.collect_keys(&root.namespace, &mut keys);
        Ok(keys)
    }
}

impl LocalKeyGatherer for ManifestGatherer {
    fn gather(&self) -> SyncResult<Vec<LocalizationKey>> {
        if self.manifests.is_empty() {
            return Err(SyncError::Extraction(
                "No localization manifests configured".to_string(),
            ));
        }

        let mut keys = Vec::new();
        let mut readable = 0usize;

        for path in &self.manifests {
            let manifest_keys = match Self::read_manifest(path) {
                Ok(manifest_keys) => manifest_keys,
                Err(e) => {
                    error!("Could not read manifest file {:?}: {}", path, e);
                    continue;
                }
            };

            if manifest_keys.is_empty() {
                warn!("Manifest {:?} has no entries", path);
                continue;
            }

            readable += 1;
            let before = keys.len();
            keys.extend(
                manifest_keys
                    .into_iter()
                    // Only generated keys lack a namespace; string table keys always have one
                    .filter(|key| !(self.ignore_generated_keys && key.namespace.is_empty())),
            );
            debug!(keys = keys.len() - before, "gathered keys from {:?}", path);
        }

        if readable == 0 {
            return Err(SyncError::Extraction(
                "None of the configured manifests could be read".to_string(),
            ));
        }

        Ok(keys)
    }
}
