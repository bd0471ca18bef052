//! Translation injection into the host's localization resources
//!
//! The host loads its own (native) resources first, then asks registered text
//! sources for overrides. Each data source here decides how an override is anchored:
//!
//! - Dashboard data carries the source hash it was uploaded with, so entries are
//!   added with that hash at normal priority ([`OverrideStrategy::SuppliedHash`]).
//! - CDN exports carry no hash, so entries reuse the hash of the entry the host
//!   already loaded for the same id and win with a higher priority
//!   ([`OverrideStrategy::ReuseNativeHash`]).
//!
//! The two are never mixed within a source.

pub mod cdn;
pub mod dashboard;

pub use cdn::{CdnResponse, CdnSource, CdnTransport, HttpCdnTransport, PoContentDecoder, PoEntry};
pub use dashboard::DashboardSource;

use crate::error::SyncResult;
use std::collections::BTreeMap;
use tracing::{trace, warn};

/// Host identity of a text
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextId {
    pub namespace: String,
    pub key: String,
}

impl TextId {
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for TextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    /// Hash of the source string this translation belongs to
    pub source_hash: u32,
    pub text: String,
    /// Lower values take precedence
    pub priority: i32,
}

/// A set of localized entries as the host keeps them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalizationResource {
    entries: BTreeMap<TextId, ResourceEntry>,
}

impl LocalizationResource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, replacing an existing one of equal or lower precedence.
    ///
    /// Returns whether the entry was stored.
    pub fn add_entry(&mut self, id: TextId, source_hash: u32, text: impl Into<String>, priority: i32) -> bool {
        let replace = self
            .entries
            .get(&id)
            .is_none_or(|existing| priority <= existing.priority);
        if replace {
            self.entries.insert(
                id,
                ResourceEntry {
                    source_hash,
                    text: text.into(),
                    priority,
                },
            );
        }
        replace
    }

    pub fn find_entry(&self, id: &TextId) -> Option<&ResourceEntry> {
        self.entries.get(id)
    }

    pub fn entries(&self) -> &BTreeMap<TextId, ResourceEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Which resource categories the host is loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadFlags(u8);

impl LoadFlags {
    pub const NATIVE: LoadFlags = LoadFlags(1);
    pub const EDITOR: LoadFlags = LoadFlags(1 << 1);
    pub const GAME: LoadFlags = LoadFlags(1 << 2);
    pub const ENGINE: LoadFlags = LoadFlags(1 << 3);
    pub const ADDITIONAL: LoadFlags = LoadFlags(1 << 4);

    pub fn contains(self, other: LoadFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for LoadFlags {
    type Output = LoadFlags;

    fn bitor(self, rhs: LoadFlags) -> LoadFlags {
        LoadFlags(self.0 | rhs.0)
    }
}

/// How an override is tied to the host's existing entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideStrategy {
    /// Use the hash carried by the data, priority 0. A zero hash is invalid.
    SuppliedHash,
    /// Reuse the hash of the already loaded entry, priority -1. No entry, no override.
    ReuseNativeHash,
}

impl OverrideStrategy {
    pub fn priority(self) -> i32 {
        match self {
            OverrideStrategy::SuppliedHash => 0,
            OverrideStrategy::ReuseNativeHash => -1,
        }
    }
}

/// One translation ready to be injected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionEntry {
    pub id: TextId,
    /// Source hash if the data carries one, 0 otherwise
    pub hash: u32,
    pub text: String,
}

/// Where injected translations come from
#[derive(Debug)]
pub enum InjectionSource {
    Dashboard(DashboardSource),
    Cdn(CdnSource),
}

impl InjectionSource {
    pub fn strategy(&self) -> OverrideStrategy {
        match self {
            InjectionSource::Dashboard(_) => OverrideStrategy::SuppliedHash,
            InjectionSource::Cdn(_) => OverrideStrategy::ReuseNativeHash,
        }
    }

    /// Pull fresh data from the source
    pub async fn fetch_translations(&self) -> SyncResult<()> {
        match self {
            InjectionSource::Dashboard(source) => source.fetch_translations().await,
            InjectionSource::Cdn(source) => {
                source.fetch_translations().await;
                Ok(())
            }
        }
    }

    /// Cached entries grouped by culture
    pub fn data_to_inject(&self) -> BTreeMap<String, Vec<InjectionEntry>> {
        match self {
            InjectionSource::Dashboard(source) => source.data_to_inject(),
            InjectionSource::Cdn(source) => source.data_to_inject(),
        }
    }
}

/// Resolved override for one text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub source_hash: u32,
    pub text: String,
    pub culture: String,
}

#[derive(Debug)]
pub struct TranslationInjector {
    source: InjectionSource,
}

impl TranslationInjector {
    pub fn new(source: InjectionSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &InjectionSource {
        &self.source
    }

    /// Compute the overrides for `prioritized_cultures`.
    ///
    /// Only cultures in the list are considered; for each text the first culture in
    /// list order that has it wins. `native` is the resource the host has loaded so
    /// far, used as the hash anchor by [`OverrideStrategy::ReuseNativeHash`].
    pub fn resolve(
        &self,
        flags: LoadFlags,
        prioritized_cultures: &[String],
        native: &LocalizationResource,
    ) -> BTreeMap<TextId, ResolvedEntry> {
        trace!(?flags, cultures = ?prioritized_cultures, "resolving localized resources");

        let strategy = self.source.strategy();
        let data = self.source.data_to_inject();
        let mut resolved = BTreeMap::new();

        for culture in prioritized_cultures {
            let Some(entries) = data.get(culture) else {
                continue;
            };

            for entry in entries {
                if resolved.contains_key(&entry.id) {
                    continue;
                }

                let source_hash = match strategy {
                    OverrideStrategy::SuppliedHash if entry.hash == 0 => {
                        warn!("KeyData {{Namespace: {} Key: {}}} has invalid hash.", entry.id.namespace, entry.id.key);
                        continue;
                    }
                    OverrideStrategy::SuppliedHash => entry.hash,
                    OverrideStrategy::ReuseNativeHash => match native.find_entry(&entry.id) {
                        Some(existing) => existing.source_hash,
                        None => {
                            warn!("Failed to inject translation for {}. Default entry not found.", entry.id);
                            continue;
                        }
                    },
                };

                resolved.insert(
                    entry.id.clone(),
                    ResolvedEntry {
                        source_hash,
                        text: entry.text.clone(),
                        culture: culture.clone(),
                    },
                );
            }
        }

        resolved
    }

    /// Resolve and add the overrides to `resource`. Returns how many were stored.
    pub fn inject(
        &self,
        flags: LoadFlags,
        prioritized_cultures: &[String],
        resource: &mut LocalizationResource,
    ) -> usize {
        let priority = self.source.strategy().priority();
        self.resolve(flags, prioritized_cultures, resource)
            .into_iter()
            .filter(|(id, entry)| resource.add_entry(id.clone(), entry.source_hash, entry.text.clone(), priority))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{MockBackend, mock_key};
    use crate::hash::translation_hash;
    use crate::store::TranslationStore;
    use std::sync::Arc;

    fn cultures(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    async fn dashboard() -> TranslationInjector {
        let mut untagged = mock_key(3, "broken", "menu", "x", &[("de", "Kaputt")]);
        untagged.tags = None;
        let backend = Arc::new(MockBackend::new().with_keys(vec![
            mock_key(1, "start", "menu", "Start", &[("de", "Starten"), ("fr", "Commencer")]),
            mock_key(2, "quit", "menu", "Quit", &[("fr", "Quitter")]),
            untagged,
        ]));
        let store = Arc::new(TranslationStore::new(backend, vec![]));
        store.refresh().await.unwrap();
        TranslationInjector::new(InjectionSource::Dashboard(DashboardSource::new(store)))
    }

    // ========== Resource Tests ==========

    #[test]
    fn test_add_entry_priority() {
        let mut resource = LocalizationResource::new();
        let id = TextId::new("ns", "k");

        assert!(resource.add_entry(id.clone(), 1, "native", 0));
        assert!(!resource.add_entry(id.clone(), 1, "weaker", 5));
        assert_eq!(resource.find_entry(&id).unwrap().text, "native");

        assert!(resource.add_entry(id.clone(), 1, "override", -1));
        assert_eq!(resource.find_entry(&id).unwrap().text, "override");
        assert_eq!(resource.len(), 1);
    }

    #[test]
    fn test_load_flags() {
        let flags = LoadFlags::NATIVE | LoadFlags::GAME;
        assert!(flags.contains(LoadFlags::GAME));
        assert!(!flags.contains(LoadFlags::EDITOR));
    }

    // ========== Supplied Hash Tests ==========

    #[tokio::test]
    async fn test_only_requested_cultures_are_used() {
        let injector = dashboard().await;

        let resolved = injector.resolve(LoadFlags::GAME, &cultures(&["de"]), &LocalizationResource::new());

        assert_eq!(resolved.len(), 1);
        let start = &resolved[&TextId::new("menu", "start")];
        assert_eq!(start.text, "Starten");
        assert_eq!(start.source_hash, translation_hash("Start"));
    }

    #[tokio::test]
    async fn test_first_culture_wins() {
        let injector = dashboard().await;

        let resolved = injector.resolve(LoadFlags::GAME, &cultures(&["fr", "de"]), &LocalizationResource::new());

        assert_eq!(resolved[&TextId::new("menu", "start")].text, "Commencer");
        assert_eq!(resolved[&TextId::new("menu", "quit")].text, "Quitter");
    }

    #[tokio::test]
    async fn test_zero_hash_is_skipped() {
        let injector = dashboard().await;

        let resolved = injector.resolve(LoadFlags::GAME, &cultures(&["de"]), &LocalizationResource::new());

        assert!(!resolved.contains_key(&TextId::new("menu", "broken")));
    }

    #[tokio::test]
    async fn test_inject_with_supplied_hash_priority() {
        let injector = dashboard().await;
        let mut resource = LocalizationResource::new();

        let added = injector.inject(LoadFlags::GAME, &cultures(&["de"]), &mut resource);

        assert_eq!(added, 1);
        let entry = resource.find_entry(&TextId::new("menu", "start")).unwrap();
        assert_eq!(entry.priority, 0);
        assert_eq!(entry.source_hash, translation_hash("Start"));
    }
}
