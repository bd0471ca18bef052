//! Core key and translation types shared by the fetcher, the reconciler and the injector

use crate::hash::{KEY_HASH_PREFIX, parse_hash_value, translation_hash};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A translatable key extracted from the local project.
///
/// Rebuilt from scratch on every gather pass; identity is `(name, namespace)`.
/// Generated keys may have an empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizationKey {
    /// Key's name in the namespace
    pub name: String,
    /// Namespace this key is part of
    pub namespace: String,
    /// Source text, used when no translation exists
    pub default_text: String,
}

impl LocalizationKey {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        default_text: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            default_text: default_text.into(),
        }
    }

    /// Hash of the current source text
    pub fn hash(&self) -> u32 {
        translation_hash(&self.default_text)
    }
}

/// A key as known to the remote backend.
///
/// `content_hash` is not a first-class backend field: it is read from an
/// `OriginalHash:<value>` tag and caches the hash of the source text at last upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteKey {
    /// Backend id, required for updates and deletes
    pub remote_id: Option<i64>,
    pub name: String,
    pub namespace: String,
    pub content_hash: u32,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl RemoteKey {
    /// Build a remote key, deriving `content_hash` from its tags.
    ///
    /// `tags` must be in the order the backend sent them: the first hash tag wins.
    pub fn from_tags(
        remote_id: Option<i64>,
        name: impl Into<String>,
        namespace: impl Into<String>,
        tags: impl IntoIterator<Item = String>,
    ) -> Self {
        let tags: Vec<String> = tags.into_iter().collect();
        let content_hash = content_hash_from_tags(tags.iter().map(String::as_str));
        Self {
            remote_id,
            name: name.into(),
            namespace: namespace.into(),
            content_hash,
            tags: tags.into_iter().collect(),
        }
    }

    /// Whether both keys name the same logical key, regardless of content
    pub fn same_key(&self, local: &LocalizationKey) -> bool {
        self.name == local.name && self.namespace == local.namespace
    }
}

/// Read the cached source hash out of a key's tags.
///
/// The first tag containing the `OriginalHash:` marker wins; no tag means 0.
pub fn content_hash_from_tags<'a>(tags: impl IntoIterator<Item = &'a str>) -> u32 {
    tags.into_iter()
        .find(|tag| tag.contains(KEY_HASH_PREFIX))
        .map(|tag| parse_hash_value(tag.strip_prefix(KEY_HASH_PREFIX).unwrap_or(tag)))
        .unwrap_or(0)
}

/// One locale's translation of a remote key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    pub key_id: Option<i64>,
    pub locale_id: String,
    pub text: String,
}

/// A remote key together with the translations fetched for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteKeyWithTranslations {
    pub key: RemoteKey,
    pub translations: Vec<Translation>,
}

impl RemoteKeyWithTranslations {
    /// Locales this key has a translation for
    pub fn available_languages(&self) -> Vec<&str> {
        self.translations
            .iter()
            .map(|t| t.locale_id.as_str())
            .collect()
    }

    /// Pick the first available translation following the locale priority list.
    ///
    /// First match wins; translations are never merged across locales.
    pub fn first_translation(&self, prioritized_locales: &[String]) -> Option<&Translation> {
        prioritized_locales.iter().find_map(|locale| {
            self.translations
                .iter()
                .find(|translation| &translation.locale_id == locale)
        })
    }
}
