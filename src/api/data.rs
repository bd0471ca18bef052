//! Wire types for the Tolgee REST API
//!
//! Request payloads serialize to the exact bodies the backend expects; response types
//! accept both the short field names (`id`, `name`, `namespace`, `tags`) and the
//! prefixed ones the translations endpoint emits (`keyId`, `keyName`, ...).

use crate::model::{RemoteKey, RemoteKeyWithTranslations, Translation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One page of `GET /v2/projects/translations`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationsPage {
    /// Cursor for the next page; absent or empty on the last page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,

    #[serde(rename = "_embedded", default, skip_serializing_if = "Option::is_none")]
    pub embedded: Option<EmbeddedKeys>,
}

impl TranslationsPage {
    /// Build a page from key records and an optional cursor
    pub fn new(keys: Vec<KeyRecord>, next_cursor: Option<String>) -> Self {
        Self {
            next_cursor,
            embedded: Some(EmbeddedKeys { keys }),
        }
    }

    /// The cursor to follow, if any. Empty cursors terminate pagination.
    pub fn cursor(&self) -> Option<&str> {
        self.next_cursor.as_deref().filter(|c| !c.is_empty())
    }

    /// Take the key records out of the page
    pub fn into_keys(self) -> Vec<KeyRecord> {
        self.embedded.map(|e| e.keys).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedKeys {
    #[serde(default)]
    pub keys: Vec<KeyRecord>,
}

/// A key with its tags and per-locale translations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRecord {
    #[serde(alias = "keyId", default)]
    pub id: Option<i64>,

    #[serde(alias = "keyName")]
    pub name: String,

    #[serde(alias = "keyNamespace", default)]
    pub namespace: Option<String>,

    #[serde(alias = "keyTags", default)]
    pub tags: Option<Vec<TagRecord>>,

    #[serde(default)]
    pub translations: Option<BTreeMap<String, TranslationRecord>>,
}

impl KeyRecord {
    /// Names of all tags on this key
    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().flatten().map(|tag| tag.name.as_str())
    }

    /// Convert the wire record into the domain representation.
    ///
    /// A missing namespace becomes the empty namespace; translations without text are
    /// dropped.
    pub fn into_remote(self) -> RemoteKeyWithTranslations {
        let tags: Vec<String> = self.tag_names().map(str::to_string).collect();
        let key = RemoteKey::from_tags(
            self.id,
            self.name,
            self.namespace.unwrap_or_default(),
            tags,
        );

        let translations = self
            .translations
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(locale, record)| {
                record.text.map(|text| Translation {
                    key_id: self.id,
                    locale_id: locale,
                    text,
                })
            })
            .collect();

        RemoteKeyWithTranslations { key, translations }
    }
}

/// A tag attached to a key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
}

/// A single locale's translation of a key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationRecord {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Body of `POST /v2/projects/keys/import`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportKeysPayload {
    pub keys: Vec<ImportKeyItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportKeyItem {
    pub name: String,
    pub namespace: String,
    pub tags: Vec<String>,
    /// Locale -> text
    pub translations: BTreeMap<String, String>,
}

/// Body of `PUT /v2/projects/keys/{id}/complex-update`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexUpdatePayload {
    pub name: String,
    pub namespace: String,
    pub tags: Vec<String>,
}

/// Body of `DELETE /v2/projects/keys`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteKeysPayload {
    pub ids: Vec<i64>,
}

/// Tag put on keys created by a PO file import
pub const IMPORTED_KEY_TAG: &str = "UnrealSDK";

/// `params` part of `POST /v2/projects/{projectId}/single-step-import`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleStepImportParams {
    pub convert_placeholders_to_icu: bool,
    pub create_new_keys: bool,
    pub file_mappings: Vec<FileMapping>,
    /// `KEEP` leaves existing translations alone on conflict
    pub force_mode: String,
    pub override_key_descriptions: bool,
    /// Delete project keys the file does not contain
    pub remove_other_keys: bool,
    pub tag_new_keys: Vec<String>,
}

impl SingleStepImportParams {
    /// Parameters for importing one PO file
    pub fn for_file(file_name: impl Into<String>, remove_other_keys: bool) -> Self {
        Self {
            convert_placeholders_to_icu: false,
            create_new_keys: true,
            file_mappings: vec![FileMapping {
                file_name: file_name.into(),
            }],
            force_mode: "KEEP".to_string(),
            override_key_descriptions: true,
            remove_other_keys,
            tag_new_keys: vec![IMPORTED_KEY_TAG.to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMapping {
    pub file_name: String,
}

/// A PO file sent as the `files` part of a single-step import
#[derive(Debug, Clone, PartialEq)]
pub struct PoFileUpload {
    pub file_name: String,
    pub content: String,
    pub params: SingleStepImportParams,
}

/// Body of `POST /v2/projects/{projectId}/export`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub escape_html: bool,
    pub format: String,
    pub support_arrays: bool,
    pub zip: bool,
    pub languages: Vec<String>,
}

impl ExportRequest {
    /// Unzipped PO export of a single locale
    pub fn po(locale: impl Into<String>) -> Self {
        Self {
            escape_html: false,
            format: "PO".to_string(),
            support_arrays: false,
            zip: false,
            languages: vec![locale.into()],
        }
    }
}

/// Response of `GET /v2/projects/stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    #[serde(default)]
    pub language_stats: Vec<LanguageStat>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageStat {
    pub language_tag: String,
    /// Epoch milliseconds of the last translation change in this language
    #[serde(default)]
    pub translations_updated_at: Option<i64>,
}

/// Response of `GET /v2/api-keys/current`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyInfo {
    pub project_id: i64,
}
