//! Backend access: the `TranslationBackend` trait, its Tolgee and in-memory
//! implementations, wire types and the paginated key fetcher.

pub mod backend;
pub mod data;
pub mod fetcher;
pub mod mock;
pub mod tolgee;

pub use backend::{TranslationBackend, translations_url};
pub use data::{
    ApiKeyInfo, ComplexUpdatePayload, DeleteKeysPayload, ExportRequest, FileMapping,
    IMPORTED_KEY_TAG, ImportKeyItem, ImportKeysPayload, KeyRecord, LanguageStat, PoFileUpload,
    ProjectStats, SingleStepImportParams, TagRecord, TranslationRecord, TranslationsPage,
};
pub use fetcher::{FetchGuard, RemoteKeyFetcher};
pub use mock::{BackendCall, MockBackend, MockFailure, MockOperation, mock_key};
pub use tolgee::TolgeeClient;
