//! Keeps a Tolgee project and a game's localization in step.
//!
//! Two flows share one cached view of the remote project:
//!
//! - **Pull**: [`store::TranslationStore`] fetches every key page by page and
//!   [`inject::TranslationInjector`] turns the cached rows into overrides for the
//!   host's localization resources.
//! - **Push**: [`sync::SyncOrchestrator`] gathers the local keys, fetches the
//!   remote ones, classifies them with [`reconcile::reconcile`] and, once
//!   confirmed, uploads, updates and deletes keys through the backend.
//!
//! Whole PO files can also be exchanged with the project through
//! [`transfer::upload_po_file`] and [`transfer::download_po_file`].
//!
//! Source texts are identified by [`hash::translation_hash`], which matches the
//! engine's own string table hashing so injected entries line up with native ones.

pub mod api;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod gather;
pub mod hash;
pub mod inject;
pub mod model;
pub mod monitor;
pub mod reconcile;
pub mod store;
pub mod sync;
pub mod transfer;


pub use api::{MockBackend, RemoteKeyFetcher, TolgeeClient, TranslationBackend};
pub use config::{ConfigError, Settings, ValidationError};
pub use dictionary::{LocalizedDictionary, LocalizedKey};
pub use error::{SyncError, SyncResult};
pub use gather::{LocalKeyGatherer, ManifestGatherer, StaticGatherer};
pub use hash::translation_hash;
pub use inject::{
    InjectionSource, LoadFlags, LocalizationResource, OverrideStrategy, TextId,
    TranslationInjector,
};
pub use model::{LocalizationKey, RemoteKey, RemoteKeyWithTranslations, Translation};
pub use monitor::UpdateMonitor;
pub use reconcile::{Reconciliation, reconcile};
pub use store::{TranslationSnapshot, TranslationStore};
pub use sync::{
    AutoConfirm, Confirmation, SyncOrchestrator, SyncOutcome, SyncReport, SyncSelection,
    SyncState, SyncSummary,
};
pub use transfer::{download_po_file, ensure_project_id, upload_po_file};
