//! Whole-file exchange with the project
//!
//! PO files are uploaded through the single-step import and downloaded through
//! the export endpoint. Both are project scoped, so the project id is filled in
//! from the API key when the settings leave it unset.

use crate::api::backend::TranslationBackend;
use crate::api::data::{PoFileUpload, SingleStepImportParams};
use crate::config::Settings;
use crate::error::{SyncError, SyncResult};
use std::path::Path;
use tracing::{debug, error, info};

/// Return the configured project id, asking the backend for it when unset.
///
/// A discovered id is stored in `settings`.
pub async fn ensure_project_id(
    backend: &dyn TranslationBackend,
    settings: &mut Settings,
) -> SyncResult<i64> {
    if let Some(project_id) = settings.project_id {
        return Ok(project_id);
    }

    if !settings.is_ready_to_send_requests() {
        return Err(SyncError::Configuration(
            "Settings are not set up properly: API key and URL are required".to_string(),
        ));
    }

    let info = backend.current_api_key().await?;
    info!("Using project {} of the API key", info.project_id);
    settings.project_id = Some(info.project_id);
    Ok(info.project_id)
}

/// Upload the PO file at `path` into the project.
///
/// With `remove_other_keys`, project keys missing from the file are deleted.
/// Returns the backend's description of the import.
pub async fn upload_po_file(
    backend: &dyn TranslationBackend,
    project_id: i64,
    path: &Path,
    remove_other_keys: bool,
) -> SyncResult<String> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| SyncError::Configuration(format!("{:?} does not name a file", path)))?
        .to_string();

    let content = std::fs::read_to_string(path).inspect_err(|e| {
        error!("Cannot load file {:?}: {}", path, e);
    })?;

    let upload = PoFileUpload {
        params: SingleStepImportParams::for_file(file_name.clone(), remove_other_keys),
        file_name,
        content,
    };

    match backend.import_po_file(project_id, &upload).await {
        Ok(response) => {
            info!("Successfully uploaded file {:?}", path);
            debug!(response = %response, "import result");
            Ok(response)
        }
        Err(e) => {
            error!("Failed to upload file {:?}: {}", path, e);
            Err(e)
        }
    }
}

/// Download the PO export of `locale` to `path`, creating parent directories.
///
/// Returns the number of bytes written.
pub async fn download_po_file(
    backend: &dyn TranslationBackend,
    project_id: i64,
    locale: &str,
    path: &Path,
) -> SyncResult<usize> {
    let content = backend
        .export_po_file(project_id, locale)
        .await
        .inspect_err(|e| error!("Failed to download file {:?}: {}", path, e))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &content).inspect_err(|e| {
        error!("Failed to write file {:?}: {}", path, e);
    })?;

    info!("Successfully downloaded {} into {:?}", locale, path);
    Ok(content.len())
}
