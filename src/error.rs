//! Error types shared by the fetch, reconcile and sync pipelines

use thiserror::Error;

/// Everything that can go wrong while talking to the backend or the local project.
///
/// Fetch failures (`Transport`, `HttpStatus`, `Deserialization`) abort a whole fetch
/// cycle and leave the cached state untouched. `MissingIdentity` is per item and is
/// normally logged and skipped rather than returned.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The request never got a response (connection refused, DNS, timeout...)
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The backend answered with a non-2xx status
    #[error("Unexpected HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The response body was not the JSON we expected
    #[error("Failed to deserialize response: {0}")]
    Deserialization(String),

    /// A remote key lacks the id needed to update or delete it
    #[error("Key '{namespace}:{name}' has no remote id")]
    MissingIdentity { namespace: String, name: String },

    /// Settings are incomplete (API key, URL, project id...)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Gathering the local keys failed
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Reading or writing a local file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Waiting on an in-flight fetch took longer than allowed
    #[error("Timed out after {0:?} waiting for translations to be fetched")]
    FetchTimeout(std::time::Duration),

    /// The operator declined to run the pending operations
    #[error("Aborted: {0}")]
    Aborted(String),
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SyncError::Deserialization(e.to_string())
        } else {
            SyncError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Deserialization(e.to_string())
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
