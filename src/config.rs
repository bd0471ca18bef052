//! Settings for talking to a Tolgee project
//!
//! Settings are read from a camelCase JSON file (missing fields fall back to their
//! defaults) and then overridden from the environment:
//!
//! | variable            | field       |
//! |---------------------|-------------|
//! | `TOLGEE_API_KEY`    | `apiKey`    |
//! | `TOLGEE_API_URL`    | `apiUrl`    |
//! | `TOLGEE_PROJECT_ID` | `projectId` |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Tolgee cloud
pub const DEFAULT_API_URL: &str = "https://app.tolgee.io";

/// Settings file looked up when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "tolgee.json";

/// Locale used for uploads when no language is configured
pub const FALLBACK_LOCALE: &str = "en";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Configuration error in '{field_path}': {message}")]
pub struct ValidationError {
    /// JSON path to the field (e.g., "languages[1]")
    pub field_path: String,
    pub message: String,
}

impl ValidationError {
    #[must_use]
    pub fn new(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field_path: field_path.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    ValidationErrors(Vec<ValidationError>),

    #[error("Failed to load configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, err)| format!("  {}. {} - {}", i + 1, err.field_path, err.message))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Sent as `X-API-Key` on every request
    pub api_key: String,

    /// Server root, e.g. `https://app.tolgee.io`
    pub api_url: String,

    /// Project the API key belongs to. Discovered from the key when unset.
    pub project_id: Option<i64>,

    /// Locales to fetch. The first one is also the upload locale.
    pub languages: Vec<String>,

    /// Drop keys with an empty namespace while gathering
    pub ignore_generated_keys: bool,

    /// Poll the backend periodically instead of using the snapshot on disk
    pub live_translation_updates: bool,

    pub update_interval_secs: u64,

    /// Upper bound for waiting on an in-flight fetch
    pub fetch_timeout_secs: u64,

    /// Also tag uploaded keys with `OriginalText:<source text>`
    pub tag_original_text: bool,

    pub snapshot_path: PathBuf,

    /// Localization manifests read by the manifest gatherer
    pub manifests: Vec<PathBuf>,

    /// CDN roots serving `<culture>.po` files
    pub cdn_addresses: Vec<String>,

    pub cdn_cultures: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: DEFAULT_API_URL.to_string(),
            project_id: None,
            languages: Vec::new(),
            ignore_generated_keys: true,
            live_translation_updates: true,
            update_interval_secs: 60,
            fetch_timeout_secs: 120,
            tag_original_text: false,
            snapshot_path: PathBuf::from("Content/Tolgee/Translations.json"),
            manifests: Vec::new(),
            cdn_addresses: Vec::new(),
            cdn_cultures: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, then apply environment overrides.
    ///
    /// # Returns
    /// - `Ok(settings)`: File parsed, or defaults if the file does not exist
    /// - `Err(ConfigError)`: File unreadable or not valid JSON
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut settings = Self::load_file(path)?;
        settings.apply_overrides(|name| std::env::var(name).ok());
        Ok(settings)
    }

    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("Configuration file not found: {:?}", path);
            return Ok(Self::default().normalized());
        }

        tracing::debug!("Loading configuration from: {:?}", path);

        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings.normalized())
    }

    /// Apply overrides from a variable lookup (normally the process environment)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_key) = lookup("TOLGEE_API_KEY") {
            self.api_key = api_key;
        }
        if let Some(api_url) = lookup("TOLGEE_API_URL") {
            self.api_url = api_url;
        }
        if let Some(project_id) = lookup("TOLGEE_PROJECT_ID") {
            match project_id.trim().parse() {
                Ok(id) => self.project_id = Some(id),
                Err(_) => tracing::warn!("Ignoring non-numeric TOLGEE_PROJECT_ID: {}", project_id),
            }
        }
        *self = std::mem::take(self).normalized();
    }

    fn normalized(mut self) -> Self {
        self.api_url = self.api_url.trim().trim_end_matches('/').to_string();
        self
    }

    /// Whether enough is configured to reach the backend at all
    pub fn is_ready_to_send_requests(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.api_url.trim().is_empty()
    }

    /// Locale used for the initial translation of uploaded keys
    pub fn default_locale(&self) -> &str {
        self.languages
            .first()
            .map(String::as_str)
            .filter(|l| !l.is_empty())
            .unwrap_or(FALLBACK_LOCALE)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// # Errors
    /// - Empty API key or URL
    /// - URL without an http(s) scheme
    /// - Zero-length intervals
    /// - Empty language codes
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.api_key.trim().is_empty() {
            errors.push(ValidationError::new(
                "apiKey",
                "The API key cannot be empty. Set it here or through TOLGEE_API_KEY",
            ));
        }

        if self.api_url.trim().is_empty() {
            errors.push(ValidationError::new(
                "apiUrl",
                format!("The URL cannot be empty. Example: \"{DEFAULT_API_URL}\""),
            ));
        } else if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            errors.push(ValidationError::new(
                "apiUrl",
                format!("'{}' must start with http:// or https://", self.api_url),
            ));
        }

        if self.update_interval_secs == 0 {
            errors.push(ValidationError::new(
                "updateIntervalSecs",
                "The interval must be at least 1 second",
            ));
        }

        if self.fetch_timeout_secs == 0 {
            errors.push(ValidationError::new(
                "fetchTimeoutSecs",
                "The timeout must be at least 1 second",
            ));
        }

        for (index, language) in self.languages.iter().enumerate() {
            if language.trim().is_empty() {
                errors.push(ValidationError::new(
                    format!("languages[{index}]"),
                    "Language codes cannot be empty",
                ));
            }
        }

        for (index, culture) in self.cdn_cultures.iter().enumerate() {
            if culture.trim().is_empty() {
                errors.push(ValidationError::new(
                    format!("cdnCultures[{index}]"),
                    "Culture codes cannot be empty",
                ));
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}
