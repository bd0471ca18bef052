//! Injection data downloaded as PO exports from a content delivery network
//!
//! For every CDN root and culture, `<root>/<culture>.po` is requested. The
//! `Last-Modified` value of each successful download is sent back as
//! `If-Modified-Since`, and a `304` keeps what is already cached.

use crate::error::{SyncError, SyncResult};
use crate::inject::{InjectionEntry, TextId};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, IF_MODIFIED_SINCE, LAST_MODIFIED};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info};

/// A decoded PO record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoEntry {
    pub namespace: String,
    pub key: String,
    pub source_text: String,
    pub translation: String,
}

/// Parses PO file content into records
pub trait PoContentDecoder: Send + Sync {
    fn decode(&self, po_text: &str) -> Vec<PoEntry>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CdnResponse {
    Modified {
        body: String,
        last_modified: Option<String>,
    },
    NotModified,
}

/// Conditional GET against a CDN
#[async_trait]
pub trait CdnTransport: Send + Sync {
    async fn get(&self, url: &str, if_modified_since: Option<&str>) -> SyncResult<CdnResponse>;
}

/// `CdnTransport` over reqwest
#[derive(Debug, Clone)]
pub struct HttpCdnTransport {
    client: reqwest::Client,
}

impl HttpCdnTransport {
    const REQUEST_TIMEOUT_SECS: u64 = 30;

    pub fn new() -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(Self::REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CdnTransport for HttpCdnTransport {
    async fn get(&self, url: &str, if_modified_since: Option<&str>) -> SyncResult<CdnResponse> {
        let mut request = self.client.get(url).header(ACCEPT, "application/json");
        if let Some(date) = if_modified_since {
            request = request.header(IF_MODIFIED_SINCE, date);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(CdnResponse::NotModified);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let body = response.text().await?;

        Ok(CdnResponse::Modified {
            body,
            last_modified,
        })
    }
}

/// Per-run counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CdnFetchSummary {
    pub fetched: usize,
    pub not_modified: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct CdnCache {
    /// Culture -> decoded records
    translations: BTreeMap<String, Vec<PoEntry>>,
    /// Download URL -> `Last-Modified`
    last_modified: HashMap<String, String>,
}

pub struct CdnSource {
    addresses: Vec<String>,
    cultures: Vec<String>,
    transport: Arc<dyn CdnTransport>,
    decoder: Arc<dyn PoContentDecoder>,
    cache: Mutex<CdnCache>,
}

impl CdnSource {
    pub fn new(
        addresses: Vec<String>,
        cultures: Vec<String>,
        transport: Arc<dyn CdnTransport>,
        decoder: Arc<dyn PoContentDecoder>,
    ) -> Self {
        Self {
            addresses,
            cultures,
            transport,
            decoder,
            cache: Mutex::new(CdnCache::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CdnCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn download_url(address: &str, culture: &str) -> String {
        format!("{}/{}.po", address.trim_end_matches('/'), culture)
    }

    /// Download every `(address, culture)` pair. Failures are logged and counted.
    pub async fn fetch_translations(&self) -> CdnFetchSummary {
        let mut summary = CdnFetchSummary::default();

        if self.addresses.is_empty() {
            info!("No CDN addresses configured. Packaged builds will only use static data.");
            return summary;
        }

        for address in &self.addresses {
            for culture in &self.cultures {
                let url = Self::download_url(address, culture);
                info!("Fetching localization data for culture: {} from CDN: {}", culture, url);

                let previous = self.lock().last_modified.get(&url).cloned();
                match self.transport.get(&url, previous.as_deref()).await {
                    Ok(CdnResponse::Modified {
                        body,
                        last_modified,
                    }) => {
                        info!("Fetch successfully for {} to {}.", culture, url);
                        let entries = self.decode(&body);

                        let mut cache = self.lock();
                        cache.translations.insert(culture.clone(), entries);
                        if let Some(last_modified) = last_modified {
                            cache.last_modified.insert(url, last_modified);
                        }
                        summary.fetched += 1;
                    }
                    Ok(CdnResponse::NotModified) => {
                        info!("No new data for {} to {}.", culture, url);
                        summary.not_modified += 1;
                    }
                    Err(e) => {
                        error!("Request for {} to {} failed: {}", culture, url, e);
                        summary.failed += 1;
                    }
                }
            }
        }

        info!(
            fetched = summary.fetched,
            not_modified = summary.not_modified,
            failed = summary.failed,
            "All requests completed. Refreshing translation data."
        );
        summary
    }

    /// Decode a PO body, dropping the header entry and untranslated entries
    fn decode(&self, body: &str) -> Vec<PoEntry> {
        self.decoder
            .decode(body)
            .into_iter()
            .filter(|entry| !entry.key.is_empty() && !entry.translation.is_empty())
            .collect()
    }

    /// Forget cached translations and modification dates
    pub fn reset(&self) {
        *self.lock() = CdnCache::default();
    }

    /// Cached records grouped by culture. CDN data carries no source hash.
    pub fn data_to_inject(&self) -> BTreeMap<String, Vec<InjectionEntry>> {
        self.lock()
            .translations
            .iter()
            .map(|(culture, entries)| {
                let entries = entries
                    .iter()
                    .map(|entry| InjectionEntry {
                        id: TextId::new(entry.namespace.clone(), entry.key.clone()),
                        hash: 0,
                        text: entry.translation.clone(),
                    })
                    .collect();
                (culture.clone(), entries)
            })
            .collect()
    }
}

impl std::fmt::Debug for CdnSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdnSource")
            .field("addresses", &self.addresses)
            .field("cultures", &self.cultures)
            .finish()
    }
}
