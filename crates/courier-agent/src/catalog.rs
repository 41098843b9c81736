use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use courier_core::types::MediaDescriptor;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Catalog endpoint error ({status})")]
    Api { status: u16 },
}

/// External media catalog source.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn list(&self) -> Result<Vec<MediaDescriptor>, CatalogError>;
}

/// Fixed in-process catalog, for tests and catalog-less deployments.
pub struct StaticCatalog(pub Vec<MediaDescriptor>);

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn list(&self) -> Result<Vec<MediaDescriptor>, CatalogError> {
        Ok(self.0.clone())
    }
}

/// Fetches the catalog as a JSON array of descriptors.
pub struct HttpCatalogSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpCatalogSource {
    pub fn new(url: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            timeout,
        }
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn list(&self) -> Result<Vec<MediaDescriptor>, CatalogError> {
        let resp = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Err(CatalogError::Api { status });
        }
        Ok(resp.json().await?)
    }
}

struct CachedList {
    items: Vec<MediaDescriptor>,
    fetched_at: DateTime<Utc>,
}

/// TTL cache over a [`CatalogSource`]. Refreshed on its own schedule,
/// independent of any flush; a failed refresh serves the stale snapshot.
pub struct MediaCatalog {
    source: Arc<dyn CatalogSource>,
    ttl_secs: i64,
    cache: Mutex<Option<CachedList>>,
}

impl MediaCatalog {
    pub fn new(source: Arc<dyn CatalogSource>, refresh_secs: u64) -> Self {
        Self {
            source,
            ttl_secs: refresh_secs as i64,
            cache: Mutex::new(None),
        }
    }

    /// Current catalog snapshot. Never fails: a refresh error falls back to
    /// the cached entries (or an empty catalog on a cold start).
    pub async fn entries(&self) -> Vec<MediaDescriptor> {
        if let Some(items) = self.fresh() {
            return items;
        }
        match self.source.list().await {
            Ok(items) => {
                debug!(count = items.len(), "media catalog refreshed");
                *self.cache.lock().unwrap() = Some(CachedList {
                    items: items.clone(),
                    fetched_at: Utc::now(),
                });
                items
            }
            Err(e) => {
                warn!(error = %e, "catalog refresh failed, serving cached entries");
                self.cache
                    .lock()
                    .unwrap()
                    .as_ref()
                    .map(|c| c.items.clone())
                    .unwrap_or_default()
            }
        }
    }

    fn fresh(&self) -> Option<Vec<MediaDescriptor>> {
        let cache = self.cache.lock().unwrap();
        let cached = cache.as_ref()?;
        let age = Utc::now()
            .signed_duration_since(cached.fetched_at)
            .num_seconds();
        (age < self.ttl_secs).then(|| cached.items.clone())
    }
}

/// Id-based lookup into a catalog snapshot.
pub fn resolve(entries: &[MediaDescriptor], id: u32) -> Option<&MediaDescriptor> {
    entries.iter().find(|d| d.id == id)
}
