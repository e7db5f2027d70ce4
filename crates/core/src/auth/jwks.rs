//! Identity provider key-set cache
//!
//! Key sets are cached per URL with a TTL. Concurrent misses for the same URL
//! share one in-flight fetch. When a refresh fails the last good key set is
//! served, however old; only a cold cache surfaces the failure.
//!
//! At most [`MAX_KEY_SETS`] URLs stay resident. Inserting past the cap drops
//! expired entries first, then the oldest.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use jsonwebtoken::jwk::JwkSet;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::metrics::{global_metrics, Metrics};

/// Well-known path of the key set below a provider root
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Upper bound on cached key-set URLs
pub const MAX_KEY_SETS: usize = 8;

/// Largest key-set response body accepted, in bytes
const MAX_KEY_SET_BYTES: usize = 256 * 1024;

/// Key-set URL for a provider root or issuer
pub fn jwks_url(root: &str) -> String {
    format!("{}{}", root.trim_end_matches('/'), JWKS_PATH)
}

/// Fetches a key set over the network
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<JwkSet>;
}

/// `reqwest`-backed fetcher with a request timeout
pub struct HttpKeySetFetcher {
    client: reqwest::Client,
}

impl HttpKeySetFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self, url: &str) -> Result<JwkSet> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::AuthServiceUnavailable(format!("key set request failed: {}", e)))?;

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::AuthServiceUnavailable(format!("key set body failed: {}", e)))?
        {
            if body.len() + chunk.len() > MAX_KEY_SET_BYTES {
                return Err(Error::AuthServiceUnavailable(format!(
                    "key set response exceeds {} bytes",
                    MAX_KEY_SET_BYTES
                )));
            }
            body.extend_from_slice(&chunk);
        }

        serde_json::from_slice::<JwkSet>(&body)
            .map_err(|e| Error::AuthServiceUnavailable(format!("key set response is not valid JSON: {}", e)))
    }
}

struct CachedKeySet {
    keys: Arc<JwkSet>,
    fetched_at: Instant,
}

type Flight = Shared<BoxFuture<'static, std::result::Result<Arc<JwkSet>, String>>>;

/// TTL cache of key sets with single-flight refresh
pub struct KeySetCache {
    fetcher: Arc<dyn KeySetFetcher>,
    ttl: Duration,
    entries: Arc<Mutex<HashMap<String, CachedKeySet>>>,
    flights: Arc<Mutex<HashMap<String, Flight>>>,
    metrics: Arc<Metrics>,
}

impl KeySetCache {
    pub fn new(fetcher: Arc<dyn KeySetFetcher>, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            entries: Arc::new(Mutex::new(HashMap::new())),
            flights: Arc::new(Mutex::new(HashMap::new())),
            metrics: global_metrics(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Key set for `url`, fetching it if missing or older than the TTL
    pub async fn get(&self, url: &str) -> Result<Arc<JwkSet>> {
        if let Some(keys) = self.fresh(url) {
            return Ok(keys);
        }

        let flight = {
            let mut flights = self.flights.lock();
            // A flight may have landed between the check above and this lock
            if let Some(keys) = self.fresh(url) {
                return Ok(keys);
            }
            flights
                .entry(url.to_string())
                .or_insert_with(|| self.start_flight(url))
                .clone()
        };

        match flight.await {
            Ok(keys) => Ok(keys),
            Err(reason) => {
                if let Some(stale) = self.entries.lock().get(url) {
                    tracing::warn!(url, reason = %reason, "Key set refresh failed, serving stale keys");
                    return Ok(stale.keys.clone());
                }
                Err(Error::AuthServiceUnavailable(
                    "unable to fetch identity provider signing keys".to_string(),
                ))
            }
        }
    }

    /// Drop every cached key set
    pub fn invalidate(&self) {
        self.entries.lock().clear();
    }

    /// Number of resident key sets
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn fresh(&self, url: &str) -> Option<Arc<JwkSet>> {
        self.entries
            .lock()
            .get(url)
            .filter(|cached| cached.fetched_at.elapsed() < self.ttl)
            .map(|cached| cached.keys.clone())
    }

    fn start_flight(&self, url: &str) -> Flight {
        let url = url.to_string();
        let fetcher = self.fetcher.clone();
        let entries = self.entries.clone();
        let flights = self.flights.clone();
        let metrics = self.metrics.clone();
        let ttl = self.ttl;

        async move {
            metrics.keyset_fetched();
            tracing::debug!(url = %url, "Fetching key set");

            let outcome = match fetcher.fetch(&url).await {
                Ok(keys) => {
                    let keys = Arc::new(keys);
                    {
                        let mut cached = entries.lock();
                        make_room(&mut cached, &url, ttl);
                        cached.insert(
                            url.clone(),
                            CachedKeySet {
                                keys: keys.clone(),
                                fetched_at: Instant::now(),
                            },
                        );
                    }
                    Ok(keys)
                }
                Err(e) => {
                    metrics.keyset_fetch_failed();
                    tracing::warn!(url = %url, error = %e, "Key set fetch failed");
                    Err(e.to_string())
                }
            };

            flights.lock().remove(&url);
            outcome
        }
        .boxed()
        .shared()
    }
}

/// Keep the map under [`MAX_KEY_SETS`] before `url` is inserted
fn make_room(entries: &mut HashMap<String, CachedKeySet>, url: &str, ttl: Duration) {
    if entries.contains_key(url) || entries.len() < MAX_KEY_SETS {
        return;
    }

    entries.retain(|_, cached| cached.fetched_at.elapsed() < ttl);
    while entries.len() >= MAX_KEY_SETS {
        let oldest = entries
            .iter()
            .min_by_key(|(_, cached)| cached.fetched_at)
            .map(|(url, _)| url.clone());
        match oldest {
            Some(oldest) => {
                tracing::debug!(url = %oldest, "Evicting cached key set");
                entries.remove(&oldest);
            }
            None => break,
        }
    }
}
