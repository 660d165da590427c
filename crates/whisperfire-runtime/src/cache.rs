//! Caching layer for whisperfire-runtime.
//!
//! Validated results are stored under the request [`Fingerprint`], so an
//! identical request inside the TTL never reaches a provider. Only results
//! that passed the schema gate are ever inserted.

use chrono::{DateTime, Utc};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use whisperfire_core::{Fingerprint, NormalizedResult};

use crate::config::CacheConfig;

/// A cached result and when it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub value: Arc<NormalizedResult>,
    pub inserted_at: DateTime<Utc>,
}

/// Bounded TTL cache of validated results, using moka.
///
/// Cloning is cheap and clones share storage.
#[derive(Clone)]
pub struct ResponseCache {
    cache: Cache<Fingerprint, Arc<CacheEntry>>,
}

impl ResponseCache {
    /// Longest time an entry may live.
    pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

    /// Create a new cache holding at most `max_entries` for `ttl` each.
    /// `ttl` is clamped to [`Self::MAX_TTL`].
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl.min(Self::MAX_TTL))
            .build();

        Self { cache }
    }

    /// Look up a result. Expired entries are never returned.
    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<CacheEntry>> {
        self.cache.get(fingerprint).await
    }

    /// Store a result, replacing any previous entry for the same key.
    pub async fn insert(&self, fingerprint: Fingerprint, value: NormalizedResult) -> Arc<CacheEntry> {
        let entry = Arc::new(CacheEntry {
            fingerprint: fingerprint.clone(),
            value: Arc::new(value),
            inserted_at: Utc::now(),
        });
        self.cache.insert(fingerprint, entry.clone()).await;
        entry
    }

    /// Clear the cache.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate number of live entries. Pending maintenance may lag.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Flush moka's pending housekeeping so counts are exact.
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }
}

impl From<&CacheConfig> for ResponseCache {
    fn from(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.ttl)
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.entry_count())
            .finish()
    }
}
