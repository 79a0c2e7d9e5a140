//! Time-boxed response cache.
//!
//! Maps a request fingerprint to a provider response for a short TTL. The
//! cache holds at most `max_entries` values; inserting at capacity evicts the
//! entry created longest ago. Expired entries are never returned and are
//! dropped on read.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::time::Instant;

use crate::config::CacheConfig;
use crate::models::ProviderRequest;

/// Deterministic fingerprint of a provider request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// md5 of `method:normalized-params`.
    pub fn for_request(request: &ProviderRequest) -> Self {
        let input = format!("{}:{}", request.method(), request.normalized_params());
        Self(format!("{:x}", md5::compute(input.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// Valid while `age < ttl`; an entry exactly `ttl` old is expired.
    fn is_valid(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) < self.ttl
    }
}

#[derive(Debug)]
struct CacheInner<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Cache counters and occupancy.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub enabled: bool,
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Thread-safe bounded TTL cache.
pub struct ResponseCache<V> {
    config: CacheConfig,
    inner: Mutex<CacheInner<V>>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::with_capacity(config.max_entries.min(1024)),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            config,
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(CacheConfig {
            enabled: false,
            default_ttl: Duration::ZERO,
            max_entries: 0,
        })
    }

    fn lock_inner(&self) -> MutexGuard<'_, CacheInner<V>> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("Response cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn default_ttl(&self) -> Duration {
        self.config.default_ttl
    }

    /// Look up a value. Expired entries are removed and count as a miss.
    ///
    /// Always `None` when the cache is disabled; disabled lookups are not counted.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        if !self.config.enabled {
            return None;
        }

        let now = Instant::now();
        let mut inner = self.lock_inner();

        let state = inner.entries.get(key).map(|entry| entry.is_valid(now));
        match state {
            Some(true) => {
                inner.hits += 1;
                inner.entries.get(key).map(|entry| entry.value.clone())
            }
            Some(false) => {
                inner.entries.remove(key);
                inner.misses += 1;
                debug!("Response cache: entry {} expired", key);
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Store a value. `ttl` falls back to the configured default.
    ///
    /// At capacity, the oldest entry by creation time is evicted first.
    /// A zero TTL or a zero capacity stores nothing.
    pub fn put(&self, key: CacheKey, value: V, ttl: Option<Duration>) {
        if !self.config.enabled || self.config.max_entries == 0 {
            return;
        }
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        if ttl.is_zero() {
            return;
        }

        let now = Instant::now();
        let mut inner = self.lock_inner();

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.config.max_entries {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.created_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
                inner.evictions += 1;
                debug!("Response cache: evicted oldest entry {}", oldest);
            }
        }

        inner.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                ttl,
            },
        );
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock_inner();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.is_valid(now));
        before - inner.entries.len()
    }

    pub fn clear(&self) {
        let mut inner = self.lock_inner();
        let dropped = inner.entries.len();
        inner.entries.clear();
        info!("Response cache cleared ({} entries)", dropped);
    }

    /// Number of stored entries, including ones that expired but were not read yet.
    pub fn len(&self) -> usize {
        self.lock_inner().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock_inner();
        CacheStats {
            enabled: self.config.enabled,
            size: inner.entries.len(),
            max_size: self.config.max_entries,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }
}
