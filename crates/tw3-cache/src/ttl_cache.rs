//! Generic in-memory cache with TTL expiry, a size bound and usage-based eviction

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::entry::CacheEntry;
use crate::key::CacheKey;

/// Default maximum number of entries
const DEFAULT_MAX_SIZE: usize = 1000;

/// Default TTL (1 hour in milliseconds)
const DEFAULT_TTL_MS: u64 = 60 * 60 * 1000;

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries before eviction kicks in
    pub max_size: usize,
    /// TTL applied when `set` is called without one, in milliseconds
    pub default_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            default_ttl_ms: DEFAULT_TTL_MS,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of reads that returned a value
    pub hits: u64,
    /// Number of reads that found nothing or an expired entry
    pub misses: u64,
    /// Number of entries removed to make room
    pub evictions: u64,
    /// hits / (hits + misses), 0 before the first read
    pub hit_rate: f64,
    /// Entries currently stored
    pub size: usize,
    /// Configured capacity
    pub max_size: usize,
}

struct CacheInner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
    next_sequence: u64,
}

/// TTL cache evicting the least used entry when full.
///
/// The eviction victim is the entry with the fewest hits; among equals the
/// oldest one goes first. All mutation happens under a single lock, so hit
/// counts and evictions stay consistent across concurrent callers.
pub struct TtlCache<V> {
    name: String,
    config: CacheConfig,
    inner: Mutex<CacheInner<V>>,
}

impl<V: Clone> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("size", &self.len())
            .finish()
    }
}

impl<V: Clone> TtlCache<V> {
    /// Create a new cache
    pub fn new(name: impl Into<String>, config: CacheConfig) -> Self {
        let name = name.into();
        debug!(
            "Creating cache {} with max_size={}, default_ttl={}ms",
            name, config.max_size, config.default_ttl_ms
        );
        Self {
            name,
            config,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
                next_sequence: 0,
            }),
        }
    }

    /// Cache name used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cache configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a value, counting a hit or a miss. Expired entries are dropped on the way.
    pub fn get(&self, key: impl Into<CacheKey>) -> Option<V> {
        let key = key.into().canonical();
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.get_mut(&key) {
            None => {
                inner.misses += 1;
                trace!("Cache {} miss: {}", self.name, key);
                return None;
            }
            Some(entry) if entry.is_expired_at(now) => true,
            Some(entry) => {
                entry.record_hit();
                let value = entry.value.clone();
                inner.hits += 1;
                trace!("Cache {} hit: {}", self.name, key);
                return Some(value);
            }
        };

        if expired {
            inner.entries.remove(&key);
            inner.misses += 1;
            debug!("Cache {} entry expired on access: {}", self.name, key);
        }
        None
    }

    /// Store a value with the default TTL
    pub fn set(&self, key: impl Into<CacheKey>, value: V) {
        self.set_with_ttl(key, value, Duration::from_millis(self.config.default_ttl_ms));
    }

    /// Store a value with an explicit TTL
    pub fn set_with_ttl(&self, key: impl Into<CacheKey>, value: V, ttl: Duration) {
        let key = key.into().canonical();
        if self.config.max_size == 0 {
            trace!("Cache {} has no capacity, dropping: {}", self.name, key);
            return;
        }
        let mut inner = self.inner.lock();

        if inner.entries.len() >= self.config.max_size && !inner.entries.contains_key(&key) {
            self.evict_one(&mut inner);
        }

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner
            .entries
            .insert(key, CacheEntry::new(value, ttl).with_sequence(sequence));
    }

    /// Remove the least used entry, oldest first among equally used ones
    fn evict_one(&self, inner: &mut CacheInner<V>) {
        let victim = inner
            .entries
            .iter()
            .min_by_key(|(_, entry)| (entry.hit_count, entry.created_at, entry.sequence))
            .map(|(key, _)| key.clone());

        if let Some(key) = victim {
            inner.entries.remove(&key);
            inner.evictions += 1;
            debug!("Cache {} evicted entry: {}", self.name, key);
        }
    }

    /// Remove a single entry, returning whether it was present
    pub fn remove(&self, key: impl Into<CacheKey>) -> bool {
        let key = key.into().canonical();
        self.inner.lock().entries.remove(&key).is_some()
    }

    /// Whether a live entry exists for `key`. Does not touch statistics.
    pub fn contains(&self, key: impl Into<CacheKey>) -> bool {
        let key = key.into().canonical();
        self.inner
            .lock()
            .entries
            .get(&key)
            .map_or(false, |entry| !entry.is_expired())
    }

    /// Remove every expired entry, returning how many were dropped.
    ///
    /// Entries already removed by a concurrent lookup are simply not found.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!("Cache {} removed {} expired entries", self.name, removed);
        }
        removed
    }

    /// Empty the cache. Cumulative statistics are kept.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
        debug!("Cache {} cleared", self.name);
    }

    /// Number of stored entries, expired ones included until they are purged
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit count of the entry stored under `key`, if any
    pub fn hit_count(&self, key: impl Into<CacheKey>) -> Option<u64> {
        let key = key.into().canonical();
        self.inner.lock().entries.get(&key).map(|entry| entry.hit_count)
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let total = inner.hits + inner.misses;
        let hit_rate = if total > 0 {
            inner.hits as f64 / total as f64
        } else {
            0.0
        };

        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            hit_rate,
            size: inner.entries.len(),
            max_size: self.config.max_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn cache(max_size: usize) -> TtlCache<String> {
        TtlCache::new(
            "test",
            CacheConfig {
                max_size,
                default_ttl_ms: 1_000,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_and_get() {
        let cache = cache(10);
        cache.set("a", "alpha".to_string());

        assert_eq!(cache.get("a"), Some("alpha".to_string()));
        assert_eq!(cache.get("missing"), None);
        assert_eq!(cache.hit_count("a"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_at_capacity_does_not_evict() {
        let cache = cache(2);
        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());
        cache.set("a", "3".to_string());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.get("a"), Some("3".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_resets_hit_count() {
        let cache = cache(2);
        cache.set("a", "1".to_string());
        cache.get("a");
        cache.set("a", "2".to_string());
        assert_eq!(cache.hit_count("a"), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_is_idempotent() {
        let cache = cache(10);
        cache.set("short", "x".to_string());
        cache.set_with_ttl("long", "y".to_string(), Duration::from_secs(10));

        advance(Duration::from_millis(1_500)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("long"));
        assert!(!cache.contains("short"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove() {
        let cache = cache(10);
        cache.set("a", "1".to_string());
        assert!(cache.remove("a"));
        assert!(!cache.remove("a"));
        assert!(cache.is_empty());
    }
}
