use std::time::Duration;
use tokio::time::Instant;

/// Cache entry with usage tracking
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Cached value
    pub value: V,
    /// When the entry was stored
    pub created_at: Instant,
    /// How long the entry stays valid
    pub ttl: Duration,
    /// Number of successful reads of this entry
    pub hit_count: u64,
    /// Insertion order, breaks ties between entries stored at the same instant
    pub(crate) sequence: u64,
}

impl<V> CacheEntry<V> {
    /// Create a new cache entry stamped with the current time
    pub fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
            hit_count: 0,
            sequence: 0,
        }
    }

    pub(crate) fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Check if the entry had expired at `now`; an entry is still valid exactly at its TTL
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }

    /// Update the access statistics
    pub fn record_hit(&mut self) {
        self.hit_count += 1;
    }
}
