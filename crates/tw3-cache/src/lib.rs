//! Caching layer for TW3
//!
//! A generic [`TtlCache`] with TTL expiry and usage-based eviction, and the
//! [`CacheCoordinator`] that owns the news and model response caches and
//! sweeps them periodically.

pub mod coordinator;
pub mod entry;
pub mod key;
pub mod ttl_cache;

pub use coordinator::{format_bytes, CacheCoordinator, CoordinatorConfig, GlobalCacheStats, NewsQuery};
pub use entry::CacheEntry;
pub use key::CacheKey;
pub use ttl_cache::{CacheConfig, CacheStats, TtlCache};
