//! Domain caches for news lookups and model responses
//!
//! The coordinator owns both caches, shapes their keys and runs the periodic
//! sweep that drops expired entries nobody reads any more.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::key::CacheKey;
use crate::ttl_cache::{CacheConfig, CacheStats, TtlCache};

/// Approximate footprint of one cached news result
const NEWS_ENTRY_BYTES: u64 = 2 * 1024;

/// Approximate footprint of one cached model response
const MODEL_ENTRY_BYTES: u64 = 4 * 1024;

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// News cache settings
    pub news: CacheConfig,
    /// TTL given to news results when they are stored, in milliseconds
    pub news_write_ttl_ms: u64,
    /// Model response cache settings
    pub model: CacheConfig,
    /// Interval between expiry sweeps, in milliseconds
    pub sweep_interval_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            news: CacheConfig {
                max_size: 500,
                default_ttl_ms: 30 * 60 * 1000,
            },
            news_write_ttl_ms: 15 * 60 * 1000,
            model: CacheConfig {
                max_size: 200,
                default_ttl_ms: 2 * 60 * 60 * 1000,
            },
            sweep_interval_ms: 5 * 60 * 1000,
        }
    }
}

impl CoordinatorConfig {
    /// Estimated bytes held when both caches are full
    pub fn max_memory_bytes(&self) -> u64 {
        self.news.max_size as u64 * NEWS_ENTRY_BYTES + self.model.max_size as u64 * MODEL_ENTRY_BYTES
    }
}

/// Parameters identifying a news lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsQuery {
    /// Free-text search
    pub query: String,
    /// Oldest publication date requested
    pub from_date: String,
    /// Sort mode passed to the news API
    pub sort_by: String,
    /// Number of articles requested
    pub max_results: u32,
}

impl NewsQuery {
    /// Create a news query
    pub fn new(
        query: impl Into<String>,
        from_date: impl Into<String>,
        sort_by: impl Into<String>,
        max_results: u32,
    ) -> Self {
        Self {
            query: query.into(),
            from_date: from_date.into(),
            sort_by: sort_by.into(),
            max_results,
        }
    }

    /// Structured cache key; the query text is trimmed and lower-cased
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::structured([
            ("query", json!(self.query.trim().to_lowercase())),
            ("from_date", json!(self.from_date)),
            ("sort", json!(self.sort_by)),
            ("max_results", json!(self.max_results)),
        ])
    }
}

/// Statistics across both caches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalCacheStats {
    /// News cache statistics
    pub news_cache: CacheStats,
    /// Model response cache statistics
    pub model_cache: CacheStats,
    /// Estimated memory held by both caches, human readable
    pub total_memory_usage: String,
    /// Estimated memory held by both caches, in bytes
    pub total_memory_bytes: u64,
}

/// Handle on the running sweep task
struct SweepTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the news and model caches and their background sweep
pub struct CacheCoordinator {
    config: CoordinatorConfig,
    news: Arc<TtlCache<String>>,
    model: Arc<TtlCache<String>>,
    sweeper: Mutex<Option<SweepTask>>,
}

impl std::fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("news", &self.news)
            .field("model", &self.model)
            .field("sweeping", &self.is_sweeping())
            .finish()
    }
}

impl Default for CacheCoordinator {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}

impl CacheCoordinator {
    /// Create a coordinator; the sweep is not started until [`start_sweep`](Self::start_sweep)
    pub fn new(config: CoordinatorConfig) -> Self {
        info!(
            "Creating cache coordinator: news max_size={}, model max_size={}, sweep every {}ms",
            config.news.max_size, config.model.max_size, config.sweep_interval_ms
        );
        Self {
            news: Arc::new(TtlCache::new("news", config.news.clone())),
            model: Arc::new(TtlCache::new("model", config.model.clone())),
            config,
            sweeper: Mutex::new(None),
        }
    }

    /// Coordinator configuration
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// The underlying news cache
    pub fn news_cache(&self) -> &TtlCache<String> {
        &self.news
    }

    /// The underlying model response cache
    pub fn model_cache(&self) -> &TtlCache<String> {
        &self.model
    }

    /// Cached news content for a lookup
    pub fn get_news(&self, query: &NewsQuery) -> Option<String> {
        self.news.get(query.cache_key())
    }

    /// Store news content for a lookup
    pub fn set_news(&self, query: &NewsQuery, content: impl Into<String>) {
        self.news.set_with_ttl(
            query.cache_key(),
            content.into(),
            Duration::from_millis(self.config.news_write_ttl_ms),
        );
        debug!("News result cached for: {:.50}", query.query);
    }

    /// Cached model response for a prompt
    pub fn get_response(&self, prompt: &str) -> Option<String> {
        self.model.get(CacheKey::content_hash(prompt))
    }

    /// Store the model response for a prompt
    pub fn set_response(&self, prompt: &str, response: impl Into<String>) {
        self.model.set(CacheKey::content_hash(prompt), response.into());
    }

    /// News cache statistics
    pub fn news_stats(&self) -> CacheStats {
        self.news.stats()
    }

    /// Model cache statistics
    pub fn model_stats(&self) -> CacheStats {
        self.model.stats()
    }

    /// Empty both caches
    pub fn clear_all(&self) {
        self.news.clear();
        self.model.clear();
        info!("All caches cleared");
    }

    /// Drop expired entries from both caches, returning `(news, model)` counts
    pub fn sweep_now(&self) -> (usize, usize) {
        sweep(&self.news, &self.model)
    }

    /// Estimated bytes held, from a fixed per-entry size
    pub fn estimated_memory_bytes(&self) -> u64 {
        self.news.len() as u64 * NEWS_ENTRY_BYTES + self.model.len() as u64 * MODEL_ENTRY_BYTES
    }

    /// Statistics for both caches plus the memory estimate
    pub fn global_stats(&self) -> GlobalCacheStats {
        let total_memory_bytes = self.estimated_memory_bytes();
        GlobalCacheStats {
            news_cache: self.news.stats(),
            model_cache: self.model.stats(),
            total_memory_usage: format_bytes(total_memory_bytes),
            total_memory_bytes,
        }
    }

    /// Whether the background sweep is running
    pub fn is_sweeping(&self) -> bool {
        self.sweeper.lock().is_some()
    }

    /// Start the periodic expiry sweep. Returns false if it is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_sweep(&self) -> bool {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            debug!("Cache sweep already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let interval = Duration::from_millis(self.config.sweep_interval_ms);
        let handle = tokio::spawn(run_sweep(
            self.news.clone(),
            self.model.clone(),
            interval,
            cancel.clone(),
        ));
        *sweeper = Some(SweepTask { cancel, handle });
        info!("Cache sweep started, interval {:?}", interval);
        true
    }

    /// Stop the sweep and wait for the task to finish
    pub async fn stop_sweep(&self) {
        let task = self.sweeper.lock().take();
        if let Some(SweepTask { cancel, handle }) = task {
            cancel.cancel();
            if let Err(e) = handle.await {
                error!("Cache sweep task ended abnormally: {}", e);
            }
            info!("Cache sweep stopped");
        }
    }
}

impl Drop for CacheCoordinator {
    fn drop(&mut self) {
        if let Some(task) = self.sweeper.get_mut().take() {
            task.cancel.cancel();
        }
    }
}

fn sweep(news: &TtlCache<String>, model: &TtlCache<String>) -> (usize, usize) {
    let removed = (news.purge_expired(), model.purge_expired());
    debug!(
        "Cache sweep completed: {} news, {} model entries removed",
        removed.0, removed.1
    );
    removed
}

async fn run_sweep(
    news: Arc<TtlCache<String>>,
    model: Arc<TtlCache<String>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("Cache sweep cancelled");
                break;
            }

            () = tokio::time::sleep(interval) => {
                sweep(&news, &model);
            }
        }
    }
}

/// Render a byte count as B, KB or MB
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;

    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_max_memory_bytes_uses_capacities() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.max_memory_bytes(), 500 * 2048 + 200 * 4096);
        assert_eq!(format_bytes(config.max_memory_bytes()), "1.8 MB");
    }

    #[test]
    fn test_news_key_normalizes_query() {
        let a = NewsQuery::new("  Rust Lang ", "2024-01-01", "publishedAt", 5);
        let b = NewsQuery::new("rust lang", "2024-01-01", "publishedAt", 5);
        let c = NewsQuery::new("rust lang", "2024-01-01", "publishedAt", 10);

        assert_eq!(a.cache_key().canonical(), b.cache_key().canonical());
        assert_ne!(b.cache_key().canonical(), c.cache_key().canonical());
    }
}
