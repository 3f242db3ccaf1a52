//! Explicitly owned container for every core component
//!
//! Built once at startup from [`AppConfig`], started with [`Services::start`]
//! and stopped with [`Services::shutdown`], which waits for both background
//! tasks to finish.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tw3_cache::{CacheCoordinator, NewsQuery};
use tw3_monitoring::{
    HealthMonitor, ModelChecker, ModelProbe, NewsApiChecker, ProcSystemMetrics, SystemMetrics,
};
use tw3_resilience::{
    CircuitBreaker, Operation, RateLimiter, ResilienceError, ResilienceStack, RetryPolicy,
};

use crate::config::AppConfig;
use crate::error::{ServerError, ServerResult};

/// The core components shared by request handlers
pub struct Services {
    config: AppConfig,
    cache: Arc<CacheCoordinator>,
    monitor: HealthMonitor,
    news: ResilienceStack,
}

impl Services {
    /// Build everything from configuration, sampling the local host
    pub fn build(config: AppConfig) -> ServerResult<Self> {
        Self::build_with(config, Arc::new(ProcSystemMetrics::default()))
    }

    /// Build with an explicit metrics source
    pub fn build_with(config: AppConfig, system: Arc<dyn SystemMetrics>) -> ServerResult<Self> {
        config.validate()?;

        if config.newsapi_key.is_none() {
            warn!("NEWSAPI_KEY is not configured; news API checks will fail");
        }

        let cache = Arc::new(CacheCoordinator::new(config.coordinator_config()));

        let monitor = HealthMonitor::new(config.monitor_config(), system)
            .with_checker(Arc::new(NewsApiChecker::new(config.news_api_config())))
            .with_cache(cache.clone());

        let news = ResilienceStack::new()
            .with_rate_limiter(Arc::new(RateLimiter::new("newsapi", config.rate_limiter_config())))
            .with_circuit_breaker(Arc::new(CircuitBreaker::new(
                "newsapi",
                config.circuit_breaker_config(),
            )))
            .with_retry(Arc::new(RetryPolicy::new("newsapi", config.retry_config())));

        info!("Services built for environment {}", config.environment);
        Ok(Self {
            config,
            cache,
            monitor,
            news,
        })
    }

    /// Monitor the inference pipeline through `probe`, bounded by the configured
    /// model check timeout. Call before [`start`](Self::start).
    pub fn with_model_probe<P>(mut self, probe: P) -> Self
    where
        P: ModelProbe + 'static,
    {
        let timeout = self.config.model_check_timeout();
        self.monitor = self
            .monitor
            .with_checker(Arc::new(ModelChecker::new(probe, timeout)));
        debug!("Model health check registered, timeout {:?}", timeout);
        self
    }

    /// Configuration the services were built from
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Cache coordinator
    pub fn cache(&self) -> &Arc<CacheCoordinator> {
        &self.cache
    }

    /// Health monitor
    pub fn monitor(&self) -> &HealthMonitor {
        &self.monitor
    }

    /// Resilience wrappers around news API calls
    pub fn news_stack(&self) -> &ResilienceStack {
        &self.news
    }

    /// Cached news content, or `fetch` run through the news wrappers and cached on success
    pub async fn fetch_news<O>(
        &self,
        query: &NewsQuery,
        fetch: &O,
    ) -> Result<String, ResilienceError<O::Error>>
    where
        O: Operation<Output = String> + ?Sized,
    {
        if let Some(cached) = self.cache.get_news(query) {
            debug!("News cache hit for: {:.50}", query.query);
            return Ok(cached);
        }

        let content = self.news.call(fetch).await?;
        self.cache.set_news(query, content.clone());
        Ok(content)
    }

    /// Cached model response, or `generate` run and its non-empty output cached
    pub async fn generate<O>(&self, prompt: &str, generate: &O) -> Result<String, O::Error>
    where
        O: Operation<Output = String> + ?Sized,
    {
        if let Some(cached) = self.cache.get_response(prompt) {
            debug!("Model response served from cache");
            return Ok(cached);
        }

        let response = generate.invoke().await?;
        if !response.is_empty() {
            self.cache.set_response(prompt, response.clone());
        }
        Ok(response)
    }

    /// Start the cache sweep and the background health checks
    pub fn start(&self) {
        self.cache.start_sweep();
        self.monitor.start_background();
        info!("Background services started");
    }

    /// Stop both background tasks, waiting at most `grace` for them to finish
    pub async fn shutdown(&self, grace: Duration) -> ServerResult<()> {
        let stop = async {
            tokio::join!(self.cache.stop_sweep(), self.monitor.stop_background());
        };

        tokio::time::timeout(grace, stop).await.map_err(|_| {
            ServerError::ShutdownError(format!("background tasks still running after {:?}", grace))
        })?;

        info!("Background services stopped");
        Ok(())
    }
}
