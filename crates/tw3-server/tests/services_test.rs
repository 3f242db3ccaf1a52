use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tw3_cache::NewsQuery;
use tw3_monitoring::{
    init_test_tracing, CpuMetrics, DiskMetrics, HealthStatus, MemoryMetrics, ModelProbe,
    MonitoringResult, SystemMetrics,
};
use tw3_resilience::{CircuitState, Operation, ResilienceError};
use tw3_server::{AppConfig, ServerError, Services};

struct IdleHost;

#[async_trait]
impl SystemMetrics for IdleHost {
    async fn memory(&self) -> MonitoringResult<MemoryMetrics> {
        Ok(MemoryMetrics::default())
    }

    async fn cpu(&self) -> MonitoringResult<CpuMetrics> {
        Ok(CpuMetrics::default())
    }

    async fn disk(&self) -> MonitoringResult<DiskMetrics> {
        Ok(DiskMetrics::default())
    }
}

struct EchoModel;

#[async_trait]
impl ModelProbe for EchoModel {
    type Error = String;

    async fn generate(&self, prompt: &str) -> Result<String, String> {
        Ok(format!("echo: {}", prompt))
    }
}

/// Counts invocations and fails while `fail` is set
struct NewsFetch {
    calls: AtomicU32,
    fail: bool,
}

impl NewsFetch {
    fn ok() -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail: true,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Operation for NewsFetch {
    type Output = String;
    type Error = String;

    async fn invoke(&self) -> Result<String, String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            Err(format!("news api unreachable (call {})", n))
        } else {
            Ok(format!("articles #{}", n))
        }
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        newsapi_key: Some("test-key".to_string()),
        newsapi_base_url: "http://127.0.0.1:1".to_string(),
        circuit_breaker_threshold: 2,
        circuit_breaker_timeout_seconds: 30,
        retry_base_delay_seconds: 0.1,
        retry_max_delay_seconds: 1.0,
        rate_limit_max_calls: 3,
        rate_limit_window_seconds: 60,
        ..AppConfig::default()
    }
}

fn services(config: AppConfig) -> Services {
    Services::build_with(config, Arc::new(IdleHost))
        .unwrap()
        .with_model_probe(EchoModel)
}

fn query(text: &str) -> NewsQuery {
    NewsQuery::new(text, "2024-06-01", "relevancy", 5)
}

#[tokio::test(start_paused = true)]
async fn test_fetch_news_served_from_cache() {
    init_test_tracing();
    let services = services(test_config());
    let fetch = NewsFetch::ok();

    let first = services.fetch_news(&query("IA générative"), &fetch).await;
    let second = services.fetch_news(&query("ia générative "), &fetch).await;

    assert_eq!(first, Ok("articles #1".to_string()));
    assert_eq!(second, Ok("articles #1".to_string()));
    assert_eq!(fetch.calls(), 1);
    assert_eq!(services.cache().news_stats().hits, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failing_news_api_opens_breaker() {
    let services = services(test_config());
    let fetch = NewsFetch::failing();

    // Every failed attempt counts, so the second attempt trips the circuit
    // and the third is rejected without reaching the news API
    let first = services.fetch_news(&query("a"), &fetch).await;
    assert!(matches!(first, Err(ResilienceError::CircuitOpen { .. })));
    let breaker = services.news_stack().circuit_breaker().unwrap();
    assert_eq!(breaker.failure_count(), 2);
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(fetch.calls(), 2);

    let rejected = services.fetch_news(&query("a"), &fetch).await;
    assert!(matches!(rejected, Err(ResilienceError::CircuitOpen { .. })));
    assert_eq!(fetch.calls(), 2);
    assert_eq!(services.cache().news_stats().size, 0, "failures are not cached");
}

#[tokio::test(start_paused = true)]
async fn test_news_rate_limit() {
    let services = services(test_config());
    let fetch = NewsFetch::ok();

    for text in ["a", "b", "c"] {
        assert!(services.fetch_news(&query(text), &fetch).await.is_ok());
    }

    let limited = services.fetch_news(&query("d"), &fetch).await;
    assert!(matches!(
        limited,
        Err(ResilienceError::RateLimitExceeded { max_calls: 3, .. })
    ));

    // Cached lookups never reach the limiter
    assert_eq!(services.fetch_news(&query("a"), &fetch).await, Ok("articles #1".to_string()));
    assert_eq!(fetch.calls(), 3);
}

struct Generate(AtomicU32);

#[async_trait]
impl Operation for Generate {
    type Output = String;
    type Error = String;

    async fn invoke(&self) -> Result<String, String> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok("Voici la réponse".to_string())
    }
}

#[tokio::test(start_paused = true)]
async fn test_generate_caches_responses() {
    let services = services(test_config());
    let generate = Generate(AtomicU32::new(0));

    for _ in 0..3 {
        assert_eq!(
            services.generate("Quelles nouvelles ?", &generate).await,
            Ok("Voici la réponse".to_string())
        );
    }
    assert_eq!(generate.0.load(Ordering::SeqCst), 1);
    assert_eq!(services.cache().global_stats().total_memory_usage, "4.0 KB");
}

#[tokio::test(start_paused = true)]
async fn test_start_and_shutdown() {
    let services = services(test_config());

    services.start();
    assert!(services.cache().is_sweeping());
    assert!(services.monitor().is_polling());

    services.shutdown(Duration::from_secs(5)).await.unwrap();
    assert!(!services.cache().is_sweeping());
    assert!(!services.monitor().is_polling());

    // Shutting down twice is harmless
    services.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_full_report_with_unreachable_news_api() {
    let services = services(test_config());
    services.cache().set_response("prompt", "response");

    let report = services.monitor().full_report().await;

    assert_eq!(report.services["newsapi"].status, HealthStatus::Unhealthy);
    assert_eq!(report.services["model"].status, HealthStatus::Healthy);
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(report.cache_stats.map(|s| s.model_cache.size), Some(1));
}

#[test]
fn test_invalid_config_rejected() {
    let config = AppConfig {
        model_cache_max_size: 0,
        ..AppConfig::default()
    };
    let result = Services::build_with(config, Arc::new(IdleHost));
    assert!(matches!(result, Err(ServerError::ConfigError(_))));
}

/// Answers only after a fixed delay
struct SlowModel(Duration);

#[async_trait]
impl ModelProbe for SlowModel {
    type Error = String;

    async fn generate(&self, _prompt: &str) -> Result<String, String> {
        tokio::time::sleep(self.0).await;
        Ok("late".to_string())
    }
}

#[tokio::test(start_paused = true)]
async fn test_model_check_uses_configured_timeout() {
    let config = AppConfig {
        model_check_timeout_seconds: 2,
        ..test_config()
    };
    let services = Services::build_with(config, Arc::new(IdleHost))
        .unwrap()
        .with_model_probe(SlowModel(Duration::from_secs(3)));

    let health = services.monitor().check_service("model").await.unwrap();
    assert_eq!(health.status, HealthStatus::Unhealthy);
    assert_eq!(health.error_message.as_deref(), Some("Timeout after 2.0 seconds"));
}
