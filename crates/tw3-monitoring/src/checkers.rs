//! Checkers for the news API and the inference pipeline

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::health::{Checker, ServiceHealth};

/// News API checker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsApiConfig {
    /// API key sent with the probe request
    pub api_key: String,
    /// Base URL of the API, without trailing slash
    pub base_url: String,
    /// Probe timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for NewsApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://newsapi.org/v2".to_string(),
            timeout_seconds: 5,
        }
    }
}

/// Probes the news API with a one-article headline request
#[derive(Debug, Clone)]
pub struct NewsApiChecker {
    config: NewsApiConfig,
    client: reqwest::Client,
}

impl NewsApiChecker {
    /// Service key of this checker
    pub const NAME: &'static str = "newsapi";

    const DISPLAY_NAME: &'static str = "NewsAPI";

    /// Create a new checker
    pub fn new(config: NewsApiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn probe(&self, started: Instant) -> Result<ServiceHealth, reqwest::Error> {
        let url = format!("{}/top-headlines", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[
                ("country", "fr"),
                ("pageSize", "1"),
                ("apiKey", self.config.api_key.as_str()),
            ])
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Ok(
                ServiceHealth::unhealthy(Self::DISPLAY_NAME, format!("HTTP {}", status.as_u16()))
                    .with_response_time(started.elapsed()),
            );
        }

        let body: Value = response.json().await?;
        let elapsed = started.elapsed();

        if body.get("status").and_then(Value::as_str) == Some("ok") {
            let articles = body
                .get("articles")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            Ok(ServiceHealth::healthy(Self::DISPLAY_NAME)
                .with_response_time(elapsed)
                .with_metadata("articles_available", articles))
        } else {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown API error");
            Ok(ServiceHealth::degraded(Self::DISPLAY_NAME, message).with_response_time(elapsed))
        }
    }
}

#[async_trait]
impl Checker for NewsApiChecker {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn check(&self) -> ServiceHealth {
        let started = Instant::now();
        match self.probe(started).await {
            Ok(health) => {
                debug!("NewsAPI check: {}", health.status);
                health
            }
            Err(e) if e.is_timeout() => {
                warn!("NewsAPI check timed out");
                ServiceHealth::unhealthy(
                    Self::DISPLAY_NAME,
                    format!("Timeout after {} seconds", self.config.timeout_seconds),
                )
            }
            Err(e) => {
                warn!("NewsAPI check failed: {}", e);
                ServiceHealth::unhealthy(Self::DISPLAY_NAME, e.to_string())
                    .with_response_time(started.elapsed())
            }
        }
    }
}

/// Minimal generation capability used to probe the inference pipeline
#[async_trait]
pub trait ModelProbe: Send + Sync {
    /// Error produced by a failed generation
    type Error: Display + Send;

    /// Generate a short completion for `prompt`
    async fn generate(&self, prompt: &str) -> Result<String, Self::Error>;
}

/// Probes the model with a tiny generation
#[derive(Debug, Clone)]
pub struct ModelChecker<P> {
    probe: P,
    timeout: Duration,
}

impl<P: ModelProbe> ModelChecker<P> {
    /// Service key of this checker
    pub const NAME: &'static str = "model";

    const DISPLAY_NAME: &'static str = "Model";

    const TEST_PROMPT: &'static str = "Test";

    /// Create a checker bounding each probe by `timeout`
    pub fn new(probe: P, timeout: Duration) -> Self {
        Self { probe, timeout }
    }
}

#[async_trait]
impl<P: ModelProbe> Checker for ModelChecker<P> {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn check(&self) -> ServiceHealth {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.probe.generate(Self::TEST_PROMPT)).await;
        let elapsed = started.elapsed();

        let health = match outcome {
            Ok(Ok(output)) if !output.trim().is_empty() => {
                ServiceHealth::healthy(Self::DISPLAY_NAME).with_metadata("test_generation", "success")
            }
            Ok(Ok(_)) => ServiceHealth::degraded(Self::DISPLAY_NAME, "Empty model response"),
            Ok(Err(e)) => ServiceHealth::unhealthy(Self::DISPLAY_NAME, e.to_string()),
            Err(_) => ServiceHealth::unhealthy(
                Self::DISPLAY_NAME,
                format!("Timeout after {:.1} seconds", self.timeout.as_secs_f64()),
            ),
        };

        debug!("Model check: {}", health.status);
        health.with_response_time(elapsed)
    }
}
