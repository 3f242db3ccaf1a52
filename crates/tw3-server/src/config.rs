//! Configuration for the TW3 server
//!
//! Values come from environment variables. A value that does not parse is
//! reported and the default is kept.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};
use tw3_cache::{CacheConfig, CoordinatorConfig};
use tw3_monitoring::{LogFormat, LoggingConfig, MonitorConfig, NewsApiConfig};
use tw3_resilience::{CircuitBreakerConfig, RateLimiterConfig, RetryConfig};

use crate::error::{ServerError, ServerResult};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// News API key
    #[serde(default)]
    pub newsapi_key: Option<String>,

    /// News API base URL
    #[serde(default = "default_newsapi_base_url")]
    pub newsapi_base_url: String,

    /// Timeout of the news API health probe
    #[serde(default = "default_newsapi_timeout")]
    pub newsapi_timeout_seconds: u64,

    /// Consecutive failures before the news breaker opens
    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_threshold: u32,

    /// Seconds the news breaker stays open before probing
    #[serde(default = "default_circuit_breaker_timeout")]
    pub circuit_breaker_timeout_seconds: u64,

    /// Attempts per news call, the first one included
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Delay before the first retry
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_seconds: f64,

    /// Upper bound of any retry delay
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_seconds: f64,

    /// Backoff multiplier
    #[serde(default = "default_retry_exponential_base")]
    pub retry_exponential_base: f64,

    /// News calls allowed per window
    #[serde(default = "default_rate_limit_max_calls")]
    pub rate_limit_max_calls: u32,

    /// Rate limit window
    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window_seconds: u64,

    #[serde(default = "default_news_cache_max_size")]
    pub news_cache_max_size: usize,

    #[serde(default = "default_news_cache_ttl")]
    pub news_cache_ttl_seconds: u64,

    /// TTL given to news results when stored
    #[serde(default = "default_news_cache_write_ttl")]
    pub news_cache_write_ttl_seconds: u64,

    #[serde(default = "default_model_cache_max_size")]
    pub model_cache_max_size: usize,

    #[serde(default = "default_model_cache_ttl")]
    pub model_cache_ttl_seconds: u64,

    /// Timeout of the model health probe
    #[serde(default = "default_model_check_timeout")]
    pub model_check_timeout_seconds: u64,

    #[serde(default = "default_cache_sweep_interval")]
    pub cache_sweep_interval_seconds: u64,

    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_seconds: u64,

    /// Log filter (e.g., "info,tw3_resilience=debug")
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_newsapi_base_url() -> String {
    "https://newsapi.org/v2".to_string()
}

fn default_newsapi_timeout() -> u64 {
    5
}

fn default_circuit_breaker_threshold() -> u32 {
    5
}

fn default_circuit_breaker_timeout() -> u64 {
    60
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay() -> f64 {
    1.0
}

fn default_retry_max_delay() -> f64 {
    60.0
}

fn default_retry_exponential_base() -> f64 {
    2.0
}

fn default_rate_limit_max_calls() -> u32 {
    100
}

fn default_rate_limit_window() -> u64 {
    3600 // 1 hour
}

fn default_news_cache_max_size() -> usize {
    500
}

fn default_news_cache_ttl() -> u64 {
    1800
}

fn default_news_cache_write_ttl() -> u64 {
    900
}

fn default_model_cache_max_size() -> usize {
    200
}

fn default_model_cache_ttl() -> u64 {
    7200
}

fn default_model_check_timeout() -> u64 {
    30
}

fn default_cache_sweep_interval() -> u64 {
    300
}

fn default_health_check_interval() -> u64 {
    60
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            newsapi_key: None,
            newsapi_base_url: default_newsapi_base_url(),
            newsapi_timeout_seconds: default_newsapi_timeout(),
            circuit_breaker_threshold: default_circuit_breaker_threshold(),
            circuit_breaker_timeout_seconds: default_circuit_breaker_timeout(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay_seconds: default_retry_base_delay(),
            retry_max_delay_seconds: default_retry_max_delay(),
            retry_exponential_base: default_retry_exponential_base(),
            rate_limit_max_calls: default_rate_limit_max_calls(),
            rate_limit_window_seconds: default_rate_limit_window(),
            news_cache_max_size: default_news_cache_max_size(),
            news_cache_ttl_seconds: default_news_cache_ttl(),
            news_cache_write_ttl_seconds: default_news_cache_write_ttl(),
            model_cache_max_size: default_model_cache_max_size(),
            model_cache_ttl_seconds: default_model_cache_ttl(),
            model_check_timeout_seconds: default_model_check_timeout(),
            cache_sweep_interval_seconds: default_cache_sweep_interval(),
            health_check_interval_seconds: default_health_check_interval(),
            log_filter: default_log_filter(),
            log_format: LogFormat::default(),
            environment: default_environment(),
        }
    }
}

/// Parse `name` into `target`, keeping the current value when it does not parse
fn override_from<T, F>(lookup: &F, name: &str, target: &mut T)
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => warn!("Invalid {} value: {}", name, raw),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn load() -> ServerResult<Self> {
        Self::load_from(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn load_from<F>(lookup: F) -> ServerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        config.newsapi_key = lookup("NEWSAPI_KEY").filter(|key| !key.trim().is_empty());
        if let Some(base_url) = lookup("NEWSAPI_BASE_URL") {
            config.newsapi_base_url = base_url;
        }
        override_from(&lookup, "NEWSAPI_TIMEOUT_SECONDS", &mut config.newsapi_timeout_seconds);

        override_from(&lookup, "CIRCUIT_BREAKER_THRESHOLD", &mut config.circuit_breaker_threshold);
        override_from(
            &lookup,
            "CIRCUIT_BREAKER_TIMEOUT_SECONDS",
            &mut config.circuit_breaker_timeout_seconds,
        );

        override_from(&lookup, "RETRY_MAX_ATTEMPTS", &mut config.retry_max_attempts);
        override_from(&lookup, "RETRY_BASE_DELAY_SECONDS", &mut config.retry_base_delay_seconds);
        override_from(&lookup, "RETRY_MAX_DELAY_SECONDS", &mut config.retry_max_delay_seconds);
        override_from(&lookup, "RETRY_EXPONENTIAL_BASE", &mut config.retry_exponential_base);

        override_from(&lookup, "RATE_LIMIT_MAX_CALLS", &mut config.rate_limit_max_calls);
        override_from(&lookup, "RATE_LIMIT_WINDOW_SECONDS", &mut config.rate_limit_window_seconds);

        override_from(&lookup, "NEWS_CACHE_MAX_SIZE", &mut config.news_cache_max_size);
        override_from(&lookup, "NEWS_CACHE_TTL_SECONDS", &mut config.news_cache_ttl_seconds);
        override_from(
            &lookup,
            "NEWS_CACHE_WRITE_TTL_SECONDS",
            &mut config.news_cache_write_ttl_seconds,
        );
        override_from(&lookup, "MODEL_CACHE_MAX_SIZE", &mut config.model_cache_max_size);
        override_from(&lookup, "MODEL_CACHE_TTL_SECONDS", &mut config.model_cache_ttl_seconds);
        override_from(
            &lookup,
            "MODEL_CHECK_TIMEOUT_SECONDS",
            &mut config.model_check_timeout_seconds,
        );

        override_from(
            &lookup,
            "CACHE_SWEEP_INTERVAL_SECONDS",
            &mut config.cache_sweep_interval_seconds,
        );
        override_from(
            &lookup,
            "HEALTH_CHECK_INTERVAL_SECONDS",
            &mut config.health_check_interval_seconds,
        );

        if let Some(log_filter) = lookup("LOG_FILTER") {
            config.log_filter = log_filter;
        }
        override_from(&lookup, "LOG_FORMAT", &mut config.log_format);
        if let Some(environment) = lookup("ENVIRONMENT") {
            config.environment = environment;
        }

        config.validate()?;

        info!("Configuration loaded for environment {}", config.environment);
        Ok(config)
    }

    /// Reject values the components cannot work with
    pub fn validate(&self) -> ServerResult<()> {
        let positive = [
            ("RETRY_MAX_ATTEMPTS", self.retry_max_attempts as u64),
            ("RATE_LIMIT_MAX_CALLS", self.rate_limit_max_calls as u64),
            ("RATE_LIMIT_WINDOW_SECONDS", self.rate_limit_window_seconds),
            ("CIRCUIT_BREAKER_THRESHOLD", self.circuit_breaker_threshold as u64),
            ("NEWS_CACHE_MAX_SIZE", self.news_cache_max_size as u64),
            ("MODEL_CACHE_MAX_SIZE", self.model_cache_max_size as u64),
            ("CACHE_SWEEP_INTERVAL_SECONDS", self.cache_sweep_interval_seconds),
            ("HEALTH_CHECK_INTERVAL_SECONDS", self.health_check_interval_seconds),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ServerError::ConfigError(format!("{} must be greater than 0", name)));
        }

        let delays = [
            ("RETRY_BASE_DELAY_SECONDS", self.retry_base_delay_seconds),
            ("RETRY_MAX_DELAY_SECONDS", self.retry_max_delay_seconds),
        ];
        if let Some((name, _)) = delays.iter().find(|(_, value)| !value.is_finite() || *value < 0.0) {
            return Err(ServerError::ConfigError(format!("{} must be a non-negative number", name)));
        }

        if !self.retry_exponential_base.is_finite() || self.retry_exponential_base < 1.0 {
            return Err(ServerError::ConfigError(
                "RETRY_EXPONENTIAL_BASE must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// News API breaker settings
    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker_threshold,
            recovery_timeout_ms: self.circuit_breaker_timeout_seconds * 1000,
        }
    }

    /// News API retry settings
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry_max_attempts,
            base_delay_ms: (self.retry_base_delay_seconds * 1000.0) as u64,
            max_delay_ms: (self.retry_max_delay_seconds * 1000.0) as u64,
            exponential_base: self.retry_exponential_base,
        }
    }

    /// News API rate limit settings
    pub fn rate_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            max_calls: self.rate_limit_max_calls,
            window_ms: self.rate_limit_window_seconds * 1000,
        }
    }

    /// Cache coordinator settings
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            news: CacheConfig {
                max_size: self.news_cache_max_size,
                default_ttl_ms: self.news_cache_ttl_seconds * 1000,
            },
            news_write_ttl_ms: self.news_cache_write_ttl_seconds * 1000,
            model: CacheConfig {
                max_size: self.model_cache_max_size,
                default_ttl_ms: self.model_cache_ttl_seconds * 1000,
            },
            sweep_interval_ms: self.cache_sweep_interval_seconds * 1000,
        }
    }

    /// Health monitor settings
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            check_interval_ms: self.health_check_interval_seconds * 1000,
        }
    }

    /// News API checker settings
    pub fn news_api_config(&self) -> NewsApiConfig {
        NewsApiConfig {
            api_key: self.newsapi_key.clone().unwrap_or_default(),
            base_url: self.newsapi_base_url.clone(),
            timeout_seconds: self.newsapi_timeout_seconds,
        }
    }

    /// Model checker timeout
    pub fn model_check_timeout(&self) -> Duration {
        Duration::from_secs(self.model_check_timeout_seconds)
    }

    /// Logging settings
    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            service_name: "tw3".to_string(),
            log_filter: self.log_filter.clone(),
            format: self.log_format,
            environment: self.environment.clone(),
        }
    }
}
