//! Health status model and the checker capability

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Health classification of a service or of the system overall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Working normally
    Healthy,
    /// Working, with problems
    Degraded,
    /// Not working
    Unhealthy,
}

impl HealthStatus {
    /// Lower-case label, as serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one health check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    /// Service display name
    pub name: String,
    /// Observed status
    pub status: HealthStatus,
    /// Time the probe took, in milliseconds
    pub response_time_ms: Option<f64>,
    /// Why the service is not healthy
    pub error_message: Option<String>,
    /// When the check completed
    pub last_check: DateTime<Utc>,
    /// Checker specific details
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ServiceHealth {
    /// A healthy result stamped now
    pub fn healthy(name: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Healthy, None)
    }

    /// A degraded result stamped now
    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Degraded, Some(message.into()))
    }

    /// An unhealthy result stamped now
    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Unhealthy, Some(message.into()))
    }

    fn new(name: impl Into<String>, status: HealthStatus, error_message: Option<String>) -> Self {
        Self {
            name: name.into(),
            status,
            response_time_ms: None,
            error_message,
            last_check: Utc::now(),
            metadata: Map::new(),
        }
    }

    /// Attach the probe duration
    pub fn with_response_time(mut self, elapsed: Duration) -> Self {
        self.response_time_ms = Some(elapsed.as_secs_f64() * 1000.0);
        self
    }

    /// Attach one metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// One monitored external service.
///
/// `check` never fails: problems are reported through the returned status.
/// Implementations bound their own probe with a timeout.
#[async_trait]
pub trait Checker: Send + Sync {
    /// Key under which results are reported and cached
    fn name(&self) -> &str;

    /// Probe the service
    async fn check(&self) -> ServiceHealth;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_service_health_serialization() {
        let health = ServiceHealth::degraded("NewsAPI", "rate limited")
            .with_response_time(Duration::from_millis(120))
            .with_metadata("articles_available", 0);

        let value = serde_json::to_value(&health).unwrap();
        assert_eq!(value["status"], "degraded");
        assert_eq!(value["error_message"], "rate limited");
        assert_eq!(value["response_time_ms"], json!(120.0));
        assert_eq!(value["metadata"]["articles_available"], 0);
        assert!(value["last_check"].is_string());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(HealthStatus::Unhealthy.to_string(), "unhealthy");
    }
}
