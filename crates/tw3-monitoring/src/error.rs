//! Error types for the monitoring crate

use thiserror::Error;

/// Monitoring error types
#[derive(Error, Debug)]
pub enum MonitoringError {
    /// The global tracing subscriber could not be installed
    #[error("Logging initialization error: {0}")]
    LoggingInit(String),

    /// A system metric could not be read
    #[error("Failed to sample {metric}: {message}")]
    MetricSampling {
        /// Metric being sampled (memory, cpu, disk)
        metric: &'static str,
        /// What went wrong
        message: String,
    },

    /// No checker is registered under the requested name
    #[error("Unknown service: {0}")]
    UnknownService(String),
}

impl MonitoringError {
    pub(crate) fn sampling(metric: &'static str, message: impl ToString) -> Self {
        Self::MetricSampling {
            metric,
            message: message.to_string(),
        }
    }
}

/// Result type for monitoring operations
pub type MonitoringResult<T> = Result<T, MonitoringError>;
