//! Error types for the TW3 server
//!
//! This module contains the error types used throughout the server.

use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Background tasks did not stop in time
    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let config = ServerError::ConfigError("rate_limit_max_calls must be positive".to_string());
        assert_eq!(
            config.to_string(),
            "Configuration error: rate_limit_max_calls must be positive"
        );

        let shutdown = ServerError::ShutdownError("background tasks still running".to_string());
        assert_eq!(shutdown.to_string(), "Shutdown error: background tasks still running");
    }
}
