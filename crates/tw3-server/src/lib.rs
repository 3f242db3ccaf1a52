//! TW3 server core
//!
//! Configuration loading and the [`Services`] container wiring the cache
//! coordinator, the health monitor and the news API resilience wrappers.

pub mod config;
pub mod error;
pub mod services;

pub use config::AppConfig;
pub use error::{ServerError, ServerResult};
pub use services::Services;
