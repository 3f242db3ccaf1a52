//! Health monitoring for TW3
//!
//! Service checkers for the news API and the inference pipeline, host
//! metrics sampling, the [`HealthMonitor`] aggregator and logging setup.

pub mod checkers;
pub mod error;
pub mod health;
pub mod logging;
pub mod monitor;
pub mod system;

pub use checkers::{ModelChecker, ModelProbe, NewsApiChecker, NewsApiConfig};
pub use error::{MonitoringError, MonitoringResult};
pub use health::{Checker, HealthStatus, ServiceHealth};
pub use logging::{init_logging, init_test_tracing, LogFormat, LoggingConfig};
pub use monitor::{determine_overall_status, HealthMonitor, HealthReport, MonitorConfig};
pub use system::{CpuMetrics, DiskMetrics, MemoryMetrics, ProcSystemMetrics, SystemMetrics, SystemSnapshot};
