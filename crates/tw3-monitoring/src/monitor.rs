//! Health aggregation and background polling
//!
//! [`HealthMonitor::full_report`] always probes every checker. The background
//! poll only refreshes the per-service cache read by
//! [`HealthMonitor::cached_health`], which may therefore lag behind.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tw3_cache::{CacheCoordinator, GlobalCacheStats};

use crate::error::{MonitoringError, MonitoringResult};
use crate::health::{Checker, HealthStatus, ServiceHealth};
use crate::system::{SystemMetrics, SystemSnapshot};

/// Memory or CPU usage above this percentage makes the system unhealthy
const UNHEALTHY_USAGE_PERCENT: f64 = 95.0;

/// Memory or CPU usage above this percentage makes the system degraded
const DEGRADED_USAGE_PERCENT: f64 = 85.0;

/// Monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval between background polls, in milliseconds
    pub check_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 60_000,
        }
    }
}

/// Complete health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall status
    pub status: HealthStatus,
    /// When the report was produced
    pub timestamp: DateTime<Utc>,
    /// Version of the running service
    pub version: String,
    /// Fresh result of every checker, by service key
    pub services: BTreeMap<String, ServiceHealth>,
    /// Host resource usage
    pub system: SystemSnapshot,
    /// Cache statistics, when a coordinator is attached
    pub cache_stats: Option<GlobalCacheStats>,
}

/// Overall status from service results and host usage
pub fn determine_overall_status<'a>(
    services: impl IntoIterator<Item = &'a ServiceHealth>,
    system: &SystemSnapshot,
) -> HealthStatus {
    let mut degraded = false;
    for health in services {
        match health.status {
            HealthStatus::Unhealthy => return HealthStatus::Unhealthy,
            HealthStatus::Degraded => degraded = true,
            HealthStatus::Healthy => {}
        }
    }

    let memory = system.memory.percentage;
    let cpu = system.cpu.percentage;

    if memory > UNHEALTHY_USAGE_PERCENT || cpu > UNHEALTHY_USAGE_PERCENT {
        HealthStatus::Unhealthy
    } else if memory > DEGRADED_USAGE_PERCENT || cpu > DEGRADED_USAGE_PERCENT || degraded {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

type HealthCache = Arc<RwLock<HashMap<String, ServiceHealth>>>;

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Runs the registered checkers and aggregates their results
pub struct HealthMonitor {
    config: MonitorConfig,
    checkers: Vec<Arc<dyn Checker>>,
    system: Arc<dyn SystemMetrics>,
    cache: Option<Arc<CacheCoordinator>>,
    last_checks: HealthCache,
    poller: Mutex<Option<PollTask>>,
}

impl HealthMonitor {
    /// Create a monitor with no checkers
    pub fn new(config: MonitorConfig, system: Arc<dyn SystemMetrics>) -> Self {
        Self {
            config,
            checkers: Vec::new(),
            system,
            cache: None,
            last_checks: Arc::new(RwLock::new(HashMap::new())),
            poller: Mutex::new(None),
        }
    }

    /// Register a checker
    pub fn with_checker(mut self, checker: Arc<dyn Checker>) -> Self {
        self.checkers.push(checker);
        self
    }

    /// Include the coordinator's statistics in reports
    pub fn with_cache(mut self, cache: Arc<CacheCoordinator>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Names of the registered services
    pub fn service_names(&self) -> Vec<&str> {
        self.checkers.iter().map(|c| c.name()).collect()
    }

    /// Probe every service and sample the host
    pub async fn full_report(&self) -> HealthReport {
        let (results, system) = tokio::join!(run_checks(&self.checkers), self.system.snapshot());
        let status = determine_overall_status(&results, &system);

        if status != HealthStatus::Healthy {
            warn!("Overall health is {}", status);
        }

        HealthReport {
            status,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            services: self
                .checkers
                .iter()
                .map(|c| c.name().to_string())
                .zip(results)
                .collect(),
            system,
            cache_stats: self.cache.as_ref().map(|cache| cache.global_stats()),
        }
    }

    /// Probe a single service
    pub async fn check_service(&self, name: &str) -> MonitoringResult<ServiceHealth> {
        let checker = self
            .checkers
            .iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| MonitoringError::UnknownService(name.to_string()))?;
        Ok(run_check(checker.clone()).await)
    }

    /// Last result recorded by the background poll
    pub fn cached_health(&self, name: &str) -> Option<ServiceHealth> {
        self.last_checks.read().get(name).cloned()
    }

    /// Probe every service once and refresh the cached results
    pub async fn poll_once(&self) {
        poll(&self.checkers, &self.last_checks).await;
    }

    /// Whether the background poll is running
    pub fn is_polling(&self) -> bool {
        self.poller.lock().is_some()
    }

    /// Start polling in the background. Returns false if already running.
    ///
    /// The first poll happens one interval after the start.
    pub fn start_background(&self) -> bool {
        let mut poller = self.poller.lock();
        if poller.is_some() {
            debug!("Background health checks already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let interval = Duration::from_millis(self.config.check_interval_ms);
        let handle = tokio::spawn(run_poll(
            self.checkers.clone(),
            self.last_checks.clone(),
            interval,
            cancel.clone(),
        ));
        *poller = Some(PollTask { cancel, handle });
        info!("Background health checks started, interval {:?}", interval);
        true
    }

    /// Stop polling and wait for the task to finish
    pub async fn stop_background(&self) {
        let task = self.poller.lock().take();
        if let Some(PollTask { cancel, handle }) = task {
            cancel.cancel();
            if let Err(e) = handle.await {
                error!("Background health task ended abnormally: {}", e);
            }
            info!("Background health checks stopped");
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.poller.get_mut().take() {
            task.cancel.cancel();
        }
    }
}

/// Run one checker on its own task so a panic becomes an unhealthy result
async fn run_check(checker: Arc<dyn Checker>) -> ServiceHealth {
    let name = checker.name().to_string();
    match tokio::spawn(async move { checker.check().await }).await {
        Ok(health) => health,
        Err(e) => {
            error!("Health check for {} failed: {}", name, e);
            ServiceHealth::unhealthy(name, format!("Health check failed: {}", e))
        }
    }
}

async fn run_checks(checkers: &[Arc<dyn Checker>]) -> Vec<ServiceHealth> {
    join_all(checkers.iter().cloned().map(run_check)).await
}

async fn poll(checkers: &[Arc<dyn Checker>], last_checks: &HealthCache) {
    let results = run_checks(checkers).await;

    let mut cache = last_checks.write();
    for (checker, health) in checkers.iter().zip(results) {
        if health.status != HealthStatus::Healthy {
            warn!(
                "{} health issue: {}",
                checker.name(),
                health.error_message.as_deref().unwrap_or("no details")
            );
        }
        cache.insert(checker.name().to_string(), health);
    }
}

async fn run_poll(
    checkers: Vec<Arc<dyn Checker>>,
    last_checks: HealthCache,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("Background health checks cancelled");
                break;
            }

            () = tokio::time::sleep(interval) => {
                poll(&checkers, &last_checks).await;
            }
        }
    }
}
