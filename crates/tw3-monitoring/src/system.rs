//! Host resource sampling (memory, CPU, disk)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::error::{MonitoringError, MonitoringResult};

const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Memory usage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    pub total_gb: f64,
    pub available_gb: f64,
    pub used_gb: f64,
    pub percentage: f64,
}

/// CPU usage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuMetrics {
    pub percentage: f64,
    pub count: usize,
    /// 1, 5 and 15 minute load averages
    pub load_avg: [f64; 3],
}

/// Usage of the root filesystem
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskMetrics {
    pub total_gb: f64,
    pub used_gb: f64,
    pub free_gb: f64,
    pub percentage: f64,
}

/// One sample of every host metric
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub memory: MemoryMetrics,
    pub cpu: CpuMetrics,
    pub disk: DiskMetrics,
}

/// Source of host metrics
#[async_trait]
pub trait SystemMetrics: Send + Sync {
    async fn memory(&self) -> MonitoringResult<MemoryMetrics>;

    async fn cpu(&self) -> MonitoringResult<CpuMetrics>;

    async fn disk(&self) -> MonitoringResult<DiskMetrics>;

    /// Sample everything; a metric that cannot be read is logged and reported as zeros
    async fn snapshot(&self) -> SystemSnapshot {
        let (memory, cpu, disk) = tokio::join!(self.memory(), self.cpu(), self.disk());
        SystemSnapshot {
            memory: memory.unwrap_or_else(|e| {
                warn!("{}", e);
                MemoryMetrics::default()
            }),
            cpu: cpu.unwrap_or_else(|e| {
                warn!("{}", e);
                CpuMetrics::default()
            }),
            disk: disk.unwrap_or_else(|e| {
                warn!("{}", e);
                DiskMetrics::default()
            }),
        }
    }
}

/// Linux sampler reading `/proc` and `df`
#[derive(Debug, Clone)]
pub struct ProcSystemMetrics {
    cpu_sample_interval: Duration,
}

impl Default for ProcSystemMetrics {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl ProcSystemMetrics {
    /// CPU usage is measured over `cpu_sample_interval`
    pub fn new(cpu_sample_interval: Duration) -> Self {
        Self {
            cpu_sample_interval,
        }
    }
}

#[async_trait]
impl SystemMetrics for ProcSystemMetrics {
    async fn memory(&self) -> MonitoringResult<MemoryMetrics> {
        let contents = tokio::fs::read_to_string("/proc/meminfo")
            .await
            .map_err(|e| MonitoringError::sampling("memory", e))?;
        parse_meminfo(&contents)
    }

    async fn cpu(&self) -> MonitoringResult<CpuMetrics> {
        let first = read_cpu_times().await?;
        tokio::time::sleep(self.cpu_sample_interval).await;
        let second = read_cpu_times().await?;

        let load_avg = match tokio::fs::read_to_string("/proc/loadavg").await {
            Ok(contents) => parse_loadavg(&contents),
            Err(e) => {
                warn!("Failed to read /proc/loadavg: {}", e);
                [0.0; 3]
            }
        };

        Ok(CpuMetrics {
            percentage: cpu_percentage(first, second),
            count: std::thread::available_parallelism().map_or(1, |n| n.get()),
            load_avg,
        })
    }

    async fn disk(&self) -> MonitoringResult<DiskMetrics> {
        let output = tokio::process::Command::new("df")
            .args(["-Pk", "/"])
            .output()
            .await
            .map_err(|e| MonitoringError::sampling("disk", e))?;
        if !output.status.success() {
            return Err(MonitoringError::sampling(
                "disk",
                format!("df exited with {}", output.status),
            ));
        }
        parse_df(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Cumulative (busy, total) jiffies
type CpuTimes = (u64, u64);

async fn read_cpu_times() -> MonitoringResult<CpuTimes> {
    let contents = tokio::fs::read_to_string("/proc/stat")
        .await
        .map_err(|e| MonitoringError::sampling("cpu", e))?;
    parse_cpu_times(&contents)
}

fn parse_meminfo(contents: &str) -> MonitoringResult<MemoryMetrics> {
    let field = |name: &str| {
        contents
            .lines()
            .find(|line| line.starts_with(name))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|kb| kb.parse::<u64>().ok())
            .map(|kb| kb * 1024)
    };

    let total = field("MemTotal:")
        .ok_or_else(|| MonitoringError::sampling("memory", "MemTotal missing from /proc/meminfo"))?;
    let available = field("MemAvailable:")
        .or_else(|| field("MemFree:"))
        .ok_or_else(|| MonitoringError::sampling("memory", "MemAvailable missing from /proc/meminfo"))?;
    let used = total.saturating_sub(available);

    Ok(MemoryMetrics {
        total_gb: total as f64 / GB,
        available_gb: available as f64 / GB,
        used_gb: used as f64 / GB,
        percentage: percent(used, total),
    })
}

fn parse_cpu_times(contents: &str) -> MonitoringResult<CpuTimes> {
    let line = contents
        .lines()
        .find(|line| line.starts_with("cpu "))
        .ok_or_else(|| MonitoringError::sampling("cpu", "aggregate line missing from /proc/stat"))?;

    let values: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|v| v.parse().ok())
        .collect();
    if values.len() < 4 {
        return Err(MonitoringError::sampling("cpu", "truncated /proc/stat line"));
    }

    // idle + iowait
    let idle = values[3] + values.get(4).copied().unwrap_or(0);
    let total: u64 = values.iter().sum();
    Ok((total - idle, total))
}

fn cpu_percentage(first: CpuTimes, second: CpuTimes) -> f64 {
    percent(
        second.0.saturating_sub(first.0),
        second.1.saturating_sub(first.1),
    )
}

fn parse_loadavg(contents: &str) -> [f64; 3] {
    let mut load = [0.0; 3];
    for (slot, value) in load.iter_mut().zip(contents.split_whitespace()) {
        *slot = value.parse().unwrap_or(0.0);
    }
    load
}

fn parse_df(output: &str) -> MonitoringResult<DiskMetrics> {
    let fields: Vec<u64> = output
        .lines()
        .nth(1)
        .ok_or_else(|| MonitoringError::sampling("disk", "df printed no filesystem line"))?
        .split_whitespace()
        .skip(1)
        .take(3)
        .filter_map(|v| v.parse().ok())
        .collect();

    match fields[..] {
        [total_kb, used_kb, free_kb] => Ok(DiskMetrics {
            total_gb: (total_kb * 1024) as f64 / GB,
            used_gb: (used_kb * 1024) as f64 / GB,
            free_gb: (free_kb * 1024) as f64 / GB,
            percentage: percent(used_kb, total_kb),
        }),
        _ => Err(MonitoringError::sampling("disk", "unexpected df output")),
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
