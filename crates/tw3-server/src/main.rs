use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tw3_cache::{format_bytes, CacheConfig, CoordinatorConfig};
use tw3_monitoring::{init_logging, HealthStatus, ServiceHealth};
use tw3_server::{AppConfig, Services};

/// Time allowed for background tasks to stop on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "tw3", version, about = "TW3 backend resilience and caching core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the cache sweep and health polling until interrupted
    Serve,

    /// Probe external services once
    Health {
        /// Service to check
        #[arg(long, value_enum, default_value_t = ServiceArg::All)]
        service: ServiceArg,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Print the configured cache layout: capacities, TTLs and sweep interval.
    ///
    /// Runtime counters live in the serving process and are reported by its
    /// health report, not by this command.
    CacheStats {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ServiceArg {
    Newsapi,
    Model,
    All,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    let mut config = AppConfig::load().context("Failed to load configuration")?;

    // One-shot commands keep stdout for their own output
    if !matches!(cli.command, Command::Serve) {
        config.log_filter = "warn".to_string();
    }
    init_logging(&config.logging_config()).context("Failed to initialize logging")?;

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Health { service, format } => health(config, service, format).await,
        Command::CacheStats { format } => cache_stats(config, format),
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let services = Services::build(config).context("Failed to build services")?;
    services.start();

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, shutting down gracefully"),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }

    services
        .shutdown(SHUTDOWN_GRACE)
        .await
        .context("Failed to stop background services")?;
    Ok(())
}

async fn health(config: AppConfig, service: ServiceArg, format: OutputFormat) -> anyhow::Result<()> {
    let services = Services::build(config).context("Failed to build services")?;
    let monitor = services.monitor();

    let names: Vec<&str> = match service {
        ServiceArg::Newsapi => vec!["newsapi"],
        ServiceArg::Model => vec!["model"],
        ServiceArg::All => vec!["newsapi", "model"],
    };

    let mut results = Vec::with_capacity(names.len());
    for name in names {
        let health = monitor
            .check_service(name)
            .await
            .unwrap_or_else(|e| ServiceHealth::unhealthy(name, e.to_string()));
        results.push((name, health));
    }

    match format {
        OutputFormat::Json => {
            let map: serde_json::Map<String, serde_json::Value> = results
                .iter()
                .map(|(name, health)| serde_json::to_value(health).map(|v| (name.to_string(), v)))
                .collect::<Result<_, _>>()
                .context("Failed to serialize health results")?;
            println!("{}", serde_json::to_string_pretty(&map)?);
        }
        OutputFormat::Text => {
            for (name, health) in &results {
                let prefix = match health.status {
                    HealthStatus::Healthy => "[OK]",
                    HealthStatus::Degraded => "[WARN]",
                    HealthStatus::Unhealthy => "[ERROR]",
                };
                println!("{} {}: {}", prefix, name.to_uppercase(), health.status);
                if let Some(ms) = health.response_time_ms {
                    println!("   Response time: {:.1}ms", ms);
                }
                if let Some(message) = &health.error_message {
                    println!("   Error: {}", message);
                }
            }
        }
    }

    Ok(())
}

fn cache_stats(config: AppConfig, format: OutputFormat) -> anyhow::Result<()> {
    config.validate().context("Invalid configuration")?;
    let coordinator = config.coordinator_config();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&coordinator)?),
        OutputFormat::Text => print!("{}", render_cache_layout(&coordinator)),
    }
    Ok(())
}

fn render_cache_layout(config: &CoordinatorConfig) -> String {
    let mut out = String::new();
    out.push_str("TW3 Cache Configuration\n");
    out.push_str(&format!("{}\n", "=".repeat(40)));
    out.push_str(&render_cache("news_cache", &config.news));
    out.push_str(&format!("   Write TTL: {}s\n", config.news_write_ttl_ms / 1000));
    out.push_str(&render_cache("model_cache", &config.model));
    out.push_str(&format!("\nSweep interval: {}s\n", config.sweep_interval_ms / 1000));
    out.push_str(&format!(
        "Memory ceiling: {}\n",
        format_bytes(config.max_memory_bytes())
    ));
    out
}

fn render_cache(name: &str, config: &CacheConfig) -> String {
    format!(
        "\n{}\n   Capacity: {} entries\n   Default TTL: {}s\n",
        name.to_uppercase(),
        config.max_size,
        config.default_ttl_ms / 1000
    )
}
