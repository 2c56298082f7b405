//! Farmwatch sampler
//!
//! Daemon that samples host CPU, memory and disk utilization on a
//! jittered schedule and pushes its recent history to the collector.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use farmwatch_lib::{
    config::ConfigWatcher,
    observability::StructuredLogger,
    sampler::{HostSampler, SamplerFactors, SamplerLoopBuilder},
    transport::{HttpPushClient, DEFAULT_PUSH_TIMEOUT},
};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SAMPLER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Farmwatch host sampler
#[derive(Parser)]
#[command(name = "farmwatch-sampler")]
#[command(author, version, about = "Host metrics sampler for the farmwatch collector", long_about = None)]
pub struct Cli {
    /// Collector base URL (can also be set via FARMWATCH_COLLECTOR_URL env var)
    #[arg(long, env = "FARMWATCH_COLLECTOR_URL", default_value = "http://localhost:5002")]
    pub collector_url: String,

    /// Live configuration file shared with the collector
    #[arg(long, env = "FARMWATCH_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Dashboard URL pinged once at startup
    #[arg(long, env = "FARMWATCH_DASHBOARD_URL")]
    pub dashboard_url: Option<String>,

    /// Push timeout in seconds
    #[arg(long, default_value_t = DEFAULT_PUSH_TIMEOUT.as_secs())]
    pub push_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let logger = StructuredLogger::new("sampler");
    logger.log_startup(SAMPLER_VERSION);

    let mut watcher = ConfigWatcher::new(&cli.config);
    let factors = match watcher.load().await {
        Ok(config) => SamplerFactors {
            cpu_factor: config.cpu_factor,
            randomization_factor: config.randomization_factor,
        },
        Err(e) => {
            warn!(error = %e, "Live configuration unavailable, using default factors");
            SamplerFactors::default()
        }
    };
    info!(
        collector = %cli.collector_url,
        cpu_factor = factors.cpu_factor,
        randomization_factor = factors.randomization_factor,
        "Sampler configured"
    );

    let client = HttpPushClient::new(
        &cli.collector_url,
        std::time::Duration::from_secs(cli.push_timeout),
    )
    .context("invalid collector URL")?;

    if let Some(dashboard_url) = &cli.dashboard_url {
        client.warm_up(dashboard_url).await;
    }

    let sampler_loop = SamplerLoopBuilder::new()
        .sampler(Box::new(HostSampler::new()))
        .transport(Arc::new(client))
        .config_watcher(watcher)
        .factors(factors)
        .build()?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(sampler_loop.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());
    handle.await.context("sampler loop task failed")?;

    Ok(())
}
