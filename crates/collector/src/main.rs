//! Farmwatch collector
//!
//! Receives host samples from the sampler daemon, keeps the alarm state
//! and serves the dashboard, probe and control endpoints.

use std::sync::Arc;

use anyhow::{Context, Result};
use farmwatch_collector::{api, config::CollectorSettings};
use farmwatch_lib::{
    aggregator::Aggregator,
    config::{ConfigWatcher, WatchdogConfig},
    control::ServiceController,
    health::{components, HealthRegistry},
    logs::AlertLogFormat,
    notifier::{HttpMailRelay, NotificationQueue, NotificationWorker},
    observability::StructuredLogger,
    probes::{ProcessTable, SystemProcessTable},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const COLLECTOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let settings = CollectorSettings::load()?;

    std::fs::create_dir_all(&settings.log_dir)
        .with_context(|| format!("failed to create {}", settings.log_dir.display()))?;
    let file_appender = tracing_appender::rolling::never(&settings.log_dir, &settings.log_file);
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);

    // JSON on stdout, plain alert lines in the log file read by /get_logs
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .with(
            fmt::layer()
                .with_ansi(false)
                .event_format(AlertLogFormat)
                .with_writer(file_writer),
        )
        .init();

    let logger = StructuredLogger::new("collector");
    logger.log_startup(COLLECTOR_VERSION);

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let mut watcher = ConfigWatcher::new(&settings.config_path);
    let config = match watcher.load().await {
        Ok(config) => {
            info!(path = %settings.config_path.display(), "Live configuration loaded");
            config
        }
        Err(e) => {
            warn!(error = %e, "Live configuration unavailable, starting with defaults");
            health_registry
                .set_degraded(components::CONFIG, e.to_string())
                .await;
            WatchdogConfig::default()
        }
    };

    let aggregator = Aggregator::new(config)
        .with_watcher(watcher)
        .with_health(health_registry.clone());

    let notifier_config = settings.notifier_config();
    let (notifications, receiver) = NotificationQueue::new(&notifier_config);
    let relay = HttpMailRelay::new(
        &settings.mail_relay_url,
        settings.mail_from.clone(),
        settings.mail_to.clone(),
        settings.mail_timeout(),
    )
    .context("invalid mail relay settings")?;
    let worker = NotificationWorker::new(notifier_config, receiver, Arc::new(relay))
        .with_health(health_registry.clone());

    let processes: Arc<dyn ProcessTable> = Arc::new(SystemProcessTable::new());
    let controller = ServiceController::new(settings.control_settings(), processes.clone());

    let app_state = Arc::new(api::AppState {
        aggregator: Arc::new(Mutex::new(aggregator)),
        notifications,
        scanner: Arc::new(settings.port_scanner()?),
        processes,
        controller: Arc::new(controller),
        health_registry: health_registry.clone(),
        log_path: settings.log_path(),
    });

    let (shutdown_tx, _) = broadcast::channel(1);
    let worker_handle = worker.spawn(shutdown_tx.subscribe());

    health_registry.set_ready(true).await;

    let addr = format!("{}:{}", settings.bind_address, settings.port);
    let api_handle = tokio::spawn(api::serve(addr, app_state, shutdown_tx.subscribe()));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());

    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task panicked"),
        Ok(Ok(())) => {}
    }
    let _ = worker_handle.await;

    info!("Shutdown complete");
    Ok(())
}
