//! Collector service settings

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use farmwatch_lib::control::{split_command, ControlSettings};
use farmwatch_lib::notifier::NotifierConfig;
use farmwatch_lib::probes::{parse_services, PortScanner};
use serde::Deserialize;

/// Static settings read once at startup from `FARMWATCH_*` variables.
///
/// Thresholds and flags that may change at runtime live in the
/// configuration file at `config_path` instead.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Live configuration file, reloaded on modification
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default = "default_log_file")]
    pub log_file: String,

    /// HTTP endpoint of the mail relay
    #[serde(default = "default_mail_relay_url")]
    pub mail_relay_url: String,

    #[serde(default = "default_mail_from")]
    pub mail_from: String,

    #[serde(default = "default_mail_to")]
    pub mail_to: String,

    #[serde(default = "default_mail_timeout_secs")]
    pub mail_timeout_secs: u64,

    #[serde(default = "default_notify_queue_size")]
    pub notify_queue_size: usize,

    #[serde(default = "default_notify_max_attempts")]
    pub notify_max_attempts: u32,

    #[serde(default = "default_notify_retry_secs")]
    pub notify_retry_secs: u64,

    /// Host the port probe connects to
    #[serde(default = "default_probe_host")]
    pub probe_host: String,

    /// Monitored services as `Name=port,Name=port`
    #[serde(default = "default_services")]
    pub services: String,

    /// Service whose reachability drives the data-store alarm
    #[serde(default = "default_primary_service")]
    pub primary_service: String,

    #[serde(default = "default_companion_command")]
    pub companion_command: String,

    /// Command-line fragment identifying the companion sampler process
    #[serde(default = "default_companion_signature")]
    pub companion_signature: String,

    #[serde(default)]
    pub ingest_command: String,

    #[serde(default = "default_ingest_signature")]
    pub ingest_signature: String,

    #[serde(default = "default_docker_binary")]
    pub docker_binary: String,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5002
}

fn default_config_path() -> PathBuf {
    PathBuf::from("config.yaml")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_file() -> String {
    "collector.log".to_string()
}

fn default_mail_relay_url() -> String {
    "http://localhost:8025/send".to_string()
}

fn default_mail_from() -> String {
    "farmwatch@localhost".to_string()
}

fn default_mail_to() -> String {
    "ops@localhost".to_string()
}

fn default_mail_timeout_secs() -> u64 {
    10
}

fn default_notify_queue_size() -> usize {
    NotifierConfig::default().queue_size
}

fn default_notify_max_attempts() -> u32 {
    NotifierConfig::default().max_attempts
}

fn default_notify_retry_secs() -> u64 {
    NotifierConfig::default().retry_delay.as_secs()
}

fn default_probe_host() -> String {
    "127.0.0.1".to_string()
}

fn default_services() -> String {
    "Flask=5100,Mysql=3306,Mysql2=3303".to_string()
}

fn default_primary_service() -> String {
    "Mysql".to_string()
}

fn default_companion_command() -> String {
    "farmwatch-sampler".to_string()
}

fn default_companion_signature() -> String {
    "farmwatch-sampler".to_string()
}

fn default_ingest_signature() -> String {
    "ingest".to_string()
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

impl CollectorSettings {
    /// Load settings from the environment
    pub fn load() -> Result<Self> {
        Self::from_builder(
            config::Config::builder().add_source(config::Environment::with_prefix("FARMWATCH")),
        )
    }

    pub fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        builder
            .build()
            .context("failed to read collector settings")?
            .try_deserialize()
            .context("invalid collector settings")
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(&self.log_file)
    }

    pub fn control_settings(&self) -> ControlSettings {
        ControlSettings {
            companion_command: split_command(&self.companion_command),
            companion_signature: self.companion_signature.clone(),
            ingest_command: split_command(&self.ingest_command),
            ingest_signature: self.ingest_signature.clone(),
            docker_binary: self.docker_binary.clone(),
        }
    }

    pub fn notifier_config(&self) -> NotifierConfig {
        NotifierConfig {
            queue_size: self.notify_queue_size.max(1),
            max_attempts: self.notify_max_attempts.max(1),
            retry_delay: Duration::from_secs(self.notify_retry_secs),
        }
    }

    pub fn mail_timeout(&self) -> Duration {
        Duration::from_secs(self.mail_timeout_secs)
    }

    pub fn port_scanner(&self) -> Result<PortScanner> {
        let services = parse_services(&self.services)
            .map_err(|e| anyhow::anyhow!(e))
            .context("invalid FARMWATCH_SERVICES")?;
        Ok(PortScanner::new(
            self.probe_host.clone(),
            services,
            self.primary_service.clone(),
        ))
    }
}
