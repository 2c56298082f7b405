//! Live watchdog configuration
//!
//! The configuration resource is a YAML file shared by the sampler and
//! the collector. It is re-read only when its modification time changes;
//! a file that fails to parse or validate is rejected as a whole and the
//! caller keeps whatever configuration it already had.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::alarm::{default_descriptors, ThresholdDescriptor};

/// Errors raised while loading the configuration resource
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Contents of the configuration resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Deliver notifications through the mail transport; otherwise only log them
    #[serde(rename = "WITH_MAIL", default)]
    pub mail_enabled: bool,

    /// Threshold descriptors keyed by quantity
    #[serde(rename = "seuils", default)]
    pub thresholds: BTreeMap<String, ThresholdDescriptor>,

    /// Upper bound of the sampler's jittered delay, in seconds
    #[serde(default = "default_randomization_factor")]
    pub randomization_factor: f64,

    /// Multiplier applied to measured CPU utilization
    #[serde(default = "default_cpu_factor")]
    pub cpu_factor: f64,

    /// Start the data store automatically when it becomes unreachable
    #[serde(default)]
    pub auto_start: bool,

    /// Allow the collector to start the data store container
    #[serde(default)]
    pub mysql_control: bool,

    /// Container running the data store
    #[serde(rename = "container_name_or_id", default)]
    pub container_id: String,
}

/// Largest accepted `randomization_factor`, in seconds
pub const MAX_RANDOMIZATION_FACTOR: f64 = 3600.0;

fn default_randomization_factor() -> f64 {
    5.0
}

fn default_cpu_factor() -> f64 {
    1.0
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            mail_enabled: false,
            thresholds: default_descriptors(),
            randomization_factor: default_randomization_factor(),
            cpu_factor: default_cpu_factor(),
            auto_start: false,
            mysql_control: false,
            container_id: String::new(),
        }
    }
}

impl WatchdogConfig {
    /// Parse and validate YAML text. Quantities missing from `seuils`
    /// fall back to the built-in descriptors.
    pub fn from_yaml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let mut config: WatchdogConfig =
            serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
                path: origin.to_path_buf(),
                source,
            })?;

        for (quantity, descriptor) in default_descriptors() {
            config.thresholds.entry(quantity).or_insert(descriptor);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the alarm logic cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (quantity, descriptor) in &self.thresholds {
            descriptor
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("seuils.{}: {}", quantity, e)))?;
        }

        if !(0.0..=MAX_RANDOMIZATION_FACTOR).contains(&self.randomization_factor) {
            return Err(ConfigError::Invalid(format!(
                "randomization_factor must be within [0, {}], got {}",
                MAX_RANDOMIZATION_FACTOR, self.randomization_factor
            )));
        }

        if !self.cpu_factor.is_finite() || self.cpu_factor <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "cpu_factor must be > 0, got {}",
                self.cpu_factor
            )));
        }

        Ok(())
    }
}

/// Modification-time watcher over the configuration file
#[derive(Debug)]
pub struct ConfigWatcher {
    path: PathBuf,
    last_modified: Option<SystemTime>,
    /// Kind of the last failed stat, while the file stays unreadable
    stat_failure: Option<std::io::ErrorKind>,
}

impl ConfigWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_modified: None,
            stat_failure: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file unconditionally and remember its modification time
    pub async fn load(&mut self) -> Result<WatchdogConfig, ConfigError> {
        let modified = self.stat().await?;
        self.last_modified = Some(modified);
        self.read().await
    }

    /// Reload if the modification time moved since the last look.
    ///
    /// Returns `Ok(None)` when unchanged. A changed-but-invalid file is
    /// reported once; its modification time is recorded so the same bad
    /// revision is not re-parsed on every poll. A file that cannot be
    /// stat'ed is reported once per failure kind; later polls that fail the
    /// same way return `Ok(None)` until the file is readable again.
    pub async fn poll(&mut self) -> Result<Option<WatchdogConfig>, ConfigError> {
        let previous_failure = self.stat_failure;
        let modified = match self.stat().await {
            Ok(modified) => modified,
            Err(ConfigError::Io { source, .. }) if previous_failure == Some(source.kind()) => {
                debug!(
                    path = %self.path.display(),
                    error = %source,
                    "Configuration still unreadable"
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if self.last_modified == Some(modified) {
            return Ok(None);
        }

        debug!(path = %self.path.display(), "Configuration modification detected");
        self.last_modified = Some(modified);
        let config = self.read().await?;
        info!(path = %self.path.display(), "Configuration reloaded");
        Ok(Some(config))
    }

    async fn stat(&mut self) -> Result<SystemTime, ConfigError> {
        match self.modified().await {
            Ok(modified) => {
                self.stat_failure = None;
                Ok(modified)
            }
            Err(e) => {
                if let ConfigError::Io { source, .. } = &e {
                    self.stat_failure = Some(source.kind());
                }
                Err(e)
            }
        }
    }

    async fn modified(&self) -> Result<SystemTime, ConfigError> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|source| self.io_error(source))?;
        metadata.modified().map_err(|source| self.io_error(source))
    }

    async fn read(&self) -> Result<WatchdogConfig, ConfigError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| self.io_error(source))?;
        WatchdogConfig::from_yaml_str(&text, &self.path)
    }

    fn io_error(&self, source: std::io::Error) -> ConfigError {
        ConfigError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::time::{Duration, SystemTime};

    /// Write `contents` and force the modification time forward so that
    /// back-to-back writes are always seen as a change.
    pub fn write_config(path: &Path, contents: &str, bump_secs: u64) {
        std::fs::write(path, contents).unwrap();
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(bump_secs))
            .unwrap();
    }

    pub const SAMPLE_CONFIG: &str = r#"
WITH_MAIL: false
seuils:
  cpu: {seuil1: 90, seuil2: 30, state: 0, timestamp: null}
  memory: {seuil1: 90, seuil2: 45, state: 0, timestamp: null}
  elapse: {seuil1: 9, seuil2: 3, state: 0, timestamp: null}
  mysql: {state: 0, timestamp: null}
  demon: {state: 0, timestamp: null}
randomization_factor: 5
cpu_factor: 1
auto_start: false
mysql_control: true
container_name_or_id: farm-mysql
"#;
}
