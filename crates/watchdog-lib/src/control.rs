//! Start and stop of the companion sampler, the ingest script and the
//! data-store container

use std::process::Stdio;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::config::WatchdogConfig;
use crate::probes::ProcessTable;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("no command configured for {0}")]
    NoCommand(&'static str),

    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("container_name_or_id is not configured")]
    NoContainer,
}

/// What `/manage` was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    Start,
    Stop,
}

impl ServiceAction {
    /// Accepts `Marche`/`Arret` as sent by the dashboard, or `start`/`stop`
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "Marche" | "start" => Some(ServiceAction::Start),
            "Arret" | "stop" => Some(ServiceAction::Stop),
            _ => None,
        }
    }
}

/// Which services an action applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceTarget {
    /// The companion sampler
    Demon,
    /// The data-store container
    Mysql,
    /// Sampler, ingest script and data store
    All,
}

impl ServiceTarget {
    /// Notification body announcing the action
    pub fn announcement(&self, action: ServiceAction) -> &'static str {
        match (self, action) {
            (ServiceTarget::Demon, ServiceAction::Start) => "Start sampler.",
            (ServiceTarget::Demon, ServiceAction::Stop) => "Stop sampler.",
            (ServiceTarget::Mysql, ServiceAction::Start) => "Start data store.",
            (ServiceTarget::Mysql, ServiceAction::Stop) => "Stop data store.",
            (ServiceTarget::All, ServiceAction::Start) => "Start data store & sampler.",
            (ServiceTarget::All, ServiceAction::Stop) => "Stop data store, ingest & sampler.",
        }
    }
}

/// Commands and process signatures the controller works with
#[derive(Debug, Clone)]
pub struct ControlSettings {
    pub companion_command: Vec<String>,
    pub companion_signature: String,
    pub ingest_command: Vec<String>,
    pub ingest_signature: String,
    pub docker_binary: String,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            companion_command: vec!["farmwatch-sampler".to_string()],
            companion_signature: "farmwatch-sampler".to_string(),
            ingest_command: Vec::new(),
            ingest_signature: "ingest".to_string(),
            docker_binary: "docker".to_string(),
        }
    }
}

/// Split a whitespace-separated command line
pub fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

/// Outcome of one `/manage` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlReport {
    pub target: ServiceTarget,
    pub action: ServiceAction,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

pub struct ServiceController {
    settings: ControlSettings,
    processes: Arc<dyn ProcessTable>,
}

impl ServiceController {
    pub fn new(settings: ControlSettings, processes: Arc<dyn ProcessTable>) -> Self {
        Self {
            settings,
            processes,
        }
    }

    pub fn settings(&self) -> &ControlSettings {
        &self.settings
    }

    /// Run an action. Individual failures are logged and collected in
    /// the report; the remaining steps still run.
    pub async fn execute(
        &self,
        target: ServiceTarget,
        action: ServiceAction,
        config: &WatchdogConfig,
    ) -> ControlReport {
        let mut errors = Vec::new();
        let mut record = |result: Result<(), ControlError>| {
            if let Err(e) = result {
                error!(service = ?target, action = ?action, error = %e, "Service control step failed");
                errors.push(e.to_string());
            }
        };

        match (target, action) {
            (ServiceTarget::Demon, ServiceAction::Start) => record(self.start_companion().await),
            (ServiceTarget::Demon, ServiceAction::Stop) => {
                self.stop_companion();
            }
            (ServiceTarget::Mysql, ServiceAction::Start) => {
                record(self.start_data_store(config).await.map(|_| ()))
            }
            (ServiceTarget::Mysql, ServiceAction::Stop) => {
                record(self.stop_data_store(config).await)
            }
            (ServiceTarget::All, ServiceAction::Start) => {
                record(self.start_companion().await);
                record(self.start_ingest().await);
                record(self.start_data_store(config).await.map(|_| ()));
            }
            (ServiceTarget::All, ServiceAction::Stop) => {
                self.stop_companion();
                self.stop_ingest();
                record(self.stop_data_store(config).await);
            }
        }

        ControlReport {
            target,
            action,
            message: target.announcement(action).to_string(),
            errors,
        }
    }

    pub async fn start_companion(&self) -> Result<(), ControlError> {
        spawn_detached("companion", &self.settings.companion_command)?;
        info!("Start sampler.");
        Ok(())
    }

    /// Kill every process carrying the companion signature
    pub fn stop_companion(&self) -> usize {
        let killed = self.kill_matching(&self.settings.companion_signature);
        info!(killed = killed, "Stop sampler.");
        killed
    }

    pub async fn start_ingest(&self) -> Result<(), ControlError> {
        spawn_detached("ingest", &self.settings.ingest_command)?;
        info!("Start ingest.");
        Ok(())
    }

    pub fn stop_ingest(&self) -> usize {
        let killed = self.kill_matching(&self.settings.ingest_signature);
        info!(killed = killed, "Stop ingest.");
        killed
    }

    /// `docker start` the data store when `mysql_control` allows it.
    /// Returns false if the start was skipped.
    pub async fn start_data_store(&self, config: &WatchdogConfig) -> Result<bool, ControlError> {
        if !config.mysql_control {
            info!("Data store start skipped, mysql_control is off");
            return Ok(false);
        }
        self.docker("start", config).await?;
        info!(container = %config.container_id, "Data store started");
        Ok(true)
    }

    pub async fn stop_data_store(&self, config: &WatchdogConfig) -> Result<(), ControlError> {
        self.docker("stop", config).await?;
        info!(container = %config.container_id, "Data store stopped");
        Ok(())
    }

    async fn docker(&self, verb: &str, config: &WatchdogConfig) -> Result<(), ControlError> {
        if config.container_id.is_empty() {
            return Err(ControlError::NoContainer);
        }

        let command = format!("{} {} {}", self.settings.docker_binary, verb, config.container_id);
        let output = Command::new(&self.settings.docker_binary)
            .arg(verb)
            .arg(&config.container_id)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ControlError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ControlError::Failed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn kill_matching(&self, signature: &str) -> usize {
        self.processes
            .find(signature)
            .into_iter()
            .filter(|&pid| {
                let killed = self.processes.kill(pid);
                if !killed {
                    warn!(pid = pid, signature = %signature, "Could not kill process");
                }
                killed
            })
            .count()
    }
}

fn spawn_detached(what: &'static str, command: &[String]) -> Result<(), ControlError> {
    let (program, args) = command.split_first().ok_or(ControlError::NoCommand(what))?;
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| ControlError::Spawn {
            command: command.join(" "),
            source,
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeTable {
        procs: Vec<(u32, &'static str)>,
        killed: Mutex<Vec<u32>>,
    }

    impl ProcessTable for FakeTable {
        fn find(&self, signature: &str) -> Vec<u32> {
            self.procs
                .iter()
                .filter(|(_, cmd)| cmd.contains(signature))
                .map(|(pid, _)| *pid)
                .collect()
        }

        fn kill(&self, pid: u32) -> bool {
            self.killed.lock().unwrap().push(pid);
            true
        }
    }

    fn controller(table: Arc<FakeTable>, docker: &str) -> ServiceController {
        ServiceController::new(
            ControlSettings {
                companion_command: vec!["true".to_string()],
                companion_signature: "farmwatch-sampler".to_string(),
                ingest_command: vec!["true".to_string()],
                ingest_signature: "ingest.py".to_string(),
                docker_binary: docker.to_string(),
            },
            table,
        )
    }

    fn config(mysql_control: bool) -> WatchdogConfig {
        WatchdogConfig {
            mysql_control,
            container_id: "farm-mysql".to_string(),
            ..WatchdogConfig::default()
        }
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!(ServiceAction::parse("Marche"), Some(ServiceAction::Start));
        assert_eq!(ServiceAction::parse("stop"), Some(ServiceAction::Stop));
        assert_eq!(ServiceAction::parse("maybe"), None);
    }

    #[test]
    fn test_split_command() {
        assert_eq!(
            split_command("  farmwatch-sampler --config config.yaml "),
            vec!["farmwatch-sampler", "--config", "config.yaml"]
        );
    }

    #[tokio::test]
    async fn test_stop_all_kills_companion_and_ingest() {
        let table = Arc::new(FakeTable {
            procs: vec![
                (10, "/usr/bin/farmwatch-sampler"),
                (11, "python3 ingest.py"),
                (12, "/usr/sbin/sshd"),
            ],
            ..Default::default()
        });
        let ctl = controller(table.clone(), "true");

        let report = ctl
            .execute(ServiceTarget::All, ServiceAction::Stop, &config(true))
            .await;

        assert_eq!(report.message, "Stop data store, ingest & sampler.");
        assert!(report.errors.is_empty());
        assert_eq!(*table.killed.lock().unwrap(), vec![10, 11]);
    }

    #[tokio::test]
    async fn test_data_store_start_gated_by_mysql_control() {
        let ctl = controller(Arc::new(FakeTable::default()), "true");

        assert!(!ctl.start_data_store(&config(false)).await.unwrap());
        assert!(ctl.start_data_store(&config(true)).await.unwrap());
    }

    #[tokio::test]
    async fn test_docker_failure_reported_not_raised() {
        let ctl = controller(Arc::new(FakeTable::default()), "false");

        let report = ctl
            .execute(ServiceTarget::Mysql, ServiceAction::Stop, &config(true))
            .await;

        assert_eq!(report.message, "Stop data store.");
        assert_eq!(report.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_container() {
        let ctl = controller(Arc::new(FakeTable::default()), "true");
        let err = ctl
            .stop_data_store(&WatchdogConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::NoContainer));
    }

    #[tokio::test]
    async fn test_empty_companion_command() {
        let mut settings = ControlSettings::default();
        settings.companion_command.clear();
        let ctl = ServiceController::new(settings, Arc::new(FakeTable::default()));

        let report = ctl
            .execute(ServiceTarget::Demon, ServiceAction::Start, &config(false))
            .await;
        assert_eq!(report.message, "Start sampler.");
        assert!(report.errors[0].contains("companion"));
    }
}
