//! Process-table liveness by command-line signature

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::{debug, warn};

/// Whether a process matching a signature is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub running: bool,
    pub pid: Option<u32>,
}

impl ProcessStatus {
    pub fn absent() -> Self {
        Self {
            running: false,
            pid: None,
        }
    }
}

/// Read and signal access to the host process table
pub trait ProcessTable: Send + Sync {
    /// Pids whose command line contains `signature`, lowest first
    fn find(&self, signature: &str) -> Vec<u32>;

    /// Send a kill signal; false if the process is gone or refused
    fn kill(&self, pid: u32) -> bool;

    /// Liveness of the first process matching `signature`
    fn status(&self, signature: &str) -> ProcessStatus {
        match self.find(signature).first() {
            Some(&pid) => ProcessStatus {
                running: true,
                pid: Some(pid),
            },
            None => ProcessStatus::absent(),
        }
    }
}

/// [`ProcessTable`] over the local host via sysinfo
pub struct SystemProcessTable {
    system: Mutex<System>,
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProcessTable {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl ProcessTable for SystemProcessTable {
    fn find(&self, signature: &str) -> Vec<u32> {
        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Process table lock poisoned, recovering");
                poisoned.into_inner()
            }
        };
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
        );

        let own_pid = sysinfo::get_current_pid().ok();
        let mut pids: Vec<u32> = system
            .processes()
            .iter()
            .filter(|(pid, _)| Some(**pid) != own_pid)
            .filter(|(_, process)| {
                process
                    .cmd()
                    .iter()
                    .any(|arg| arg.to_string_lossy().contains(signature))
            })
            .map(|(pid, _)| pid.as_u32())
            .collect();
        pids.sort_unstable();

        debug!(signature = %signature, matches = pids.len(), "Process table scan");
        pids
    }

    fn kill(&self, pid: u32) -> bool {
        let system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match system.process(Pid::from_u32(pid)) {
            Some(process) => process.kill(),
            None => false,
        }
    }
}
