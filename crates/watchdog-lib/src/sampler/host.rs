//! Host utilization sampling through sysinfo

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, RefreshKind, System};

use super::MetricsSampler;
use crate::models::Sample;

/// Window over which CPU utilization is measured
pub const CPU_MEASUREMENT_WINDOW: Duration = Duration::from_secs(1);

/// Reads CPU, memory and root filesystem utilization of the local host
pub struct HostSampler {
    system: System,
    cpu_window: Duration,
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSampler {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
                .with_memory(MemoryRefreshKind::nothing().with_ram()),
        );
        Self {
            system,
            cpu_window: CPU_MEASUREMENT_WINDOW,
        }
    }

    /// Override the CPU measurement window
    pub fn with_cpu_window(mut self, window: Duration) -> Self {
        self.cpu_window = window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        self
    }

    fn memory_percent(&mut self) -> f64 {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return 0.0;
        }
        let used = total.saturating_sub(self.system.available_memory());
        used as f64 / total as f64 * 100.0
    }
}

#[async_trait]
impl MetricsSampler for HostSampler {
    async fn sample(&mut self, cpu_factor: f64) -> Result<Sample> {
        self.system.refresh_cpu_usage();
        tokio::time::sleep(self.cpu_window).await;
        self.system.refresh_cpu_usage();
        let cpu = self.system.global_cpu_usage() as f64 * cpu_factor;

        let memory = self.memory_percent();
        let disk = root_disk_percent();

        Ok(Sample::now(cpu, memory, disk))
    }
}

/// Used percentage of the filesystem mounted at `/`, or of the largest
/// disk when no root mount is listed.
fn root_disk_percent() -> f64 {
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .iter()
        .find(|d| d.mount_point() == Path::new("/"))
        .or_else(|| disks.iter().max_by_key(|d| d.total_space()));

    match disk {
        Some(disk) if disk.total_space() > 0 => {
            let used = disk.total_space().saturating_sub(disk.available_space());
            used as f64 / disk.total_space() as f64 * 100.0
        }
        _ => 0.0,
    }
}
