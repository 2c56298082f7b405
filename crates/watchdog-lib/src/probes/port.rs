//! TCP reachability of the farm's dependent services

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::debug;

/// Connect timeout per service
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Reachability per service name
pub type PortReport = BTreeMap<String, bool>;

/// Parse a `Name=port,Name=port` list
pub fn parse_services(list: &str) -> Result<BTreeMap<String, u16>, String> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, port) = entry
                .split_once('=')
                .ok_or_else(|| format!("expected Name=port, got '{}'", entry))?;
            let port = port
                .trim()
                .parse::<u16>()
                .map_err(|e| format!("bad port for {}: {}", name.trim(), e))?;
            Ok((name.trim().to_string(), port))
        })
        .collect()
}

/// Scans a fixed set of named services on one host
#[derive(Debug, Clone)]
pub struct PortScanner {
    host: String,
    services: BTreeMap<String, u16>,
    primary: String,
    timeout: Duration,
}

impl PortScanner {
    pub fn new(
        host: impl Into<String>,
        services: BTreeMap<String, u16>,
        primary: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            services,
            primary: primary.into(),
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Name of the service that drives the data-store alarm
    pub fn primary(&self) -> &str {
        &self.primary
    }

    /// Try every service concurrently; connection errors count as unreachable
    pub async fn scan(&self) -> PortReport {
        let mut probes = JoinSet::new();
        for (name, port) in &self.services {
            let name = name.clone();
            let host = self.host.clone();
            let port = *port;
            let timeout = self.timeout;
            probes.spawn(async move {
                let reachable = matches!(
                    tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), port))).await,
                    Ok(Ok(_))
                );
                debug!(service = %name, port = port, reachable = reachable, "Port probe");
                (name, reachable)
            });
        }

        let mut report: PortReport = self.services.keys().map(|n| (n.clone(), false)).collect();
        while let Some(joined) = probes.join_next().await {
            if let Ok((name, reachable)) = joined {
                report.insert(name, reachable);
            }
        }
        report
    }

    /// Whether the primary service is reachable in `report`
    pub fn primary_reachable(&self, report: &PortReport) -> bool {
        report.get(&self.primary).copied().unwrap_or(false)
    }
}
