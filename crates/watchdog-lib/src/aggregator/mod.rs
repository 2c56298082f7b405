//! Collector-side state
//!
//! The [`Aggregator`] owns everything the collector remembers between
//! requests: the last pushed batch, the heartbeat history, the alarm
//! registry and the live configuration. Callers serialize access to it
//! (the HTTP layer keeps it behind a `tokio::sync::Mutex`) and run slow
//! probes before taking the lock, handing only their results in.


use std::time::Instant;

use thiserror::Error;
use tracing::debug;

use crate::alarm::{quantities, AlarmRegistry, Transition};
use crate::buffer::{RingBuffer, DEFAULT_HISTORY_CAPACITY};
use crate::config::{ConfigWatcher, WatchdogConfig};
use crate::health::{components, HealthRegistry};
use crate::models::{iso_now, CheckUp, HeartbeatRecord, PushBatch, Snapshot};
use crate::notifier::Notification;
use crate::observability::{StructuredLogger, WatchdogMetrics};
use crate::probes::{PortReport, ProcessStatus};

/// A sampler counts as running if it pushed within this many seconds
pub const RUNNING_WINDOW_SECS: f64 = 10.0;

/// Rejections of an inbound batch; no state is touched when one is raised
#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error("malformed batch: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("batch contains no samples")]
    Empty,
}

/// Result of applying a port scan
#[derive(Debug, Default)]
pub struct PortScanOutcome {
    pub notifications: Vec<Notification>,
    /// The primary service just went down and `auto_start` is set
    pub start_data_store: bool,
}

pub struct Aggregator {
    watcher: Option<ConfigWatcher>,
    config: WatchdogConfig,
    registry: AlarmRegistry,
    last_receipt: Option<Instant>,
    intervals: RingBuffer<HeartbeatRecord>,
    snapshot: Snapshot,
    lifeline: u8,
    health: Option<HealthRegistry>,
    metrics: WatchdogMetrics,
    logger: StructuredLogger,
}

impl Aggregator {
    pub fn new(config: WatchdogConfig) -> Self {
        Self {
            watcher: None,
            registry: AlarmRegistry::new(config.thresholds.clone()),
            config,
            last_receipt: None,
            intervals: RingBuffer::new(DEFAULT_HISTORY_CAPACITY),
            snapshot: Snapshot::default(),
            lifeline: 0,
            health: None,
            metrics: WatchdogMetrics::new(),
            logger: StructuredLogger::new("collector"),
        }
    }

    /// Re-read the configuration whenever this watcher sees a change
    pub fn with_watcher(mut self, watcher: ConfigWatcher) -> Self {
        self.watcher = Some(watcher);
        self
    }

    /// Report reload failures on the `config` health component
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Parse a raw request body and accept it
    pub async fn receive(&mut self, body: &[u8]) -> Result<Vec<Notification>, ReceiveError> {
        let batch: PushBatch = serde_json::from_slice(body)?;
        self.receive_at(batch, Instant::now()).await
    }

    /// Accept a batch as if it arrived at `now`
    pub async fn receive_at(
        &mut self,
        batch: PushBatch,
        now: Instant,
    ) -> Result<Vec<Notification>, ReceiveError> {
        if batch.pc_data.is_empty() {
            return Err(ReceiveError::Empty);
        }

        self.reload_if_changed().await;

        let elapsed = self
            .last_receipt
            .map(|previous| now.saturating_duration_since(previous).as_secs_f64());
        self.last_receipt = Some(now);

        if let Some(interval) = elapsed {
            self.intervals.push_front(HeartbeatRecord {
                interval,
                timestamp: iso_now(),
            });
            self.metrics.observe_heartbeat(interval);
        }
        self.metrics.inc_pushes_received();

        self.snapshot = Snapshot {
            pc_data: batch.pc_data,
            time_intervals: Vec::new(),
            running: elapsed.is_some_and(|e| e < RUNNING_WINDOW_SECS),
            check_up: None,
        };

        let mut transitions = Vec::new();
        if let Some(latest) = self.snapshot.pc_data.first() {
            let (cpu, memory) = (latest.cpu, latest.memory);
            transitions.extend(self.registry.evaluate(quantities::CPU, cpu));
            transitions.extend(self.registry.evaluate(quantities::MEMORY, memory));
        }
        if let Some(interval) = elapsed {
            transitions.extend(self.registry.evaluate(quantities::ELAPSE, round2(interval)));
        }

        debug!(
            samples = self.snapshot.pc_data.len(),
            elapsed = ?elapsed,
            transitions = transitions.len(),
            "Batch accepted"
        );
        Ok(self.notifications_for(transitions))
    }

    /// Current snapshot with the heartbeat history and a toggled lifeline
    pub fn get_data(&mut self) -> Snapshot {
        self.lifeline = (self.lifeline + 1) % 2;
        Snapshot {
            time_intervals: self.intervals.snapshot(),
            check_up: Some(CheckUp {
                ligne_de_vie: self.lifeline,
            }),
            ..self.snapshot.clone()
        }
    }

    /// First value in the stored batch that differs from the sample
    /// before it, walking newest to oldest
    pub fn first_change(&self, quantity: &str) -> Option<f64> {
        let values: Vec<f64> = self
            .snapshot
            .pc_data
            .iter()
            .filter_map(|sample| match quantity {
                quantities::CPU => Some(sample.cpu),
                quantities::MEMORY => Some(sample.memory),
                _ => None,
            })
            .collect();

        values
            .windows(2)
            .find(|pair| pair[0] != pair[1])
            .map(|pair| pair[1])
    }

    /// Most recent heartbeat record
    pub fn latest_interval(&self) -> Option<&HeartbeatRecord> {
        self.intervals.front()
    }

    /// Drive the data-store alarm from a port scan
    pub async fn apply_port_scan(
        &mut self,
        report: &PortReport,
        primary_reachable: bool,
    ) -> PortScanOutcome {
        self.reload_if_changed().await;

        let transition = self.registry.observe(quantities::MYSQL, primary_reachable);
        let start_data_store = matches!(&transition, Some(t) if t.is_trip()) && self.config.auto_start;

        debug!(services = report.len(), primary_reachable = primary_reachable, "Port scan applied");
        PortScanOutcome {
            notifications: self.notifications_for(transition),
            start_data_store,
        }
    }

    /// Drive the companion-process alarm from a process scan
    pub fn apply_demon_status(&mut self, status: &ProcessStatus) -> Vec<Notification> {
        let transition = self.registry.observe(quantities::DEMON, status.running);
        self.notifications_for(transition)
    }

    /// Poll the configuration watcher and apply a changed file
    pub async fn reload_if_changed(&mut self) {
        let Some(watcher) = self.watcher.as_mut() else {
            return;
        };

        let result = watcher.poll().await;
        let path = watcher.path().to_path_buf();
        match result {
            Ok(Some(config)) => {
                self.apply_config(config);
                self.metrics.inc_config_reloads(true);
                self.logger.log_config_reload(&path, None);
                if let Some(health) = &self.health {
                    health.set_healthy(components::CONFIG).await;
                }
            }
            Ok(None) => {}
            Err(e) => {
                let reason = e.to_string();
                self.metrics.inc_config_reloads(false);
                self.logger.log_config_reload(&path, Some(&reason));
                if let Some(health) = &self.health {
                    health.set_degraded(components::CONFIG, reason).await;
                }
            }
        }
    }

    /// Swap in a new configuration, keeping live alarm state
    pub fn apply_config(&mut self, config: WatchdogConfig) {
        self.registry.reseed(config.thresholds.clone());
        self.config = config;
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    pub fn registry(&self) -> &AlarmRegistry {
        &self.registry
    }

    pub fn mail_enabled(&self) -> bool {
        self.config.mail_enabled
    }

    fn notifications_for(
        &self,
        transitions: impl IntoIterator<Item = Transition>,
    ) -> Vec<Notification> {
        transitions
            .into_iter()
            .map(|transition| {
                self.metrics.record_transition(&transition);
                self.logger.log_alarm_transition(&transition);
                Notification::for_transition(&transition, self.config.mail_enabled)
            })
            .collect()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
