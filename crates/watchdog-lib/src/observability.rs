//! Observability infrastructure for the watchdog
//!
//! Provides:
//! - Prometheus metrics (pushes, heartbeat intervals, alarm states, notifications, reloads)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{error, info, warn};

use crate::alarm::{Direction, Transition};

/// Histogram buckets for heartbeat intervals (in seconds)
const INTERVAL_BUCKETS: &[f64] = &[0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 7.5, 10.0, 15.0, 30.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<WatchdogMetricsInner> = OnceLock::new();

struct WatchdogMetricsInner {
    pushes_received: IntCounter,
    heartbeat_interval_seconds: Histogram,
    alarm_state: IntGaugeVec,
    alarm_transitions: IntCounterVec,
    notifications: IntCounterVec,
    config_reloads: IntCounterVec,
    sampler_push_failures: IntCounter,
    ring_buffer_items: IntGauge,
}

impl WatchdogMetricsInner {
    fn new() -> Self {
        Self {
            pushes_received: register_int_counter!(
                "farmwatch_pushes_received_total",
                "Sample batches accepted by the collector"
            )
            .expect("Failed to register pushes_received"),

            heartbeat_interval_seconds: register_histogram!(
                "farmwatch_heartbeat_interval_seconds",
                "Wall-clock delay between consecutive accepted pushes",
                INTERVAL_BUCKETS.to_vec()
            )
            .expect("Failed to register heartbeat_interval_seconds"),

            alarm_state: register_int_gauge_vec!(
                "farmwatch_alarm_state",
                "Current alarm state per quantity (0 nominal, 1 alarmed)",
                &["quantity"]
            )
            .expect("Failed to register alarm_state"),

            alarm_transitions: register_int_counter_vec!(
                "farmwatch_alarm_transitions_total",
                "Alarm state changes",
                &["quantity", "direction"]
            )
            .expect("Failed to register alarm_transitions"),

            notifications: register_int_counter_vec!(
                "farmwatch_notifications_total",
                "Notifications handled by outcome",
                &["outcome"]
            )
            .expect("Failed to register notifications"),

            config_reloads: register_int_counter_vec!(
                "farmwatch_config_reloads_total",
                "Live configuration reloads by outcome",
                &["outcome"]
            )
            .expect("Failed to register config_reloads"),

            sampler_push_failures: register_int_counter!(
                "farmwatch_sampler_push_failures_total",
                "Sample pushes that did not reach the collector"
            )
            .expect("Failed to register sampler_push_failures"),

            ring_buffer_items: register_int_gauge!(
                "farmwatch_ring_buffer_items",
                "Number of samples held in the sampler history"
            )
            .expect("Failed to register ring_buffer_items"),
        }
    }
}

/// Outcome label for handled notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    Delivered,
    Simulated,
    Failed,
    Dropped,
}

impl NotificationOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            NotificationOutcome::Delivered => "delivered",
            NotificationOutcome::Simulated => "simulated",
            NotificationOutcome::Failed => "failed",
            NotificationOutcome::Dropped => "dropped",
        }
    }
}

/// Watchdog metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct WatchdogMetrics {
    _private: (),
}

impl Default for WatchdogMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchdogMetrics {
    /// Create a handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(WatchdogMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &WatchdogMetricsInner {
        GLOBAL_METRICS.get_or_init(WatchdogMetricsInner::new)
    }

    pub fn inc_pushes_received(&self) {
        self.inner().pushes_received.inc();
    }

    pub fn observe_heartbeat(&self, interval_secs: f64) {
        self.inner().heartbeat_interval_seconds.observe(interval_secs);
    }

    /// Record a transition and move the per-quantity state gauge
    pub fn record_transition(&self, transition: &Transition) {
        let direction = match transition.direction {
            Direction::Tripped => "tripped",
            Direction::Cleared => "cleared",
        };
        self.inner()
            .alarm_transitions
            .with_label_values(&[transition.quantity.as_str(), direction])
            .inc();
        self.inner()
            .alarm_state
            .with_label_values(&[transition.quantity.as_str()])
            .set(i64::from(transition.is_trip()));
    }

    pub fn inc_notifications(&self, outcome: NotificationOutcome) {
        self.inner()
            .notifications
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    pub fn inc_config_reloads(&self, success: bool) {
        let outcome = if success { "applied" } else { "rejected" };
        self.inner()
            .config_reloads
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn inc_sampler_push_failures(&self) {
        self.inner().sampler_push_failures.inc();
    }

    pub fn set_ring_buffer_items(&self, items: usize) {
        self.inner().ring_buffer_items.set(items as i64);
    }
}

/// Structured logger for watchdog events
#[derive(Clone)]
pub struct StructuredLogger {
    component: String,
}

impl StructuredLogger {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            event = "watchdog_started",
            component = %self.component,
            version = %version,
            "Watchdog component started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "watchdog_shutdown",
            component = %self.component,
            reason = %reason,
            "Watchdog component shutting down"
        );
    }

    /// Log an alarm state change; trips are warnings, clears are info
    pub fn log_alarm_transition(&self, transition: &Transition) {
        if transition.is_trip() {
            warn!(
                event = "alarm_tripped",
                component = %self.component,
                quantity = %transition.quantity,
                value = ?transition.value,
                at = %transition.at,
                "Alarm raised"
            );
        } else {
            info!(
                event = "alarm_cleared",
                component = %self.component,
                quantity = %transition.quantity,
                value = ?transition.value,
                at = %transition.at,
                "Alarm cleared"
            );
        }
    }

    /// Log the outcome of a live configuration reload
    pub fn log_config_reload(&self, path: &Path, failure: Option<&str>) {
        match failure {
            None => info!(
                event = "config_reloaded",
                component = %self.component,
                path = %path.display(),
                "Live configuration applied"
            ),
            Some(reason) => error!(
                event = "config_reload_failed",
                component = %self.component,
                path = %path.display(),
                error = %reason,
                "Live configuration rejected, keeping previous"
            ),
        }
    }

    pub fn log_push_failure(&self, error: &str, failures_total: u64, buffered: usize) {
        warn!(
            event = "push_failed",
            component = %self.component,
            error = %error,
            failures_total = failures_total,
            buffered_samples = buffered,
            "Failed to push samples to collector, keeping history"
        );
    }
}
