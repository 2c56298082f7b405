//! Farm host-health watchdog library
//!
//! This crate provides the core functionality for:
//! - Host metrics sampling on a jittered schedule
//! - Pushing sample history to the collector
//! - Hysteresis alarms over cpu, memory, heartbeat, data store and sampler liveness
//! - Asynchronous alarm notification
//! - Live configuration reload, probes and service control
//! - Health checks and observability

pub mod aggregator;
pub mod alarm;
pub mod buffer;
pub mod config;
pub mod control;
pub mod health;
pub mod logs;
pub mod models;
pub mod notifier;
pub mod observability;
pub mod probes;
pub mod sampler;
pub mod transport;

pub use aggregator::{Aggregator, ReceiveError};
pub use alarm::{AlarmRegistry, AlarmState, ThresholdDescriptor, Transition};
pub use config::{ConfigError, ConfigWatcher, WatchdogConfig};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{StructuredLogger, WatchdogMetrics};
