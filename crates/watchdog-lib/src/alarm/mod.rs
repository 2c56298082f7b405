//! Threshold-crossing alarms
//!
//! This module provides:
//! - A two-state hysteresis alarm per monitored quantity
//! - Liveness alarms driven by boolean probes
//! - A keyed registry that survives configuration reloads

mod registry;
mod state;

pub use registry::{default_descriptors, quantities, AlarmRegistry};
pub use state::{AlarmState, Direction, ThresholdDescriptor, Transition};
