//! Keyed set of alarms, one per monitored quantity

use std::collections::BTreeMap;

use super::state::{AlarmState, ThresholdDescriptor, Transition};
use crate::models::iso_now;

/// Monitored quantity names
pub mod quantities {
    pub const CPU: &str = "cpu";
    pub const MEMORY: &str = "memory";
    pub const ELAPSE: &str = "elapse";
    pub const MYSQL: &str = "mysql";
    pub const DEMON: &str = "demon";
}

/// Threshold descriptors used when the configuration omits a quantity
pub fn default_descriptors() -> BTreeMap<String, ThresholdDescriptor> {
    BTreeMap::from([
        (
            quantities::CPU.to_string(),
            ThresholdDescriptor::threshold(90.0, 30.0),
        ),
        (
            quantities::MEMORY.to_string(),
            ThresholdDescriptor::threshold(90.0, 45.0),
        ),
        (
            quantities::ELAPSE.to_string(),
            ThresholdDescriptor::threshold(9.0, 3.0),
        ),
        (quantities::MYSQL.to_string(), ThresholdDescriptor::liveness()),
        (quantities::DEMON.to_string(), ThresholdDescriptor::liveness()),
    ])
}

/// Process-wide alarm table
///
/// Iteration is alphabetical by quantity name so log ordering is stable.
#[derive(Debug, Clone)]
pub struct AlarmRegistry {
    alarms: BTreeMap<String, ThresholdDescriptor>,
}

impl Default for AlarmRegistry {
    fn default() -> Self {
        Self::new(default_descriptors())
    }
}

impl AlarmRegistry {
    pub fn new(seeds: BTreeMap<String, ThresholdDescriptor>) -> Self {
        Self { alarms: seeds }
    }

    /// Feed a numeric reading for `quantity`
    pub fn evaluate(&mut self, quantity: &str, value: f64) -> Option<Transition> {
        let alarm = match self.alarms.get_mut(quantity) {
            Some(alarm) => alarm,
            None => {
                tracing::debug!(quantity = %quantity, "No alarm configured for quantity");
                return None;
            }
        };

        alarm.evaluate(value).map(|direction| Transition {
            quantity: quantity.to_string(),
            direction,
            value: Some(value),
            at: alarm.last_transition.clone().unwrap_or_else(iso_now),
        })
    }

    /// Feed a liveness probe result for `quantity`
    pub fn observe(&mut self, quantity: &str, healthy: bool) -> Option<Transition> {
        let alarm = match self.alarms.get_mut(quantity) {
            Some(alarm) => alarm,
            None => {
                tracing::debug!(quantity = %quantity, "No alarm configured for quantity");
                return None;
            }
        };

        alarm.observe(healthy).map(|direction| Transition {
            quantity: quantity.to_string(),
            direction,
            value: None,
            at: alarm.last_transition.clone().unwrap_or_else(iso_now),
        })
    }

    /// Replace the descriptor set, keeping the live state of quantities
    /// that survive the reload.
    pub fn reseed(&mut self, seeds: BTreeMap<String, ThresholdDescriptor>) {
        let mut next = seeds;
        for (quantity, descriptor) in next.iter_mut() {
            if let Some(current) = self.alarms.get(quantity) {
                descriptor.state = current.state;
                descriptor.last_transition = current.last_transition.clone();
            }
        }
        self.alarms = next;
    }

    pub fn get(&self, quantity: &str) -> Option<&ThresholdDescriptor> {
        self.alarms.get(quantity)
    }

    pub fn state(&self, quantity: &str) -> Option<AlarmState> {
        self.alarms.get(quantity).map(|a| a.state)
    }

    /// Quantities currently alarmed, in name order
    pub fn alarmed(&self) -> Vec<&str> {
        self.alarms
            .iter()
            .filter(|(_, a)| a.is_alarmed())
            .map(|(q, _)| q.as_str())
            .collect()
    }

    pub fn descriptors(&self) -> &BTreeMap<String, ThresholdDescriptor> {
        &self.alarms
    }

    pub fn len(&self) -> usize {
        self.alarms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }
}
