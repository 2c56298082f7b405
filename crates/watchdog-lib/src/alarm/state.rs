//! Per-quantity hysteresis alarm
//!
//! A descriptor either carries a trip/reset pair (numeric quantities) or
//! none (liveness quantities driven by a boolean probe). The alarm only
//! moves Nominal -> Alarmed when the value is strictly above the trip
//! threshold and Alarmed -> Nominal when it is strictly below the reset
//! threshold; anything in between is a no-op.

use serde::{Deserialize, Serialize};

use crate::models::iso_now;

/// Binary alarm state, serialized as `0` / `1`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum AlarmState {
    #[default]
    Nominal,
    Alarmed,
}

impl From<AlarmState> for u8 {
    fn from(state: AlarmState) -> Self {
        match state {
            AlarmState::Nominal => 0,
            AlarmState::Alarmed => 1,
        }
    }
}

impl TryFrom<u8> for AlarmState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AlarmState::Nominal),
            1 => Ok(AlarmState::Alarmed),
            other => Err(format!("invalid alarm state {}, expected 0 or 1", other)),
        }
    }
}

impl std::fmt::Display for AlarmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlarmState::Nominal => write!(f, "nominal"),
            AlarmState::Alarmed => write!(f, "alarmed"),
        }
    }
}

/// Direction of a state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Nominal -> Alarmed
    Tripped,
    /// Alarmed -> Nominal
    Cleared,
}

/// A state change produced by one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub quantity: String,
    pub direction: Direction,
    /// Value that caused the change; `None` for liveness quantities
    pub value: Option<f64>,
    pub at: String,
}

impl Transition {
    pub fn is_trip(&self) -> bool {
        self.direction == Direction::Tripped
    }
}

/// Thresholds and current state of one monitored quantity
///
/// Field names on the wire follow the configuration file
/// (`seuil1` = trip, `seuil2` = reset).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdDescriptor {
    #[serde(rename = "seuil1", default, skip_serializing_if = "Option::is_none")]
    pub trip_threshold: Option<f64>,
    #[serde(rename = "seuil2", default, skip_serializing_if = "Option::is_none")]
    pub reset_threshold: Option<f64>,
    #[serde(default)]
    pub state: AlarmState,
    #[serde(rename = "timestamp", default)]
    pub last_transition: Option<String>,
}

impl ThresholdDescriptor {
    /// Numeric alarm with a hysteresis band
    pub fn threshold(trip: f64, reset: f64) -> Self {
        Self {
            trip_threshold: Some(trip),
            reset_threshold: Some(reset),
            ..Default::default()
        }
    }

    /// Liveness alarm driven by a boolean probe
    pub fn liveness() -> Self {
        Self::default()
    }

    /// True when the descriptor has no thresholds
    pub fn is_liveness(&self) -> bool {
        self.trip_threshold.is_none() && self.reset_threshold.is_none()
    }

    pub fn is_alarmed(&self) -> bool {
        self.state == AlarmState::Alarmed
    }

    /// Check the trip/reset pair is complete and ordered
    pub fn validate(&self) -> Result<(), String> {
        match (self.trip_threshold, self.reset_threshold) {
            (None, None) => Ok(()),
            (Some(trip), Some(reset)) if !trip.is_finite() || !reset.is_finite() => {
                Err(format!("thresholds must be finite (seuil1={}, seuil2={})", trip, reset))
            }
            (Some(trip), Some(reset)) if trip > reset => Ok(()),
            (Some(trip), Some(reset)) => Err(format!(
                "seuil1 ({}) must be strictly greater than seuil2 ({})",
                trip, reset
            )),
            _ => Err("seuil1 and seuil2 must be given together".to_string()),
        }
    }

    /// Feed a numeric reading. Liveness descriptors ignore it.
    pub fn evaluate(&mut self, value: f64) -> Option<Direction> {
        let (trip, reset) = match (self.trip_threshold, self.reset_threshold) {
            (Some(trip), Some(reset)) => (trip, reset),
            _ => return None,
        };

        if value > trip && self.state == AlarmState::Nominal {
            self.enter(AlarmState::Alarmed);
            Some(Direction::Tripped)
        } else if value < reset && self.state == AlarmState::Alarmed {
            self.enter(AlarmState::Nominal);
            Some(Direction::Cleared)
        } else {
            None
        }
    }

    /// Feed a probe result: unhealthy trips, healthy clears
    pub fn observe(&mut self, healthy: bool) -> Option<Direction> {
        match (healthy, self.state) {
            (false, AlarmState::Nominal) => {
                self.enter(AlarmState::Alarmed);
                Some(Direction::Tripped)
            }
            (true, AlarmState::Alarmed) => {
                self.enter(AlarmState::Nominal);
                Some(Direction::Cleared)
            }
            _ => None,
        }
    }

    fn enter(&mut self, state: AlarmState) {
        self.state = state;
        self.last_transition = Some(iso_now());
    }
}
