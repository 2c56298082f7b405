//! Core data models shared by the sampler and the collector

use serde::{Deserialize, Serialize};

/// One host utilization reading
///
/// `cpu` is already multiplied by the configured CPU factor and may exceed 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    /// ISO-8601 local timestamp of the reading
    pub timestamp: String,
}

impl Sample {
    /// Create a sample stamped with the current local time
    pub fn now(cpu: f64, memory: f64, disk: f64) -> Self {
        Self {
            cpu,
            memory,
            disk,
            timestamp: iso_now(),
        }
    }
}

/// Batch pushed by the sampler, newest sample first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushBatch {
    pub pc_data: Vec<Sample>,
}

/// Wall-clock delay between two consecutive accepted pushes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    /// Seconds since the previous accepted push
    pub interval: f64,
    pub timestamp: String,
}

/// Liveness toggle returned with every snapshot read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckUp {
    pub ligne_de_vie: u8,
}

/// Current state exposed to dashboards
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub pc_data: Vec<Sample>,
    pub time_intervals: Vec<HeartbeatRecord>,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_up: Option<CheckUp>,
}

/// Current local time as an ISO-8601 string with microseconds
pub fn iso_now() -> String {
    chrono::Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_batch_wire_format() {
        let json = r#"{"pc_data":[{"cpu":12.5,"memory":40.0,"disk":71.2,"timestamp":"2024-06-28T14:02:30.000001"}]}"#;
        let batch: PushBatch = serde_json::from_str(json).unwrap();

        assert_eq!(batch.pc_data.len(), 1);
        assert_eq!(batch.pc_data[0].cpu, 12.5);
        assert_eq!(batch.pc_data[0].timestamp, "2024-06-28T14:02:30.000001");
    }

    #[test]
    fn test_snapshot_omits_missing_check_up() {
        let value = serde_json::to_value(Snapshot::default()).unwrap();
        assert!(value.get("check_up").is_none());
        assert_eq!(value["running"], false);
    }

    #[test]
    fn test_iso_now_shape() {
        let ts = iso_now();
        assert_eq!(ts.len(), "2024-06-28T14:02:30.000001".len());
        assert_eq!(&ts[10..11], "T");
    }
}
