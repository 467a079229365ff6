//! Data model shared by the controller, the engine and the collaborators.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::state::ExperimentState;

/// Network Slice Template: caller-supplied description of an experiment's
/// schedule, slices and applications.
///
/// Timestamps are UTC strings in the `%Y-%m-%dT%H:%M:%SZ` format; they are
/// parsed and checked during load, not during deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSliceTemplate {
    pub trial_id: i64,
    pub start_time: String,
    pub stop_time: String,
    pub slices: Vec<String>,
    pub applications: Vec<String>,
}

/// One slice taking part in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceRecord {
    /// Caller-supplied slice type label (e.g. "eMBB")
    #[serde(rename = "type")]
    pub slice_type: String,
    /// Provisioning identifier resolved from configuration by position
    pub id: Uuid,
    /// Measurement session assigned during initialize
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_session_id: Option<String>,
}

/// Measured quality of one slice in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiRecord {
    pub downlink: DirectionKpis,
    pub uplink: DirectionKpis,
}

/// KPI set for a single traffic direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectionKpis {
    pub throughput: f64,
    pub latency: f64,
    pub jitter: f64,
    pub packet_loss: f64,
}

/// Fractional bandwidth split returned by the inference service.
///
/// Each value is in [0, 1] and is interpreted as the fraction of the
/// configured maximum bandwidth for its direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    #[serde(rename = "downlink_allocation")]
    pub downlink: SliceShare,
    #[serde(rename = "uplink_allocation")]
    pub uplink: SliceShare,
}

/// Per-slice share of one direction's bandwidth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SliceShare {
    pub slice1: f64,
    pub slice2: f64,
}

/// Rate and burst for one direction, in shaper-native units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBurst {
    pub rate: u64,
    pub burst: u64,
}

/// Per-slice traffic-shaping command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapingCommand {
    #[serde(rename = "dl")]
    pub downlink: RateBurst,
    #[serde(rename = "ul")]
    pub uplink: RateBurst,
}

impl ShapingCommand {
    /// Zero rate and burst disable policing in both directions.
    pub fn unlimited() -> Self {
        Self {
            downlink: RateBurst { rate: 0, burst: 0 },
            uplink: RateBurst { rate: 0, burst: 0 },
        }
    }
}

/// Non-blocking view of the current run.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub id: Option<i64>,
    pub state: ExperimentState,
    pub message: Option<String>,
}

/// Identifiers returned to the caller when a run starts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub id: i64,
    pub default_slice_id: Uuid,
    pub slices: Vec<SliceRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_template_requires_integer_trial_id() {
        let raw = json!({
            "trialId": "not-a-number",
            "startTime": "2026-01-01T00:00:00Z",
            "stopTime": "2026-01-01T01:00:00Z",
            "slices": ["eMBB"],
            "applications": []
        });
        assert!(serde_json::from_value::<NetworkSliceTemplate>(raw).is_err());

        let raw = json!({
            "trialId": 1.5,
            "startTime": "2026-01-01T00:00:00Z",
            "stopTime": "2026-01-01T01:00:00Z",
            "slices": ["eMBB"],
            "applications": []
        });
        assert!(serde_json::from_value::<NetworkSliceTemplate>(raw).is_err());
    }

    #[test]
    fn test_template_list_entries_must_be_strings() {
        let raw = json!({
            "trialId": 7,
            "startTime": "2026-01-01T00:00:00Z",
            "stopTime": "2026-01-01T01:00:00Z",
            "slices": ["eMBB", 2],
            "applications": []
        });
        assert!(serde_json::from_value::<NetworkSliceTemplate>(raw).is_err());

        let raw = json!({
            "trialId": 7,
            "startTime": "2026-01-01T00:00:00Z",
            "stopTime": "2026-01-01T01:00:00Z",
            "slices": ["eMBB"],
            "applications": [true]
        });
        assert!(serde_json::from_value::<NetworkSliceTemplate>(raw).is_err());
    }

    #[test]
    fn test_allocation_parses_wire_format() {
        let raw = json!({
            "downlink_allocation": {"slice1": 0.3, "slice2": 0.7},
            "uplink_allocation": {"slice1": 0.5, "slice2": 0.5}
        });
        let allocation: Allocation = serde_json::from_value(raw).unwrap();
        assert_eq!(allocation.downlink.slice1, 0.3);
        assert_eq!(allocation.downlink.slice2, 0.7);
        assert_eq!(allocation.uplink.slice1, 0.5);
    }

    #[test]
    fn test_shaping_command_wire_format() {
        let command = ShapingCommand {
            downlink: RateBurst { rate: 120_000, burst: 22_500 },
            uplink: RateBurst { rate: 30_000, burst: 5_625 },
        };
        let encoded = serde_json::to_value(command).unwrap();
        assert_eq!(
            encoded,
            json!({
                "dl": {"rate": 120_000, "burst": 22_500},
                "ul": {"rate": 30_000, "burst": 5_625}
            })
        );
    }
}
