//! Static testbed configuration, loaded once at startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::ExperimentError;

/// Number of slice positions the testbed supports.
pub const SLICE_POSITIONS: usize = 2;

/// Main configuration file contents.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Address the experiment API listens on
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Seconds between control-loop iterations
    pub update_interval_seconds: u64,
    /// Maximum downlink bandwidth in shaper-native units
    pub max_downlink_bandwidth: u64,
    /// Maximum uplink bandwidth in shaper-native units
    pub max_uplink_bandwidth: u64,
    /// Slice measured when a template requests no slices
    pub default_slice_id: Uuid,
    /// Ordered slice definitions; templates resolve slices by position
    pub slices: Vec<SliceConfig>,
    pub measurement_base_url: String,
    /// Per-position measurement profile files
    pub measurement_profiles: Vec<PathBuf>,
    pub inference_base_url: String,
    pub provisioning_base_url: String,
    /// Payload template for slice-instance creation
    pub provisioning_template: PathBuf,
    pub workload_base_url: String,
    pub shaper_host: String,
    pub shaper_port: u16,
    /// Provision slices in the 5G core around each run
    #[serde(default)]
    pub provision_slices: bool,
    /// Boot application VMs around each run
    #[serde(default)]
    pub manage_workloads: bool,
}

/// Static definition of one slice position.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceConfig {
    pub id: Uuid,
    #[serde(rename = "sNSSAIList")]
    pub snssai_list: Vec<Snssai>,
    /// Switch interface policing this slice's downlink traffic
    pub downlink_interface: String,
    /// Switch interface policing this slice's uplink traffic
    pub uplink_interface: String,
}

/// Single network slice selection assistance information entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snssai {
    pub sst: u8,
    pub sd: String,
}

impl Config {
    /// Load and validate the configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ExperimentError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ExperimentError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&contents).map_err(|e| {
            ExperimentError::Config(format!("Malformed configuration in {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ExperimentError> {
        if self.update_interval_seconds == 0 {
            return Err(ExperimentError::Config(
                "updateIntervalSeconds must be at least 1".to_string(),
            ));
        }
        if self.slices.len() < SLICE_POSITIONS {
            return Err(ExperimentError::Config(format!(
                "At least {} slice definitions are required",
                SLICE_POSITIONS
            )));
        }
        if self.measurement_profiles.len() < SLICE_POSITIONS {
            return Err(ExperimentError::Config(format!(
                "At least {} measurement profiles are required",
                SLICE_POSITIONS
            )));
        }
        Ok(())
    }
}

fn default_listen_address() -> String {
    "[::]:5000".to_string()
}
