//! REST client for the NFV orchestrator that boots application VMs.

use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde_json::Value;

use super::WorkloadService;
use crate::config::Config;
use crate::core::error::ExperimentError;

pub struct WorkloadClient {
    http: Client,
    base_url: String,
}

/// The info endpoint answers with an empty document when nothing runs.
fn no_running_vms(info: &Value) -> bool {
    match info {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(members) => members.is_empty(),
        _ => false,
    }
}

impl WorkloadClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: Client::new(),
            base_url: config.workload_base_url.clone(),
        }
    }

    async fn start_vms(&self, apps: &[String]) -> Result<(), ExperimentError> {
        let resp = self
            .http
            .post(format!("{}/osm_create", self.base_url))
            .json(&serde_json::json!({ "applications": apps }))
            .send()
            .await
            .map_err(|e| ExperimentError::Remote(format!("Starting VMs failed: {}", e)))?;

        if !resp.status().is_success() {
            error!("Starting VMs failed; StatusCode={}", resp.status());
            return Err(ExperimentError::Remote("Starting VMs failed!".to_string()));
        }

        let details: Value = resp
            .json()
            .await
            .map_err(|e| ExperimentError::Remote(format!("Malformed VM creation response: {}", e)))?;

        debug!("VMs started; VMData={}", details);

        Ok(())
    }

    async fn stop_running_vms(&self) -> Result<(), ExperimentError> {
        let resp = self
            .http
            .get(format!("{}/osm_info", self.base_url))
            .send()
            .await
            .map_err(|e| ExperimentError::Remote(format!("Error retrieving all running VMs: {}", e)))?;

        if !resp.status().is_success() {
            error!(
                "Retrieving all running VMs failed; StatusCode={}",
                resp.status()
            );
            return Err(ExperimentError::Remote(
                "Error retrieving all running VMs!".to_string(),
            ));
        }

        let info: Value = resp
            .json()
            .await
            .map_err(|e| ExperimentError::Remote(format!("Malformed VM info response: {}", e)))?;

        if no_running_vms(&info) {
            debug!("No running VMs found");
            return Ok(());
        }

        let resp = self
            .http
            .delete(format!("{}/osm_delete", self.base_url))
            .send()
            .await
            .map_err(|e| ExperimentError::Remote(format!("Error stopping all running VMs: {}", e)))?;

        if !resp.status().is_success() {
            error!("Failed to stop VMs; StatusCode={}", resp.status());
            return Err(ExperimentError::Remote(
                "Error stopping all running VMs!".to_string(),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl WorkloadService for WorkloadClient {
    /// Stop any running VMs and start new ones hosting the requested
    /// applications.
    async fn initialize(&self, apps: &[String]) -> Result<(), ExperimentError> {
        debug!("Initializing workloads: stopping all running VMs");
        self.stop_running_vms().await?;

        debug!("Initializing workloads: starting VMs");
        self.start_vms(apps).await?;

        debug!("Initializing workloads: done");
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), ExperimentError> {
        debug!("Cleaning up workloads: stopping all running VMs");
        self.stop_running_vms().await?;
        debug!("Cleaning up workloads: done");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_info_documents_mean_idle() {
        assert!(no_running_vms(&serde_json::json!(null)));
        assert!(no_running_vms(&serde_json::json!([])));
        assert!(no_running_vms(&serde_json::json!({})));
        assert!(!no_running_vms(&serde_json::json!([{"vm": "app-1"}])));
        assert!(!no_running_vms(&serde_json::json!({"vm": "app-1"})));
    }
}
