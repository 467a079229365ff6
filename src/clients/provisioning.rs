//! REST client for the 5G core's network-slice instance API.

use std::path::PathBuf;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::SliceProvisioningService;
use crate::config::{Config, SliceConfig};
use crate::core::error::ExperimentError;

pub struct ProvisioningClient {
    http: Client,
    base_url: String,
    /// Payload template for slice-instance creation
    template_path: PathBuf,
    slices: Vec<SliceConfig>,
}

#[derive(Debug, Deserialize)]
struct SliceInstanceList {
    #[serde(rename = "Data")]
    data: Vec<SliceInstance>,
}

#[derive(Debug, Deserialize)]
struct SliceInstance {
    #[serde(rename = "sliceName")]
    slice_name: String,
}

/// Fill the creation payload template with one slice's name and S-NSSAI
/// list. The template must carry all three target members.
fn instantiate_template(template: &Value, slice: &SliceConfig) -> Result<Value, ExperimentError> {
    let mut payload = template.clone();
    let snssai = serde_json::to_value(&slice.snssai_list)
        .map_err(|e| ExperimentError::Config(format!("Unserializable S-NSSAI list: {}", e)))?;

    for (pointer, value) in [
        ("/sliceName", Value::String(slice.id.to_string())),
        ("/serviceProfile/sNSSAIList", snssai.clone()),
        ("/networkSliceSubnet/sliceProfile/sNSSAIList", snssai),
    ] {
        match payload.pointer_mut(pointer) {
            Some(slot) => *slot = value,
            None => {
                return Err(ExperimentError::Config(format!(
                    "Provisioning template is missing {}",
                    pointer
                )))
            }
        }
    }

    Ok(payload)
}

impl ProvisioningClient {
    pub fn new(config: &Config) -> Result<Self, ExperimentError> {
        // The core's API terminates TLS with a self-signed certificate.
        let http = Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| {
                ExperimentError::Config(format!("Failed to build the provisioning client: {}", e))
            })?;

        Ok(Self {
            http,
            base_url: config.provisioning_base_url.clone(),
            template_path: config.provisioning_template.clone(),
            slices: config.slices.clone(),
        })
    }

    fn instances_url(&self) -> String {
        format!("{}/api/v1.0/network-slice/slice-instance", self.base_url)
    }

    async fn existing_slices(&self) -> Result<Vec<SliceInstance>, ExperimentError> {
        debug!("Retrieving all existing slice instances");

        let resp = self.http.get(self.instances_url()).send().await.map_err(|e| {
            ExperimentError::Remote(format!("Retrieving existing slices failed: {}", e))
        })?;

        if !resp.status().is_success() {
            return Err(ExperimentError::Remote(
                "Retrieving existing slices failed!".to_string(),
            ));
        }

        let listing: SliceInstanceList = resp.json().await.map_err(|e| {
            ExperimentError::Remote(format!("Malformed slice-instance listing: {}", e))
        })?;

        Ok(listing.data)
    }

    async fn delete_slice(&self, name: &str) -> Result<(), ExperimentError> {
        debug!("Deleting existing slice instance '{}'", name);

        let resp = self
            .http
            .delete(format!("{}/{}", self.instances_url(), name))
            .send()
            .await
            .map_err(|e| ExperimentError::Remote(format!("Deleting slice failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(ExperimentError::Remote("Deleting slice failed!".to_string()));
        }

        Ok(())
    }

    /// Delete every configured slice that currently exists in the core.
    async fn delete_existing_slices(&self) -> Result<(), ExperimentError> {
        let existing = self.existing_slices().await?;

        for slice in &self.slices {
            let name = slice.id.to_string();
            if existing.iter().any(|item| item.slice_name == name) {
                self.delete_slice(&name).await?;
            }
        }

        Ok(())
    }

    async fn create_slices(&self) -> Result<(), ExperimentError> {
        debug!("Creating slice instances");

        let contents = tokio::fs::read_to_string(&self.template_path)
            .await
            .map_err(|e| {
                ExperimentError::Config(format!(
                    "Failed to read provisioning template {}: {}",
                    self.template_path.display(),
                    e
                ))
            })?;
        let template: Value = serde_json::from_str(&contents).map_err(|e| {
            ExperimentError::Config(format!(
                "Malformed provisioning template {}: {}",
                self.template_path.display(),
                e
            ))
        })?;

        for slice in &self.slices {
            let payload = instantiate_template(&template, slice)?;

            debug!(
                "Creating slice instance '{}'; SNSSAI={:?}",
                slice.id, slice.snssai_list
            );

            let resp = self
                .http
                .post(self.instances_url())
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    ExperimentError::Remote(format!("Creating slice '{}' failed: {}", slice.id, e))
                })?;

            if !resp.status().is_success() {
                return Err(ExperimentError::Remote(format!(
                    "Creating slice '{}' failed!",
                    slice.id
                )));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl SliceProvisioningService for ProvisioningClient {
    /// Delete existing slices and create new ones from the configuration.
    async fn initialize(&self) -> Result<(), ExperimentError> {
        self.delete_existing_slices().await?;
        self.create_slices().await
    }

    async fn cleanup(&self) -> Result<(), ExperimentError> {
        self.delete_existing_slices().await
    }
}
