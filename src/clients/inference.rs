//! REST client for the ML resource allocator.

use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::Serialize;

use super::InferenceService;
use crate::config::Config;
use crate::core::error::ExperimentError;
use crate::core::models::{Allocation, KpiRecord};

pub struct InferenceClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct AllocationRequest<'a> {
    kpis: &'a [KpiRecord],
}

impl InferenceClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: Client::new(),
            base_url: config.inference_base_url.clone(),
        }
    }
}

#[async_trait]
impl InferenceService for InferenceClient {
    async fn process_kpis(&self, kpis: &[KpiRecord]) -> Result<Allocation, ExperimentError> {
        debug!("Sending KPIs for the allocator to process: {:?}", kpis);

        let resp = self
            .http
            .post(format!("{}/allocate_resource", self.base_url))
            .json(&AllocationRequest { kpis })
            .send()
            .await
            .map_err(|e| {
                ExperimentError::Remote(format!("Getting allocation from AI/ML failed: {}", e))
            })?;

        if !resp.status().is_success() {
            error!(
                "Could not get allocation from AI/ML; StatusCode={}",
                resp.status()
            );
            return Err(ExperimentError::Remote(
                "Getting allocation from AI/ML failed".to_string(),
            ));
        }

        let allocation: Allocation = resp.json().await.map_err(|e| {
            ExperimentError::Remote(format!("Malformed allocation response: {}", e))
        })?;

        debug!("Allocator response: {:?}", allocation);

        Ok(allocation)
    }
}
