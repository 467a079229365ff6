//! REST client for the QoS measurement storage.
//!
//! The storage runs one measurement session per slice; each session keeps
//! averaging KPIs until it is stopped. Sessions surviving a crashed run are
//! stopped wholesale before new ones start.

use std::path::PathBuf;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::MeasurementService;
use crate::config::Config;
use crate::core::error::ExperimentError;
use crate::core::models::{DirectionKpis, KpiRecord, SliceRecord};

pub struct MeasurementClient {
    http: Client,
    base_url: String,
    default_slice_id: Uuid,
    /// Per-position measurement profile files
    profiles: Vec<PathBuf>,
    /// Slices with live sessions, set by initialize
    sessions: RwLock<Vec<SliceRecord>>,
}

#[derive(Debug, Deserialize)]
struct StartSessionResponse {
    #[serde(rename = "QSMeasId")]
    session_id: Option<String>,
    #[serde(rename = "internalName")]
    internal_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionStatus {
    #[serde(rename = "QSMeasId")]
    session_id: Option<String>,
}

/// One averaged measurement row as stored by the service.
#[derive(Debug, Deserialize)]
struct ResultRow {
    #[serde(rename = "secRecBitsS")]
    secondary_received_bits: f64,
    #[serde(rename = "sentDelayS")]
    sent_delay: f64,
    #[serde(rename = "sentJitter")]
    sent_jitter: f64,
    #[serde(rename = "primRecBitsS")]
    primary_received_bits: f64,
    #[serde(rename = "recDelayS")]
    receive_delay: f64,
    #[serde(rename = "recJitter")]
    receive_jitter: f64,
}

/// The storage reports failed session starts as a missing, null or literal
/// "null" identifier rather than an error status.
fn valid_session_id(response: &StartSessionResponse) -> Option<&str> {
    match response.session_id.as_deref() {
        Some(id) if id != "null" => Some(id),
        _ => None,
    }
}

/// Map a stored result row onto the per-direction KPI model.
fn map_result_row(row: &ResultRow) -> KpiRecord {
    KpiRecord {
        downlink: DirectionKpis {
            throughput: row.secondary_received_bits,
            latency: row.sent_delay,
            jitter: row.sent_jitter,
            // Packet loss counters in the storage API are unreliable; report zero.
            packet_loss: 0.0,
        },
        uplink: DirectionKpis {
            throughput: row.primary_received_bits,
            latency: row.receive_delay,
            jitter: row.receive_jitter,
            packet_loss: 0.0,
        },
    }
}

impl MeasurementClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: Client::new(),
            base_url: config.measurement_base_url.clone(),
            default_slice_id: config.default_slice_id,
            profiles: config.measurement_profiles.clone(),
            sessions: RwLock::new(Vec::new()),
        }
    }

    /// Load the measurement profile for a slice position and tag it with
    /// the slice identifier.
    async fn load_profile(
        &self,
        index: usize,
        slice_id: Uuid,
    ) -> Result<serde_json::Value, ExperimentError> {
        let path = self.profiles.get(index).ok_or_else(|| {
            ExperimentError::Remote(format!(
                "No measurement profile configured for slice position {}",
                index
            ))
        })?;

        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            ExperimentError::Remote(format!(
                "Failed to read measurement profile {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut params: serde_json::Value = serde_json::from_str(&contents).map_err(|e| {
            ExperimentError::Remote(format!(
                "Malformed measurement profile {}: {}",
                path.display(),
                e
            ))
        })?;

        match params.as_object_mut() {
            Some(members) => {
                members.insert(
                    "measurement_description".to_string(),
                    serde_json::Value::String(format!("SliceId={}", slice_id)),
                );
            }
            None => {
                return Err(ExperimentError::Remote(format!(
                    "Measurement profile {} is not a JSON object",
                    path.display()
                )))
            }
        }

        Ok(params)
    }

    async fn start_session(
        &self,
        slice_id: Uuid,
        params: &serde_json::Value,
    ) -> Result<String, ExperimentError> {
        debug!("Starting measurement; SliceId={}", slice_id);

        let resp = self
            .http
            .post(format!("{}/measurement/start", self.base_url))
            .json(params)
            .send()
            .await
            .map_err(|e| {
                ExperimentError::Remote(format!(
                    "Starting measurement for slice '{}' failed: {}",
                    slice_id, e
                ))
            })?;

        if !resp.status().is_success() {
            error!("Starting measurement failed; StatusCode={}", resp.status());
            return Err(ExperimentError::Remote(format!(
                "Starting measurement for slice '{}' failed!",
                slice_id
            )));
        }

        let body: StartSessionResponse = resp.json().await.map_err(|e| {
            ExperimentError::Remote(format!(
                "Malformed session-start response for slice '{}': {}",
                slice_id, e
            ))
        })?;

        match valid_session_id(&body) {
            Some(session_id) => {
                info!(
                    "Measurement started; QSMeasId={}, InternalName={:?}",
                    session_id, body.internal_name
                );
                Ok(session_id.to_string())
            }
            None => {
                error!(
                    "Starting measurement failed; InternalName={:?}",
                    body.internal_name
                );
                Err(ExperimentError::Remote(format!(
                    "Starting measurement for slice '{}' failed!",
                    slice_id
                )))
            }
        }
    }

    /// Stop every session the storage reports as running.
    async fn stop_running_sessions(&self) -> Result<(), ExperimentError> {
        let resp = self
            .http
            .get(format!("{}/measurement/status/all", self.base_url))
            .send()
            .await
            .map_err(|e| {
                ExperimentError::Remote(format!("Error retrieving all running measurements: {}", e))
            })?;

        if !resp.status().is_success() {
            error!(
                "Retrieving all running measurements failed; StatusCode={}",
                resp.status()
            );
            return Err(ExperimentError::Remote(
                "Error retrieving all running measurements!".to_string(),
            ));
        }

        let running: Vec<SessionStatus> = resp.json().await.map_err(|e| {
            ExperimentError::Remote(format!("Malformed measurement status listing: {}", e))
        })?;

        for item in running {
            let session_id = match item.session_id {
                Some(id) if id != "null" => id,
                _ => {
                    warn!("Encountered a null measurement ID in running measurements");
                    continue;
                }
            };

            let resp = self
                .http
                .get(format!("{}/measurement/stop", self.base_url))
                .query(&[("QSMeasId", session_id.as_str())])
                .send()
                .await
                .map_err(|e| {
                    ExperimentError::Remote(format!("Error stopping a measurement: {}", e))
                })?;

            if !resp.status().is_success() {
                // The stop endpoint sometimes reports an error even though
                // the measurement is gone.
                warn!(
                    "Failed to stop measurement; StatusCode={}, QSMeasId={}",
                    resp.status(),
                    session_id
                );
            }
        }

        Ok(())
    }

    /// Fetch the newest averaged result of one session.
    async fn latest_kpis(&self, session_id: &str) -> Result<KpiRecord, ExperimentError> {
        debug!("Getting the latest measurement result; QSMeasId={}", session_id);

        let resp = self
            .http
            .get(format!("{}/AverageResult", self.base_url))
            .query(&[("qmId", session_id), ("limit", "1"), ("sort", "desc")])
            .send()
            .await
            .map_err(|e| ExperimentError::Remote(format!("Failed to get the latest KPIs: {}", e)))?;

        if !resp.status().is_success() {
            error!(
                "Failed to get the latest measurement result; QSMeasId={}, StatusCode={}",
                session_id,
                resp.status()
            );
            return Err(ExperimentError::Remote(
                "Failed to get the latest KPIs".to_string(),
            ));
        }

        let rows: Vec<ResultRow> = resp.json().await.map_err(|e| {
            ExperimentError::Remote(format!("Malformed measurement result set: {}", e))
        })?;

        if rows.len() != 1 {
            error!("Measurement result set invalid; QSMeasId={}", session_id);
            return Err(ExperimentError::Remote(
                "Invalid measurement set encountered".to_string(),
            ));
        }

        Ok(map_result_row(&rows[0]))
    }
}

#[async_trait]
impl MeasurementService for MeasurementClient {
    async fn initialize(
        &self,
        slices: &[SliceRecord],
    ) -> Result<Vec<SliceRecord>, ExperimentError> {
        debug!("Initializing measurements: stopping all running sessions");
        self.stop_running_sessions().await?;

        debug!("Initializing measurements: starting slice-specific sessions");
        let mut enriched = slices.to_vec();

        if enriched.is_empty() {
            // No slices requested; measure the default slice instead.
            debug!("No slices defined; using the default slice");
            let params = self.load_profile(0, self.default_slice_id).await?;
            self.start_session(self.default_slice_id, &params).await?;
        }

        for (index, slice) in enriched.iter_mut().enumerate() {
            let params = self.load_profile(index, slice.id).await?;
            slice.measurement_session_id = Some(self.start_session(slice.id, &params).await?);
        }

        *self.sessions.write().await = enriched.clone();

        debug!("Initializing measurements: done");
        Ok(enriched)
    }

    async fn cleanup(&self) -> Result<(), ExperimentError> {
        debug!("Cleaning up measurements: stopping all running sessions");
        self.stop_running_sessions().await?;
        debug!("Cleaning up measurements: done");
        Ok(())
    }

    async fn kpis_per_slice(&self) -> Result<Vec<KpiRecord>, ExperimentError> {
        let sessions = self.sessions.read().await.clone();

        let mut kpis = Vec::with_capacity(sessions.len());
        for slice in &sessions {
            let session_id = slice.measurement_session_id.as_deref().ok_or_else(|| {
                ExperimentError::Remote(format!("Slice '{}' has no measurement session", slice.id))
            })?;
            kpis.push(self.latest_kpis(session_id).await?);
        }

        Ok(kpis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_row_maps_to_kpi_record() {
        let raw = serde_json::json!({
            "time": 1718000000,
            "secRecBitsS": 2944.0,
            "sentDelayS": 6.06,
            "sentJitter": 0.705,
            "primRecBitsS": 6544.0,
            "recDelayS": 9.486,
            "recJitter": 1.959
        });
        let row: ResultRow = serde_json::from_value(raw).unwrap();
        let kpis = map_result_row(&row);

        assert_eq!(kpis.downlink.throughput, 2944.0);
        assert_eq!(kpis.downlink.latency, 6.06);
        assert_eq!(kpis.downlink.jitter, 0.705);
        assert_eq!(kpis.downlink.packet_loss, 0.0);
        assert_eq!(kpis.uplink.throughput, 6544.0);
        assert_eq!(kpis.uplink.latency, 9.486);
        assert_eq!(kpis.uplink.packet_loss, 0.0);
    }

    #[test]
    fn test_session_id_null_variants_rejected() {
        let missing: StartSessionResponse =
            serde_json::from_value(serde_json::json!({"internalName": "meas-7"})).unwrap();
        assert!(valid_session_id(&missing).is_none());

        let null: StartSessionResponse =
            serde_json::from_value(serde_json::json!({"QSMeasId": null})).unwrap();
        assert!(valid_session_id(&null).is_none());

        let literal: StartSessionResponse =
            serde_json::from_value(serde_json::json!({"QSMeasId": "null"})).unwrap();
        assert!(valid_session_id(&literal).is_none());

        let good: StartSessionResponse =
            serde_json::from_value(serde_json::json!({"QSMeasId": "qs-123"})).unwrap();
        assert_eq!(valid_session_id(&good), Some("qs-123"));
    }
}
