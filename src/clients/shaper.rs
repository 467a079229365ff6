//! JSON-RPC client for the virtual switch's ingress policing.
//!
//! Rate and burst values are written straight into the switch database's
//! Interface table over a raw TCP transact call.

use async_trait::async_trait;
use log::debug;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::TrafficShaper;
use crate::config::{Config, SliceConfig};
use crate::core::error::ExperimentError;
use crate::core::models::ShapingCommand;

const INGRESS_POLICING_RATE: &str = "ingress_policing_rate";
const INGRESS_POLICING_BURST: &str = "ingress_policing_burst";

pub struct ShaperClient {
    host: String,
    port: u16,
    slices: Vec<SliceConfig>,
}

/// Build the transact request updating one interface's policing columns.
fn build_request(interface: &str, rate: u64, burst: u64) -> Value {
    json!({
        "id": 1,
        "method": "transact",
        "params": [
            "Open_vSwitch", {
                "op": "update",
                "table": "Interface",
                "where": [
                    ["name", "==", interface]
                ],
                "row": {
                    INGRESS_POLICING_RATE: rate,
                    INGRESS_POLICING_BURST: burst
                }
            }
        ]
    })
}

impl ShaperClient {
    pub fn new(config: &Config) -> Self {
        Self {
            host: config.shaper_host.clone(),
            port: config.shaper_port,
            slices: config.slices.clone(),
        }
    }

    /// Send one request over a fresh TCP connection and read the response.
    async fn send_request(&self, request: &Value) -> Result<Value, ExperimentError> {
        debug!("Sending request to the switch: {}", request);

        let mut stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                ExperimentError::Remote(format!("Error sending request to the switch: {}", e))
            })?;

        let mut payload = serde_json::to_vec(request)
            .map_err(|e| ExperimentError::Remote(format!("Unserializable switch request: {}", e)))?;
        payload.push(b'\n');

        stream.write_all(&payload).await.map_err(|e| {
            ExperimentError::Remote(format!("Error sending request to the switch: {}", e))
        })?;

        let mut buffer = vec![0u8; 4096];
        let read = stream.read(&mut buffer).await.map_err(|e| {
            ExperimentError::Remote(format!("Error reading response from the switch: {}", e))
        })?;

        serde_json::from_slice(&buffer[..read]).map_err(|e| {
            ExperimentError::Remote(format!("Malformed response from the switch: {}", e))
        })
    }

    async fn set_interface_values(
        &self,
        interface: &str,
        rate: u64,
        burst: u64,
    ) -> Result<(), ExperimentError> {
        let request = build_request(interface, rate, burst);
        let response = self.send_request(&request).await?;

        debug!("Switch response: {}", response);

        match response.get("error") {
            None | Some(Value::Null) => Ok(()),
            Some(error) => Err(ExperimentError::Remote(format!(
                "Error setting rate/burst value: {}",
                error
            ))),
        }
    }
}

#[async_trait]
impl TrafficShaper for ShaperClient {
    async fn set_downlink_uplink_values(
        &self,
        commands: &[ShapingCommand],
    ) -> Result<(), ExperimentError> {
        for (slice, command) in self.slices.iter().zip(commands) {
            debug!(
                "Setting DL rate/burst for slice '{}': {}/{} ({})",
                slice.id, command.downlink.rate, command.downlink.burst, slice.downlink_interface
            );
            self.set_interface_values(
                &slice.downlink_interface,
                command.downlink.rate,
                command.downlink.burst,
            )
            .await?;

            debug!(
                "Setting UL rate/burst for slice '{}': {}/{} ({})",
                slice.id, command.uplink.rate, command.uplink.burst, slice.uplink_interface
            );
            self.set_interface_values(
                &slice.uplink_interface,
                command.uplink.rate,
                command.uplink.burst,
            )
            .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transact_request_shape() {
        let request = build_request("upf4-ranup-vhost", 120_000, 22_500);

        assert_eq!(
            request,
            json!({
                "id": 1,
                "method": "transact",
                "params": [
                    "Open_vSwitch", {
                        "op": "update",
                        "table": "Interface",
                        "where": [["name", "==", "upf4-ranup-vhost"]],
                        "row": {
                            "ingress_policing_rate": 120_000,
                            "ingress_policing_burst": 22_500
                        }
                    }
                ]
            })
        );
    }
}
