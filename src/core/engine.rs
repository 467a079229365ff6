//! Background task driving one experiment run through its lifecycle phases.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, warn};

use crate::clients::Collaborators;
use crate::config::{Config, SLICE_POSITIONS};
use crate::core::allocation::{translate_allocation, unlimited_commands};
use crate::core::cancel::CancelListener;
use crate::core::error::ExperimentError;
use crate::core::state::ExperimentState;
use crate::core::status::StatusStore;

/// Poll period while waiting for the scheduled start time.
const START_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Drives initialize -> execute -> cleanup inside a spawned task.
///
/// The engine owns its cancellation listener; the controller keeps the
/// matching handle and the task's join handle.
pub struct ExecutionEngine {
    config: Arc<Config>,
    status: Arc<StatusStore>,
    collaborators: Collaborators,
    cancel: CancelListener,
    start_time: DateTime<Utc>,
    stop_time: DateTime<Utc>,
}

impl ExecutionEngine {
    pub fn new(
        config: Arc<Config>,
        status: Arc<StatusStore>,
        collaborators: Collaborators,
        cancel: CancelListener,
        start_time: DateTime<Utc>,
        stop_time: DateTime<Utc>,
    ) -> Self {
        Self {
            config,
            status,
            collaborators,
            cancel,
            start_time,
            stop_time,
        }
    }

    /// Run the whole lifecycle. Any phase failure lands in the error state
    /// with the failure message attached.
    pub async fn run(mut self) {
        if let Err(e) = self.drive().await {
            error!("Experiment run failed: {}", e);
            self.status
                .set_status(ExperimentState::Error, Some(e.to_string()))
                .await;
        }

        // Measurement sessions are torn down even after a failed run; a
        // failure here is swallowed so it cannot overwrite the status.
        if let Err(e) = self.collaborators.measurement.cleanup().await {
            warn!("Post-run measurement cleanup failed: {}", e);
        }
    }

    async fn drive(&mut self) -> Result<(), ExperimentError> {
        self.initialize().await?;
        self.execute().await?;
        self.cleanup().await
    }

    /// Start measurement sessions and lift all shaping limits.
    async fn initialize(&self) -> Result<(), ExperimentError> {
        self.status
            .set_status(ExperimentState::Initialize, None)
            .await;

        if self.config.manage_workloads {
            let apps = self.status.apps().await;
            self.collaborators.workload.initialize(&apps).await?;
        }

        if self.config.provision_slices {
            self.collaborators.provisioning.initialize().await?;
        }

        let slices = self.status.slices().await;
        let enriched = self.collaborators.measurement.initialize(&slices).await?;
        self.status.set_slices(enriched).await;

        self.collaborators
            .shaper
            .set_downlink_uplink_values(&unlimited_commands(self.config.slices.len()))
            .await
    }

    /// Wait for the start time, then run the control loop until the stop
    /// time or cancellation.
    async fn execute(&mut self) -> Result<(), ExperimentError> {
        // Cancellation during this wait skips straight to cleanup without
        // the run ever entering the execute state.
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            if Utc::now() >= self.start_time {
                break;
            }
            if self.cancel.sleep(START_POLL_INTERVAL).await {
                return Ok(());
            }
        }

        self.status.set_status(ExperimentState::Execute, None).await;

        let update_interval = Duration::from_secs(self.config.update_interval_seconds);

        while Utc::now() < self.stop_time && !self.cancel.is_cancelled() {
            // A failed cycle must never abort the experiment; the loop
            // picks up again at the next scheduled interval.
            if let Err(e) = self.control_cycle().await {
                warn!("Recover from error in execute: {}", e);
            }

            self.cancel.sleep(update_interval).await;
        }

        Ok(())
    }

    /// One pass of the closed control loop.
    async fn control_cycle(&self) -> Result<(), ExperimentError> {
        let slices = self.status.slices().await;

        // Closed-loop control needs exactly two slices to split bandwidth
        // between; otherwise the schedule is waited out without shaping.
        if slices.len() != SLICE_POSITIONS {
            return Ok(());
        }

        let kpis = self.collaborators.measurement.kpis_per_slice().await?;

        let kpi_json = serde_json::to_string(&kpis)
            .map_err(|e| ExperimentError::Remote(format!("Unserializable KPI set: {}", e)))?;
        self.status
            .append_log(format!("Got KPIs from measurement service: {}", kpi_json))
            .await;

        let allocation = self.collaborators.inference.process_kpis(&kpis).await?;

        debug!(
            "Got DL slice allocation; Slice1={}, Slice2={}",
            allocation.downlink.slice1, allocation.downlink.slice2
        );
        debug!(
            "Got UL slice allocation; Slice1={}, Slice2={}",
            allocation.uplink.slice1, allocation.uplink.slice2
        );

        let commands = translate_allocation(
            &allocation,
            self.config.max_downlink_bandwidth,
            self.config.max_uplink_bandwidth,
        );

        self.collaborators
            .shaper
            .set_downlink_uplink_values(&commands)
            .await?;

        let epoch_ms = Utc::now().timestamp_millis();
        self.status
            .append_log(format!(
                "Set DL slice allocation; Time={}, Slice1={}, Slice2={}",
                epoch_ms, allocation.downlink.slice1, allocation.downlink.slice2
            ))
            .await;
        self.status
            .append_log(format!(
                "Set UL slice allocation; Time={}, Slice1={}, Slice2={}",
                epoch_ms, allocation.uplink.slice1, allocation.uplink.slice2
            ))
            .await;

        Ok(())
    }

    /// Tear down collaborators and restore unlimited shaping.
    async fn cleanup(&self) -> Result<(), ExperimentError> {
        self.status.set_status(ExperimentState::Cleanup, None).await;

        self.collaborators.measurement.cleanup().await?;

        if self.config.manage_workloads {
            self.collaborators.workload.cleanup().await?;
        }

        if self.config.provision_slices {
            self.collaborators.provisioning.cleanup().await?;
        }

        self.collaborators
            .shaper
            .set_downlink_uplink_values(&unlimited_commands(self.config.slices.len()))
            .await?;

        self.status.set_status(ExperimentState::Done, None).await;
        Ok(())
    }
}
