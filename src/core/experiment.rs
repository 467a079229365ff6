//! Public façade owning the experiment lifecycle.
//!
//! The controller validates incoming templates, spawns and cancels the
//! execution engine, and exposes status and logs. It supports exactly one
//! concurrent run.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, error, info};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::clients::Collaborators;
use crate::config::{Config, SLICE_POSITIONS};
use crate::core::cancel::{cancel_pair, CancelHandle};
use crate::core::engine::ExecutionEngine;
use crate::core::error::ExperimentError;
use crate::core::models::{NetworkSliceTemplate, SliceRecord, StartResponse, StatusSnapshot};
use crate::core::status::StatusStore;

/// Fixed identifier of the single experiment slot.
pub const EXPERIMENT_ID: i64 = 1;

/// Template timestamps are UTC strings in this exact format.
const TEMPLATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Handle to the background task of an active run.
struct RunHandle {
    id: i64,
    cancel: CancelHandle,
    task: JoinHandle<()>,
}

pub struct ExperimentController {
    config: Arc<Config>,
    collaborators: Collaborators,
    status: Arc<StatusStore>,
    /// Serializes start/stop pairs and owns the background task handle.
    /// The slot being occupied is what "an experiment is active" means.
    run_slot: Mutex<Option<RunHandle>>,
}

impl ExperimentController {
    pub fn new(config: Arc<Config>, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            status: Arc::new(StatusStore::new()),
            run_slot: Mutex::new(None),
        }
    }

    /// Validate a template and load it as the current experiment.
    ///
    /// Performs no I/O and does not start execution. On any validation
    /// failure the previous status is left untouched.
    pub async fn load(&self, template: &NetworkSliceTemplate) -> Result<(), ExperimentError> {
        let start_time = parse_template_time(&template.start_time)?;
        let stop_time = parse_template_time(&template.stop_time)?;

        let now = Utc::now();
        if now > start_time || now > stop_time || start_time > stop_time {
            return Err(ExperimentError::Validation(
                "Invalid execution time in NST".to_string(),
            ));
        }

        debug!(
            "Experiment start time: {} ({})",
            start_time,
            start_time.timestamp()
        );
        debug!(
            "Experiment stop time: {} ({})",
            stop_time,
            stop_time.timestamp()
        );

        if template.slices.iter().any(|entry| entry.is_empty()) {
            return Err(ExperimentError::Validation(
                "Invalid or no slice information in NST".to_string(),
            ));
        }
        if template.slices.len() > SLICE_POSITIONS {
            return Err(ExperimentError::Validation(
                "Only up to 2 slices supported".to_string(),
            ));
        }
        if template.applications.len() > SLICE_POSITIONS {
            return Err(ExperimentError::Validation(
                "Only up to 2 applications supported".to_string(),
            ));
        }

        // Slice identifiers are resolved positionally from configuration.
        let slices: Vec<SliceRecord> = template
            .slices
            .iter()
            .enumerate()
            .map(|(index, slice_type)| SliceRecord {
                slice_type: slice_type.clone(),
                id: self.config.slices[index].id,
                measurement_session_id: None,
            })
            .collect();

        self.status
            .load(
                EXPERIMENT_ID,
                start_time,
                stop_time,
                slices,
                template.applications.clone(),
            )
            .await;

        Ok(())
    }

    /// Load a template and spawn the execution engine for it.
    ///
    /// Fails when an experiment is already active. The returned slice list
    /// is a copy; later enrichment of the internal records is not visible
    /// through it.
    pub async fn start(
        &self,
        template: &NetworkSliceTemplate,
    ) -> Result<StartResponse, ExperimentError> {
        let mut slot = self.run_slot.lock().await;

        if slot.is_some() {
            return Err(ExperimentError::AlreadyRunning);
        }

        self.load(template).await?;

        let (start_time, stop_time) = self.status.schedule().await.ok_or_else(|| {
            ExperimentError::Validation("Invalid execution time in NST".to_string())
        })?;

        let (cancel, listener) = cancel_pair();
        let engine = ExecutionEngine::new(
            self.config.clone(),
            self.status.clone(),
            self.collaborators.clone(),
            listener,
            start_time,
            stop_time,
        );
        let task = tokio::spawn(engine.run());

        *slot = Some(RunHandle {
            id: EXPERIMENT_ID,
            cancel,
            task,
        });

        info!(
            "Experiment {} started for trial {}",
            EXPERIMENT_ID, template.trial_id
        );

        Ok(StartResponse {
            id: EXPERIMENT_ID,
            default_slice_id: self.config.default_slice_id,
            slices: self.status.slices().await,
        })
    }

    /// Cancel the running experiment, wait for the engine to exit, and
    /// return the accumulated log.
    pub async fn stop(&self, id: i64) -> Result<String, ExperimentError> {
        let mut slot = self.run_slot.lock().await;

        let handle = match slot.take() {
            Some(handle) if handle.id == id => handle,
            other => {
                *slot = other;
                return Err(ExperimentError::NotFound);
            }
        };

        handle.cancel.cancel();

        if let Err(e) = handle.task.await {
            error!("Experiment task failed to join cleanly: {}", e);
        }

        let log = self.status.drain_log().await;
        self.status.reset().await;

        info!("Experiment {} stopped", id);

        Ok(log)
    }

    /// Non-blocking status snapshot; the id is None when idle.
    pub async fn status(&self) -> StatusSnapshot {
        self.status.snapshot().await
    }
}

fn parse_template_time(value: &str) -> Result<DateTime<Utc>, ExperimentError> {
    NaiveDateTime::parse_from_str(value, TEMPLATE_TIME_FORMAT)
        .map(|dt| dt.and_utc())
        .map_err(|_| ExperimentError::Validation("Invalid execution time in NST".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Duration as TimeDelta;
    use uuid::Uuid;

    use crate::clients::{
        MockInferenceService, MockMeasurementService, MockSliceProvisioningService,
        MockTrafficShaper, MockWorkloadService,
    };
    use crate::config::{SliceConfig, Snssai};
    use crate::core::models::{Allocation, DirectionKpis, KpiRecord, SliceShare};
    use crate::core::state::ExperimentState;

    fn slice_config(id: &str, prefix: &str) -> SliceConfig {
        SliceConfig {
            id: Uuid::parse_str(id).unwrap(),
            snssai_list: vec![Snssai {
                sst: 1,
                sd: "000003".to_string(),
            }],
            downlink_interface: format!("{}-ranup-vhost", prefix),
            uplink_interface: format!("{}-n6-vhost", prefix),
        }
    }

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            listen_address: "[::]:5000".to_string(),
            update_interval_seconds: 1,
            max_downlink_bandwidth: 400_000,
            max_uplink_bandwidth: 60_000,
            default_slice_id: Uuid::parse_str("b84725bc-955a-44bb-9327-21c9d7eb5f65").unwrap(),
            slices: vec![
                slice_config("5480f617-8d26-4ece-8b5a-a811b08f0012", "upf4"),
                slice_config("c969da01-609b-4c71-ae96-1bece0ebf6c2", "upf5"),
            ],
            measurement_base_url: "http://localhost:8080".to_string(),
            measurement_profiles: vec![
                "conf/measurement1.json".into(),
                "conf/measurement2.json".into(),
            ],
            inference_base_url: "http://localhost:5001".to_string(),
            provisioning_base_url: "https://localhost:3000".to_string(),
            provisioning_template: "conf/slice.json".into(),
            workload_base_url: "http://localhost:5002".to_string(),
            shaper_host: "localhost".to_string(),
            shaper_port: 6640,
            provision_slices: false,
            manage_workloads: false,
        })
    }

    fn template(
        start_offset_secs: i64,
        stop_offset_secs: i64,
        slices: &[&str],
        apps: &[&str],
    ) -> NetworkSliceTemplate {
        let now = Utc::now();
        NetworkSliceTemplate {
            trial_id: 42,
            start_time: (now + TimeDelta::seconds(start_offset_secs))
                .format(TEMPLATE_TIME_FORMAT)
                .to_string(),
            stop_time: (now + TimeDelta::seconds(stop_offset_secs))
                .format(TEMPLATE_TIME_FORMAT)
                .to_string(),
            slices: slices.iter().map(|s| s.to_string()).collect(),
            applications: apps.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn sample_kpis() -> Vec<KpiRecord> {
        let direction = DirectionKpis {
            throughput: 2944.0,
            latency: 6.06,
            jitter: 0.705,
            packet_loss: 0.0,
        };
        vec![
            KpiRecord {
                downlink: direction.clone(),
                uplink: direction.clone(),
            },
            KpiRecord {
                downlink: direction.clone(),
                uplink: direction,
            },
        ]
    }

    fn sample_allocation() -> Allocation {
        Allocation {
            downlink: SliceShare {
                slice1: 0.3,
                slice2: 0.7,
            },
            uplink: SliceShare {
                slice1: 0.5,
                slice2: 0.5,
            },
        }
    }

    /// Measurement mock that accepts initialization and cleanup.
    fn benign_measurement() -> MockMeasurementService {
        let mut measurement = MockMeasurementService::new();
        measurement.expect_initialize().returning(|slices| {
            Ok(slices
                .iter()
                .cloned()
                .enumerate()
                .map(|(index, mut slice)| {
                    slice.measurement_session_id = Some(format!("session-{}", index + 1));
                    slice
                })
                .collect())
        });
        measurement.expect_cleanup().returning(|| Ok(()));
        measurement
    }

    fn benign_shaper() -> MockTrafficShaper {
        let mut shaper = MockTrafficShaper::new();
        shaper
            .expect_set_downlink_uplink_values()
            .returning(|_| Ok(()));
        shaper
    }

    fn controller(
        measurement: MockMeasurementService,
        inference: MockInferenceService,
        shaper: MockTrafficShaper,
    ) -> ExperimentController {
        // Provisioning and workloads are disabled in the test configuration,
        // so any call on these mocks fails the test.
        let collaborators = Collaborators {
            measurement: Arc::new(measurement),
            inference: Arc::new(inference),
            provisioning: Arc::new(MockSliceProvisioningService::new()),
            workload: Arc::new(MockWorkloadService::new()),
            shaper: Arc::new(shaper),
        };
        ExperimentController::new(test_config(), collaborators)
    }

    async fn wait_for_state(
        controller: &ExperimentController,
        state: ExperimentState,
        timeout: Duration,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if controller.status().await.state == state {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_load_accepts_valid_template() {
        let controller = controller(
            benign_measurement(),
            MockInferenceService::new(),
            benign_shaper(),
        );

        let nst = template(60, 120, &["eMBB", "uRLLC"], &["Nginx"]);
        controller.load(&nst).await.unwrap();

        let status = controller.status().await;
        assert_eq!(status.id, Some(EXPERIMENT_ID));
        assert_eq!(status.state, ExperimentState::Ready);
        assert_eq!(status.message, None);
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_schedules() {
        let controller = controller(
            benign_measurement(),
            MockInferenceService::new(),
            benign_shaper(),
        );

        // Start after stop
        let nst = template(120, 60, &["eMBB"], &[]);
        assert_eq!(
            controller.load(&nst).await,
            Err(ExperimentError::Validation(
                "Invalid execution time in NST".to_string()
            ))
        );

        // Start in the past
        let nst = template(-60, 120, &["eMBB"], &[]);
        assert!(controller.load(&nst).await.is_err());

        // Unparseable timestamp
        let mut nst = template(60, 120, &["eMBB"], &[]);
        nst.start_time = "yesterday".to_string();
        assert!(controller.load(&nst).await.is_err());

        // Failed loads must not mutate the idle status
        let status = controller.status().await;
        assert_eq!(status.id, None);
        assert_eq!(status.state, ExperimentState::Ready);
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_slice_and_app_lists() {
        let controller = controller(
            benign_measurement(),
            MockInferenceService::new(),
            benign_shaper(),
        );

        let nst = template(60, 120, &["eMBB", "uRLLC", "mMTC"], &[]);
        assert_eq!(
            controller.load(&nst).await,
            Err(ExperimentError::Validation(
                "Only up to 2 slices supported".to_string()
            ))
        );

        let nst = template(60, 120, &["eMBB", ""], &[]);
        assert_eq!(
            controller.load(&nst).await,
            Err(ExperimentError::Validation(
                "Invalid or no slice information in NST".to_string()
            ))
        );

        let nst = template(60, 120, &["eMBB"], &["a", "b", "c"]);
        assert_eq!(
            controller.load(&nst).await,
            Err(ExperimentError::Validation(
                "Only up to 2 applications supported".to_string()
            ))
        );

        assert_eq!(controller.status().await.id, None);
    }

    #[tokio::test]
    async fn test_load_resolves_slice_ids_positionally() {
        let controller = controller(
            benign_measurement(),
            MockInferenceService::new(),
            benign_shaper(),
        );

        let nst = template(60, 120, &["eMBB", "uRLLC"], &[]);
        let response = controller.start(&nst).await.unwrap();

        assert_eq!(response.id, EXPERIMENT_ID);
        assert_eq!(response.slices.len(), 2);
        assert_eq!(response.slices[0].slice_type, "eMBB");
        assert_eq!(response.slices[0].id, test_config().slices[0].id);
        assert_eq!(response.slices[1].id, test_config().slices[1].id);

        controller.stop(EXPERIMENT_ID).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_rejects_second_experiment() {
        let controller = controller(
            benign_measurement(),
            MockInferenceService::new(),
            benign_shaper(),
        );

        let nst = template(60, 120, &["eMBB"], &[]);
        controller.start(&nst).await.unwrap();

        assert_eq!(
            controller.start(&nst).await.unwrap_err(),
            ExperimentError::AlreadyRunning
        );

        controller.stop(EXPERIMENT_ID).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_requires_matching_id() {
        let controller = controller(
            benign_measurement(),
            MockInferenceService::new(),
            benign_shaper(),
        );

        // Nothing active yet
        assert_eq!(
            controller.stop(EXPERIMENT_ID).await.unwrap_err(),
            ExperimentError::NotFound
        );

        let nst = template(60, 120, &["eMBB"], &[]);
        controller.start(&nst).await.unwrap();

        assert_eq!(
            controller.stop(99).await.unwrap_err(),
            ExperimentError::NotFound
        );

        controller.stop(EXPERIMENT_ID).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_before_start_time_skips_execute() {
        let mut measurement = benign_measurement();
        measurement.expect_kpis_per_slice().never();
        let mut inference = MockInferenceService::new();
        inference.expect_process_kpis().never();

        let controller = controller(measurement, inference, benign_shaper());

        // Scheduled far enough out that the engine sits in the pre-start wait
        let nst = template(60, 120, &["eMBB", "uRLLC"], &[]);
        controller.start(&nst).await.unwrap();

        assert!(wait_for_state(&controller, ExperimentState::Initialize, Duration::from_secs(5)).await);

        let log = controller.stop(EXPERIMENT_ID).await.unwrap();
        assert!(log.is_empty());

        let status = controller.status().await;
        assert_eq!(status.id, None);
        assert_eq!(status.state, ExperimentState::Ready);
    }

    #[tokio::test]
    async fn test_single_slice_run_never_calls_inference() {
        let mut measurement = benign_measurement();
        measurement.expect_kpis_per_slice().never();
        let mut inference = MockInferenceService::new();
        inference.expect_process_kpis().never();

        let controller = controller(measurement, inference, benign_shaper());

        let nst = template(1, 2, &["eMBB"], &[]);
        controller.start(&nst).await.unwrap();

        assert!(wait_for_state(&controller, ExperimentState::Done, Duration::from_secs(15)).await);

        let log = controller.stop(EXPERIMENT_ID).await.unwrap();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_closed_loop_logs_kpis_and_allocations() {
        let mut measurement = benign_measurement();
        measurement
            .expect_kpis_per_slice()
            .returning(|| Ok(sample_kpis()));
        let mut inference = MockInferenceService::new();
        inference
            .expect_process_kpis()
            .returning(|_| Ok(sample_allocation()));

        let controller = controller(measurement, inference, benign_shaper());

        let nst = template(1, 3, &["eMBB", "uRLLC"], &[]);
        controller.start(&nst).await.unwrap();

        assert!(wait_for_state(&controller, ExperimentState::Done, Duration::from_secs(15)).await);

        let log = controller.stop(EXPERIMENT_ID).await.unwrap();
        assert!(log.contains("Got KPIs from measurement service"));
        assert!(log.contains("Set DL slice allocation"));
        assert!(log.contains("Set UL slice allocation"));
        assert!(log.contains("Slice1=0.3, Slice2=0.7"));
    }

    #[tokio::test]
    async fn test_failed_cycle_does_not_abort_the_run() {
        let mut measurement = benign_measurement();
        measurement
            .expect_kpis_per_slice()
            .times(1)
            .returning(|| Err(ExperimentError::Remote("measurement outage".to_string())));
        measurement
            .expect_kpis_per_slice()
            .returning(|| Ok(sample_kpis()));
        let mut inference = MockInferenceService::new();
        inference
            .expect_process_kpis()
            .returning(|_| Ok(sample_allocation()));

        let controller = controller(measurement, inference, benign_shaper());

        let nst = template(1, 4, &["eMBB", "uRLLC"], &[]);
        controller.start(&nst).await.unwrap();

        assert!(wait_for_state(&controller, ExperimentState::Done, Duration::from_secs(20)).await);

        // The cycle after the outage still produced shaping commands
        let log = controller.stop(EXPERIMENT_ID).await.unwrap();
        assert!(log.contains("Set DL slice allocation"));
    }

    #[tokio::test]
    async fn test_initialize_failure_lands_in_error_state() {
        let mut measurement = MockMeasurementService::new();
        measurement
            .expect_initialize()
            .returning(|_| Err(ExperimentError::Remote("no sessions today".to_string())));
        measurement.expect_cleanup().returning(|| Ok(()));
        let mut inference = MockInferenceService::new();
        inference.expect_process_kpis().never();

        let controller = controller(measurement, inference, benign_shaper());

        let nst = template(1, 3, &["eMBB", "uRLLC"], &[]);
        controller.start(&nst).await.unwrap();

        assert!(wait_for_state(&controller, ExperimentState::Error, Duration::from_secs(10)).await);
        let status = controller.status().await;
        assert_eq!(status.message.as_deref(), Some("no sessions today"));

        // The log survives the failure and is returned by stop
        controller.stop(EXPERIMENT_ID).await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_accepted_after_stop() {
        let controller = controller(
            benign_measurement(),
            MockInferenceService::new(),
            benign_shaper(),
        );

        let nst = template(60, 120, &["eMBB"], &[]);
        controller.start(&nst).await.unwrap();
        controller.stop(EXPERIMENT_ID).await.unwrap();

        assert_eq!(controller.status().await.state, ExperimentState::Ready);

        controller.start(&nst).await.unwrap();
        controller.stop(EXPERIMENT_ID).await.unwrap();
    }
}
