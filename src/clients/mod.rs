//! Clients for the external testbed services.
//!
//! The execution engine consumes these through service traits so tests can
//! substitute collaborators for the real endpoints.

pub mod inference;
pub mod measurement;
pub mod provisioning;
pub mod shaper;
pub mod workload;

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::core::error::ExperimentError;
use crate::core::models::{Allocation, KpiRecord, ShapingCommand, SliceRecord};

/// QoS measurement service: session management and KPI retrieval.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MeasurementService: Send + Sync {
    /// Start one measurement session per slice. Returns the slices enriched
    /// with their session identifiers.
    async fn initialize(&self, slices: &[SliceRecord]) -> Result<Vec<SliceRecord>, ExperimentError>;

    /// Stop all running measurement sessions.
    async fn cleanup(&self) -> Result<(), ExperimentError>;

    /// Latest KPI record per slice, ordered to match the configured slices.
    async fn kpis_per_slice(&self) -> Result<Vec<KpiRecord>, ExperimentError>;
}

/// ML resource allocator.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn process_kpis(&self, kpis: &[KpiRecord]) -> Result<Allocation, ExperimentError>;
}

/// Network-slice instance management in the 5G core.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SliceProvisioningService: Send + Sync {
    async fn initialize(&self) -> Result<(), ExperimentError>;
    async fn cleanup(&self) -> Result<(), ExperimentError>;
}

/// NFV orchestrator booting application VMs.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkloadService: Send + Sync {
    async fn initialize(&self, apps: &[String]) -> Result<(), ExperimentError>;
    async fn cleanup(&self) -> Result<(), ExperimentError>;
}

/// Ingress traffic shaper.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TrafficShaper: Send + Sync {
    /// Apply one command per configured slice, in order.
    async fn set_downlink_uplink_values(
        &self,
        commands: &[ShapingCommand],
    ) -> Result<(), ExperimentError>;
}

/// The set of collaborators the engine calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub measurement: Arc<dyn MeasurementService>,
    pub inference: Arc<dyn InferenceService>,
    pub provisioning: Arc<dyn SliceProvisioningService>,
    pub workload: Arc<dyn WorkloadService>,
    pub shaper: Arc<dyn TrafficShaper>,
}
