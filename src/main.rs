use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use log::{error, info};

mod clients;
mod config;
mod core;
mod web;

use crate::clients::inference::InferenceClient;
use crate::clients::measurement::MeasurementClient;
use crate::clients::provisioning::ProvisioningClient;
use crate::clients::shaper::ShaperClient;
use crate::clients::workload::WorkloadClient;
use crate::clients::Collaborators;
use crate::config::Config;
use crate::core::experiment::ExperimentController;
use crate::web::server::start_web_server;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    info!("Starting network slicing testbed controller...");

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("conf/config.json"));

    let config = match Config::from_file(&config_path) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    info!("Configuration loaded from {}", config_path.display());

    let provisioning = match ProvisioningClient::new(&config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    let collaborators = Collaborators {
        measurement: Arc::new(MeasurementClient::new(&config)),
        inference: Arc::new(InferenceClient::new(&config)),
        provisioning,
        workload: Arc::new(WorkloadClient::new(&config)),
        shaper: Arc::new(ShaperClient::new(&config)),
    };

    let controller = Arc::new(ExperimentController::new(config.clone(), collaborators));
    info!("Experiment controller initialized");

    let web_server_handle = tokio::spawn(start_web_server(
        controller.clone(),
        config.listen_address.clone(),
    ));

    info!("Testbed controller is now running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for Ctrl+C");

    info!("Shutting down testbed controller...");

    // Stop a run that is still active so collaborators are torn down
    let status = controller.status().await;
    if let Some(id) = status.id {
        if let Err(e) = controller.stop(id).await {
            error!("Error stopping the active experiment: {}", e);
        }
    }

    web_server_handle.abort();

    info!("Testbed controller shutdown complete");
}
