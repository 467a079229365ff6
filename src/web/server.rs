use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};
use log::info;

use crate::core::experiment::ExperimentController;
use crate::web::handlers;

/// Shared application state for web handlers
pub struct AppState {
    pub controller: Arc<ExperimentController>,
}

/// Start the web server exposing the experiment API.
pub async fn start_web_server(
    controller: Arc<ExperimentController>,
    listen_address: String,
) -> std::io::Result<()> {
    info!("Starting web server on {}", listen_address);

    // Create shared application state
    let app_state = web::Data::new(AppState { controller });

    let server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(app_state.clone())
            .route("/", web::get().to(handlers::root))
            .route("/experiment", web::get().to(handlers::list_experiments))
            .route("/experiment", web::post().to(handlers::create_experiment))
            .route("/experiment/{id}", web::get().to(handlers::read_experiment))
            .route(
                "/experiment/{id}",
                web::delete().to(handlers::delete_experiment),
            )
    })
    .bind(listen_address.as_str())?
    .run();

    server.await
}
