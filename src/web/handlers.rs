//! HTTP handlers for the experiment API.

use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;

use crate::core::error::ExperimentError;
use crate::core::models::NetworkSliceTemplate;
use crate::web::server::AppState;

/// Service banner
pub async fn root() -> impl Responder {
    "Network Slicing Testbed API"
}

/// List experiments: empty when idle, else the single active run.
pub async fn list_experiments(app_state: web::Data<AppState>) -> impl Responder {
    let status = app_state.controller.status().await;

    match status.id {
        Some(_) => HttpResponse::Ok().json(json!([status])),
        None => HttpResponse::Ok().json(json!([])),
    }
}

/// Read the status of one experiment.
pub async fn read_experiment(
    app_state: web::Data<AppState>,
    path: web::Path<i64>,
) -> impl Responder {
    let id = path.into_inner();
    let status = app_state.controller.status().await;

    if status.id != Some(id) {
        return HttpResponse::NotFound().body(ExperimentError::NotFound.to_string());
    }

    HttpResponse::Ok().json(status)
}

/// Form payload carrying the Network Slice Template as a JSON string.
#[derive(Debug, Deserialize)]
pub struct CreateExperimentForm {
    pub nst: String,
}

/// Start an experiment from a submitted template.
pub async fn create_experiment(
    app_state: web::Data<AppState>,
    form: web::Form<CreateExperimentForm>,
) -> impl Responder {
    let template: NetworkSliceTemplate = match serde_json::from_str(&form.nst) {
        Ok(template) => template,
        Err(e) => return HttpResponse::BadRequest().body(format!("Invalid NST: {}", e)),
    };

    match app_state.controller.start(&template).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => HttpResponse::BadRequest().body(e.to_string()),
    }
}

/// Stop an experiment and return its accumulated log as plain text.
pub async fn delete_experiment(
    app_state: web::Data<AppState>,
    path: web::Path<i64>,
) -> impl Responder {
    match app_state.controller.stop(path.into_inner()).await {
        Ok(log) => HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .body(log),
        Err(e) => HttpResponse::NotFound().body(e.to_string()),
    }
}
