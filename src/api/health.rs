use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub database: String,
    pub timestamp: i64,
}

#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct ExampleResponse {
    pub message: String,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
pub async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let (healthy, database) = match state.store.ping().await {
        Ok(()) => (true, "connected".to_string()),
        Err(e) => {
            log::error!("❌ Health check failed: {}", e);
            (false, "unreachable".to_string())
        }
    };

    let body = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        service: "course-notifier".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
        timestamp: chrono::Utc::now().timestamp(),
    };

    if healthy {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

#[utoipa::path(
    get,
    path = "/get_example",
    tag = "Health",
    responses(
        (status = 200, description = "Static liveness payload", body = ExampleResponse)
    )
)]
pub async fn get_example() -> impl Responder {
    HttpResponse::Ok().json(ExampleResponse {
        message: "This is a GET endpoint for testing.".to_string(),
    })
}
