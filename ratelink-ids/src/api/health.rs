//! Liveness, readiness and fetcher status endpoints

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::error::{ApiResult, RETRY_AFTER_SECS};
use crate::services::FetchStatus;
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "ratelink-ids".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
    })
}

/// GET /ready
pub async fn readiness(State(state): State<AppState>) -> Response {
    if state.service.is_ready().await {
        (StatusCode::OK, Json(json!({"status": "ready"}))).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "initializing"}))).into_response()
    }
}

/// GET /wait
///
/// Polling variant of `/ready`: 202 with `Retry-After` until ready.
pub async fn wait_ready(State(state): State<AppState>) -> Response {
    if state.service.is_ready().await {
        (StatusCode::OK, Json(json!({"status": "ready"}))).into_response()
    } else {
        (
            StatusCode::ACCEPTED,
            [(header::RETRY_AFTER, RETRY_AFTER_SECS.to_string())],
            Json(json!({"status": "processing"})),
        )
            .into_response()
    }
}

/// GET /fetch/status
pub async fn fetch_status(State(state): State<AppState>) -> ApiResult<Json<FetchStatus>> {
    Ok(Json(state.service.fetch_status().await?))
}

pub fn status_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness))
        .route("/wait", get(wait_ready))
        .route("/fetch/status", get(fetch_status))
}
