//! Health handler

use crate::api::rest::state::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: String,
    pub uptime: String,
    pub compile_timeout_ms: u64,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "ok",
        service: "tealforge-daemon",
        version: state.version.clone(),
        uptime: state.uptime(),
        compile_timeout_ms: state.compiler.timeout().as_millis() as u64,
    })
}
