use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: String,
    pub version: String,
    pub labels: usize,
}

/// Liveness probe; a running server always has a loaded artifact
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let header = state.service.artifact().header();
    Json(HealthResponse {
        status: "ok",
        model: header.name.clone(),
        version: header.version.clone(),
        labels: header.labels.len(),
    })
}
