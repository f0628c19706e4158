//! HTTP and WebSocket handlers

pub mod keys;
pub mod ws;

use crate::core::config::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub online: usize,
    pub published_keys: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        online: state.hub.registry().online_count(),
        published_keys: state.hub.keys().len(),
    })
}
