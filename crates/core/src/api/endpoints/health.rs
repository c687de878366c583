use axum::{Extension, Json, response::IntoResponse};
use serde::Serialize;

use crate::api::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Connected `/watch` clients
    pub clients: usize,
    /// Replay boundary a client connecting now would get
    pub cursor: u64,
}

/// GET /health
pub async fn health_handler(Extension(state): Extension<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        clients: state.registry.len(),
        cursor: state.registry.cursor().load(),
    })
}
