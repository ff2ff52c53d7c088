use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub orders: usize,
    pub timestamp: String,
}

// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "up",
        orders: state.store.len(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
