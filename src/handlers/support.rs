use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;

use crate::errors::ServiceError;
use crate::handlers::{authorize_order, OrderAccess};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct TicketResponse {
    pub status: &'static str,
    pub detail: String,
}

// POST /support/ticket
pub async fn open_ticket(
    State(state): State<AppState>,
    Json(req): Json<OrderAccess>,
) -> Result<impl IntoResponse, ServiceError> {
    let record = authorize_order(&state, &req.order, req.token.as_deref())?;
    let outcome = state.effects.open_ticket(&record).await;

    Ok(Json(TicketResponse {
        status: outcome.status(),
        detail: outcome
            .detail()
            .unwrap_or("Support ticket opened")
            .to_string(),
    }))
}
