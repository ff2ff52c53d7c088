use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::{error, warn};

use crate::errors::ServiceError;
use crate::services::intake::{IntakeOutcome, WebhookEnvelope};
use crate::AppState;

// POST /webhook
//
// Acknowledges every well-formed delivery with 200 so the storefront does
// not retry on partial downstream failures. Only a fault inside intake
// produces a 500.
pub async fn order_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let envelope: WebhookEnvelope = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Rejected webhook with invalid JSON body");
        ServiceError::BadRequest(format!("invalid json: {}", e))
    })?;

    let response = match state.intake.ingest(envelope) {
        Ok(IntakeOutcome::Ignored { .. }) => (StatusCode::OK, Json(json!({"message": "Ignored"}))),
        Ok(IntakeOutcome::Created { .. } | IntakeOutcome::Refreshed { .. }) => {
            (StatusCode::OK, Json(json!({"message": "OK"})))
        }
        Err(e) => {
            error!(error = %e, "Webhook processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"message": "Webhook processing failed"})),
            )
        }
    };
    Ok(response)
}
