use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use validator::Validate;

use crate::errors::ServiceError;
use crate::handlers::authorize_order;
use crate::models::Review;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewRequest {
    pub order: String,
    #[serde(default)]
    pub token: Option<String>,
    #[validate(range(min = 1, max = 5))]
    pub rating: i64,
    #[validate(length(max = 1000))]
    #[serde(default)]
    pub text: Option<String>,
}

// POST /review
pub async fn submit_review(
    State(state): State<AppState>,
    Json(req): Json<ReviewRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    req.validate()?;
    authorize_order(&state, &req.order, req.token.as_deref())?;

    let rating = u8::try_from(req.rating)
        .map_err(|_| ServiceError::ValidationError("rating out of range".to_string()))?;
    let review = Review {
        rating,
        text: req
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()),
        submitted_at: Utc::now(),
    };

    let record = state
        .store
        .submit_review(&req.order, review)
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", req.order)))?;
    info!(order_id = %record.order_id(), rating, "Review stored");

    Ok(Json(json!({"message": "Review saved", "review": record.review})))
}
