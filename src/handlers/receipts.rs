use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::errors::ServiceError;
use crate::handlers::authorize_order;
use crate::pages::ReceiptView;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ReceiptQuery {
    pub order: Option<String>,
    pub token: Option<String>,
}

/// Builds `/receipt?order=..&token=..` with the query properly encoded.
pub fn receipt_link(order_id: &str, token: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("order", order_id)
        .append_pair("token", token)
        .finish();
    format!("/receipt?{}", query)
}

fn page(status: StatusCode, html: Result<String, ServiceError>) -> Result<Response, ServiceError> {
    Ok((status, Html(html?)).into_response())
}

// GET /success?order=<id>
//
// Landing page after checkout. The order may not have been delivered by
// webhook yet, so the redirect does not look at the store.
pub async fn success(
    State(state): State<AppState>,
    Query(query): Query<ReceiptQuery>,
) -> Result<Response, ServiceError> {
    let Some(order_id) = query.order.filter(|o| !o.trim().is_empty()) else {
        return page(
            StatusCode::FORBIDDEN,
            state.pages.unauthorized(&state.config.store_name),
        );
    };
    let token = state.tokens.issue(&order_id);
    Ok(Redirect::to(&receipt_link(&order_id, &token)).into_response())
}

// GET /receipt?order=<id>&token=<t>
pub async fn receipt(
    State(state): State<AppState>,
    Query(query): Query<ReceiptQuery>,
) -> Result<Response, ServiceError> {
    let store_name = &state.config.store_name;
    let Some(order_id) = query.order.as_deref() else {
        return page(StatusCode::FORBIDDEN, state.pages.unauthorized(store_name));
    };

    if !state.tokens.verify_opt(order_id, query.token.as_deref()) {
        info!(%order_id, "Receipt requested with invalid token");
        return page(StatusCode::FORBIDDEN, state.pages.unauthorized(store_name));
    }

    let Some(record) = state.store.get(order_id) else {
        debug!(%order_id, "Receipt requested before webhook delivery");
        return page(StatusCode::NOT_FOUND, state.pages.not_found(store_name, order_id));
    };

    let view = ReceiptView::new(
        &record,
        store_name,
        &state.config.attribute_keyword,
        state.config.community_invite_url.as_deref(),
    );
    page(StatusCode::OK, state.pages.receipt(&view))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmEmailRequest {
    pub order: String,
    #[serde(default)]
    pub token: Option<String>,
    pub email: String,
}

// POST /receipt/confirm-email
pub async fn confirm_email(
    State(state): State<AppState>,
    Json(req): Json<ConfirmEmailRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    authorize_order(&state, &req.order, req.token.as_deref())?;

    match state.store.confirm_email(&req.order, &req.email) {
        Some(true) => {
            info!(order_id = %req.order, "Buyer email confirmed");
            Ok(Json(json!({"confirmed": true})))
        }
        Some(false) => Err(ServiceError::BadRequest(
            "Email does not match this order".to_string(),
        )),
        None => Err(ServiceError::NotFound(format!("Order {} not found", req.order))),
    }
}
