pub mod chat;
pub mod health;
pub mod receipts;
pub mod reviews;
pub mod support;
pub mod webhooks;

use serde::Deserialize;

use crate::errors::ServiceError;
use crate::models::OrderRecord;
use crate::AppState;

/// `{order, token}` pair carried by every buyer-initiated POST.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderAccess {
    pub order: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// Verifies the order token, then loads the record.
///
/// Bad tokens are rejected before the store is consulted, so an unknown
/// order id with a forged token never reveals whether the order exists.
pub(crate) fn authorize_order(
    state: &AppState,
    order_id: &str,
    token: Option<&str>,
) -> Result<OrderRecord, ServiceError> {
    if !state.tokens.verify_opt(order_id, token) {
        return Err(ServiceError::Forbidden("Invalid order token".to_string()));
    }
    state
        .store
        .get(order_id)
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
}
