use chrono::Utc;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::models::OrderRecord;
use crate::services::actions::{ActionReport, SideEffects};
use crate::services::extraction::{self, ExtractionError, ExtractionSettings};
use crate::services::order_store::{OrderStore, UpsertOutcome};
use crate::token::TokenIssuer;

/// Event names that signal a paid order. Both are handled identically.
pub const ACCEPTED_EVENTS: &[&str] = &["order.paid", "order.completed"];

/// Inbound webhook body: `{ "event": ..., "data": {...} }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default, deserialize_with = "event_name")]
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// A non-string `event` is read as empty so it takes the ignored path.
fn event_name<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(event) => event,
        _ => String::new(),
    })
}

#[derive(Debug)]
pub enum IntakeOutcome {
    /// Event type is not a paid-order signal; nothing was recorded.
    Ignored { event: String },
    /// First delivery for this order. Side effects run on `effects`.
    Created {
        record: OrderRecord,
        effects: JoinHandle<Vec<ActionReport>>,
    },
    /// Redelivery; the record was refreshed and no side effects were started.
    Refreshed { record: OrderRecord },
}

impl IntakeOutcome {
    pub fn record(&self) -> Option<&OrderRecord> {
        match self {
            IntakeOutcome::Ignored { .. } => None,
            IntakeOutcome::Created { record, .. } | IntakeOutcome::Refreshed { record } => {
                Some(record)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

pub fn is_accepted_event(event: &str) -> bool {
    let event = event.trim();
    ACCEPTED_EVENTS
        .iter()
        .any(|accepted| accepted.eq_ignore_ascii_case(event))
}

/// Webhook Intake Pipeline: accept, extract, record, then fan out side effects.
#[derive(Clone)]
pub struct IntakePipeline {
    settings: ExtractionSettings,
    tokens: TokenIssuer,
    store: OrderStore,
    effects: SideEffects,
}

impl IntakePipeline {
    pub fn new(
        settings: ExtractionSettings,
        tokens: TokenIssuer,
        store: OrderStore,
        effects: SideEffects,
    ) -> Self {
        Self {
            settings,
            tokens,
            store,
            effects,
        }
    }

    #[instrument(skip(self, envelope), fields(event = %envelope.event))]
    pub fn ingest(&self, envelope: WebhookEnvelope) -> Result<IntakeOutcome, IntakeError> {
        if !is_accepted_event(&envelope.event) {
            info!("Ignoring webhook event");
            return Ok(IntakeOutcome::Ignored {
                event: envelope.event,
            });
        }

        let order = extraction::extract_order(&envelope.data, &self.settings, Utc::now())
            .map_err(|e| {
                warn!(error = %e, "Accepted webhook could not be normalized");
                e
            })?;
        let token = self.tokens.issue(&order.order_id);

        match self.store.upsert(order, token) {
            UpsertOutcome::Created(record) => {
                info!(order_id = %record.order_id(), "Order recorded");
                let effects = self.effects.spawn(record.clone());
                Ok(IntakeOutcome::Created { record, effects })
            }
            UpsertOutcome::Refreshed(record) => {
                info!(
                    order_id = %record.order_id(),
                    deliveries = record.deliveries,
                    "Duplicate delivery refreshed existing order"
                );
                Ok(IntakeOutcome::Refreshed { record })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use assert_matches::assert_matches;
    use rstest::rstest;
    use serde_json::json;

    fn pipeline() -> (IntakePipeline, OrderStore) {
        let cfg = AppConfig::new("a-long-enough-receipt-secret");
        let store = OrderStore::new();
        let pipeline = IntakePipeline::new(
            ExtractionSettings::from_config(&cfg),
            TokenIssuer::new(&cfg.receipt_secret),
            store.clone(),
            SideEffects::from_config(&cfg, None).unwrap(),
        );
        (pipeline, store)
    }

    fn envelope(event: &str, data: Value) -> WebhookEnvelope {
        WebhookEnvelope {
            event: event.to_string(),
            data,
        }
    }

    #[rstest]
    #[case("order.paid", true)]
    #[case("order.completed", true)]
    #[case(" ORDER.PAID ", true)]
    #[case("order.created", false)]
    #[case("", false)]
    fn accepts_only_paid_events(#[case] event: &str, #[case] accepted: bool) {
        assert_eq!(is_accepted_event(event), accepted);
    }

    #[rstest]
    #[case(json!({"event": null, "data": {"id": "1"}}))]
    #[case(json!({"event": 42, "data": {"id": "1"}}))]
    #[case(json!({"event": ["order.paid"], "data": {"id": "1"}}))]
    #[case(json!({"data": {"id": "1"}}))]
    fn non_string_event_reads_as_empty(#[case] body: Value) {
        let envelope: WebhookEnvelope = serde_json::from_value(body).unwrap();
        assert_eq!(envelope.event, "");
        assert!(!is_accepted_event(&envelope.event));
    }

    #[tokio::test]
    async fn ignored_event_leaves_store_untouched() {
        let (pipeline, store) = pipeline();
        let outcome = pipeline
            .ingest(envelope("order.created", json!({"id": "1001"})))
            .unwrap();
        assert_matches!(outcome, IntakeOutcome::Ignored { ref event } if event == "order.created");
        assert!(!store.contains("1001"));
    }

    #[tokio::test]
    async fn redelivery_refreshes_without_side_effects() {
        let (pipeline, store) = pipeline();
        let first = pipeline
            .ingest(envelope("order.paid", json!({"id": "1001"})))
            .unwrap();
        let IntakeOutcome::Created { record, effects } = first else {
            panic!("first delivery should create the record");
        };
        assert_eq!(effects.await.unwrap().len(), 3);

        let second = pipeline
            .ingest(envelope("order.completed", json!({"id": "1001", "coupon_code": "X"})))
            .unwrap();
        assert_matches!(second, IntakeOutcome::Refreshed { ref record } if record.coupon == "X");
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("1001").unwrap().access_token(), record.access_token());
    }

    #[tokio::test]
    async fn accepted_event_without_order_id_is_a_fault() {
        let (pipeline, store) = pipeline();
        let err = pipeline
            .ingest(envelope("order.paid", json!({"customer_information": {}})))
            .unwrap_err();
        assert_matches!(err, IntakeError::Extraction(ExtractionError::MissingOrderId));
        assert!(store.is_empty());
    }
}
