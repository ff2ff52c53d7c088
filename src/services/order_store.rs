use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::models::{NormalizedOrder, OrderRecord, Review};

/// Result of writing one accepted delivery into the store.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// First delivery for this order id
    Created(OrderRecord),
    /// A record already existed and was refreshed in place
    Refreshed(OrderRecord),
}

impl UpsertOutcome {
    pub fn record(&self) -> &OrderRecord {
        match self {
            UpsertOutcome::Created(record) | UpsertOutcome::Refreshed(record) => record,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, UpsertOutcome::Created(_))
    }
}

/// In-process table of order records keyed by external order id.
///
/// Every read-modify-write goes through a DashMap entry or `get_mut` guard,
/// which holds the shard lock for that key, so concurrent deliveries for one
/// order id always resolve to a single record. Guards are never held across
/// an `.await`.
#[derive(Clone, Default)]
pub struct OrderStore {
    records: Arc<DashMap<String, OrderRecord>>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the record on first delivery, otherwise refreshes it in place.
    pub fn upsert(&self, order: NormalizedOrder, access_token: String) -> UpsertOutcome {
        match self.records.entry(order.order_id.clone()) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                record.refresh(order);
                debug!(order_id = %record.order_id(), deliveries = record.deliveries, "Refreshed order record");
                UpsertOutcome::Refreshed(record.clone())
            }
            Entry::Vacant(entry) => {
                let record = entry.insert(OrderRecord::new(order, access_token));
                debug!(order_id = %record.order_id(), "Created order record");
                UpsertOutcome::Created(record.clone())
            }
        }
    }

    /// Returns a snapshot of the record.
    pub fn get(&self, order_id: &str) -> Option<OrderRecord> {
        self.records.get(order_id).map(|r| r.value().clone())
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.records.contains_key(order_id)
    }

    /// Runs `f` with exclusive access to one record.
    pub fn update<F, R>(&self, order_id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut OrderRecord) -> R,
    {
        self.records.get_mut(order_id).map(|mut r| f(r.value_mut()))
    }

    /// `Some(true)` when this call completed the order, `Some(false)` when it
    /// was already completed, `None` when the order is unknown.
    pub fn mark_completed(&self, order_id: &str) -> Option<bool> {
        self.update(order_id, |record| record.mark_completed())
    }

    pub fn submit_review(&self, order_id: &str, review: Review) -> Option<OrderRecord> {
        self.update(order_id, |record| {
            record.review = Some(review);
            record.clone()
        })
    }

    pub fn confirm_email(&self, order_id: &str, email: &str) -> Option<bool> {
        self.update(order_id, |record| record.confirm_email(email))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
