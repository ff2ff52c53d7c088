use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money;

/// Payment state reported by the storefront. Paid and completed events are
/// treated identically, so only one state exists today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
}

impl PaymentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "Paid",
        }
    }
}

/// One purchased product variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub name: String,
    pub quantity: u32,
    /// Unit price in minor units of the order's primary currency
    pub unit_price: Option<i64>,
    /// Buyer-supplied attribute matched by the configured keyword
    pub buyer_attribute: String,
}

impl OrderLine {
    pub fn line_total(&self) -> Option<i64> {
        self.unit_price
            .map(|price| price.saturating_mul(i64::from(self.quantity)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerInfo {
    pub email: String,
    pub country: String,
    /// Chat-platform handle (e.g. Discord username)
    pub handle: String,
    /// Chat-platform user id, required for role grants and tickets
    pub platform_user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub currency: String,
    /// Total in minor units of `currency`
    pub amount: Option<i64>,
    pub secondary_currency: String,
    /// Total in minor units of `secondary_currency`
    pub secondary_amount: Option<i64>,
    /// True when `secondary_amount` was computed with an approximate rate
    pub secondary_is_estimate: bool,
}

impl OrderTotals {
    pub fn display_primary(&self) -> String {
        money::display(self.amount, &self.currency)
    }

    pub fn display_secondary(&self) -> String {
        if self.secondary_amount.is_none() {
            return format!("Not available in {}", self.secondary_currency);
        }
        let value = money::display(self.secondary_amount, &self.secondary_currency);
        if self.secondary_is_estimate {
            format!("≈ {} (estimate)", value)
        } else {
            value
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub rating: u8,
    pub text: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Fields extracted from one webhook delivery, before any local state is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedOrder {
    pub order_id: String,
    pub lines: Vec<OrderLine>,
    pub buyer: BuyerInfo,
    pub coupon: String,
    pub totals: OrderTotals,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// The stored snapshot of one external order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    order_id: String,
    pub lines: Vec<OrderLine>,
    pub buyer: BuyerInfo,
    pub coupon: String,
    pub totals: OrderTotals,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    access_token: String,
    completed_at: Option<DateTime<Utc>>,
    pub review: Option<Review>,
    email_confirmed_at: Option<DateTime<Utc>>,
    pub deliveries: u32,
    pub last_delivery_at: DateTime<Utc>,
}

impl OrderRecord {
    pub fn new(order: NormalizedOrder, access_token: String) -> Self {
        Self {
            order_id: order.order_id,
            lines: order.lines,
            buyer: order.buyer,
            coupon: order.coupon,
            totals: order.totals,
            payment_status: order.payment_status,
            created_at: order.created_at,
            access_token,
            completed_at: None,
            review: None,
            email_confirmed_at: None,
            deliveries: 1,
            last_delivery_at: Utc::now(),
        }
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Re-applies a later delivery for the same order in place.
    ///
    /// Identity, token, completion, review and email confirmation survive.
    pub fn refresh(&mut self, order: NormalizedOrder) {
        debug_assert_eq!(order.order_id, self.order_id);
        self.lines = order.lines;
        self.buyer = order.buyer;
        self.coupon = order.coupon;
        self.totals = order.totals;
        self.payment_status = order.payment_status;
        self.created_at = order.created_at;
        self.deliveries = self.deliveries.saturating_add(1);
        self.last_delivery_at = Utc::now();
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Marks the order completed. Returns `true` only on the first call.
    pub fn mark_completed(&mut self) -> bool {
        if self.completed_at.is_some() {
            return false;
        }
        self.completed_at = Some(Utc::now());
        true
    }

    pub fn email_confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.email_confirmed_at
    }

    /// Records an email confirmation if the address matches the buyer email.
    pub fn confirm_email(&mut self, email: &str) -> bool {
        let matches = email
            .trim()
            .eq_ignore_ascii_case(self.buyer.email.trim());
        if matches && self.email_confirmed_at.is_none() {
            self.email_confirmed_at = Some(Utc::now());
        }
        matches
    }

    pub fn masked_email(&self) -> String {
        mask_email(&self.buyer.email)
    }

    /// Creation time as an RFC-1123 UTC string.
    pub fn created_at_display(&self) -> String {
        self.created_at
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string()
    }

    pub fn primary_line(&self) -> Option<&OrderLine> {
        self.lines.first()
    }

    pub fn product_summary(&self) -> String {
        if self.lines.is_empty() {
            return "Unknown".to_string();
        }
        self.lines
            .iter()
            .map(|line| format!("{} × {}", line.name, line.quantity))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn total_quantity(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }
}

/// Keeps the first three characters of the local part and the full domain.
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let prefix: String = local.chars().take(3).collect();
            format!("{}***@{}", prefix, domain)
        }
        None => "Unknown".to_string(),
    }
}
