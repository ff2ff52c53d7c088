//! HTML pages rendered for buyers. Templates live in `templates/` and are
//! compiled into the binary; `.html` templates are auto-escaped.

use minijinja::{context, Environment};
use serde::Serialize;
use std::sync::Arc;

use crate::errors::ServiceError;
use crate::models::OrderRecord;
use crate::money;

const TEMPLATES: &[(&str, &str)] = &[
    ("layout.html", include_str!("../templates/layout.html")),
    ("receipt.html", include_str!("../templates/receipt.html")),
    ("unauthorized.html", include_str!("../templates/unauthorized.html")),
    ("not_found.html", include_str!("../templates/not_found.html")),
];

#[derive(Debug, Serialize)]
struct LineView {
    name: String,
    quantity: u32,
    unit_price: String,
    line_total: String,
    attribute: String,
}

#[derive(Debug, Serialize)]
struct ReviewView {
    rating: u8,
    stars: String,
    text: Option<String>,
    submitted_at: String,
}

/// Everything the receipt template displays.
#[derive(Debug, Serialize)]
pub struct ReceiptView {
    store_name: String,
    order_id: String,
    token: String,
    attribute_label: String,
    lines: Vec<LineView>,
    total: String,
    estimate: String,
    coupon: String,
    masked_email: String,
    country: String,
    handle: String,
    payment_status: &'static str,
    created_at: String,
    completed: bool,
    completed_at: Option<String>,
    email_confirmed: bool,
    review: Option<ReviewView>,
    invite_url: Option<String>,
}

impl ReceiptView {
    pub fn new(
        record: &OrderRecord,
        store_name: &str,
        attribute_keyword: &str,
        invite_url: Option<&str>,
    ) -> Self {
        let currency = &record.totals.currency;
        let rfc1123 = |at: chrono::DateTime<chrono::Utc>| {
            at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
        };
        let price = |amount: Option<i64>| match amount {
            Some(_) => money::display(amount, currency),
            None => "—".to_string(),
        };

        Self {
            store_name: store_name.to_string(),
            order_id: record.order_id().to_string(),
            token: record.access_token().to_string(),
            attribute_label: attribute_label(attribute_keyword),
            lines: record
                .lines
                .iter()
                .map(|line| LineView {
                    name: line.name.clone(),
                    quantity: line.quantity,
                    unit_price: price(line.unit_price),
                    line_total: price(line.line_total()),
                    attribute: line.buyer_attribute.clone(),
                })
                .collect(),
            total: record.totals.display_primary(),
            estimate: record.totals.display_secondary(),
            coupon: record.coupon.clone(),
            masked_email: record.masked_email(),
            country: record.buyer.country.clone(),
            handle: record.buyer.handle.clone(),
            payment_status: record.payment_status.label(),
            created_at: record.created_at_display(),
            completed: record.is_completed(),
            completed_at: record.completed_at().map(rfc1123),
            email_confirmed: record.email_confirmed_at().is_some(),
            review: record.review.as_ref().map(|review| ReviewView {
                rating: review.rating,
                stars: "★".repeat(usize::from(review.rating)),
                text: review.text.clone(),
                submitted_at: rfc1123(review.submitted_at),
            }),
            invite_url: invite_url.map(str::to_string),
        }
    }
}

/// `roblox` -> `Roblox username`
fn attribute_label(keyword: &str) -> String {
    let mut chars = keyword.chars();
    match chars.next() {
        Some(first) => format!("{}{} username", first.to_uppercase(), chars.as_str()),
        None => "Username".to_string(),
    }
}

/// Compiled page templates.
#[derive(Clone)]
pub struct Pages {
    env: Arc<Environment<'static>>,
}

impl Pages {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)?;
        }
        Ok(Self { env: Arc::new(env) })
    }

    fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String, ServiceError> {
        self.env
            .get_template(name)
            .and_then(|template| template.render(ctx))
            .map_err(|e| ServiceError::InternalError(format!("template {name}: {e}")))
    }

    pub fn receipt(&self, view: &ReceiptView) -> Result<String, ServiceError> {
        self.render("receipt.html", view)
    }

    pub fn unauthorized(&self, store_name: &str) -> Result<String, ServiceError> {
        self.render("unauthorized.html", context! { store_name })
    }

    pub fn not_found(&self, store_name: &str, order_id: &str) -> Result<String, ServiceError> {
        self.render("not_found.html", context! { store_name, order_id })
    }
}

impl std::fmt::Debug for Pages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pages").finish_non_exhaustive()
    }
}
