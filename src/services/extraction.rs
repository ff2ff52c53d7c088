//! Defensive field extraction for storefront webhook payloads.
//!
//! The upstream payload shape is unstable, so each logical field is read
//! through an ordered list of JSON pointers. The first pointer that yields a
//! usable value wins; when none do, the rule's fixed default is substituted.
//! The tables below are the single place where fallback order is defined.
//!
//! | field              | pointers (in priority order)                                   | default        |
//! |--------------------|----------------------------------------------------------------|----------------|
//! | order id           | `/id`, `/order_id`, `/invoice_id`, `/uniqid`                    | *(fault)*      |
//! | product lines      | `/product_variants`, `/products`, `/items`                      | one placeholder|
//! | line title         | `/product_title`, `/title`, `/product/title`, `/name`           | `Unknown`      |
//! | line quantity      | `/quantity`, `/qty`                                             | `1`            |
//! | line unit price    | `/unit_price`, `/price`, `/price/base`, `/product/price`        | none           |
//! | buyer attribute    | `/additional_information`, `/custom_fields`, `/fields`          | `Not provided` |
//! | buyer email        | `/customer_information/email`, `/customer/email`, `/email`      | `Unknown`      |
//! | buyer country      | `/customer_information/country`, `/customer/country`, `/country`| `Unknown`      |
//! | buyer handle       | `/customer_information/discord_data/username`, ...              | `Not linked`   |
//! | platform user id   | `/customer_information/discord_data/id`, ...                    | none           |
//! | coupon             | first variant's payment modification code, `/coupon/code`, ...  | `None`         |
//! | currency           | `/payment/full_price/currency`, `/payment/currency`, `/currency`| configured     |
//! | primary total      | `/payment/full_price/base`, `/payment/total/base`, ...          | sum of lines   |
//! | secondary total    | `/payment/total/gross_sale_usd`, `/payment/total/total_usd`     | estimate       |
//! | exchange rate      | `/payment/exchange_rate`, `/payment/total/exchange_rate`        | configured (primary currency only) |
//! | created at         | `/created_at`, `/createdAt`, `/paid_at`                          | receipt time   |

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::models::{BuyerInfo, NormalizedOrder, OrderLine, OrderTotals, PaymentStatus};
use crate::money;

/// Ordered JSON-pointer fallbacks for a text field.
#[derive(Debug, Clone, Copy)]
pub struct TextRule {
    pub paths: &'static [&'static str],
    pub default: &'static str,
}

impl TextRule {
    pub const fn new(paths: &'static [&'static str], default: &'static str) -> Self {
        Self { paths, default }
    }

    /// First non-empty string or number found along `paths`.
    pub fn find(&self, root: &Value) -> Option<String> {
        self.paths
            .iter()
            .find_map(|path| root.pointer(path).and_then(as_text))
    }

    pub fn resolve(&self, root: &Value) -> String {
        self.find(root).unwrap_or_else(|| self.default.to_string())
    }
}

/// Ordered JSON-pointer fallbacks for a minor-unit amount.
#[derive(Debug, Clone, Copy)]
pub struct AmountRule {
    pub paths: &'static [&'static str],
}

impl AmountRule {
    pub fn find(&self, root: &Value) -> Option<i64> {
        self.paths
            .iter()
            .find_map(|path| root.pointer(path).and_then(money::parse_minor))
    }
}

pub const ORDER_ID: TextRule = TextRule::new(&["/id", "/order_id", "/invoice_id", "/uniqid"], "");

pub const LINE_LISTS: &[&str] = &["/product_variants", "/products", "/items"];
pub const LINE_TITLE: TextRule = TextRule::new(
    &["/product_title", "/title", "/product/title", "/name"],
    "Unknown",
);
pub const LINE_QUANTITY: &[&str] = &["/quantity", "/qty"];
pub const LINE_UNIT_PRICE: AmountRule = AmountRule {
    paths: &["/unit_price", "/price", "/price/base", "/product/price"],
};
pub const ATTRIBUTE_LISTS: &[&str] = &["/additional_information", "/custom_fields", "/fields"];
pub const ATTRIBUTE_LABEL: TextRule = TextRule::new(&["/label", "/name", "/key"], "");
pub const ATTRIBUTE_VALUE: TextRule = TextRule::new(&["/value"], "");
pub const ATTRIBUTE_DEFAULT: &str = "Not provided";

pub const BUYER_EMAIL: TextRule = TextRule::new(
    &["/customer_information/email", "/customer/email", "/email"],
    "Unknown",
);
pub const BUYER_COUNTRY: TextRule = TextRule::new(
    &["/customer_information/country", "/customer/country", "/country"],
    "Unknown",
);
pub const BUYER_HANDLE: TextRule = TextRule::new(
    &[
        "/customer_information/discord_data/username",
        "/customer_information/discord_username",
        "/customer/discord/username",
    ],
    "Not linked",
);
pub const BUYER_PLATFORM_ID: TextRule = TextRule::new(
    &[
        "/customer_information/discord_data/id",
        "/customer_information/discord_data/user_id",
        "/customer_information/discord_id",
    ],
    "",
);
pub const COUPON: TextRule = TextRule::new(
    &[
        "/product_variants/0/invoice_payment/payment_details/modifications/0/attributes/code",
        "/invoice_payment/payment_details/modifications/0/attributes/code",
        "/coupon/code",
        "/coupon_code",
    ],
    "None",
);
pub const CURRENCY: TextRule = TextRule::new(
    &["/payment/full_price/currency", "/payment/currency", "/currency"],
    "",
);
pub const PRIMARY_TOTAL: AmountRule = AmountRule {
    paths: &[
        "/payment/full_price/base",
        "/payment/total/base",
        "/payment/total/total",
        "/total",
    ],
};
pub const SECONDARY_TOTAL: AmountRule = AmountRule {
    paths: &["/payment/total/gross_sale_usd", "/payment/total/total_usd"],
};
/// The payload only reports a secondary total in this currency.
pub const SECONDARY_TOTAL_CURRENCY: &str = "USD";
pub const EXCHANGE_RATE: &[&str] = &["/payment/exchange_rate", "/payment/total/exchange_rate"];
pub const CREATED_AT: TextRule = TextRule::new(&["/created_at", "/createdAt", "/paid_at"], "");

/// Values the extractor needs from configuration.
#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    pub attribute_keyword: String,
    pub primary_currency: String,
    pub secondary_currency: String,
    pub exchange_rate: f64,
}

impl ExtractionSettings {
    pub fn from_config(cfg: &crate::config::AppConfig) -> Self {
        Self {
            attribute_keyword: cfg.attribute_keyword.clone(),
            primary_currency: cfg.primary_currency.clone(),
            secondary_currency: cfg.secondary_currency.clone(),
            exchange_rate: cfg.exchange_rate,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("payload carries no order id")]
    MissingOrderId,
}

/// Normalizes one order payload (`data` of the webhook body).
pub fn extract_order(
    data: &Value,
    settings: &ExtractionSettings,
    received_at: DateTime<Utc>,
) -> Result<NormalizedOrder, ExtractionError> {
    let order_id = ORDER_ID.find(data).ok_or(ExtractionError::MissingOrderId)?;
    let lines = extract_lines(data, &settings.attribute_keyword);
    let totals = extract_totals(data, &lines, settings);

    Ok(NormalizedOrder {
        order_id,
        lines,
        buyer: BuyerInfo {
            email: BUYER_EMAIL.resolve(data),
            country: BUYER_COUNTRY.resolve(data),
            handle: BUYER_HANDLE.resolve(data),
            platform_user_id: BUYER_PLATFORM_ID.find(data),
        },
        coupon: COUPON.resolve(data),
        totals,
        payment_status: PaymentStatus::Paid,
        created_at: CREATED_AT
            .find(data)
            .and_then(|raw| parse_timestamp(&raw))
            .unwrap_or(received_at),
    })
}

fn extract_lines(data: &Value, keyword: &str) -> Vec<OrderLine> {
    let entries = LINE_LISTS
        .iter()
        .find_map(|path| {
            data.pointer(path)
                .and_then(Value::as_array)
                .filter(|items| !items.is_empty())
        })
        .map(|items| items.as_slice())
        .unwrap_or(&[]);

    if entries.is_empty() {
        return vec![extract_line(&Value::Null, keyword)];
    }
    entries.iter().map(|entry| extract_line(entry, keyword)).collect()
}

fn extract_line(entry: &Value, keyword: &str) -> OrderLine {
    let quantity = LINE_QUANTITY
        .iter()
        .find_map(|path| entry.pointer(path).and_then(money::parse_minor))
        .filter(|q| *q > 0)
        .and_then(|q| u32::try_from(q).ok())
        .unwrap_or(1);

    OrderLine {
        name: LINE_TITLE.resolve(entry),
        quantity,
        unit_price: LINE_UNIT_PRICE.find(entry),
        buyer_attribute: find_attribute(entry, keyword)
            .unwrap_or_else(|| ATTRIBUTE_DEFAULT.to_string()),
    }
}

/// Value of the first attribute whose label contains `keyword`, case-insensitively.
fn find_attribute(entry: &Value, keyword: &str) -> Option<String> {
    let keyword = keyword.to_lowercase();
    ATTRIBUTE_LISTS
        .iter()
        .filter_map(|path| entry.pointer(path).and_then(Value::as_array))
        .flatten()
        .find(|attr| {
            ATTRIBUTE_LABEL
                .find(attr)
                .is_some_and(|label| label.to_lowercase().contains(&keyword))
        })
        .and_then(|attr| ATTRIBUTE_VALUE.find(attr))
}

fn extract_totals(data: &Value, lines: &[OrderLine], settings: &ExtractionSettings) -> OrderTotals {
    let currency = CURRENCY
        .find(data)
        .unwrap_or_else(|| settings.primary_currency.clone())
        .to_ascii_uppercase();
    let secondary_currency = settings.secondary_currency.to_ascii_uppercase();

    let amount = PRIMARY_TOTAL.find(data).or_else(|| {
        lines
            .iter()
            .map(OrderLine::line_total)
            .try_fold(0i64, |acc, total| total.map(|t| acc.saturating_add(t)))
    });

    let (secondary_amount, secondary_is_estimate) = if currency == secondary_currency {
        (amount, false)
    } else if let Some(reported) = SECONDARY_TOTAL
        .find(data)
        .filter(|_| secondary_currency == SECONDARY_TOTAL_CURRENCY)
    {
        (Some(reported), false)
    } else {
        // The configured rate only converts from the configured primary currency.
        let rate = EXCHANGE_RATE
            .iter()
            .find_map(|path| data.pointer(path).and_then(as_rate))
            .or_else(|| {
                currency
                    .eq_ignore_ascii_case(&settings.primary_currency)
                    .then_some(settings.exchange_rate)
            });
        match rate {
            Some(rate) => (money::estimate(amount, rate), true),
            None => (None, false),
        }
    };

    OrderTotals {
        currency,
        amount,
        secondary_currency,
        secondary_amount,
        secondary_is_estimate,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_rate(value: &Value) -> Option<f64> {
    let rate = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// Parses ISO-8601 timestamps, with or without an offset.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn settings() -> ExtractionSettings {
        ExtractionSettings {
            attribute_keyword: "roblox".into(),
            primary_currency: "GBP".into(),
            secondary_currency: "USD".into(),
            exchange_rate: 1.25,
        }
    }

    fn received() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn extracts_full_payload() {
        let data = json!({
            "id": 1001,
            "product_variants": [{
                "product_title": "VIP Pass",
                "quantity": 2,
                "unit_price": "450",
                "additional_information": [
                    {"label": "Email again", "value": "x"},
                    {"label": "Your ROBLOX Username", "value": "Foo123"}
                ],
                "invoice_payment": {"payment_details": {"modifications": [
                    {"attributes": {"code": "SPRING10"}}
                ]}}
            }],
            "customer_information": {
                "email": "alice@example.com",
                "country": "GB",
                "discord_data": {"username": "alice", "id": "424242"}
            },
            "payment": {
                "full_price": {"base": 900, "currency": "gbp"},
                "total": {"gross_sale_usd": 1140}
            },
            "created_at": "2024-05-01T10:20:30Z"
        });

        let order = extract_order(&data, &settings(), received()).unwrap();
        assert_eq!(order.order_id, "1001");
        assert_eq!(order.lines.len(), 1);
        assert_eq!(order.lines[0].name, "VIP Pass");
        assert_eq!(order.lines[0].quantity, 2);
        assert_eq!(order.lines[0].unit_price, Some(450));
        assert_eq!(order.lines[0].buyer_attribute, "Foo123");
        assert_eq!(order.buyer.email, "alice@example.com");
        assert_eq!(order.buyer.handle, "alice");
        assert_eq!(order.buyer.platform_user_id.as_deref(), Some("424242"));
        assert_eq!(order.coupon, "SPRING10");
        assert_eq!(order.totals.currency, "GBP");
        assert_eq!(order.totals.amount, Some(900));
        assert_eq!(order.totals.secondary_amount, Some(1140));
        assert!(!order.totals.secondary_is_estimate);
        assert_eq!(
            order.created_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 20, 30).unwrap()
        );
    }

    #[test]
    fn empty_payload_degrades_to_placeholders() {
        let data = json!({"id": "abc"});
        let order = extract_order(&data, &settings(), received()).unwrap();

        assert_eq!(order.lines.len(), 1);
        assert_eq!(order.lines[0].name, "Unknown");
        assert_eq!(order.lines[0].quantity, 1);
        assert_eq!(order.lines[0].buyer_attribute, "Not provided");
        assert_eq!(order.buyer.email, "Unknown");
        assert_eq!(order.buyer.country, "Unknown");
        assert_eq!(order.buyer.handle, "Not linked");
        assert_eq!(order.buyer.platform_user_id, None);
        assert_eq!(order.coupon, "None");
        assert_eq!(order.totals.currency, "GBP");
        assert_eq!(order.totals.amount, None);
        assert_eq!(order.created_at, received());
    }

    #[test]
    fn missing_order_id_is_an_error() {
        let data = json!({"product_variants": []});
        assert_eq!(
            extract_order(&data, &settings(), received()).unwrap_err(),
            ExtractionError::MissingOrderId
        );
    }

    #[test]
    fn fallback_order_prefers_earlier_paths() {
        let data = json!({
            "order_id": "second",
            "invoice_id": "third",
            "customer": {"email": "fallback@example.com"},
            "email": "last@example.com"
        });
        let order = extract_order(&data, &settings(), received()).unwrap();
        assert_eq!(order.order_id, "second");
        assert_eq!(order.buyer.email, "fallback@example.com");
    }

    #[test]
    fn blank_strings_fall_through_to_next_path() {
        let data = json!({
            "id": "  ",
            "order_id": "x-1",
            "customer_information": {"email": ""},
            "customer": {"email": "real@example.com"}
        });
        let order = extract_order(&data, &settings(), received()).unwrap();
        assert_eq!(order.order_id, "x-1");
        assert_eq!(order.buyer.email, "real@example.com");
    }

    #[test]
    fn secondary_total_is_estimated_with_payload_rate_then_config_rate() {
        let with_rate = json!({"id": 1, "payment": {"full_price": {"base": 1000}, "exchange_rate": 1.5}});
        let order = extract_order(&with_rate, &settings(), received()).unwrap();
        assert_eq!(order.totals.secondary_amount, Some(1500));
        assert!(order.totals.secondary_is_estimate);

        let without_rate = json!({"id": 1, "payment": {"full_price": {"base": 1000}}});
        let order = extract_order(&without_rate, &settings(), received()).unwrap();
        assert_eq!(order.totals.secondary_amount, Some(1250));
        assert!(order.totals.secondary_is_estimate);
    }

    #[test]
    fn foreign_currency_without_rate_has_no_estimate() {
        let data = json!({"id": 1, "payment": {"full_price": {"base": 1000, "currency": "EUR"}}});
        let order = extract_order(&data, &settings(), received()).unwrap();
        assert_eq!(order.totals.currency, "EUR");
        assert_eq!(order.totals.secondary_amount, None);
        assert!(!order.totals.secondary_is_estimate);

        let with_rate = json!({
            "id": 1,
            "payment": {"full_price": {"base": 1000, "currency": "EUR"}, "exchange_rate": 1.1}
        });
        let order = extract_order(&with_rate, &settings(), received()).unwrap();
        assert_eq!(order.totals.secondary_amount, Some(1100));
        assert!(order.totals.secondary_is_estimate);
    }

    #[test]
    fn same_currency_needs_no_estimate() {
        let data = json!({"id": 1, "payment": {"full_price": {"base": 700, "currency": "USD"}}});
        let order = extract_order(&data, &settings(), received()).unwrap();
        assert_eq!(order.totals.currency, "USD");
        assert_eq!(order.totals.secondary_amount, Some(700));
        assert!(!order.totals.secondary_is_estimate);
    }

    #[test]
    fn primary_total_falls_back_to_line_sum() {
        let data = json!({
            "id": 5,
            "products": [
                {"title": "A", "quantity": 2, "price": 300},
                {"name": "B", "qty": "1", "price": {"base": 150}}
            ]
        });
        let order = extract_order(&data, &settings(), received()).unwrap();
        assert_eq!(order.lines[1].name, "B");
        assert_eq!(order.lines[1].unit_price, Some(150));
        assert_eq!(order.totals.amount, Some(750));
    }

    #[test]
    fn zero_quantity_defaults_to_one() {
        let data = json!({"id": 5, "product_variants": [{"product_title": "A", "quantity": 0}]});
        let order = extract_order(&data, &settings(), received()).unwrap();
        assert_eq!(order.lines[0].quantity, 1);
    }

    #[test]
    fn unparseable_created_at_uses_received_time() {
        let data = json!({"id": 5, "created_at": "yesterday"});
        let order = extract_order(&data, &settings(), received()).unwrap();
        assert_eq!(order.created_at, received());
    }

    #[test]
    fn parses_naive_timestamps_as_utc() {
        assert_eq!(
            parse_timestamp("2024-02-03 04:05:06"),
            Some(Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap())
        );
    }
}
