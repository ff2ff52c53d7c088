//! Minor-unit amount formatting and cross-currency estimates.
//!
//! Amounts arrive from the storefront as integers in minor units (pence,
//! cents) but are frequently missing, `null`, or encoded as strings. Every
//! path through this module degrades to zero instead of failing.
//!
//! [`estimate`] multiplies by a configured constant. It is an approximation
//! for display only and must never be treated as an authoritative conversion.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;

/// Reads a minor-unit amount from a loosely typed JSON value.
///
/// Integers, integral floats and numeric strings are accepted; anything else
/// yields `None`.
pub fn parse_minor(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed.parse::<i64>().ok().or_else(|| {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.round() as i64)
            })
        }
        _ => None,
    }
}

/// Formats a minor-unit amount as a two-decimal major-unit string.
///
/// The currency label does not change the output; it is accepted so call
/// sites read as `normalize(amount, "GBP")`. Missing amounts become `"0.00"`.
pub fn normalize(amount: Option<i64>, _currency: &str) -> String {
    let minor = amount.unwrap_or(0);
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Converts a minor-unit amount with an approximate rate, rounding half away
/// from zero to the nearest minor unit.
pub fn estimate(amount: Option<i64>, rate: f64) -> Option<i64> {
    let minor = amount?;
    let rate = Decimal::from_f64_retain(rate)?;
    Decimal::from(minor)
        .checked_mul(rate)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Display symbol for the handful of currencies the storefront sells in.
pub fn currency_symbol(currency: &str) -> &'static str {
    match currency.to_ascii_uppercase().as_str() {
        "GBP" => "£",
        "USD" | "CAD" | "AUD" => "$",
        "EUR" => "€",
        _ => "",
    }
}

/// `normalize` with symbol and code, e.g. `£12.34 GBP`.
pub fn display(amount: Option<i64>, currency: &str) -> String {
    format!(
        "{}{} {}",
        currency_symbol(currency),
        normalize(amount, currency),
        currency.to_ascii_uppercase()
    )
}
