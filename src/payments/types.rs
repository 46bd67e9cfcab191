use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

/// Field values sent to the gateway's bill creation API, already defaulted and
/// truncated to the gateway's limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BillForm {
    pub bill_name: String,
    pub bill_description: String,
    pub bill_to: String,
    pub bill_email: String,
    pub bill_phone: String,
    pub bill_amount_cents: i64,
    pub return_url: String,
    pub callback_url: String,
    pub external_reference_no: String,
    pub content_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreatedBill {
    pub bill_code: String,
    pub payment_url: String,
}

/// Reads an amount that may arrive as a JSON number or a numeric string.
pub fn parse_amount(value: &JsonValue) -> Option<Decimal> {
    match value {
        JsonValue::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
                .or_else(|| n.as_f64().and_then(Decimal::from_f64))
        }
        JsonValue::String(s) => parse_amount_str(s),
        _ => None,
    }
}

pub fn parse_amount_str(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

/// Amounts are stored as plain JSON numbers so other clients of the store can
/// do arithmetic on them.
pub fn amount_to_json(amount: Decimal) -> JsonValue {
    amount
        .normalize()
        .to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

/// Gateway amounts are integer cents, rounded half away from zero.
pub fn amount_to_cents(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Shortest textual form: `25.50` becomes `25.5`, `10.00` becomes `10`.
pub fn format_amount(amount: Decimal) -> String {
    amount.normalize().to_string()
}
