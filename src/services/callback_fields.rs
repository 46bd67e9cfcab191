//! Alias table for gateway callback fields
//!
//! Gateway integrations spell the same field in different case and separator
//! styles (`billCode`, `BillCode`, `bill_code`, `billcode`). Keys are
//! normalized (lowercase, `_` and `-` removed) and matched against a short list
//! of aliases per logical field. The request body wins over the query string.

use serde_json::{Map, Value as JsonValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackField {
    BillCode,
    PaymentStatus,
    InvoiceNo,
    ExternalReferenceNo,
    Amount,
}

impl CallbackField {
    /// Normalized aliases, most specific first
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            CallbackField::BillCode => &["billcode"],
            CallbackField::PaymentStatus => {
                &["billpaymentstatus", "statuscode", "statusid", "status"]
            }
            CallbackField::InvoiceNo => &["billpaymentinvoiceno", "refno"],
            CallbackField::ExternalReferenceNo => &["billexternalreferenceno", "orderid"],
            CallbackField::Amount => &["billpaymentamount", "amount"],
        }
    }
}

pub fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Callback fields from the body (JSON, form or multipart) and the query string
#[derive(Debug, Clone, Default)]
pub struct CallbackPayload {
    pub body: Map<String, JsonValue>,
    pub query: Vec<(String, String)>,
}

impl CallbackPayload {
    pub fn new(body: Map<String, JsonValue>, query: Vec<(String, String)>) -> Self {
        Self { body, query }
    }

    pub fn from_pairs(body: Vec<(String, String)>, query: Vec<(String, String)>) -> Self {
        Self {
            body: body
                .into_iter()
                .map(|(k, v)| (k, JsonValue::String(v)))
                .collect(),
            query,
        }
    }

    /// First non-empty value for the field, body before query
    pub fn get(&self, field: CallbackField) -> Option<String> {
        let aliases = field.aliases();
        for alias in aliases {
            let from_body = self
                .body
                .iter()
                .filter(|(k, _)| normalize_key(k) == *alias)
                .find_map(|(_, v)| scalar_text(v));
            if from_body.is_some() {
                return from_body;
            }
        }
        for alias in aliases {
            let from_query = self
                .query
                .iter()
                .filter(|(k, _)| normalize_key(k) == *alias)
                .map(|(_, v)| v.trim())
                .find(|v| !v.is_empty())
                .map(str::to_string);
            if from_query.is_some() {
                return from_query;
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty() && self.query.is_empty()
    }

    /// Field names present, for logs
    pub fn keys(&self) -> Vec<String> {
        self.body
            .keys()
            .cloned()
            .chain(self.query.iter().map(|(k, _)| format!("?{}", k)))
            .collect()
    }
}

fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
