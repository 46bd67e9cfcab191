//! External reference numbers carried through the gateway.
//!
//! Layout: `{reference}_{driverIdPrefix}_{amount}_{epochMillis}`, cut to 50
//! characters. The gateway echoes the value back on some callbacks, which makes
//! it a fallback channel for recovering the driver and amount of a bill when the
//! bill mapping is missing. It is never authoritative: only the first
//! [`DRIVER_PREFIX_LEN`] characters of the driver id survive, and truncation can
//! clip the tail.

use rust_decimal::Decimal;

use crate::payments::types::{format_amount, parse_amount_str};

pub const MAX_LEN: usize = 50;
pub const DRIVER_PREFIX_LEN: usize = 8;
const SEPARATOR: char = '_';

/// Fields recovered from an external reference number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedReference {
    pub reference: String,
    pub driver_prefix: String,
    pub amount: Option<Decimal>,
    pub timestamp_ms: Option<i64>,
}

pub fn driver_prefix(driver_id: &str) -> String {
    driver_id.chars().take(DRIVER_PREFIX_LEN).collect()
}

pub fn encode(reference: &str, driver_id: &str, amount: Decimal, timestamp_ms: i64) -> String {
    let reference = if reference.trim().is_empty() {
        "REF"
    } else {
        reference
    };
    let full = format!(
        "{}{sep}{}{sep}{}{sep}{}",
        reference,
        driver_prefix(driver_id),
        format_amount(amount),
        timestamp_ms,
        sep = SEPARATOR
    );
    full.chars().take(MAX_LEN).collect()
}

/// Decode a reference number. Returns `None` when fewer than four
/// underscore-separated parts are present.
///
/// The amount and timestamp are anchored at the right end so that references and
/// driver ids containing underscores still decode. When the tail does not look
/// like `_{amount}_{digits}` the positional layout is used instead.
pub fn decode(external_reference_no: &str) -> Option<DecodedReference> {
    let raw = external_reference_no.trim();
    let parts: Vec<&str> = raw.split(SEPARATOR).collect();
    if parts.len() < 4 {
        return None;
    }

    decode_right_anchored(&parts).or_else(|| decode_positional(&parts))
}

fn decode_right_anchored(parts: &[&str]) -> Option<DecodedReference> {
    let n = parts.len();
    let timestamp = parts[n - 1];
    if timestamp.is_empty() || !timestamp.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let amount = parse_amount_str(parts[n - 2])?;

    let head = parts[..n - 2].join(&SEPARATOR.to_string());
    let head_chars: Vec<char> = head.chars().collect();

    // Prefer a full-length prefix: `{reference}_{8 chars}`.
    let (reference, prefix) = if head_chars.len() > DRIVER_PREFIX_LEN + 1
        && head_chars[head_chars.len() - DRIVER_PREFIX_LEN - 1] == SEPARATOR
    {
        let split = head_chars.len() - DRIVER_PREFIX_LEN;
        (
            head_chars[..split - 1].iter().collect::<String>(),
            head_chars[split..].iter().collect::<String>(),
        )
    } else {
        // Short driver ids produce a shorter prefix.
        let (reference, prefix) = head.split_once(SEPARATOR)?;
        (reference.to_string(), prefix.to_string())
    };

    if reference.is_empty() || prefix.is_empty() {
        return None;
    }

    Some(DecodedReference {
        reference,
        driver_prefix: prefix,
        amount: Some(amount),
        timestamp_ms: timestamp.parse().ok(),
    })
}

fn decode_positional(parts: &[&str]) -> Option<DecodedReference> {
    let prefix = parts[1].to_string();
    if prefix.is_empty() {
        return None;
    }
    Some(DecodedReference {
        reference: parts[0].to_string(),
        driver_prefix: prefix,
        amount: parse_amount_str(parts[2]),
        timestamp_ms: parts[3].parse().ok(),
    })
}
