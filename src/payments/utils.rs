use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::CreatedBill;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

pub const MAX_TEXT_LEN: usize = 100;
pub const MAX_PHONE_LEN: usize = 20;

const KNOWN_REJECTION_TOKENS: &[&str] = &[
    "[KEY-DID-NOT-EXIST-OR-USER-IS-NOT-ACTIVE]",
    "[KEY-DID-NOT-EXIST]",
    "[USER-IS-NOT-ACTIVE]",
    "[CATEGORY-NOT-EXIST]",
    "[FALSE]",
];

/// Form-encoded POST client for the gateway. The gateway answers with plain
/// text in every case, so the body is returned unparsed.
#[derive(Clone)]
pub struct GatewayHttpClient {
    client: Client,
    timeout: Duration,
}

impl GatewayHttpClient {
    pub fn new(timeout: Duration) -> PaymentResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| PaymentError::NetworkError {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self { client, timeout })
    }

    pub async fn post_form<T: Serialize + ?Sized>(
        &self,
        url: &str,
        form: &T,
    ) -> PaymentResult<(u16, String)> {
        let body = serde_urlencoded::to_string(form).map_err(|e| PaymentError::ValidationError {
            message: format!("bill form could not be encoded: {}", e),
            field: None,
        })?;

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| PaymentError::NetworkError {
                message: format!("failed to read gateway response: {}", e),
            })?;

        debug!(status, body_len = text.len(), "gateway responded");
        Ok((status, text))
    }
}

/// Certificate failures get their own error so operators know to look at the
/// gateway host rather than the credentials.
pub fn classify_transport_error(err: reqwest::Error) -> PaymentError {
    let message = format!("{}", err);
    let mut detail = message.to_lowercase();
    let mut source = std::error::Error::source(&err);
    while let Some(inner) = source {
        detail.push(' ');
        detail.push_str(&inner.to_string().to_lowercase());
        source = inner.source();
    }

    if is_tls_failure(&detail) {
        PaymentError::GatewayTlsError { message }
    } else {
        PaymentError::NetworkError { message }
    }
}

fn is_tls_failure(detail: &str) -> bool {
    detail.contains("certificate") || detail.contains("ssl") || detail.contains("tls")
}

/// Classify the gateway's bill-creation reply.
///
/// The reply may be an HTML error page, a bracketed error token, a JSON array
/// whose first element carries the bill code, or a JSON object with either a
/// bill code or an error field.
pub fn parse_create_bill_response(raw: &str, base_url: &str) -> PaymentResult<CreatedBill> {
    let text = raw.trim();

    if is_html(text) {
        if text.contains("Invalid SSL certificate") || text.contains("Error code 526") {
            return Err(PaymentError::GatewayTlsError {
                message: "gateway returned an invalid SSL certificate page".to_string(),
            });
        }
        return Err(PaymentError::GatewayHtmlError {
            message: "gateway returned an HTML page instead of a bill".to_string(),
            raw: raw.to_string(),
        });
    }

    if let Some(token) = rejection_token(text) {
        return Err(PaymentError::GatewayRejected {
            token,
            raw: raw.to_string(),
        });
    }

    let parsed: JsonValue = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => {
            return Err(PaymentError::GatewayUnexpectedResponse {
                raw: raw.to_string(),
            })
        }
    };

    let bill_code = match &parsed {
        JsonValue::Array(items) => items.first().and_then(bill_code_field),
        JsonValue::Object(_) => bill_code_field(&parsed),
        _ => None,
    };

    if let Some(bill_code) = bill_code {
        return Ok(CreatedBill {
            payment_url: payment_url(base_url, &bill_code),
            bill_code,
        });
    }

    if let Some(error) = parsed.get("error").filter(|v| !v.is_null()) {
        let token = match error {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(PaymentError::GatewayRejected {
            token,
            raw: raw.to_string(),
        });
    }

    Err(PaymentError::GatewayUnexpectedResponse {
        raw: raw.to_string(),
    })
}

pub fn payment_url(base_url: &str, bill_code: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), bill_code)
}

fn is_html(text: &str) -> bool {
    let head: String = text.chars().take(64).collect::<String>().to_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html") || text.contains("<html")
}

fn rejection_token(text: &str) -> Option<String> {
    if let Some(known) = KNOWN_REJECTION_TOKENS.iter().find(|t| text == **t) {
        return Some((*known).to_string());
    }
    bracket_token_regex()
        .find(text)
        .filter(|m| m.start() == 0 && m.end() == text.len())
        .map(|m| m.as_str().to_string())
}

fn bracket_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[[A-Z0-9_-]+\]$").expect("token pattern is valid"))
}

fn bill_code_field(value: &JsonValue) -> Option<String> {
    ["BillCode", "billCode", "billcode"]
        .iter()
        .filter_map(|k| value.get(*k))
        .find_map(|v| match v {
            JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Cut a field to the gateway's limit, logging when characters are dropped.
pub fn truncate_field(field: &str, value: &str, max: usize) -> String {
    let count = value.chars().count();
    if count <= max {
        return value.to_string();
    }
    warn!(
        field,
        original_len = count,
        max_len = max,
        "truncating bill field to gateway limit"
    );
    value.chars().take(max).collect()
}

/// Digits only; the placeholder is used when nothing remains.
pub fn sanitize_phone(raw: Option<&str>, placeholder: &str) -> String {
    let digits: String = raw
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        placeholder.to_string()
    } else {
        digits
    }
}

pub fn looks_like_email(value: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
    })
    .is_match(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://dev.toyyibpay.com";

    #[test]
    fn parses_array_with_bill_code() {
        let bill = parse_create_bill_response(r#"[{"BillCode":"gcbhict9"}]"#, BASE).unwrap();
        assert_eq!(bill.bill_code, "gcbhict9");
        assert_eq!(bill.payment_url, "https://dev.toyyibpay.com/gcbhict9");
    }

    #[test]
    fn parses_object_with_bill_code() {
        let bill = parse_create_bill_response(r#"{"billCode":"abc123"}"#, BASE).unwrap();
        assert_eq!(bill.bill_code, "abc123");
    }

    #[test]
    fn known_tokens_are_rejections() {
        for token in KNOWN_REJECTION_TOKENS {
            match parse_create_bill_response(&format!(" {} \n", token), BASE) {
                Err(PaymentError::GatewayRejected { token: t, .. }) => assert_eq!(&t, token),
                other => panic!("expected rejection, got {:?}", other),
            }
        }
    }

    #[test]
    fn unknown_bracket_token_is_a_rejection() {
        match parse_create_bill_response("[SOMETHING-NEW]", BASE) {
            Err(PaymentError::GatewayRejected { token, .. }) => assert_eq!(token, "[SOMETHING-NEW]"),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn html_pages_are_classified() {
        let tls = "<!DOCTYPE html><html><body>Error code 526 Invalid SSL certificate</body></html>";
        assert!(matches!(
            parse_create_bill_response(tls, BASE),
            Err(PaymentError::GatewayTlsError { .. })
        ));

        let page = "<html><body>Maintenance</body></html>";
        match parse_create_bill_response(page, BASE) {
            Err(PaymentError::GatewayHtmlError { raw, .. }) => assert_eq!(raw, page),
            other => panic!("expected html error, got {:?}", other),
        }
    }

    #[test]
    fn json_error_field_is_a_rejection() {
        match parse_create_bill_response(r#"{"error":"Invalid category"}"#, BASE) {
            Err(PaymentError::GatewayRejected { token, .. }) => assert_eq!(token, "Invalid category"),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn other_shapes_are_unexpected() {
        for raw in ["", "OK", "[]", r#"{"status":"ok"}"#, "42"] {
            assert!(matches!(
                parse_create_bill_response(raw, BASE),
                Err(PaymentError::GatewayUnexpectedResponse { .. })
            ));
        }
    }

    #[test]
    fn truncation_counts_characters() {
        let long = "é".repeat(150);
        let cut = truncate_field("billDescription", &long, MAX_TEXT_LEN);
        assert_eq!(cut.chars().count(), 100);
        assert_eq!(truncate_field("billName", "short", MAX_TEXT_LEN), "short");
    }

    #[test]
    fn phone_is_reduced_to_digits() {
        assert_eq!(sanitize_phone(Some("+60 12-345 6789"), "0123456789"), "60123456789");
        assert_eq!(sanitize_phone(Some("n/a"), "0123456789"), "0123456789");
        assert_eq!(sanitize_phone(None, "0123456789"), "0123456789");
    }

    #[test]
    fn email_shape_check() {
        assert!(looks_like_email("drv_1@urbandrive.com"));
        assert!(!looks_like_email("not-an-email"));
    }

    #[test]
    fn tls_detection_matches_certificate_errors() {
        assert!(is_tls_failure("invalid peer certificate: expired"));
        assert!(!is_tls_failure("connection refused"));
    }
}
