use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Gateway returned an HTML error page: {message}")]
    GatewayHtmlError { message: String, raw: String },

    #[error("Gateway TLS certificate error: {message}")]
    GatewayTlsError { message: String },

    #[error("Gateway rejected the bill: {token}")]
    GatewayRejected { token: String, raw: String },

    #[error("Gateway returned an unexpected response")]
    GatewayUnexpectedResponse { raw: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },
}

impl PaymentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::ValidationError { .. } => false,
            PaymentError::GatewayHtmlError { .. } => true,
            PaymentError::GatewayTlsError { .. } => false,
            PaymentError::GatewayRejected { .. } => false,
            PaymentError::GatewayUnexpectedResponse { .. } => false,
            PaymentError::NetworkError { .. } => true,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::ValidationError { .. } => 400,
            PaymentError::GatewayRejected { .. } => 400,
            PaymentError::GatewayUnexpectedResponse { .. } => 400,
            PaymentError::GatewayHtmlError { .. } => 500,
            PaymentError::GatewayTlsError { .. } => 500,
            PaymentError::NetworkError { .. } => 500,
        }
    }

    /// Gateway text kept verbatim for operator triage
    pub fn raw_diagnostic(&self) -> Option<&str> {
        match self {
            PaymentError::GatewayHtmlError { raw, .. }
            | PaymentError::GatewayRejected { raw, .. }
            | PaymentError::GatewayUnexpectedResponse { raw } => Some(raw.as_str()),
            _ => None,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PaymentError::ValidationError { message, .. } => message.clone(),
            PaymentError::GatewayHtmlError { .. } => {
                "Payment gateway returned an error page. Check credentials and endpoint".to_string()
            }
            PaymentError::GatewayTlsError { .. } => {
                "Unable to establish a secure connection to the payment gateway".to_string()
            }
            PaymentError::GatewayRejected { token, .. } => rejection_hint(token),
            PaymentError::GatewayUnexpectedResponse { .. } => {
                "Payment gateway returned an unexpected response".to_string()
            }
            PaymentError::NetworkError { .. } => {
                "Payment gateway is temporarily unavailable".to_string()
            }
        }
    }
}

fn rejection_hint(token: &str) -> String {
    match token {
        "[KEY-DID-NOT-EXIST-OR-USER-IS-NOT-ACTIVE]" => {
            "Invalid gateway secret key or category code, or the gateway account is not active"
                .to_string()
        }
        "[KEY-DID-NOT-EXIST]" => {
            "Invalid gateway secret key or category code for the configured environment"
                .to_string()
        }
        "[USER-IS-NOT-ACTIVE]" => "Gateway account is not active".to_string(),
        "[CATEGORY-NOT-EXIST]" => "Invalid gateway category code".to_string(),
        "[FALSE]" => {
            "Gateway validation failed: check bill name, description, recipient, email, phone and reference"
                .to_string()
        }
        other => format!("Payment gateway error: {}", other),
    }
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError, ValidationError};

        let kind = match err {
            PaymentError::ValidationError { message, field } => {
                AppErrorKind::Validation(ValidationError::InvalidField {
                    field: field.unwrap_or_else(|| "request".to_string()),
                    reason: message,
                })
            }
            other => AppErrorKind::External(ExternalError::Gateway(other)),
        };
        AppError::new(kind)
    }
}
