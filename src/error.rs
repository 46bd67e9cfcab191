//! Unified error handling for the commission relay
//!
//! Every layer error (gateway, store, configuration) converts into [`AppError`],
//! which carries the HTTP status, a machine-readable code and a user message.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ConfigError;
use crate::payments::error::PaymentError;

/// Error codes for programmatic handling by the mobile client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation errors (400)
    #[serde(rename = "MISSING_FIELDS")]
    MissingFields,
    #[serde(rename = "AMOUNT_OUT_OF_RANGE")]
    AmountOutOfRange,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,

    // Gateway errors
    #[serde(rename = "GATEWAY_HTML_ERROR")]
    GatewayHtmlError,
    #[serde(rename = "GATEWAY_TLS_ERROR")]
    GatewayTlsError,
    #[serde(rename = "GATEWAY_REJECTED")]
    GatewayRejected,
    #[serde(rename = "GATEWAY_UNEXPECTED_RESPONSE")]
    GatewayUnexpectedResponse,
    #[serde(rename = "GATEWAY_UNAVAILABLE")]
    GatewayUnavailable,

    // Reconciliation and domain errors
    #[serde(rename = "MISSING_DRIVER_OR_AMOUNT")]
    MissingDriverOrAmount,
    #[serde(rename = "DUPLICATE_SETTLEMENT")]
    DuplicateSettlement,

    // Infrastructure errors (5xx)
    #[serde(rename = "STORE_ERROR")]
    StoreError,
    #[serde(rename = "STORE_PERMISSION_DENIED")]
    StorePermissionDenied,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

/// Business rule violations
#[derive(Debug, Clone)]
pub enum DomainError {
    /// The bill has already been settled by an earlier callback or request
    DuplicateSettlement { bill_code: String },
}

/// Driver or amount for a bill could not be recovered
#[derive(Debug, Clone)]
pub enum ReconciliationError {
    Gap {
        bill_code: String,
        driver_resolved: bool,
        amount_resolved: bool,
    },
}

/// Document store and configuration failures
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Store { message: String, is_retryable: bool },
    StorePermissionDenied { path: String },
    Configuration { message: String },
}

/// Upstream payment gateway failures
#[derive(Debug, Clone)]
pub enum ExternalError {
    Gateway(PaymentError),
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// One or more required fields are absent or blank
    MissingFields { fields: Vec<String> },
    /// Amount outside the accepted bill range
    AmountOutOfRange {
        amount: String,
        min: String,
        max: String,
    },
    InvalidField { field: String, reason: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Reconciliation(ReconciliationError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn missing_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(AppErrorKind::Validation(ValidationError::MissingFields {
            fields: fields.into_iter().map(Into::into).collect(),
        }))
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::DuplicateSettlement { .. } => 409,
            },
            AppErrorKind::Reconciliation(_) => 404,
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(ExternalError::Gateway(err)) => err.http_status_code(),
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(DomainError::DuplicateSettlement { .. }) => {
                ErrorCode::DuplicateSettlement
            }
            AppErrorKind::Reconciliation(_) => ErrorCode::MissingDriverOrAmount,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Store { .. } => ErrorCode::StoreError,
                InfrastructureError::StorePermissionDenied { .. } => {
                    ErrorCode::StorePermissionDenied
                }
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(ExternalError::Gateway(err)) => match err {
                PaymentError::ValidationError { .. } => ErrorCode::ValidationError,
                PaymentError::GatewayHtmlError { .. } => ErrorCode::GatewayHtmlError,
                PaymentError::GatewayTlsError { .. } => ErrorCode::GatewayTlsError,
                PaymentError::GatewayRejected { .. } => ErrorCode::GatewayRejected,
                PaymentError::GatewayUnexpectedResponse { .. } => {
                    ErrorCode::GatewayUnexpectedResponse
                }
                PaymentError::NetworkError { .. } => ErrorCode::GatewayUnavailable,
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::MissingFields { .. } => ErrorCode::MissingFields,
                ValidationError::AmountOutOfRange { .. } => ErrorCode::AmountOutOfRange,
                ValidationError::InvalidField { .. } => ErrorCode::ValidationError,
            },
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(DomainError::DuplicateSettlement { bill_code }) => {
                format!("Bill '{}' has already been settled", bill_code)
            }
            AppErrorKind::Reconciliation(ReconciliationError::Gap {
                bill_code,
                driver_resolved,
                amount_resolved,
            }) => {
                let missing = match (*driver_resolved, *amount_resolved) {
                    (false, false) => "driver and amount",
                    (false, true) => "driver",
                    _ => "amount",
                };
                format!(
                    "Could not determine the {} for bill '{}'. Use payment recovery",
                    missing, bill_code
                )
            }
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::StorePermissionDenied { .. } => {
                    "Database access denied. Check database rules and credentials".to_string()
                }
                _ => "Service temporarily unavailable. Please try again later".to_string(),
            },
            AppErrorKind::External(ExternalError::Gateway(err)) => err.user_message(),
            AppErrorKind::Validation(err) => match err {
                ValidationError::MissingFields { fields } => {
                    format!("Missing required fields: {}", fields.join(", "))
                }
                ValidationError::AmountOutOfRange { amount, min, max } => {
                    format!(
                        "Amount {} is out of range. It must be between RM {} and RM {}",
                        amount, min, max
                    )
                }
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid value for '{}': {}", field, reason)
                }
            },
        }
    }

    /// Structured details for the error body
    pub fn details(&self) -> Option<serde_json::Value> {
        match &self.kind {
            AppErrorKind::External(ExternalError::Gateway(err)) => err
                .raw_diagnostic()
                .map(|raw| serde_json::json!({ "raw": raw })),
            AppErrorKind::Validation(ValidationError::MissingFields { fields }) => {
                Some(serde_json::json!({ "fields": fields }))
            }
            AppErrorKind::Reconciliation(ReconciliationError::Gap { bill_code, .. })
            | AppErrorKind::Domain(DomainError::DuplicateSettlement { bill_code }) => {
                Some(serde_json::json!({ "billCode": bill_code }))
            }
            AppErrorKind::Infrastructure(InfrastructureError::StorePermissionDenied { path }) => {
                Some(serde_json::json!({ "path": path }))
            }
            _ => None,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Reconciliation(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Store { is_retryable, .. } => *is_retryable,
                InfrastructureError::StorePermissionDenied { .. } => false,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(ExternalError::Gateway(err)) => err.is_retryable(),
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{}: {}", context, self.user_message()),
            None => write!(f, "{}", self.user_message()),
        }
    }
}

impl std::error::Error for AppError {}

// From<PaymentError> lives in payments/error.rs and From<DatabaseError> in
// database/error.rs

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::new(AppErrorKind::Infrastructure(
            InfrastructureError::Configuration {
                message: err.to_string(),
            },
        ))
    }
}
