use thiserror::Error;

use crate::error::{AppError, AppErrorKind, InfrastructureError};

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Document store failures
#[derive(Debug, Clone, Error)]
pub enum DatabaseError {
    /// Store rules refused the request
    #[error("permission denied at '{path}': {message}")]
    PermissionDenied { path: String, message: String },

    /// Timeouts, connection failures and 5xx answers
    #[error("store temporarily unavailable: {message}")]
    Transient { message: String },

    #[error("store rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed data at '{path}': {message}")]
    Malformed { path: String, message: String },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl DatabaseError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DatabaseError::Transient { .. })
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, DatabaseError::PermissionDenied { .. })
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        DatabaseError::InvalidInput {
            message: message.into(),
        }
    }

    /// Classify a non-success HTTP answer from the store
    pub fn from_status(path: &str, status: u16, body: &str) -> Self {
        if status == 401 || status == 403 || body.contains("Permission denied") {
            return DatabaseError::PermissionDenied {
                path: path.to_string(),
                message: body.to_string(),
            };
        }
        if status >= 500 || status == 408 || status == 429 {
            return DatabaseError::Transient {
                message: format!("HTTP {}: {}", status, body),
            };
        }
        DatabaseError::Rejected {
            status,
            body: body.to_string(),
        }
    }
}

impl From<reqwest::Error> for DatabaseError {
    fn from(err: reqwest::Error) -> Self {
        DatabaseError::Transient {
            message: err.to_string(),
        }
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        let kind = match err {
            DatabaseError::PermissionDenied { path, .. } => {
                InfrastructureError::StorePermissionDenied { path }
            }
            other => InfrastructureError::Store {
                is_retryable: other.is_retryable(),
                message: other.to_string(),
            },
        };
        AppError::new(AppErrorKind::Infrastructure(kind))
    }
}
