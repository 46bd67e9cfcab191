//! JSON body extractor whose rejections use the `ErrorResponse` envelope

use axum::{
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{AppError, AppErrorKind, ValidationError};
use crate::middleware::error::get_request_id_from_headers;

/// Like [`Json`], but a missing content type, malformed JSON or a wrongly
/// typed field is a 400 validation error instead of axum's plain-text reply.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let request_id = get_request_id_from_headers(req.headers());
        let path = req.uri().path().to_string();

        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                let reason = rejection.body_text();
                warn!(path = %path, status = %rejection.status(), reason = %reason, "rejected request body");
                let err = AppError::new(AppErrorKind::Validation(ValidationError::InvalidField {
                    field: "body".to_string(),
                    reason,
                }));
                Err(match request_id {
                    Some(id) => err.with_request_id(id),
                    None => err,
                })
            }
        }
    }
}
