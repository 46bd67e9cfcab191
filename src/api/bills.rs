//! Bill endpoints: credential check, bill creation and the payer's return
//! redirect

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::api::extract::JsonBody;
use crate::api::AppState;
use crate::error::AppError;
use crate::middleware::error::get_request_id_from_headers;
use crate::payments::types::amount_to_json;
use crate::services::CreateBillRequest;

/// Credential presence and environment, with masked previews only
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub environment: &'static str,
    pub base_url: String,
    pub create_bill_url: String,
    pub secret_key_configured: bool,
    pub category_code_configured: bool,
    pub secret_key_preview: String,
    pub category_code_preview: String,
}

/// Query of the gateway's return redirect
#[derive(Debug, Default, Deserialize)]
pub struct ReturnQuery {
    pub status_id: Option<String>,
    pub billcode: Option<String>,
    #[serde(rename = "billCode")]
    pub bill_code: Option<String>,
    pub order_id: Option<String>,
    pub msg: Option<String>,
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectStatus {
    Paid,
    Pending,
    Failed,
    Unknown,
}

impl RedirectStatus {
    /// `1` paid, `2` pending, `3` failed. A bill code without a status counts
    /// as paid.
    pub fn from_redirect(status_id: Option<&str>, has_bill_code: bool) -> Self {
        match status_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some("1") => Self::Paid,
            Some("2") => Self::Pending,
            Some("3") => Self::Failed,
            Some(_) => Self::Unknown,
            None if has_bill_code => Self::Paid,
            None => Self::Unknown,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnResponse {
    pub bill_code: Option<String>,
    pub status: RedirectStatus,
    pub status_id: Option<String>,
    pub transaction_id: Option<String>,
    pub order_id: Option<String>,
    pub message: Option<String>,
    pub mapping_found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<JsonValue>,
    /// Whether a callback or manual settlement already claimed this bill
    pub settled: Option<bool>,
}

/// GET /api/toyyibpay/verify
pub async fn verify_credentials(State(state): State<AppState>) -> impl IntoResponse {
    let config = &state.gateway;
    info!(
        environment = config.environment.as_str(),
        secret_key = %config.secret_key_preview(),
        "🔑 gateway credential check requested"
    );

    Json(VerifyResponse {
        environment: config.environment.as_str(),
        base_url: config.base_url.clone(),
        create_bill_url: config.create_bill_url(),
        secret_key_configured: !config.user_secret_key.trim().is_empty(),
        category_code_configured: !config.category_code.trim().is_empty(),
        secret_key_preview: config.secret_key_preview(),
        category_code_preview: crate::config::secret_preview(&config.category_code),
    })
}

/// POST /api/toyyibpay/create-bill
pub async fn create_bill(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<CreateBillRequest>,
) -> Result<impl IntoResponse, AppError> {
    let request_id = get_request_id_from_headers(&headers);

    let response = state.bills.create_bill(&request).await.map_err(|e| match &request_id {
        Some(id) => e.with_request_id(id.clone()),
        None => e,
    })?;

    Ok((StatusCode::OK, Json(response)))
}

/// GET /api/toyyibpay/return
///
/// Read-only view of the redirect; settlement happens through the callback.
pub async fn payment_return(
    State(state): State<AppState>,
    Query(query): Query<ReturnQuery>,
) -> impl IntoResponse {
    let bill_code = query
        .billcode
        .or(query.bill_code)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    let status = RedirectStatus::from_redirect(query.status_id.as_deref(), bill_code.is_some());

    info!(
        bill_code = bill_code.as_deref().unwrap_or("-"),
        status_id = query.status_id.as_deref().unwrap_or("-"),
        status = ?status,
        "↩️ payer returned from gateway"
    );

    let mut response = ReturnResponse {
        bill_code: bill_code.clone(),
        status,
        status_id: query.status_id,
        transaction_id: query.transaction_id,
        order_id: query.order_id,
        message: query.msg,
        mapping_found: false,
        driver_id: None,
        amount: None,
        settled: None,
    };

    if let Some(code) = bill_code.as_deref() {
        match state.reconciler.mappings().get(code).await {
            Ok(Some(mapping)) => {
                response.mapping_found = true;
                response.driver_id = mapping.driver_id;
                response.amount = mapping.amount.map(amount_to_json);
            }
            Ok(None) => warn!(bill_code = code, "return redirect for unknown bill"),
            Err(e) => warn!(bill_code = code, error = %e, "bill mapping lookup failed"),
        }

        match state.reconciler.processed().is_processed(code).await {
            Ok(settled) => response.settled = Some(settled),
            Err(e) => warn!(bill_code = code, error = %e, "settlement status lookup failed"),
        }
    }

    Json(response)
}
