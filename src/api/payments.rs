//! Operator endpoints for manual settlement, mapping recovery and ledger
//! adjustment

use axum::{extract::State, http::HeaderMap, Json};
use tracing::info;

use crate::api::extract::JsonBody;
use crate::api::AppState;
use crate::error::AppError;
use crate::middleware::error::get_request_id_from_headers;
use crate::services::payment_recovery::{
    CommissionUpdateRequest, CommissionUpdateResponse, ProcessPaymentRequest,
    RecoverPaymentRequest, SettlementResponse,
};

fn tag(headers: &HeaderMap) -> impl Fn(AppError) -> AppError {
    let request_id = get_request_id_from_headers(headers);
    move |e| match &request_id {
        Some(id) => e.with_request_id(id.clone()),
        None => e,
    }
}

/// POST /api/payment/process
pub async fn process_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<ProcessPaymentRequest>,
) -> Result<Json<SettlementResponse>, AppError> {
    info!(
        bill_code = request.bill_code.as_deref().unwrap_or("-"),
        "🛠️ manual settlement requested"
    );
    let response = state.recovery.process(&request).await.map_err(tag(&headers))?;
    Ok(Json(response))
}

/// POST /api/payment/recover
pub async fn recover_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<RecoverPaymentRequest>,
) -> Result<Json<SettlementResponse>, AppError> {
    info!(
        bill_code = request.bill_code.as_deref().unwrap_or("-"),
        driver_id = request.driver_id.as_deref().unwrap_or("-"),
        "🛠️ payment recovery requested"
    );
    let response = state.recovery.recover(&request).await.map_err(tag(&headers))?;
    Ok(Json(response))
}

/// POST /api/commission/update
pub async fn update_commission(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<CommissionUpdateRequest>,
) -> Result<Json<CommissionUpdateResponse>, AppError> {
    info!(
        driver_id = request.driver_id.as_deref().unwrap_or("-"),
        "🛠️ manual commission update requested"
    );
    let response = state
        .recovery
        .update_commission(&request)
        .await
        .map_err(tag(&headers))?;
    Ok(Json(response))
}
