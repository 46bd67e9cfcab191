//! HTTP surface

pub mod bills;
pub mod callbacks;
pub mod extract;
pub mod health;
pub mod payments;

use axum::{
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::any::Any;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any as CorsAny, CorsLayer};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::error;

use crate::config::{GatewayConfig, ReconciliationConfig, ServerConfig};
use crate::database::bill_mapping_repository::BillMappingRepository;
use crate::database::SharedStore;
use crate::health::HealthChecker;
use crate::middleware::error::ErrorResponse;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::payments::provider::BillGateway;
use crate::services::{
    BillCreationService, CallbackAck, CallbackReconciler, PaymentRecoveryService, Sleeper,
};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub bills: Arc<BillCreationService>,
    pub reconciler: Arc<CallbackReconciler>,
    pub recovery: Arc<PaymentRecoveryService>,
    pub health: HealthChecker,
    pub gateway: Arc<GatewayConfig>,
}

impl AppState {
    pub fn new(
        store: SharedStore,
        gateway: Arc<dyn BillGateway>,
        gateway_config: GatewayConfig,
        reconciliation: &ReconciliationConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let reconciler = Arc::new(CallbackReconciler::new(
            store.clone(),
            reconciliation,
            sleeper,
        ));
        let health = HealthChecker::new(store.clone(), gateway.environment());
        let bills = Arc::new(BillCreationService::new(
            gateway,
            BillMappingRepository::new(store),
            gateway_config.clone(),
        ));

        Self {
            bills,
            recovery: Arc::new(PaymentRecoveryService::new(reconciler.clone())),
            reconciler,
            health,
            gateway: Arc::new(gateway_config),
        }
    }
}

/// All routes with request-id, request logging and panic handling
pub fn router(state: AppState) -> Router {
    // The gateway must always see 200, even when the handler panics
    let callback_routes = Router::new()
        .route("/api/toyyibpay/callback", post(callbacks::handle_callback))
        .layer(CatchPanicLayer::custom(callback_panic_response));

    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/toyyibpay/verify", get(bills::verify_credentials))
        .route("/api/toyyibpay/create-bill", post(bills::create_bill))
        .route("/api/toyyibpay/return", get(bills::payment_return))
        .route("/api/payment/process", post(payments::process_payment))
        .route("/api/payment/recover", post(payments::recover_payment))
        .route("/api/commission/update", post(payments::update_commission))
        .merge(callback_routes)
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

/// CORS from `CORS_ALLOWED_ORIGINS`; `*` allows any origin
pub fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(CorsAny);

    if config.cors_allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(CorsAny);
    }

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o.trim()).ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

fn panic_message(err: &(dyn Any + Send)) -> String {
    if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    }
}

fn callback_panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    error!(panic = %panic_message(err.as_ref()), "callback handler panicked");
    (StatusCode::OK, Json(CallbackAck::internal_error())).into_response()
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    error!(panic = %panic_message(err.as_ref()), "handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::internal_error(None)),
    )
        .into_response()
}
