use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::{error, info};

use crate::api::AppState;

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    info!("🏥 Health check requested");
    let health_status = state.health.check_health().await;

    if health_status.is_serving() {
        info!(status = ?health_status.status, "✅ Health check passed");
        (StatusCode::OK, Json(health_status))
    } else {
        error!("❌ Health check failed - service unhealthy");
        (StatusCode::SERVICE_UNAVAILABLE, Json(health_status))
    }
}
