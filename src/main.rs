use driver_commission_relay::api::{self, AppState};
use driver_commission_relay::config::{skip_externals, AppConfig};
use driver_commission_relay::database::{init_memory_store, init_store};
use driver_commission_relay::logging::init_tracing;
use driver_commission_relay::payments::ToyyibPayGateway;
use driver_commission_relay::services::TokioSleeper;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        gateway_environment = config.gateway.environment.as_str(),
        "🚀 Starting driver commission relay"
    );

    let store = if skip_externals() {
        info!("⏭️  Using in-memory document store (SKIP_EXTERNALS=true)");
        init_memory_store()
    } else {
        init_store(&config.store).map_err(|e| {
            error!("Failed to initialize document store: {}", e);
            e
        })?
    };

    info!(
        environment = config.gateway.environment.as_str(),
        base_url = %config.gateway.base_url,
        secret_key = %config.gateway.secret_key_preview(),
        category_code = %config.gateway.category_code,
        "💳 Initializing bill gateway"
    );
    let gateway = Arc::new(ToyyibPayGateway::new(config.gateway.clone()).map_err(|e| {
        error!("❌ Failed to initialize bill gateway: {}", e);
        e
    })?);

    info!(
        max_attempts = config.reconciliation.mapping_max_attempts,
        backoff_ms = config.reconciliation.mapping_backoff.as_millis() as u64,
        dedup_enabled = config.reconciliation.dedup_enabled,
        "Callback reconciliation configured"
    );

    let state = AppState::new(
        store,
        gateway,
        config.gateway.clone(),
        &config.reconciliation,
        Arc::new(TokioSleeper),
    );

    let startup_health = state.health.check_health().await;
    if startup_health.is_healthy() {
        info!("✅ Document store reachable");
    } else {
        error!(status = ?startup_health.status, "❌ Document store health check failed at startup");
    }

    let app = api::router(state).layer(api::cors_layer(&config.server));
    info!("✅ Routes configured");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}
