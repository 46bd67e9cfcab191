//! Health check module
//! Provides health status for the application and its dependencies

use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::database::error::DatabaseError;
use crate::database::keys::HEALTH_PROBE;
use crate::database::SharedStore;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u64>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
    Warning,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }

    /// Degraded still serves traffic
    pub fn is_serving(&self) -> bool {
        !matches!(self.status, HealthState::Unhealthy)
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u64>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn warning(response_time_ms: Option<u64>, details: Option<String>) -> Self {
        Self {
            status: ComponentState::Warning,
            response_time_ms,
            details,
        }
    }
}

/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    store: SharedStore,
    gateway_environment: &'static str,
    probe_timeout: Duration,
}

impl HealthChecker {
    pub fn new(store: SharedStore, gateway_environment: &'static str) -> Self {
        Self {
            store,
            gateway_environment,
            probe_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// Perform health check of the document store
    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();

        let store_health =
            match timeout(self.probe_timeout, check_store_health(&self.store)).await {
                Ok(Ok(response_time)) => {
                    info!("Document store health check: OK ({}ms)", response_time);
                    ComponentHealth::up(Some(response_time))
                }
                Ok(Err(e)) if e.is_permission_denied() => {
                    // Reachable, but rules refuse the probe path
                    warn!("Document store health check: permission denied: {}", e);
                    ComponentHealth::warning(None, Some(e.to_string()))
                }
                Ok(Err(e)) => {
                    error!("Document store health check failed: {}", e);
                    ComponentHealth::down(Some(e.to_string()))
                }
                Err(_) => {
                    error!("Document store health check timed out");
                    ComponentHealth::down(Some("Timeout".to_string()))
                }
            };

        health_status.status = match store_health.status {
            ComponentState::Up => HealthState::Healthy,
            ComponentState::Warning => HealthState::Degraded,
            ComponentState::Down => HealthState::Unhealthy,
        };
        health_status
            .checks
            .insert("database".to_string(), store_health);

        let mut gateway = ComponentHealth::up(None);
        gateway.details = Some(format!("environment: {}", self.gateway_environment));
        health_status.checks.insert("gateway".to_string(), gateway);

        health_status
    }
}

/// Time a read of the probe path
pub async fn check_store_health(store: &SharedStore) -> Result<u64, DatabaseError> {
    let start = Instant::now();
    store.get(HEALTH_PROBE).await?;
    Ok(start.elapsed().as_millis() as u64)
}
