//! Health check module
//! Liveness with a configuration summary, and readiness backed by a database ping

use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::database::{self, error::DatabaseError};
use crate::logging::describe_secret;

const DATABASE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone)]
pub enum ComponentState {
    Up,
    Down,
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
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
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
}

/// Which secrets and settings are present; secret values are never shown.
#[derive(Debug, Serialize, Clone, Default)]
pub struct ConfigSummary {
    pub gateway_base_url: String,
    pub pg_key: String,
    pub api_key: String,
    pub school_id: String,
    pub jwt_secret: String,
    pub max_page_size: u32,
    pub reject_stale_webhooks: bool,
    pub enforce_unique_custom_order_id: bool,
}

impl ConfigSummary {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            gateway_base_url: config.gateway.base_url.clone(),
            pg_key: describe_secret(config.gateway.pg_key.as_deref()),
            api_key: describe_secret(config.gateway.api_key.as_deref()),
            school_id: describe_secret(config.gateway.school_id.as_deref()),
            jwt_secret: describe_secret(config.auth.jwt_secret.as_deref()),
            max_page_size: config.reconciliation.max_page_size,
            reject_stale_webhooks: config.reconciliation.reject_stale_webhooks,
            enforce_unique_custom_order_id: config.reconciliation.enforce_unique_custom_order_id,
        }
    }
}

/// Liveness body for `/health`
#[derive(Debug, Serialize, Clone)]
pub struct LivenessReport {
    pub status: &'static str,
    pub version: &'static str,
    pub config: ConfigSummary,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Health checker for the application
#[derive(Clone, Default)]
pub struct HealthChecker {
    db_pool: Option<sqlx::PgPool>,
    summary: ConfigSummary,
}

impl HealthChecker {
    pub fn new(db_pool: Option<sqlx::PgPool>, summary: ConfigSummary) -> Self {
        Self { db_pool, summary }
    }

    pub fn liveness(&self) -> LivenessReport {
        LivenessReport {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            config: self.summary.clone(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Ping the database. Without a pool (in-memory stores) the service is always ready.
    pub async fn check_readiness(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();

        let Some(pool) = &self.db_pool else {
            health_status.checks.insert(
                "database".to_string(),
                ComponentHealth {
                    status: ComponentState::Up,
                    response_time_ms: None,
                    details: Some("in-memory storage".to_string()),
                },
            );
            return health_status;
        };

        match timeout(DATABASE_CHECK_TIMEOUT, check_database_health(pool)).await {
            Ok(Ok(response_time)) => {
                health_status.checks.insert(
                    "database".to_string(),
                    ComponentHealth::up(Some(response_time)),
                );
                info!("Database health check: OK ({}ms)", response_time);
            }
            Ok(Err(e)) => {
                health_status.status = HealthState::Unhealthy;
                health_status.checks.insert(
                    "database".to_string(),
                    ComponentHealth::down(Some(e.to_string())),
                );
                error!("Database health check failed: {}", e);
            }
            Err(_) => {
                health_status.status = HealthState::Unhealthy;
                health_status.checks.insert(
                    "database".to_string(),
                    ComponentHealth::down(Some("Timeout".to_string())),
                );
                error!("Database health check timed out");
            }
        }

        health_status
    }
}

pub async fn check_database_health(pool: &sqlx::PgPool) -> Result<u128, DatabaseError> {
    let start = Instant::now();
    database::health_check(pool).await?;
    Ok(start.elapsed().as_millis())
}
