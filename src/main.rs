use payment_reconciler::api::{self, AppState};
use payment_reconciler::config::AppConfig;
use payment_reconciler::database::{
    self, order_repository::OrderRepository, status_repository::StatusRepository,
    webhook_log_repository::WebhookLogRepository,
};
use payment_reconciler::health::{ConfigSummary, HealthChecker};
use payment_reconciler::logging::{describe_secret, init_tracing};
use payment_reconciler::middleware::auth::JwtVerifier;
use payment_reconciler::payments::providers::edviron::{EdvironConfig, EdvironGateway};
use payment_reconciler::services::{ReconciliationConfig, ReconciliationEngine};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

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
            Ok(mut stream) => {
                stream.recv().await;
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
    dotenv::dotenv().ok();

    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        gateway = %config.gateway.base_url,
        pg_key = %describe_secret(config.gateway.pg_key.as_deref()),
        api_key = %describe_secret(config.gateway.api_key.as_deref()),
        school_id = %describe_secret(config.gateway.school_id.as_deref()),
        "Starting payment reconciliation service"
    );

    if config.gateway.pg_key.is_none() || config.gateway.api_key.is_none() {
        warn!("PG_KEY or API_KEY is not set; payment creation will fail until configured");
    }
    if config.auth.jwt_secret.is_none() {
        warn!("JWT_SECRET is not set; reporting endpoints will reject every request");
    }

    let db_pool = database::init_pool_from_config(&config.database)
        .await
        .map_err(|e| {
            error!("Failed to initialize database pool: {}", e);
            e
        })?;
    database::run_migrations(&db_pool).await?;

    info!(
        max_connections = db_pool.options().get_max_connections(),
        "Database connection pool initialized"
    );

    let gateway = EdvironGateway::new(EdvironConfig::from(&config.gateway)).map_err(|e| {
        error!("Failed to initialize payment gateway client: {}", e);
        e
    })?;

    let engine = ReconciliationEngine::new(
        Arc::new(OrderRepository::new(db_pool.clone())),
        Arc::new(StatusRepository::new(db_pool.clone())),
        Arc::new(WebhookLogRepository::new(db_pool.clone())),
        Arc::new(gateway),
        ReconciliationConfig::from(&config),
    );

    let state = AppState {
        engine: Arc::new(engine),
        auth: Arc::new(JwtVerifier::new(config.auth.jwt_secret.clone())),
        health: HealthChecker::new(Some(db_pool.clone()), ConfigSummary::from_config(&config)),
    };

    let app = api::router(state, &config.server.cors_allowed_origins);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db_pool.close().await;
    info!("Server shutdown complete");

    Ok(())
}
