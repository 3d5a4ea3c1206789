//! HTTP surface: routing, shared state and probes.

pub mod payments;
pub mod transactions;
pub mod webhooks;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, warn};

use crate::error::AppError;
use crate::health::HealthChecker;
use crate::middleware::error::get_request_id_from_headers;
use crate::middleware::auth::{require_bearer, JwtVerifier};
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::services::ReconciliationEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReconciliationEngine>,
    pub auth: Arc<JwtVerifier>,
    pub health: HealthChecker,
}

/// Build the application router with request ids, access logging and CORS.
pub fn router(state: AppState, cors_allowed_origins: &[String]) -> Router {
    let reporting = Router::new()
        .route("/transactions", get(transactions::list_all))
        .route(
            "/transactions/school/{school_id}",
            get(transactions::list_by_school),
        )
        .route(
            "/transaction-status/{id}",
            get(payments::transaction_status),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.auth.clone(),
            require_bearer,
        ));

    Router::new()
        .route("/create-payment", post(payments::create_payment))
        .route("/webhook", post(webhooks::handle_webhook))
        .route("/status/{id}", get(payments::check_status))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(reporting)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(cors_layer(cors_allowed_origins)),
        )
}

/// `*` allows any origin; otherwise only the listed origins that parse.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Attach the `x-request-id` set by the request id layer to an error.
pub(crate) fn tag_request(error: AppError, headers: &HeaderMap) -> AppError {
    match get_request_id_from_headers(headers) {
        Some(request_id) => error.with_request_id(request_id),
        None => error,
    }
}

async fn health(State(state): State<AppState>) -> Response {
    (StatusCode::OK, Json(state.health.liveness())).into_response()
}

/// Readiness probe - 503 until the database answers
async fn readiness(State(state): State<AppState>) -> Response {
    let status = state.health.check_readiness().await;
    if status.is_healthy() {
        (StatusCode::OK, Json(status)).into_response()
    } else {
        error!("Readiness check failed");
        (StatusCode::SERVICE_UNAVAILABLE, Json(status)).into_response()
    }
}
