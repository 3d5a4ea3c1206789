use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    Json,
};
use tracing::info;

use super::{tag_request, AppState};
use crate::error::{AppError, AppResult};
use crate::middleware::error::success_response;
use crate::services::reconciliation::{CreatePaymentRequest, CREATE_PAYMENT_FAILED};

/// Turn a body extraction failure into a structured validation error.
fn body_rejection(rejection: JsonRejection) -> AppError {
    AppError::invalid_field("body", rejection.body_text()).with_context(CREATE_PAYMENT_FAILED)
}

/// POST /create-payment
pub async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(request) = body.map_err(|e| tag_request(body_rejection(e), &headers))?;

    info!(school_id = ?request.school_id, "create payment requested");

    let outcome = state
        .engine
        .create_payment(request)
        .await
        .map_err(|e| tag_request(e, &headers))?;

    Ok(success_response(StatusCode::CREATED, outcome))
}

/// GET /status/{id}
pub async fn check_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let lookup = state
        .engine
        .check_payment_status(&id)
        .await
        .map_err(|e| tag_request(e, &headers))?;

    Ok(success_response(StatusCode::OK, lookup))
}

/// GET /transaction-status/{id}, the authenticated twin of `/status/{id}`
pub async fn transaction_status(
    state: State<AppState>,
    headers: HeaderMap,
    id: Path<String>,
) -> AppResult<Response> {
    check_status(state, headers, id).await
}
