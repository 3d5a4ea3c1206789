use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use super::{tag_request, AppState};
use crate::error::AppResult;
use crate::middleware::error::success_response;

/// Accept any body. JSON is logged as-is, anything else as a JSON string.
pub fn decode_body(body: &str) -> JsonValue {
    if body.trim().is_empty() {
        return JsonValue::Null;
    }
    match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "webhook body is not JSON");
            JsonValue::String(body.to_string())
        }
    }
}

/// POST /webhook
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<Response> {
    info!(bytes = body.len(), "Received webhook");

    let outcome = state
        .engine
        .handle_webhook(decode_body(&body))
        .await
        .map_err(|e| tag_request(e, &headers))?;

    Ok(success_response(StatusCode::OK, outcome))
}
