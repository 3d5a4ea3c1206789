//! Error response formatting
//!
//! Every failure leaves the service as the same JSON envelope, so clients can
//! branch on `success` and `error` without inspecting status codes.

use crate::error::{AppError, ErrorCode};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Standardized error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always `false`
    pub success: bool,

    /// Machine-readable error code
    pub error: ErrorCode,

    /// Operation-level message, e.g. "Failed to create payment link"
    pub message: String,

    /// Request ID for debugging and support
    pub request_id: Option<String>,

    /// ISO 8601 timestamp of the error
    pub timestamp: String,

    /// Upstream gateway body, or the specific reason behind `message`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Whether the client should retry the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorResponse {
    /// Create a new error response from an AppError
    pub fn from_app_error(error: &AppError) -> Self {
        let (message, details) = match &error.context {
            Some(context) => (
                context.clone(),
                Some(
                    error
                        .upstream_details()
                        .cloned()
                        .unwrap_or_else(|| serde_json::Value::String(error.user_message())),
                ),
            ),
            None => (error.user_message(), error.upstream_details().cloned()),
        };

        Self {
            success: false,
            error: error.error_code(),
            message,
            request_id: error.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            details,
            retryable: Some(error.is_retryable()),
        }
    }
}

/// Implement IntoResponse for AppError to automatically convert errors
/// into HTTP responses with proper status codes and JSON formatting
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::error!(
                error = %self,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::warn!(
                error = %self,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Client error occurred"
            );
        }

        let error_response = ErrorResponse::from_app_error(&self);
        (status_code, Json(error_response)).into_response()
    }
}

/// Wrap a serializable payload as `{"success": true, ...payload}`.
///
/// The payload must serialize to a JSON object; its fields are flattened
/// next to the `success` flag.
#[derive(Debug, Clone, Serialize)]
pub struct SuccessBody<T> {
    pub success: bool,
    #[serde(flatten)]
    pub body: T,
}

pub fn success_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    (
        status,
        Json(SuccessBody {
            success: true,
            body,
        }),
    )
        .into_response()
}

/// Helper to extract request ID from request headers
pub fn get_request_id_from_headers(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
