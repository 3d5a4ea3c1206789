//! Unified error handling for the reconciliation service
//!
//! Every engine operation returns [`AppResult`]. The HTTP layer turns an
//! [`AppError`] into a structured `{"success": false, ...}` body with the
//! status code chosen here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable error codes for client handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "INVALID_WEBHOOK_PAYLOAD")]
    InvalidWebhookPayload,
    #[serde(rename = "DUPLICATE_ORDER")]
    DuplicateOrder,
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors (502, 504)
    #[serde(rename = "PAYMENT_GATEWAY_ERROR")]
    PaymentGatewayError,
    #[serde(rename = "INVALID_GATEWAY_RESPONSE")]
    InvalidGatewayResponse,
    #[serde(rename = "EXTERNAL_SERVICE_TIMEOUT")]
    ExternalServiceTimeout,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Reconciliation rule violations
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Webhook lacks `order_info.order_id` or does not match the expected shape
    InvalidWebhookPayload { reason: String },
    /// An order with this merchant reference already exists
    DuplicateOrder { custom_order_id: String },
    /// Missing or rejected bearer credential
    Unauthorized { reason: String },
}

/// Infrastructure-level errors (database, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    /// Database connection or query failure
    Database { message: String, is_retryable: bool },
    /// Missing or invalid configuration
    Configuration { message: String },
}

/// Payment gateway failures
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// Gateway returned an error status or could not be reached
    PaymentGateway {
        gateway: String,
        message: String,
        upstream: Option<serde_json::Value>,
        is_retryable: bool,
    },
    /// Gateway answered 2xx but the body lacked a required field
    InvalidGatewayResponse {
        gateway: String,
        reason: String,
        upstream: Option<serde_json::Value>,
    },
    /// External service timeout
    Timeout { service: String, timeout_secs: u64 },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Invalid amount (format or value)
    InvalidAmount { amount: String, reason: String },
    /// Required field missing
    MissingField { field: String },
    /// Field present but unusable
    InvalidField { field: String, reason: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Attach the operation-level message shown to clients.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Infrastructure(
            InfrastructureError::Configuration {
                message: message.into(),
            },
        ))
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::MissingField {
            field: field.into(),
        }))
    }

    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }))
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InvalidWebhookPayload { .. } => 400,
                DomainError::DuplicateOrder { .. } => 409, // Conflict
                DomainError::Unauthorized { .. } => 401,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentGateway { .. } => 502, // Bad Gateway
                ExternalError::InvalidGatewayResponse { .. } => 502,
                ExternalError::Timeout { .. } => 504, // Gateway Timeout
            },
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InvalidWebhookPayload { .. } => ErrorCode::InvalidWebhookPayload,
                DomainError::DuplicateOrder { .. } => ErrorCode::DuplicateOrder,
                DomainError::Unauthorized { .. } => ErrorCode::Unauthorized,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentGateway { .. } => ErrorCode::PaymentGatewayError,
                ExternalError::InvalidGatewayResponse { .. } => ErrorCode::InvalidGatewayResponse,
                ExternalError::Timeout { .. } => ErrorCode::ExternalServiceTimeout,
            },
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InvalidWebhookPayload { reason } => reason.clone(),
                DomainError::DuplicateOrder { custom_order_id } => {
                    format!("Order '{}' already exists", custom_order_id)
                }
                DomainError::Unauthorized { reason } => format!("Unauthorized: {}", reason),
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Configuration { message } => {
                    format!("Service is not configured: {}", message)
                }
                InfrastructureError::Database { .. } => {
                    "Service temporarily unavailable. Please try again later".to_string()
                }
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentGateway {
                    gateway,
                    message,
                    is_retryable,
                    ..
                } => {
                    if *is_retryable {
                        format!(
                            "Payment gateway ({}) is temporarily unavailable: {}",
                            gateway, message
                        )
                    } else {
                        format!("Payment gateway ({}) rejected the request: {}", gateway, message)
                    }
                }
                ExternalError::InvalidGatewayResponse {
                    gateway, reason, ..
                } => {
                    format!("Payment gateway ({}) returned an unusable response: {}", gateway, reason)
                }
                ExternalError::Timeout {
                    service,
                    timeout_secs,
                } => {
                    format!(
                        "{} request timed out after {} seconds. Please try again",
                        service, timeout_secs
                    )
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid value for '{}': {}", field, reason)
                }
            },
        }
    }

    /// Upstream body carried by gateway errors, if any
    pub fn upstream_details(&self) -> Option<&serde_json::Value> {
        match &self.kind {
            AppErrorKind::External(ExternalError::PaymentGateway { upstream, .. })
            | AppErrorKind::External(ExternalError::InvalidGatewayResponse { upstream, .. }) => {
                upstream.as_ref()
            }
            _ => None,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentGateway { is_retryable, .. } => *is_retryable,
                ExternalError::InvalidGatewayResponse { .. } => false,
                ExternalError::Timeout { .. } => true,
            },
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{}: {}", context, self.user_message()),
            None => write!(f, "{}", self.user_message()),
        }
    }
}

impl std::error::Error for AppError {}

// From<DatabaseError> lives in database/error.rs, From<PaymentError> in payments/error.rs

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
