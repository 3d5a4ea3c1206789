use serde_json::Value as JsonValue;
use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    /// A signing secret or gateway credential is missing.
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Signing error: {message}")]
    SigningError { message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Gateway timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Non-2xx response. `raw_body` holds the upstream body, parsed as JSON when possible.
    #[error("Provider error: provider={provider}, message={message}")]
    ProviderError {
        provider: String,
        message: String,
        provider_code: Option<String>,
        raw_body: Option<JsonValue>,
        retryable: bool,
    },

    /// 2xx response the client could not use.
    #[error("Invalid provider response: provider={provider}, message={message}")]
    InvalidResponse {
        provider: String,
        message: String,
        raw_body: Option<JsonValue>,
    },
}

impl PaymentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::ConfigurationError { .. } => false,
            PaymentError::SigningError { .. } => false,
            PaymentError::NetworkError { .. } => true,
            PaymentError::Timeout { .. } => true,
            PaymentError::ProviderError { retryable, .. } => *retryable,
            PaymentError::InvalidResponse { .. } => false,
        }
    }
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError, InfrastructureError};

        let is_retryable = err.is_retryable();
        let kind = match err {
            PaymentError::ConfigurationError { message } | PaymentError::SigningError { message } => {
                AppErrorKind::Infrastructure(InfrastructureError::Configuration { message })
            }
            PaymentError::Timeout { timeout_secs } => AppErrorKind::External(ExternalError::Timeout {
                service: "Payment gateway".to_string(),
                timeout_secs,
            }),
            PaymentError::NetworkError { message } => {
                AppErrorKind::External(ExternalError::PaymentGateway {
                    gateway: "gateway".to_string(),
                    message,
                    upstream: None,
                    is_retryable,
                })
            }
            PaymentError::ProviderError {
                provider,
                message,
                raw_body,
                ..
            } => AppErrorKind::External(ExternalError::PaymentGateway {
                gateway: provider,
                message,
                upstream: raw_body,
                is_retryable,
            }),
            PaymentError::InvalidResponse {
                provider,
                message,
                raw_body,
            } => AppErrorKind::External(ExternalError::InvalidGatewayResponse {
                gateway: provider,
                reason: message,
                upstream: raw_body,
            }),
        };

        AppError::new(kind)
    }
}
