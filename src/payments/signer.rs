//! HS256 request signing for gateway calls.
//!
//! The gateway verifies a JSON Web Token over the request parameters. Tokens
//! carry no expiry; the gateway checks only the signature and the claims.

use crate::payments::error::{PaymentError, PaymentResult};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::Value as JsonValue;

/// Sign `payload` with `secret`. An empty secret is a configuration error.
pub fn sign(payload: &JsonValue, secret: &str) -> PaymentResult<String> {
    if secret.trim().is_empty() {
        return Err(PaymentError::ConfigurationError {
            message: "signing secret is empty".to_string(),
        });
    }

    encode(
        &Header::new(Algorithm::HS256),
        payload,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| PaymentError::SigningError {
        message: format!("failed to sign gateway payload: {}", e),
    })
}

/// Decode a token produced by [`sign`] back into its claims.
pub fn verify(token: &str, secret: &str) -> PaymentResult<JsonValue> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<JsonValue>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| PaymentError::SigningError {
        message: format!("signature verification failed: {}", e),
    })
}

/// Holds the configured `PG_KEY` so callers never pass secrets around.
#[derive(Clone, Default)]
pub struct RequestSigner {
    secret: Option<String>,
}

impl RequestSigner {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Fails with a configuration error before touching the payload when no key is set.
    pub fn ensure_configured(&self) -> PaymentResult<()> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(PaymentError::ConfigurationError {
                message: "PG_KEY is not set".to_string(),
            })
        }
    }

    pub fn sign(&self, payload: &JsonValue) -> PaymentResult<String> {
        match &self.secret {
            Some(secret) => sign(payload, secret),
            None => Err(PaymentError::ConfigurationError {
                message: "PG_KEY is not set".to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("configured", &self.is_configured())
            .finish()
    }
}
