//! Bearer JWT guard for reporting routes.

use crate::error::{AppError, AppErrorKind, DomainError};
use crate::middleware::error::get_request_id_from_headers;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingHeader,
    #[error("malformed Authorization header")]
    MalformedHeader,
    #[error("authentication is not configured")]
    NotConfigured,
    #[error("invalid token: {0}")]
    InvalidToken(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: usize,
}

/// Caller identity, inserted into request extensions once the token verifies.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Clone, Default)]
pub struct JwtVerifier {
    secret: Option<String>,
}

impl JwtVerifier {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let secret = self.secret.as_deref().ok_or(AuthError::NotConfigured)?;

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    /// Pull the token out of an `Authorization: Bearer ...` header value.
    pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
        let header = header.ok_or(AuthError::MissingHeader)?;
        match header.split_once(' ') {
            Some((scheme, token))
                if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() =>
            {
                Ok(token.trim())
            }
            _ => Err(AuthError::MalformedHeader),
        }
    }
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("configured", &self.secret.is_some())
            .finish()
    }
}

pub async fn require_bearer(
    State(verifier): State<Arc<JwtVerifier>>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = get_request_id_from_headers(request.headers());
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let claims = JwtVerifier::bearer_token(header).and_then(|token| verifier.verify(token));

    match claims {
        Ok(claims) => {
            tracing::debug!(user = %claims.sub, "request authenticated");
            request.extensions_mut().insert(AuthenticatedUser {
                id: claims.sub,
                email: claims.email,
            });
            next.run(request).await
        }
        Err(reason) => {
            tracing::warn!(reason = %reason, "rejected unauthenticated request");
            let mut error = AppError::new(AppErrorKind::Domain(DomainError::Unauthorized {
                reason: reason.to_string(),
            }));
            if let Some(request_id) = request_id {
                error = error.with_request_id(request_id);
            }
            error.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, exp_offset: i64) -> String {
        let claims = Claims {
            sub: "user-1".to_string(),
            email: Some("ops@school.test".to_string()),
            exp: (Utc::now().timestamp() + exp_offset) as usize,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_yields_claims() {
        let verifier = JwtVerifier::new(Some("jwt-secret".to_string()));
        let claims = verifier.verify(&token("jwt-secret", 3600)).unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn expired_or_foreign_tokens_are_rejected() {
        let verifier = JwtVerifier::new(Some("jwt-secret".to_string()));
        assert!(verifier.verify(&token("jwt-secret", -3600)).is_err());
        assert!(verifier.verify(&token("other", 3600)).is_err());
    }

    #[test]
    fn unset_secret_rejects_everything() {
        let verifier = JwtVerifier::new(None);
        assert_eq!(
            verifier.verify(&token("jwt-secret", 3600)).unwrap_err(),
            AuthError::NotConfigured
        );
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(JwtVerifier::bearer_token(Some("Bearer abc")).unwrap(), "abc");
        assert_eq!(JwtVerifier::bearer_token(Some("bearer abc")).unwrap(), "abc");
        assert_eq!(
            JwtVerifier::bearer_token(Some("Basic abc")).unwrap_err(),
            AuthError::MalformedHeader
        );
        assert!(JwtVerifier::bearer_token(Some("Bearer ")).is_err());
        assert_eq!(JwtVerifier::bearer_token(None).unwrap_err(), AuthError::MissingHeader);
    }
}
