use crate::payments::error::{PaymentError, PaymentResult};
use bigdecimal::BigDecimal;
use reqwest::Client;
use serde::{de, Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// JSON-over-HTTP client shared by gateway implementations.
///
/// Every request carries the configured timeout. Retries apply only to
/// transport failures, 429 and 5xx answers, and default to zero because the
/// create-request endpoint is not idempotent.
#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    provider: String,
    timeout: Duration,
    max_retries: u32,
}

impl PaymentHttpClient {
    pub fn new(provider: impl Into<String>, timeout: Duration, max_retries: u32) -> PaymentResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| PaymentError::NetworkError {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self {
            client,
            provider: provider.into(),
            timeout,
            max_retries,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn request_json(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer_token: Option<&str>,
        body: Option<&JsonValue>,
    ) -> PaymentResult<JsonValue> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            let mut request = self.client.request(method.clone(), url);
            request = request.timeout(self.timeout);

            if let Some(token) = bearer_token {
                request = request.bearer_auth(token);
            }
            if let Some(payload) = body {
                request = request.json(payload);
            }

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    if status.is_success() {
                        return serde_json::from_str::<JsonValue>(&text).map_err(|e| {
                            PaymentError::InvalidResponse {
                                provider: self.provider.clone(),
                                message: format!("invalid JSON response: {}", e),
                                raw_body: Some(JsonValue::String(text)),
                            }
                        });
                    }

                    let retryable = status.is_server_error() || status.as_u16() == 429;
                    if retryable && attempt < self.max_retries {
                        warn!(
                            provider = %self.provider,
                            status = %status,
                            attempt = attempt + 1,
                            "gateway error, retrying"
                        );
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }

                    return Err(PaymentError::ProviderError {
                        provider: self.provider.clone(),
                        message: format!("HTTP {}", status),
                        provider_code: Some(status.as_u16().to_string()),
                        raw_body: parse_raw_body(text),
                        retryable,
                    });
                }
                Err(e) => {
                    let error = if e.is_timeout() {
                        PaymentError::Timeout {
                            timeout_secs: self.timeout.as_secs(),
                        }
                    } else {
                        PaymentError::NetworkError {
                            message: format!("gateway request failed: {}", e),
                        }
                    };
                    last_error = Some(error);
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(PaymentError::NetworkError {
            message: "gateway request failed".to_string(),
        }))
    }
}

/// Keep the upstream body for diagnostics, as JSON when it parses.
fn parse_raw_body(text: String) -> Option<JsonValue> {
    if text.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(&text).unwrap_or(JsonValue::String(text)))
}

/// Read a money amount from a JSON number or numeric string.
///
/// Numbers are parsed from their JSON text so `100.1` stays `100.1` instead
/// of passing through an `f64`.
pub fn deserialize_optional_amount<'de, D>(
    deserializer: D,
) -> Result<Option<BigDecimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = match Option::<JsonValue>::deserialize(deserializer)? {
        None | Some(JsonValue::Null) => return Ok(None),
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(JsonValue::String(s)) => s,
        Some(other) => {
            return Err(de::Error::custom(format!(
                "invalid amount {}, expected a number or numeric string",
                other
            )))
        }
    };
    BigDecimal::from_str(text.trim())
        .map(Some)
        .map_err(|_| de::Error::custom(format!("invalid amount '{}'", text)))
}
