use crate::config::GatewayConfig;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentGateway;
use crate::payments::types::{
    CollectRequest, CollectRequestResponse, GatewayName, StatusPollRequest,
};
use crate::payments::utils::PaymentHttpClient;
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct EdvironConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for EdvironConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: crate::config::DEFAULT_GATEWAY_BASE_URL.to_string(),
            timeout_secs: 10,
            max_retries: 0,
        }
    }
}

impl From<&GatewayConfig> for EdvironConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        }
    }
}

pub struct EdvironGateway {
    config: EdvironConfig,
    http: PaymentHttpClient,
}

impl EdvironGateway {
    pub fn new(config: EdvironConfig) -> PaymentResult<Self> {
        let http = PaymentHttpClient::new(
            GatewayName::Edviron.as_str(),
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn api_key(&self) -> PaymentResult<&str> {
        self.config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(PaymentError::ConfigurationError {
                message: "API_KEY is not set".to_string(),
            })
    }

    /// `{base}/collect-request/{id}?school_id=..&sign=..` with the id as a single path segment.
    fn status_url(&self, request: &StatusPollRequest) -> PaymentResult<Url> {
        let mut url = Url::parse(&self.config.base_url).map_err(|e| {
            PaymentError::ConfigurationError {
                message: format!("PAYMENT_API_BASE_URL is not a valid URL: {}", e),
            }
        })?;

        url.path_segments_mut()
            .map_err(|_| PaymentError::ConfigurationError {
                message: "PAYMENT_API_BASE_URL cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .push("collect-request")
            .push(&request.collect_request_id);

        url.query_pairs_mut()
            .append_pair("school_id", &request.school_id)
            .append_pair("sign", &request.sign);

        Ok(url)
    }
}

#[async_trait]
impl PaymentGateway for EdvironGateway {
    async fn create_collect_request(
        &self,
        request: CollectRequest,
    ) -> PaymentResult<CollectRequestResponse> {
        let api_key = self.api_key()?;
        let payload = serde_json::to_value(&request).map_err(|e| PaymentError::SigningError {
            message: format!("failed to encode collect request: {}", e),
        })?;

        let raw = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/create-collect-request"),
                Some(api_key),
                Some(&payload),
            )
            .await?;

        let response = CollectRequestResponse::from_raw(raw);
        match &response.collect_request_id {
            Some(collect_id) => info!(
                school_id = %request.school_id,
                collect_id = %collect_id,
                has_payment_url = response.payment_url.is_some(),
                "edviron collect request created"
            ),
            None => warn!(
                school_id = %request.school_id,
                "edviron response did not include a collect request id"
            ),
        }

        Ok(response)
    }

    async fn poll_status(&self, request: StatusPollRequest) -> PaymentResult<JsonValue> {
        let url = self.status_url(&request)?;
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty());

        let body = self
            .http
            .request_json(reqwest::Method::GET, url.as_str(), api_key, None)
            .await?;

        info!(
            collect_id = %request.collect_request_id,
            "edviron collect request status fetched"
        );
        Ok(body)
    }

    fn check_credentials(&self) -> PaymentResult<()> {
        self.api_key().map(|_| ())
    }

    fn name(&self) -> GatewayName {
        GatewayName::Edviron
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(api_key: Option<&str>) -> EdvironGateway {
        EdvironGateway::new(EdvironConfig {
            api_key: api_key.map(str::to_string),
            base_url: "https://dev-vanilla.edviron.com/erp/".to_string(),
            timeout_secs: 10,
            max_retries: 0,
        })
        .unwrap()
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(
            gateway(Some("key")).endpoint("/create-collect-request"),
            "https://dev-vanilla.edviron.com/erp/create-collect-request"
        );
    }

    #[test]
    fn status_url_encodes_id_and_query() {
        let url = gateway(Some("key"))
            .status_url(&StatusPollRequest {
                collect_request_id: "abc/1".to_string(),
                school_id: "S 1".to_string(),
                sign: "t.o.k".to_string(),
            })
            .unwrap();

        assert_eq!(
            url.as_str(),
            "https://dev-vanilla.edviron.com/erp/collect-request/abc%2F1?school_id=S+1&sign=t.o.k"
        );
    }

    #[test]
    fn missing_api_key_fails_credential_check() {
        assert!(matches!(
            gateway(None).check_credentials(),
            Err(PaymentError::ConfigurationError { .. })
        ));
        assert!(gateway(Some("key")).check_credentials().is_ok());
    }

    #[tokio::test]
    async fn create_without_api_key_makes_no_request() {
        let result = gateway(Some(" "))
            .create_collect_request(CollectRequest {
                school_id: "S1".to_string(),
                amount: "500".to_string(),
                callback_url: "https://google.com".to_string(),
                sign: "token".to_string(),
            })
            .await;

        assert!(matches!(result, Err(PaymentError::ConfigurationError { .. })));
    }
}
