use crate::payments::error::PaymentResult;
use crate::payments::types::{
    CollectRequest, CollectRequestResponse, GatewayName, StatusPollRequest,
};
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Outbound port to the payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Register a collect request and return its identifier and payment URL.
    async fn create_collect_request(
        &self,
        request: CollectRequest,
    ) -> PaymentResult<CollectRequestResponse>;

    /// Fetch the gateway's view of a collect request. The body is returned untouched.
    async fn poll_status(&self, request: StatusPollRequest) -> PaymentResult<JsonValue>;

    /// Fails when the gateway credential is missing, before any side effect.
    fn check_credentials(&self) -> PaymentResult<()> {
        Ok(())
    }

    fn name(&self) -> GatewayName;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::error::PaymentError;
    use serde_json::json;

    struct EchoGateway;

    #[async_trait]
    impl PaymentGateway for EchoGateway {
        async fn create_collect_request(
            &self,
            request: CollectRequest,
        ) -> PaymentResult<CollectRequestResponse> {
            Ok(CollectRequestResponse::from_raw(json!({
                "collect_request_id": format!("cr-{}", request.school_id),
                "collect_request_url": "https://pay/echo"
            })))
        }

        async fn poll_status(&self, request: StatusPollRequest) -> PaymentResult<JsonValue> {
            if request.sign.is_empty() {
                return Err(PaymentError::SigningError {
                    message: "unsigned".to_string(),
                });
            }
            Ok(json!({"collect_request_id": request.collect_request_id, "status": "SUCCESS"}))
        }

        fn name(&self) -> GatewayName {
            GatewayName::Edviron
        }
    }

    #[tokio::test]
    async fn gateway_trait_is_object_safe() {
        let gateway: Box<dyn PaymentGateway> = Box::new(EchoGateway);
        assert!(gateway.check_credentials().is_ok());

        let created = gateway
            .create_collect_request(CollectRequest {
                school_id: "S1".to_string(),
                amount: "500".to_string(),
                callback_url: "https://google.com".to_string(),
                sign: "token".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(created.collect_request_id.as_deref(), Some("cr-S1"));

        let polled = gateway
            .poll_status(StatusPollRequest {
                collect_request_id: "cr-S1".to_string(),
                school_id: "S1".to_string(),
                sign: String::new(),
            })
            .await;
        assert!(polled.is_err());
    }
}
