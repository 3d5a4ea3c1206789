//! Edviron client against a local HTTP double.

use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use payment_reconciler::error::{AppError, ErrorCode};
use payment_reconciler::payments::providers::edviron::{EdvironConfig, EdvironGateway};
use payment_reconciler::payments::signer::verify;
use payment_reconciler::payments::types::{CollectRequest, StatusPollRequest};
use payment_reconciler::payments::{PaymentError, PaymentGateway};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/erp", addr)
}

fn gateway(base_url: String) -> EdvironGateway {
    EdvironGateway::new(EdvironConfig {
        api_key: Some("api-test-key".to_string()),
        base_url,
        timeout_secs: 5,
        max_retries: 0,
    })
    .unwrap()
}

fn collect_request(sign: String) -> CollectRequest {
    CollectRequest {
        school_id: "S1".to_string(),
        amount: "500".to_string(),
        callback_url: "https://google.com".to_string(),
        sign,
    }
}

#[tokio::test]
async fn test_create_collect_request_sends_bearer_and_signed_body() {
    let app = Router::new().route(
        "/erp/create-collect-request",
        post(|headers: HeaderMap, Json(body): Json<Value>| async move {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            if auth != "Bearer api-test-key" {
                return (StatusCode::UNAUTHORIZED, Json(json!({"message": "bad key"})));
            }
            let claims = verify(body["sign"].as_str().unwrap_or_default(), "pg-key");
            if claims.is_err() || body["school_id"] != "S1" {
                return (StatusCode::BAD_REQUEST, Json(json!({"message": "bad sign"})));
            }
            (
                StatusCode::OK,
                Json(json!({"collect_id": "cid-9", "redirect_url": "https://pay/cid-9"})),
            )
        }),
    );
    let base = spawn(app).await;

    let sign = payment_reconciler::payments::signer::sign(
        &json!({"school_id": "S1", "amount": "500", "callback_url": "https://google.com"}),
        "pg-key",
    )
    .unwrap();

    let response = gateway(base)
        .create_collect_request(collect_request(sign))
        .await
        .unwrap();

    assert_eq!(response.collect_request_id.as_deref(), Some("cid-9"));
    assert_eq!(response.payment_url.as_deref(), Some("https://pay/cid-9"));
}

#[tokio::test]
async fn test_error_status_keeps_upstream_body() {
    let app = Router::new().route(
        "/erp/create-collect-request",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"message": "school not found"})),
            )
        }),
    );
    let base = spawn(app).await;

    let err = gateway(base)
        .create_collect_request(collect_request("token".to_string()))
        .await
        .unwrap_err();

    match err {
        PaymentError::ProviderError {
            raw_body,
            retryable,
            provider_code,
            ..
        } => {
            assert_eq!(raw_body, Some(json!({"message": "school not found"})));
            assert!(!retryable);
            assert_eq!(provider_code.as_deref(), Some("400"));
        }
        other => panic!("expected provider error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_non_json_error_body_is_kept_as_text() {
    let app = Router::new().route(
        "/erp/create-collect-request",
        post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
    );
    let base = spawn(app).await;

    let err = gateway(base)
        .create_collect_request(collect_request("token".to_string()))
        .await
        .unwrap_err();

    match err {
        PaymentError::ProviderError {
            raw_body,
            retryable,
            ..
        } => {
            assert_eq!(raw_body, Some(json!("upstream down")));
            assert!(retryable);
        }
        other => panic!("expected provider error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_poll_status_sends_school_and_sign_query() {
    let app = Router::new().route(
        "/erp/collect-request/{id}",
        get(
            |Path(id): Path<String>, Query(query): Query<HashMap<String, String>>| async move {
                Json(json!({
                    "collect_request_id": id,
                    "school_id": query.get("school_id"),
                    "sign": query.get("sign"),
                    "status": "SUCCESS"
                }))
            },
        ),
    );
    let base = spawn(app).await;

    let body = gateway(base)
        .poll_status(StatusPollRequest {
            collect_request_id: "cr-1".to_string(),
            school_id: "S1".to_string(),
            sign: "a.b.c".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(body["collect_request_id"], "cr-1");
    assert_eq!(body["school_id"], "S1");
    assert_eq!(body["sign"], "a.b.c");
    assert_eq!(body["status"], "SUCCESS");
}

#[tokio::test]
async fn test_unreachable_gateway_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = gateway(format!("http://{}/erp", addr))
        .create_collect_request(collect_request("token".to_string()))
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::NetworkError { .. }));
}

#[tokio::test]
async fn test_slow_gateway_times_out() {
    let app = Router::new().route(
        "/erp/create-collect-request",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({"collect_request_id": "late"}))
        }),
    );
    let base = spawn(app).await;

    let gateway = EdvironGateway::new(EdvironConfig {
        api_key: Some("api-test-key".to_string()),
        base_url: base,
        timeout_secs: 1,
        max_retries: 0,
    })
    .unwrap();

    let err = gateway
        .create_collect_request(collect_request("token".to_string()))
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::Timeout { timeout_secs: 1 }));

    let app_error = AppError::from(err);
    assert_eq!(app_error.error_code(), ErrorCode::ExternalServiceTimeout);
    assert_eq!(app_error.status_code(), 504);
}
