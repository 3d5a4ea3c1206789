//! Shared fixtures: a scripted gateway and an engine wired to in-memory stores.

#![allow(dead_code)]

use async_trait::async_trait;
use payment_reconciler::api::{self, AppState};
use payment_reconciler::database::in_memory::{
    InMemoryOrderStore, InMemoryStatusStore, InMemoryWebhookLogStore,
};
use payment_reconciler::health::HealthChecker;
use payment_reconciler::middleware::auth::JwtVerifier;
use payment_reconciler::payments::types::{
    CollectRequest, CollectRequestResponse, GatewayName, StatusPollRequest,
};
use payment_reconciler::payments::{PaymentError, PaymentGateway, PaymentResult};
use payment_reconciler::services::{ReconciliationConfig, ReconciliationEngine};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const JWT_SECRET: &str = "test-jwt-secret";

/// Gateway double that replays queued collect responses in order.
#[derive(Default)]
pub struct StubGateway {
    collect_responses: Mutex<VecDeque<PaymentResult<Value>>>,
    poll_response: Mutex<Option<Value>>,
    pub collect_calls: AtomicUsize,
    pub poll_calls: AtomicUsize,
    pub requests: Mutex<Vec<CollectRequest>>,
    pub polls: Mutex<Vec<StatusPollRequest>>,
    pub api_key_missing: bool,
}

impl StubGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_api_key() -> Self {
        Self {
            api_key_missing: true,
            ..Self::default()
        }
    }

    pub fn push_collect(&self, body: Value) {
        self.collect_responses.lock().unwrap().push_back(Ok(body));
    }

    pub fn push_collect_error(&self, error: PaymentError) {
        self.collect_responses.lock().unwrap().push_back(Err(error));
    }

    pub fn set_poll(&self, body: Value) {
        *self.poll_response.lock().unwrap() = Some(body);
    }

    pub fn collect_count(&self) -> usize {
        self.collect_calls.load(Ordering::SeqCst)
    }

    pub fn poll_count(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_collect_request(
        &self,
        request: CollectRequest,
    ) -> PaymentResult<CollectRequestResponse> {
        self.collect_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        let next = self
            .collect_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({})));
        next.map(CollectRequestResponse::from_raw)
    }

    async fn poll_status(&self, request: StatusPollRequest) -> PaymentResult<Value> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let body = self
            .poll_response
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| json!({"collect_request_id": request.collect_request_id}));
        self.polls.lock().unwrap().push(request);
        Ok(body)
    }

    fn check_credentials(&self) -> PaymentResult<()> {
        if self.api_key_missing {
            return Err(PaymentError::ConfigurationError {
                message: "API_KEY is not set".to_string(),
            });
        }
        Ok(())
    }

    fn name(&self) -> GatewayName {
        GatewayName::Edviron
    }
}

pub struct TestContext {
    pub engine: Arc<ReconciliationEngine>,
    pub orders: InMemoryOrderStore,
    pub statuses: InMemoryStatusStore,
    pub logs: InMemoryWebhookLogStore,
    pub gateway: Arc<StubGateway>,
}

pub fn configured() -> ReconciliationConfig {
    ReconciliationConfig {
        pg_key: Some("pg-test-key".to_string()),
        school_id: Some("S1".to_string()),
        ..ReconciliationConfig::default()
    }
}

pub fn context_with(gateway: StubGateway, config: ReconciliationConfig) -> TestContext {
    let orders = InMemoryOrderStore::new();
    let statuses = InMemoryStatusStore::new(orders.clone());
    let logs = InMemoryWebhookLogStore::new();
    let gateway = Arc::new(gateway);

    let engine = ReconciliationEngine::new(
        Arc::new(orders.clone()),
        Arc::new(statuses.clone()),
        Arc::new(logs.clone()),
        gateway.clone(),
        config,
    );

    TestContext {
        engine: Arc::new(engine),
        orders,
        statuses,
        logs,
        gateway,
    }
}

pub fn context() -> TestContext {
    context_with(StubGateway::new(), configured())
}

pub fn app(ctx: &TestContext) -> axum::Router {
    let state = AppState {
        engine: ctx.engine.clone(),
        auth: Arc::new(JwtVerifier::new(Some(JWT_SECRET.to_string()))),
        health: HealthChecker::default(),
    };
    api::router(state, &["http://localhost:5173".to_string()])
}

pub fn bearer_token() -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use payment_reconciler::middleware::auth::Claims;

    let claims = Claims {
        sub: "user-1".to_string(),
        email: Some("admin@school.test".to_string()),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}
