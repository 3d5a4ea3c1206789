//! Payment lifecycle: create collect requests, apply gateway webhooks, answer
//! status queries and build transaction reports.

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, DEFAULT_CALLBACK_URL};
use crate::database::order_repository::{NewOrder, StudentInfo};
use crate::database::repository::{OrderStore, StatusStore, WebhookLogStore};
use crate::database::status_repository::{
    NewOrderStatus, OrderStatus, SortDirection, SortField, TransactionListParams, TransactionRow,
    STATUS_PENDING,
};
use crate::database::webhook_log_repository::NewWebhookLog;
use crate::error::{AppError, AppErrorKind, AppResult, DomainError, ValidationError};
use crate::payments::error::PaymentError;
use crate::payments::utils::deserialize_optional_amount;
use crate::payments::provider::PaymentGateway;
use crate::payments::signer::RequestSigner;
use crate::payments::types::{CollectRequest, StatusPollRequest};
use crate::services::webhook_payload::{extract_order_id, extract_status_code, WebhookPayload};

pub const MISSING_PAYMENT_FIELDS: &str = "school_id and amount are required";
pub const CREATE_PAYMENT_FAILED: &str = "Failed to create payment link";
pub const INVALID_WEBHOOK_PAYLOAD: &str = "Invalid webhook payload";
pub const WEBHOOK_PROCESSING_FAILED: &str = "Webhook processing failed";
pub const STATUS_CHECK_FAILED: &str = "Failed to check payment status";
pub const TRANSACTIONS_FAILED: &str = "Failed to fetch transactions";

pub const PAYMENT_LINK_CREATED: &str = "Payment link created successfully";
pub const PAYMENT_LINK_MISSING: &str = "Payment created, but no payment_url returned from API";

const DEFAULT_PAGE_SIZE: i64 = 10;

/// Settings the engine needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub default_callback_url: String,
    pub pg_key: Option<String>,
    pub school_id: Option<String>,
    pub max_page_size: u32,
    pub enforce_unique_custom_order_id: bool,
    pub reject_stale_webhooks: bool,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            default_callback_url: DEFAULT_CALLBACK_URL.to_string(),
            pg_key: None,
            school_id: None,
            max_page_size: 100,
            enforce_unique_custom_order_id: false,
            reject_stale_webhooks: true,
        }
    }
}

impl From<&AppConfig> for ReconciliationConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            default_callback_url: config.gateway.default_callback_url.clone(),
            pg_key: config.gateway.pg_key.clone(),
            school_id: config.gateway.school_id.clone(),
            max_page_size: config.reconciliation.max_page_size,
            enforce_unique_custom_order_id: config.reconciliation.enforce_unique_custom_order_id,
            reject_stale_webhooks: config.reconciliation.reject_stale_webhooks,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePaymentRequest {
    #[serde(default)]
    pub school_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub amount: Option<BigDecimal>,
    #[serde(default)]
    pub student_info: Option<StudentInfo>,
    #[serde(default)]
    pub trustee_id: Option<String>,
    #[serde(default)]
    pub custom_order_id: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatePaymentOutcome {
    pub message: String,
    pub collect_request_id: String,
    pub payment_url: Option<String>,
    pub order_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookOutcome {
    pub updated: OrderStatus,
    /// False when the update was older than the stored state and skipped.
    pub applied: bool,
    pub created: bool,
    pub log_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "source")]
pub enum PaymentStatusLookup {
    /// A local order exists; `status` is null when no status row is linked yet.
    #[serde(rename = "db")]
    Db { status: Option<OrderStatus> },
    #[serde(rename = "remote")]
    Remote { data: JsonValue },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionQuery {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionPage {
    pub page: u32,
    pub limit: u32,
    pub data: Vec<TransactionRow>,
}

pub struct ReconciliationEngine {
    orders: Arc<dyn OrderStore>,
    statuses: Arc<dyn StatusStore>,
    webhook_logs: Arc<dyn WebhookLogStore>,
    gateway: Arc<dyn PaymentGateway>,
    signer: RequestSigner,
    config: ReconciliationConfig,
}

impl ReconciliationEngine {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        statuses: Arc<dyn StatusStore>,
        webhook_logs: Arc<dyn WebhookLogStore>,
        gateway: Arc<dyn PaymentGateway>,
        config: ReconciliationConfig,
    ) -> Self {
        Self {
            signer: RequestSigner::new(config.pg_key.clone()),
            orders,
            statuses,
            webhook_logs,
            gateway,
            config,
        }
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    /// Persist an order, register a collect request with the gateway and
    /// record its pending status.
    ///
    /// The order is kept even if the gateway call fails afterwards.
    pub async fn create_payment(
        &self,
        request: CreatePaymentRequest,
    ) -> AppResult<CreatePaymentOutcome> {
        let (school_id, amount) = validate_create_request(&request)?;

        self.signer
            .ensure_configured()
            .and_then(|_| self.gateway.check_credentials())
            .map_err(|e| {
                error!(error = %e, "payment creation refused: gateway not configured");
                AppError::from(e).with_context(CREATE_PAYMENT_FAILED)
            })?;

        let custom_order_id = request
            .custom_order_id
            .filter(|id| !id.trim().is_empty());

        if self.config.enforce_unique_custom_order_id {
            if let Some(custom_order_id) = &custom_order_id {
                let existing = self
                    .orders
                    .find_by_custom_order_id(custom_order_id)
                    .await
                    .map_err(|e| AppError::from(e).with_context(CREATE_PAYMENT_FAILED))?;
                if existing.is_some() {
                    warn!(custom_order_id = %custom_order_id, "duplicate custom_order_id rejected");
                    return Err(AppError::new(AppErrorKind::Domain(
                        DomainError::DuplicateOrder {
                            custom_order_id: custom_order_id.clone(),
                        },
                    ))
                    .with_context(CREATE_PAYMENT_FAILED));
                }
            }
        }

        let order = self
            .orders
            .create(NewOrder {
                school_id: school_id.clone(),
                trustee_id: request.trustee_id,
                student_info: request.student_info,
                gateway_name: self.gateway.name().as_str().to_string(),
                custom_order_id,
            })
            .await
            .map_err(|e| AppError::from(e).with_context(CREATE_PAYMENT_FAILED))?;

        let callback_url = request
            .callback_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| self.config.default_callback_url.clone());
        let amount_text = amount.to_string();

        let sign = self
            .signer
            .sign(&json!({
                "school_id": school_id,
                "amount": amount_text,
                "callback_url": callback_url,
            }))
            .map_err(|e| AppError::from(e).with_context(CREATE_PAYMENT_FAILED))?;

        let response = self
            .gateway
            .create_collect_request(CollectRequest {
                school_id: school_id.clone(),
                amount: amount_text,
                callback_url,
                sign,
            })
            .await
            .map_err(|e| {
                error!(order_id = %order.id, error = %e, "gateway rejected collect request");
                AppError::from(e).with_context(CREATE_PAYMENT_FAILED)
            })?;

        let collect_id = response.collect_request_id.clone().ok_or_else(|| {
            error!(order_id = %order.id, "gateway response lacks a collect request id");
            AppError::from(PaymentError::InvalidResponse {
                provider: self.gateway.name().as_str().to_string(),
                message: "response did not include a collect request id".to_string(),
                raw_body: Some(response.raw.clone()),
            })
            .with_context(CREATE_PAYMENT_FAILED)
        })?;

        self.statuses
            .create_pending(NewOrderStatus {
                collect_id: collect_id.clone(),
                order_ref: order.id,
                order_amount: amount,
                transaction_amount: BigDecimal::from(0),
                status: STATUS_PENDING.to_string(),
            })
            .await
            .map_err(|e| AppError::from(e).with_context(CREATE_PAYMENT_FAILED))?;

        let message = match &response.payment_url {
            Some(_) => PAYMENT_LINK_CREATED,
            None => {
                warn!(collect_id = %collect_id, "gateway returned no payment url");
                PAYMENT_LINK_MISSING
            }
        };

        info!(
            order_id = %order.id,
            collect_id = %collect_id,
            school_id = %school_id,
            "payment link created"
        );

        Ok(CreatePaymentOutcome {
            message: message.to_string(),
            collect_request_id: collect_id,
            payment_url: response.payment_url,
            order_id: order.id,
        })
    }

    /// Log the raw webhook, then upsert the status row named by
    /// `order_info.order_id`.
    pub async fn handle_webhook(&self, payload: JsonValue) -> AppResult<WebhookOutcome> {
        let parsed = WebhookPayload::parse(&payload).and_then(WebhookPayload::into_update);

        let log = self
            .webhook_logs
            .record(NewWebhookLog {
                status_code: extract_status_code(&payload),
                order_id: extract_order_id(&payload),
                processed_at: Utc::now(),
                error_message: parsed.as_ref().err().cloned(),
                webhook_data: payload,
            })
            .await
            .map_err(|e| {
                error!(error = %e, "failed to log webhook");
                AppError::from(e).with_context(WEBHOOK_PROCESSING_FAILED)
            })?;

        let (collect_id, update) = match parsed {
            Ok(parsed) => parsed,
            Err(reason) => {
                warn!(log_id = %log.id, reason = %reason, "invalid webhook payload");
                return Err(AppError::new(AppErrorKind::Domain(
                    DomainError::InvalidWebhookPayload { reason },
                ))
                .with_context(INVALID_WEBHOOK_PAYLOAD));
            }
        };

        match self
            .statuses
            .upsert_by_collect_id(&collect_id, update, self.config.reject_stale_webhooks)
            .await
        {
            Ok(outcome) => {
                if outcome.applied {
                    info!(
                        collect_id = %collect_id,
                        status = %outcome.status.status,
                        created = outcome.created,
                        "webhook applied"
                    );
                } else {
                    warn!(
                        collect_id = %collect_id,
                        stored_payment_time = ?outcome.status.payment_time,
                        "stale webhook ignored"
                    );
                }
                Ok(WebhookOutcome {
                    updated: outcome.status,
                    applied: outcome.applied,
                    created: outcome.created,
                    log_id: log.id,
                })
            }
            Err(e) => {
                error!(collect_id = %collect_id, error = %e, "webhook status update failed");
                if let Err(log_err) = self.webhook_logs.record_failure(log.id, &e.to_string()).await {
                    error!(log_id = %log.id, error = %log_err, "failed to annotate webhook log");
                }
                Err(AppError::from(e).with_context(WEBHOOK_PROCESSING_FAILED))
            }
        }
    }

    /// Answer from local storage when an order carries this merchant reference,
    /// otherwise ask the gateway.
    pub async fn check_payment_status(&self, id: &str) -> AppResult<PaymentStatusLookup> {
        let id = id.trim();
        if id.is_empty() {
            return Err(AppError::missing_field("id").with_context(STATUS_CHECK_FAILED));
        }

        let order = self
            .orders
            .find_by_custom_order_id(id)
            .await
            .map_err(|e| AppError::from(e).with_context(STATUS_CHECK_FAILED))?;

        if let Some(order) = order {
            let status = self
                .statuses
                .latest_for_order(order.id)
                .await
                .map_err(|e| AppError::from(e).with_context(STATUS_CHECK_FAILED))?;
            info!(custom_order_id = %id, found_status = status.is_some(), "status served from db");
            return Ok(PaymentStatusLookup::Db { status });
        }

        let school_id = self
            .config
            .school_id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                AppError::configuration("SCHOOL_ID is not set").with_context(STATUS_CHECK_FAILED)
            })?;

        let sign = self
            .signer
            .sign(&json!({
                "school_id": school_id,
                "collect_request_id": id,
            }))
            .map_err(|e| AppError::from(e).with_context(STATUS_CHECK_FAILED))?;

        let data = self
            .gateway
            .poll_status(StatusPollRequest {
                collect_request_id: id.to_string(),
                school_id,
                sign,
            })
            .await
            .map_err(|e| {
                warn!(collect_id = %id, error = %e, "remote status check failed");
                AppError::from(e).with_context(STATUS_CHECK_FAILED)
            })?;

        Ok(PaymentStatusLookup::Remote { data })
    }

    pub async fn get_all_transactions(&self, query: TransactionQuery) -> AppResult<TransactionPage> {
        self.list_transactions(None, query).await
    }

    pub async fn get_transactions_by_school(
        &self,
        school_id: &str,
        query: TransactionQuery,
    ) -> AppResult<TransactionPage> {
        if school_id.trim().is_empty() {
            return Err(AppError::missing_field("school_id").with_context(TRANSACTIONS_FAILED));
        }
        self.list_transactions(Some(school_id.to_string()), query).await
    }

    async fn list_transactions(
        &self,
        school_id: Option<String>,
        query: TransactionQuery,
    ) -> AppResult<TransactionPage> {
        let params = self
            .normalize_query(school_id, query)
            .map_err(|e| e.with_context(TRANSACTIONS_FAILED))?;

        let data = self
            .statuses
            .list_transactions(&params)
            .await
            .map_err(|e| AppError::from(e).with_context(TRANSACTIONS_FAILED))?;

        Ok(TransactionPage {
            page: params.page,
            limit: params.limit,
            data,
        })
    }

    /// Defaults: page 1, limit 10, newest payment first. Limits above the
    /// configured maximum are clamped.
    pub fn normalize_query(
        &self,
        school_id: Option<String>,
        query: TransactionQuery,
    ) -> AppResult<TransactionListParams> {
        let sort = match query.sort.as_deref().map(str::trim) {
            None | Some("") => SortField::PaymentTime,
            Some(field) => SortField::parse(field).ok_or_else(|| {
                AppError::invalid_field(
                    "sort",
                    format!(
                        "unsupported sort field '{}', expected one of: {}",
                        field,
                        SortField::ACCEPTED.join(", ")
                    ),
                )
            })?,
        };

        let max_page_size = i64::from(self.config.max_page_size.max(1));
        let page = query.page.unwrap_or(1).clamp(1, i64::from(u32::MAX));
        let limit = query
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, max_page_size);

        Ok(TransactionListParams {
            school_id,
            page: page as u32,
            limit: limit as u32,
            sort,
            direction: SortDirection::parse(query.order.as_deref()),
        })
    }
}

fn validate_create_request(request: &CreatePaymentRequest) -> AppResult<(String, BigDecimal)> {
    let school_id = request
        .school_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::missing_field("school_id").with_context(MISSING_PAYMENT_FIELDS))?;

    let amount = request
        .amount
        .clone()
        .ok_or_else(|| AppError::missing_field("amount").with_context(MISSING_PAYMENT_FIELDS))?;

    if amount <= BigDecimal::from(0) {
        return Err(AppError::new(AppErrorKind::Validation(
            ValidationError::InvalidAmount {
                amount: amount.to_string(),
                reason: "amount must be greater than zero".to_string(),
            },
        ))
        .with_context(CREATE_PAYMENT_FAILED));
    }

    Ok((school_id.to_string(), amount))
}
