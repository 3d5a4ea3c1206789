use crate::database::error::{DatabaseError, DatabaseErrorKind, DbResult};
use crate::database::order_repository::{NewOrder, Order};
use crate::database::repository::{OrderStore, StatusStore, WebhookLogStore};
use crate::database::status_repository::{
    NewOrderStatus, OrderStatus, SortDirection, SortField, StatusUpdate, TransactionListParams,
    TransactionOrder, TransactionRow, UpsertOutcome, STATUS_INITIATED,
};
use crate::database::webhook_log_repository::{NewWebhookLog, WebhookLog};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Thread-safe in-memory order store. Insertion order is creation order.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<Vec<Order>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Order> {
        self.orders.read().await.clone()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: NewOrder) -> DbResult<Order> {
        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            school_id: order.school_id,
            trustee_id: order.trustee_id,
            student_info: order.student_info.map(Json),
            gateway_name: order.gateway_name,
            custom_order_id: order.custom_order_id,
            created_at: now,
            updated_at: now,
        };
        self.orders.write().await.push(order.clone());
        Ok(order)
    }

    async fn find_by_custom_order_id(&self, custom_order_id: &str) -> DbResult<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders
            .iter()
            .find(|o| o.custom_order_id.as_deref() == Some(custom_order_id))
            .cloned())
    }
}

/// Thread-safe in-memory status store.
///
/// Holds a handle to the order store so listings can join orders the same
/// way the SQL implementation does.
#[derive(Clone)]
pub struct InMemoryStatusStore {
    statuses: Arc<RwLock<Vec<OrderStatus>>>,
    orders: InMemoryOrderStore,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryStatusStore {
    pub fn new(orders: InMemoryOrderStore) -> Self {
        Self {
            statuses: Arc::default(),
            orders,
            unavailable: Arc::default(),
        }
    }

    pub async fn all(&self) -> Vec<OrderStatus> {
        self.statuses.read().await.clone()
    }

    /// Make every subsequent call fail like a lost database connection.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    fn check_available(&self) -> DbResult<()> {
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            return Err(DatabaseError::new(DatabaseErrorKind::ConnectionError {
                message: "status store unavailable".to_string(),
            }));
        }
        Ok(())
    }
}

fn apply_update(row: &mut OrderStatus, update: StatusUpdate) {
    if let Some(v) = update.order_amount {
        row.order_amount = Some(v);
    }
    if let Some(v) = update.transaction_amount {
        row.transaction_amount = Some(v);
    }
    if let Some(v) = update.payment_mode {
        row.payment_mode = Some(v);
    }
    if let Some(v) = update.payment_details {
        row.payment_details = Some(v);
    }
    if let Some(v) = update.bank_reference {
        row.bank_reference = Some(v);
    }
    if let Some(v) = update.payment_message {
        row.payment_message = Some(v);
    }
    if let Some(v) = update.status {
        row.status = v;
    }
    if let Some(v) = update.error_message {
        row.error_message = Some(v);
    }
    if let Some(v) = update.payment_time {
        row.payment_time = Some(v);
    }
    row.updated_at = Utc::now();
}

enum SortKey<'a> {
    Text(Option<&'a str>),
    Amount(Option<&'a BigDecimal>),
    Time(Option<DateTime<Utc>>),
}

fn sort_key(row: &TransactionRow, field: SortField) -> SortKey<'_> {
    match field {
        SortField::CollectId => SortKey::Text(Some(row.collect_id.as_str())),
        SortField::Status => SortKey::Text(Some(row.status.as_str())),
        SortField::SchoolId => SortKey::Text(row.order.school_id.as_deref()),
        SortField::CustomOrderId => SortKey::Text(row.order.custom_order_id.as_deref()),
        SortField::GatewayName => SortKey::Text(row.order.gateway_name.as_deref()),
        SortField::OrderAmount => SortKey::Amount(row.order_amount.as_ref()),
        SortField::TransactionAmount => SortKey::Amount(row.transaction_amount.as_ref()),
        SortField::PaymentTime => SortKey::Time(row.payment_time),
        SortField::CreatedAt => SortKey::Time(Some(row.created_at)),
    }
}

// `None < Some`, so missing values come first ascending and last descending.
fn compare_keys(a: &SortKey<'_>, b: &SortKey<'_>) -> Ordering {
    match (a, b) {
        (SortKey::Text(x), SortKey::Text(y)) => x.cmp(y),
        (SortKey::Amount(x), SortKey::Amount(y)) => x.cmp(y),
        (SortKey::Time(x), SortKey::Time(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn create_pending(&self, status: NewOrderStatus) -> DbResult<OrderStatus> {
        self.check_available()?;
        let mut statuses = self.statuses.write().await;

        if let Some(existing) = statuses
            .iter_mut()
            .find(|s| s.collect_id == status.collect_id)
        {
            if existing.order_ref.is_none() {
                existing.order_ref = Some(status.order_ref);
            }
            if existing.order_amount.is_none() {
                existing.order_amount = Some(status.order_amount);
            }
            if existing.transaction_amount.is_none() {
                existing.transaction_amount = Some(status.transaction_amount);
            }
            existing.updated_at = Utc::now();
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let row = OrderStatus {
            id: Uuid::new_v4(),
            collect_id: status.collect_id,
            order_ref: Some(status.order_ref),
            order_amount: Some(status.order_amount),
            transaction_amount: Some(status.transaction_amount),
            payment_mode: None,
            payment_details: None,
            bank_reference: None,
            payment_message: None,
            status: status.status,
            error_message: None,
            payment_time: None,
            created_at: now,
            updated_at: now,
        };
        statuses.push(row.clone());
        Ok(row)
    }

    async fn upsert_by_collect_id(
        &self,
        collect_id: &str,
        update: StatusUpdate,
        reject_stale: bool,
    ) -> DbResult<UpsertOutcome> {
        self.check_available()?;
        let mut statuses = self.statuses.write().await;

        if let Some(existing) = statuses.iter_mut().find(|s| s.collect_id == collect_id) {
            if reject_stale && !update.is_newer_than(existing.payment_time) {
                return Ok(UpsertOutcome {
                    status: existing.clone(),
                    applied: false,
                    created: false,
                });
            }
            apply_update(existing, update);
            return Ok(UpsertOutcome {
                status: existing.clone(),
                applied: true,
                created: false,
            });
        }

        let now = Utc::now();
        let mut row = OrderStatus {
            id: Uuid::new_v4(),
            collect_id: collect_id.to_string(),
            order_ref: None,
            order_amount: None,
            transaction_amount: None,
            payment_mode: None,
            payment_details: None,
            bank_reference: None,
            payment_message: None,
            status: STATUS_INITIATED.to_string(),
            error_message: None,
            payment_time: None,
            created_at: now,
            updated_at: now,
        };
        apply_update(&mut row, update);
        statuses.push(row.clone());

        Ok(UpsertOutcome {
            status: row,
            applied: true,
            created: true,
        })
    }

    async fn find_by_collect_id(&self, collect_id: &str) -> DbResult<Option<OrderStatus>> {
        self.check_available()?;
        let statuses = self.statuses.read().await;
        Ok(statuses.iter().find(|s| s.collect_id == collect_id).cloned())
    }

    async fn latest_for_order(&self, order_id: Uuid) -> DbResult<Option<OrderStatus>> {
        self.check_available()?;
        let statuses = self.statuses.read().await;
        Ok(statuses
            .iter()
            .filter(|s| s.order_ref == Some(order_id))
            .max_by(|a, b| {
                a.payment_time
                    .cmp(&b.payment_time)
                    .then(a.created_at.cmp(&b.created_at))
            })
            .cloned())
    }

    async fn list_transactions(
        &self,
        params: &TransactionListParams,
    ) -> DbResult<Vec<TransactionRow>> {
        self.check_available()?;
        let orders = self.orders.all().await;
        let statuses = self.statuses.read().await;

        let mut rows: Vec<TransactionRow> = statuses
            .iter()
            .map(|s| {
                let order = s
                    .order_ref
                    .and_then(|id| orders.iter().find(|o| o.id == id));
                TransactionRow {
                    id: s.id,
                    collect_id: s.collect_id.clone(),
                    order_amount: s.order_amount.clone(),
                    transaction_amount: s.transaction_amount.clone(),
                    status: s.status.clone(),
                    payment_time: s.payment_time,
                    created_at: s.created_at,
                    order: TransactionOrder {
                        school_id: order.map(|o| o.school_id.clone()),
                        custom_order_id: order.and_then(|o| o.custom_order_id.clone()),
                        gateway_name: order.map(|o| o.gateway_name.clone()),
                    },
                }
            })
            .filter(|row| match &params.school_id {
                Some(school_id) => row.order.school_id.as_deref() == Some(school_id.as_str()),
                None => true,
            })
            .collect();

        // Stable sort keeps insertion (creation) order for ties.
        rows.sort_by(|a, b| {
            let ordering = compare_keys(&sort_key(a, params.sort), &sort_key(b, params.sort));
            match params.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        Ok(rows
            .into_iter()
            .skip(params.offset() as usize)
            .take(params.limit as usize)
            .collect())
    }
}

/// Thread-safe in-memory webhook log
#[derive(Default, Clone)]
pub struct InMemoryWebhookLogStore {
    logs: Arc<RwLock<Vec<WebhookLog>>>,
}

impl InMemoryWebhookLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<WebhookLog> {
        self.logs.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.logs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.logs.read().await.is_empty()
    }
}

#[async_trait]
impl WebhookLogStore for InMemoryWebhookLogStore {
    async fn record(&self, entry: NewWebhookLog) -> DbResult<WebhookLog> {
        let log = WebhookLog {
            id: Uuid::new_v4(),
            webhook_data: entry.webhook_data,
            status_code: entry.status_code,
            order_id: entry.order_id,
            processed_at: entry.processed_at,
            error_message: entry.error_message,
            created_at: Utc::now(),
        };
        self.logs.write().await.push(log.clone());
        Ok(log)
    }

    async fn record_failure(&self, id: Uuid, error: &str) -> DbResult<()> {
        let mut logs = self.logs.write().await;
        let log = logs.iter_mut().find(|l| l.id == id).ok_or_else(|| {
            DatabaseError::new(DatabaseErrorKind::NotFound {
                entity: "WebhookLog".to_string(),
                id: id.to_string(),
            })
        })?;
        if log.error_message.is_none() {
            log.error_message = Some(error.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(collect_id: &str, order_ref: Uuid) -> NewOrderStatus {
        NewOrderStatus {
            collect_id: collect_id.to_string(),
            order_ref,
            order_amount: BigDecimal::from(100),
            transaction_amount: BigDecimal::from(0),
            status: "Pending".to_string(),
        }
    }

    fn new_order(school_id: &str, custom_order_id: Option<&str>) -> NewOrder {
        NewOrder {
            school_id: school_id.to_string(),
            trustee_id: None,
            student_info: None,
            gateway_name: "Edviron".to_string(),
            custom_order_id: custom_order_id.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn find_by_custom_order_id_returns_first_created() {
        let orders = InMemoryOrderStore::new();
        let first = orders.create(new_order("S1", Some("dup"))).await.unwrap();
        orders.create(new_order("S2", Some("dup"))).await.unwrap();

        let found = orders.find_by_custom_order_id("dup").await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
        assert!(orders.find_by_custom_order_id("none").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_creates_missing_row_with_default_status() {
        let statuses = InMemoryStatusStore::new(InMemoryOrderStore::new());

        let outcome = statuses
            .upsert_by_collect_id(
                "unknown",
                StatusUpdate {
                    payment_mode: Some("upi".to_string()),
                    ..StatusUpdate::default()
                },
                true,
            )
            .await
            .unwrap();

        assert!(outcome.created);
        assert!(outcome.applied);
        assert_eq!(outcome.status.status, "initiated");
        assert_eq!(outcome.status.order_ref, None);
        assert_eq!(outcome.status.payment_mode.as_deref(), Some("upi"));
    }

    #[tokio::test]
    async fn pending_insert_after_webhook_keeps_reported_status() {
        let orders = InMemoryOrderStore::new();
        let statuses = InMemoryStatusStore::new(orders.clone());
        let order = orders.create(new_order("S1", None)).await.unwrap();

        statuses
            .upsert_by_collect_id(
                "abc",
                StatusUpdate {
                    status: Some("success".to_string()),
                    ..StatusUpdate::default()
                },
                true,
            )
            .await
            .unwrap();
        let row = statuses.create_pending(pending("abc", order.id)).await.unwrap();

        assert_eq!(row.status, "success");
        assert_eq!(row.order_ref, Some(order.id));
        assert_eq!(row.order_amount, Some(BigDecimal::from(100)));
        assert_eq!(statuses.all().await.len(), 1);
    }

    #[tokio::test]
    async fn latest_for_order_prefers_payment_time_then_creation() {
        let orders = InMemoryOrderStore::new();
        let statuses = InMemoryStatusStore::new(orders.clone());
        let order = orders.create(new_order("S1", None)).await.unwrap();

        statuses.create_pending(pending("a", order.id)).await.unwrap();
        statuses.create_pending(pending("b", order.id)).await.unwrap();
        statuses
            .upsert_by_collect_id(
                "a",
                StatusUpdate {
                    payment_time: Some("2024-05-01T10:00:00Z".parse().unwrap()),
                    ..StatusUpdate::default()
                },
                true,
            )
            .await
            .unwrap();

        let latest = statuses.latest_for_order(order.id).await.unwrap().unwrap();
        assert_eq!(latest.collect_id, "a");
    }

    #[tokio::test]
    async fn record_failure_does_not_overwrite_existing_reason() {
        let logs = InMemoryWebhookLogStore::new();
        let log = logs
            .record(NewWebhookLog {
                webhook_data: serde_json::json!({}),
                status_code: 0,
                order_id: None,
                processed_at: Utc::now(),
                error_message: Some("missing order_info.order_id".to_string()),
            })
            .await
            .unwrap();

        logs.record_failure(log.id, "later").await.unwrap();

        let stored = logs.all().await;
        assert_eq!(
            stored[0].error_message.as_deref(),
            Some("missing order_info.order_id")
        );
    }

    #[tokio::test]
    async fn unavailable_store_returns_retryable_error() {
        let statuses = InMemoryStatusStore::new(InMemoryOrderStore::new());
        statuses.set_unavailable(true);

        let err = statuses.find_by_collect_id("abc").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
