//! Storage ports used by the reconciliation engine.
//!
//! Each trait has a Postgres implementation next to its entity and an
//! in-memory implementation in [`crate::database::in_memory`].

use crate::database::error::DbResult;
use crate::database::order_repository::{NewOrder, Order};
use crate::database::status_repository::{
    NewOrderStatus, OrderStatus, StatusUpdate, TransactionListParams, TransactionRow,
    UpsertOutcome,
};
use crate::database::webhook_log_repository::{NewWebhookLog, WebhookLog};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, order: NewOrder) -> DbResult<Order>;

    /// First order created with this merchant reference, if any.
    async fn find_by_custom_order_id(&self, custom_order_id: &str) -> DbResult<Option<Order>>;
}

#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Insert the pending row for a new collect request, or attach the order to
    /// a row a webhook already created.
    async fn create_pending(&self, status: NewOrderStatus) -> DbResult<OrderStatus>;

    /// Apply `update` to the row for `collect_id`, creating it when missing.
    ///
    /// With `reject_stale`, an update whose payment time is older than the
    /// stored one leaves the row unchanged and reports `applied = false`.
    async fn upsert_by_collect_id(
        &self,
        collect_id: &str,
        update: StatusUpdate,
        reject_stale: bool,
    ) -> DbResult<UpsertOutcome>;

    async fn find_by_collect_id(&self, collect_id: &str) -> DbResult<Option<OrderStatus>>;

    /// Most recent status by payment time (missing times last), then creation time.
    async fn latest_for_order(&self, order_id: Uuid) -> DbResult<Option<OrderStatus>>;

    async fn list_transactions(
        &self,
        params: &TransactionListParams,
    ) -> DbResult<Vec<TransactionRow>>;
}

#[async_trait]
pub trait WebhookLogStore: Send + Sync {
    async fn record(&self, entry: NewWebhookLog) -> DbResult<WebhookLog>;

    /// Attach a processing failure to a log row that has no error yet.
    async fn record_failure(&self, id: Uuid, error: &str) -> DbResult<()>;
}
