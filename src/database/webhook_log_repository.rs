use crate::database::error::{DatabaseError, DbResult};
use crate::database::repository::WebhookLogStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// One row per inbound webhook call
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WebhookLog {
    pub id: Uuid,
    pub webhook_data: serde_json::Value,
    pub status_code: i32,
    pub order_id: Option<String>,
    pub processed_at: DateTime<Utc>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWebhookLog {
    pub webhook_data: serde_json::Value,
    pub status_code: i32,
    pub order_id: Option<String>,
    pub processed_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

const WEBHOOK_LOG_COLUMNS: &str =
    "id, webhook_data, status_code, order_id, processed_at, error_message, created_at";

/// Append-only webhook audit log in Postgres
#[derive(Clone)]
pub struct WebhookLogRepository {
    pool: PgPool,
}

impl WebhookLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookLogStore for WebhookLogRepository {
    async fn record(&self, entry: NewWebhookLog) -> DbResult<WebhookLog> {
        let query = format!(
            "INSERT INTO webhook_logs (id, webhook_data, status_code, order_id, processed_at, error_message, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW()) \
             RETURNING {}",
            WEBHOOK_LOG_COLUMNS
        );

        sqlx::query_as::<_, WebhookLog>(&query)
            .bind(Uuid::new_v4())
            .bind(&entry.webhook_data)
            .bind(entry.status_code)
            .bind(&entry.order_id)
            .bind(entry.processed_at)
            .bind(&entry.error_message)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx(e).with_context("insert webhook log"))
    }

    async fn record_failure(&self, id: Uuid, error: &str) -> DbResult<()> {
        // Annotate once; an existing reason is never overwritten.
        sqlx::query(
            "UPDATE webhook_logs SET error_message = $2 WHERE id = $1 AND error_message IS NULL",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_sqlx(e).with_context("record webhook failure"))?;

        Ok(())
    }
}
