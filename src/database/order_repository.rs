use crate::database::error::{DatabaseError, DbResult};
use crate::database::repository::OrderStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentInfo {
    pub name: String,
    pub id: String,
    pub email: String,
}

/// Order entity
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub school_id: String,
    pub trustee_id: Option<String>,
    pub student_info: Option<Json<StudentInfo>>,
    pub gateway_name: String,
    pub custom_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub school_id: String,
    pub trustee_id: Option<String>,
    pub student_info: Option<StudentInfo>,
    pub gateway_name: String,
    pub custom_order_id: Option<String>,
}

const ORDER_COLUMNS: &str =
    "id, school_id, trustee_id, student_info, gateway_name, custom_order_id, created_at, updated_at";

/// Postgres-backed order store
#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn create(&self, order: NewOrder) -> DbResult<Order> {
        let query = format!(
            "INSERT INTO orders (id, school_id, trustee_id, student_info, gateway_name, custom_order_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW()) \
             RETURNING {}",
            ORDER_COLUMNS
        );

        sqlx::query_as::<_, Order>(&query)
            .bind(Uuid::new_v4())
            .bind(&order.school_id)
            .bind(&order.trustee_id)
            .bind(order.student_info.map(Json))
            .bind(&order.gateway_name)
            .bind(&order.custom_order_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx(e).with_context("insert order"))
    }

    async fn find_by_custom_order_id(&self, custom_order_id: &str) -> DbResult<Option<Order>> {
        // Not unique: the first order created under this reference wins.
        let query = format!(
            "SELECT {} FROM orders WHERE custom_order_id = $1 ORDER BY created_at ASC, id ASC LIMIT 1",
            ORDER_COLUMNS
        );

        sqlx::query_as::<_, Order>(&query)
            .bind(custom_order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }
}
