use crate::database::error::DatabaseError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt;
use std::str::FromStr;

/// Local order lifecycle. `created` is the only state with outgoing
/// transitions; the rest are terminal and a row never leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Paid,
    Failed,
    Expired,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Created)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "created" => Ok(OrderStatus::Created),
            "paid" => Ok(OrderStatus::Paid),
            "failed" => Ok(OrderStatus::Failed),
            "expired" => Ok(OrderStatus::Expired),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

/// Payment intent entity. `order_id` is generated locally at creation time
/// and immutable; `gateway_order_id` is filled in once the gateway accepts
/// the order.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub order_id: String,
    pub gateway_order_id: Option<String>,
    pub amount_minor_units: i64,
    pub currency: String,
    pub status: String,
    pub metadata: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Order {
    pub fn status(&self) -> Result<OrderStatus, String> {
        OrderStatus::from_str(&self.status)
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    /// Who the order was placed by (`user_id` note).
    pub fn subject_id(&self) -> Option<&str> {
        self.metadata_value("user_id")
    }

    /// What the order pays for (`course_id` note).
    pub fn resource_id(&self) -> Option<&str> {
        self.metadata_value("course_id")
    }
}

/// Fields required to record a new payment intent.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: String,
    pub amount_minor_units: i64,
    pub currency: String,
    pub metadata: serde_json::Value,
}

/// Durable order store. Status changes go through `transition_status` so a
/// late or duplicate writer can never revert a terminal state.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: NewOrder) -> Result<Order, DatabaseError>;

    async fn find_by_id(&self, order_id: &str) -> Result<Option<Order>, DatabaseError>;

    async fn set_gateway_order_id(
        &self,
        order_id: &str,
        gateway_order_id: &str,
    ) -> Result<Order, DatabaseError>;

    /// Conditionally move an order from `from` to `to`. Returns `false`
    /// when the order was not in `from` (including when it is already in
    /// `to`), without touching the row.
    async fn transition_status(
        &self,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, DatabaseError>;
}

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ORDER_COLUMNS: &str = "order_id, gateway_order_id, amount_minor_units, currency, status, \
                             metadata, created_at, updated_at";

#[async_trait]
impl OrderStore for PgOrderRepository {
    async fn insert(&self, order: NewOrder) -> Result<Order, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "INSERT INTO orders (order_id, amount_minor_units, currency, status, metadata) \
             VALUES ($1, $2, $3, 'created', $4) \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(&order.order_id)
        .bind(order.amount_minor_units)
        .bind(&order.currency)
        .bind(&order.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_id(&self, order_id: &str) -> Result<Option<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn set_gateway_order_id(
        &self,
        order_id: &str,
        gateway_order_id: &str,
    ) -> Result<Order, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders SET gateway_order_id = $2, updated_at = NOW() \
             WHERE order_id = $1 AND gateway_order_id IS NULL \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order_id)
        .bind(gateway_order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .ok_or_else(|| DatabaseError::not_found("Order", order_id))
    }

    async fn transition_status(
        &self,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE orders SET status = $3, updated_at = NOW() \
             WHERE order_id = $1 AND status = $2",
        )
        .bind(order_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }
}
