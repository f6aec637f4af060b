//! Order persistence.
//!
//! An order header and its lines are written in one transaction. Rows are
//! never updated by the storefront afterwards.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use pizzeria_core::{OrderId, OrderStatus, PizzaId, Price, UserId};

use super::{RepositoryError, quantity_from_db};
use crate::models::{NewOrder, Order, OrderItem, SessionId};

/// Durable order storage.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert the header and every line atomically.
    async fn create(&self, order: &NewOrder) -> Result<Order, RepositoryError>;

    /// Orders placed from `session_id`, most recent first.
    async fn list_for_session(&self, session_id: &SessionId)
    -> Result<Vec<Order>, RepositoryError>;

    /// One order, only if it was placed from `session_id`.
    async fn get_for_session(
        &self,
        id: OrderId,
        session_id: &SessionId,
    ) -> Result<Option<Order>, RepositoryError>;
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    user_id: Option<UserId>,
    session_id: Option<String>,
    status: OrderStatus,
    total: Price,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    order_id: OrderId,
    pizza_id: PizzaId,
    pizza_name: String,
    quantity: i64,
    unit_price: Price,
    total_price: Price,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            pizza_id: row.pizza_id,
            name: row.pizza_name,
            quantity: quantity_from_db(row.quantity)?,
            unit_price: row.unit_price,
            total_price: row.total_price,
        })
    }
}

/// `PostgreSQL` order storage.
#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach lines to headers, preserving header order.
    async fn with_items(&self, headers: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        if headers.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i32> = headers.iter().map(|h| h.id.as_i32()).collect();
        let rows: Vec<OrderItemRow> = sqlx::query_as(
            r"
            SELECT order_id, pizza_id, pizza_name, quantity, unit_price, total_price
            FROM storefront.order_item
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            ",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let order_id = row.order_id;
            by_order
                .entry(order_id)
                .or_default()
                .push(OrderItem::try_from(row)?);
        }

        Ok(headers
            .into_iter()
            .map(|h| Order {
                items: by_order.remove(&h.id).unwrap_or_default(),
                id: h.id,
                user_id: h.user_id,
                session_id: h.session_id.as_deref().and_then(SessionId::parse),
                status: h.status,
                total: h.total,
                created_at: h.created_at,
            })
            .collect())
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn create(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let id: OrderId = sqlx::query_scalar(
            r#"
            INSERT INTO storefront."order" (user_id, session_id, status, total, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(order.user_id)
        .bind(order.session_id.as_str())
        .bind(OrderStatus::Pending)
        .bind(order.total)
        .bind(order.created_at)
        .fetch_one(&mut *tx)
        .await?;

        for (position, item) in (0_i32..).zip(&order.items) {
            sqlx::query(
                r"
                INSERT INTO storefront.order_item
                    (order_id, position, pizza_id, pizza_name, quantity, unit_price, total_price)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
            )
            .bind(id)
            .bind(position)
            .bind(item.pizza_id)
            .bind(&item.name)
            .bind(i64::from(item.quantity))
            .bind(item.unit_price)
            .bind(item.total_price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(Order {
            id,
            user_id: order.user_id,
            session_id: Some(order.session_id.clone()),
            status: OrderStatus::Pending,
            total: order.total,
            created_at: order.created_at,
            items: order.items.clone(),
        })
    }

    async fn list_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<Order>, RepositoryError> {
        let headers: Vec<OrderRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, session_id, status, total, created_at
            FROM storefront."order"
            WHERE session_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(session_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        self.with_items(headers).await
    }

    async fn get_for_session(
        &self,
        id: OrderId,
        session_id: &SessionId,
    ) -> Result<Option<Order>, RepositoryError> {
        let header: Option<OrderRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, session_id, status, total, created_at
            FROM storefront."order"
            WHERE id = $1 AND session_id = $2
            "#,
        )
        .bind(id)
        .bind(session_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(header) = header else {
            return Ok(None);
        };
        Ok(self.with_items(vec![header]).await?.into_iter().next())
    }
}
