//! Order route handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use pizzeria_core::{OrderId, OrderStatus, PizzaId, Price};

use crate::error::{AppError, Result};
use crate::middleware::CurrentSession;
use crate::models::{Order, OrderItem, price_as_number};
use crate::services::OrderService;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub pizza_id: PizzaId,
    pub name: String,
    pub quantity: u32,
    #[serde(serialize_with = "price_as_number")]
    pub unit_price: Price,
    #[serde(serialize_with = "price_as_number")]
    pub total_price: Price,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: OrderId,
    #[serde(serialize_with = "price_as_number")]
    pub total: Price,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
}

impl From<OrderItem> for OrderItemResponse {
    fn from(item: OrderItem) -> Self {
        Self {
            pizza_id: item.pizza_id,
            name: item.name,
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.total_price,
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id,
            total: order.total,
            created_at: order.created_at,
            status: order.status,
            items: order.items.into_iter().map(Into::into).collect(),
        }
    }
}

/// Turn the session cart into an order.
#[instrument(skip_all, fields(session = %session.id))]
pub async fn create(
    State(state): State<AppState>,
    CurrentSession(mut session): CurrentSession,
) -> Result<(StatusCode, Json<OrderResponse>)> {
    let order = OrderService::new(&state).commit(&mut session).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// Orders placed from this session, newest first.
#[instrument(skip_all, fields(session = %session.id))]
pub async fn list(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<Json<OrderListResponse>> {
    let orders = OrderService::new(&state).history(&session).await?;
    Ok(Json(OrderListResponse {
        orders: orders.into_iter().map(Into::into).collect(),
    }))
}

/// One order placed from this session.
///
/// Orders from other sessions are indistinguishable from missing ones.
#[instrument(skip_all, fields(session = %session.id))]
pub async fn show(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>> {
    let id = id
        .parse::<OrderId>()
        .map_err(|_| AppError::BadRequest("Invalid order id".to_string()))?;

    state
        .orders()
        .get_for_session(id, &session.id)
        .await?
        .map(|order| Json(order.into()))
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))
}
