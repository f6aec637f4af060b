//! Order models.
//!
//! Orders are immutable once written: line prices and names are captured at
//! commit time and never looked up again.

use chrono::{DateTime, Utc};

use pizzeria_core::{OrderId, OrderStatus, PizzaId, Price, UserId};

use super::SessionId;

/// One priced line of an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    pub pizza_id: PizzaId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Price,
    pub total_price: Price,
}

/// A committed purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub user_id: Option<UserId>,
    pub session_id: Option<SessionId>,
    pub status: OrderStatus,
    pub total: Price,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

/// An order about to be persisted.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub session_id: SessionId,
    pub user_id: Option<UserId>,
    pub total: Price,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}
