//! Order commit protocol.
//!
//! Turns the session cart into a priced, immutable order:
//!
//! ```text
//! Validating -> Pricing -> Persisting -> ClearingCart -> Done
//! ```
//!
//! The order and the cart live in different stores, so the last step is not
//! atomic with the others. If clearing the cart fails the order still stands
//! and the stale cart is left for the customer to clear or re-order.

use std::fmt;

use mockable::Clock;
use thiserror::Error;
use tracing::instrument;

use pizzeria_core::{PizzaId, Price};

use crate::db::{CatalogRepository, OrderRepository, RepositoryError};
use crate::models::{NewOrder, Order, OrderItem, Session};
use crate::session::{SessionError, SessionManager};
use crate::state::AppState;

/// Errors that abort an order commit.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Nothing to order.
    #[error("cart is empty")]
    EmptyCart,

    /// Some cart lines refer to pizzas that are no longer sold.
    #[error("pizzas no longer available: {0:?}")]
    ItemUnavailable(Vec<PizzaId>),

    /// Relational store failure.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Session store failure.
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

/// Commit stages, recorded on the tracing span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStage {
    Validating,
    Pricing,
    Persisting,
    ClearingCart,
    Done,
}

impl fmt::Display for CommitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "validating",
            Self::Pricing => "pricing",
            Self::Persisting => "persisting",
            Self::ClearingCart => "clearing_cart",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Places orders from session carts.
pub struct OrderService<'a> {
    catalog: &'a dyn CatalogRepository,
    orders: &'a dyn OrderRepository,
    sessions: &'a SessionManager,
    clock: &'a (dyn Clock + Send + Sync),
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub fn new(state: &'a AppState) -> Self {
        Self {
            catalog: state.catalog(),
            orders: state.orders(),
            sessions: state.sessions(),
            clock: state.clock(),
        }
    }

    /// Commit the cart in `session` as a new order.
    ///
    /// Prices come from the catalog at commit time, never from the cart's
    /// running total. On success the ordered units have been taken out of
    /// the cart in `session`.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::EmptyCart` if there is nothing to order.
    /// Returns `OrderError::ItemUnavailable` if any line no longer exists.
    #[instrument(skip_all, fields(session = %session.id, stage = tracing::field::Empty))]
    pub async fn commit(&self, session: &mut Session) -> Result<Order, OrderError> {
        enter(CommitStage::Validating);
        if session.cart.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        enter(CommitStage::Pricing);
        let items = self.price_cart(session).await?;
        let total: Price = items.iter().map(|item| item.total_price).sum();

        enter(CommitStage::Persisting);
        let order = self
            .orders
            .create(&NewOrder {
                session_id: session.id.clone(),
                user_id: session.user_id,
                total,
                created_at: self.clock.utc(),
                items,
            })
            .await?;
        tracing::info!(order_id = %order.id, total = %order.total, "Order placed");

        // Only the ordered units leave the cart. On a conflicting write the
        // fresh copy may hold lines added after pricing; those stay.
        enter(CommitStage::ClearingCart);
        let cleared: Result<(), SessionError> = self
            .sessions
            .update(session, |s| {
                for item in &order.items {
                    s.cart.subtract(item.pizza_id, item.quantity, item.unit_price);
                }
                Ok(())
            })
            .await;
        if let Err(e) = cleared {
            let event_id = sentry::capture_error(&e);
            tracing::error!(
                order_id = %order.id,
                error = %e,
                sentry_event_id = %event_id,
                "Order placed but cart could not be cleared"
            );
        }

        enter(CommitStage::Done);
        Ok(order)
    }

    /// Price every cart line at the current catalog price.
    async fn price_cart(&self, session: &Session) -> Result<Vec<OrderItem>, OrderError> {
        let catalog = self.catalog.price_lookup(&session.cart.pizza_ids()).await?;

        let missing: Vec<PizzaId> = session
            .cart
            .items()
            .iter()
            .map(|item| item.pizza_id)
            .filter(|id| !catalog.contains_key(id))
            .collect();
        if !missing.is_empty() {
            return Err(OrderError::ItemUnavailable(missing));
        }

        Ok(session
            .cart
            .items()
            .iter()
            .filter_map(|item| {
                catalog.get(&item.pizza_id).map(|pizza| OrderItem {
                    pizza_id: item.pizza_id,
                    name: pizza.name.clone(),
                    quantity: item.quantity,
                    unit_price: pizza.price,
                    total_price: pizza.price.times(item.quantity),
                })
            })
            .collect())
    }

    /// Orders placed from this session, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the query fails.
    pub async fn history(&self, session: &Session) -> Result<Vec<Order>, OrderError> {
        Ok(self.orders.list_for_session(&session.id).await?)
    }
}

fn enter(stage: CommitStage) {
    tracing::Span::current().record("stage", tracing::field::display(stage));
    tracing::debug!(%stage, "order commit stage");
}
