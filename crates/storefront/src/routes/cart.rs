//! Cart route handlers.
//!
//! The cart lives inside the visitor's session. Every mutation looks up the
//! live catalog price, applies the change through the session manager (which
//! retries on concurrent writes) and returns the resulting cart.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use pizzeria_core::{Cart, CartError, CartItem, PizzaId, Price};

use super::extract::ApiJson;
use super::pizzas::parse_pizza_id;
use crate::error::{AppError, Result};
use crate::middleware::CurrentSession;
use crate::models::price_as_number;
use crate::state::AppState;

/// Cart as returned by every cart endpoint.
#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub items: Vec<CartItem>,
    #[serde(serialize_with = "price_as_number")]
    pub total: Price,
}

impl From<&Cart> for CartResponse {
    fn from(cart: &Cart) -> Self {
        Self {
            items: cart.items().to_vec(),
            total: cart.total(),
        }
    }
}

/// `POST /cart` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub pizza_id: Option<i64>,
    pub quantity: Option<i64>,
}

/// `PUT /cart/{pizzaId}` body.
#[derive(Debug, Deserialize)]
pub struct SetQuantityRequest {
    pub quantity: Option<i64>,
}

impl AddToCartRequest {
    fn validate(&self) -> Result<(PizzaId, u32)> {
        let (Some(pizza_id), Some(quantity)) = (self.pizza_id, self.quantity) else {
            return Err(AppError::BadRequest(
                "pizzaId and quantity are required".to_string(),
            ));
        };
        let pizza_id = i32::try_from(pizza_id)
            .ok()
            .filter(|id| *id > 0)
            .map(PizzaId::new)
            .ok_or_else(|| AppError::BadRequest("Invalid pizza id".to_string()))?;
        let quantity = u32::try_from(quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or(CartError::InvalidQuantity)?;
        Ok((pizza_id, quantity))
    }
}

impl SetQuantityRequest {
    fn validate(&self) -> Result<u32> {
        let quantity = self
            .quantity
            .ok_or_else(|| AppError::BadRequest("quantity is required".to_string()))?;
        u32::try_from(quantity).map_err(|_| {
            AppError::BadRequest("Quantity must be a non-negative integer".to_string())
        })
    }
}

/// Current price of a pizza, if it is still sold.
async fn current_price(state: &AppState, pizza_id: PizzaId) -> Result<Option<Price>> {
    let mut found = state.catalog().price_lookup(&[pizza_id]).await?;
    Ok(found.remove(&pizza_id).map(|pizza| pizza.price))
}

async fn require_price(state: &AppState, pizza_id: PizzaId) -> Result<Price> {
    current_price(state, pizza_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Pizza not found".to_string()))
}

/// Show the cart.
#[instrument(skip_all, fields(session = %session.id))]
pub async fn show(CurrentSession(session): CurrentSession) -> Json<CartResponse> {
    Json(CartResponse::from(&session.cart))
}

/// Add units of a pizza to the cart.
#[instrument(skip_all, fields(session = %session.id))]
pub async fn add(
    State(state): State<AppState>,
    CurrentSession(mut session): CurrentSession,
    ApiJson(body): ApiJson<AddToCartRequest>,
) -> Result<Json<CartResponse>> {
    let (pizza_id, quantity) = body.validate()?;
    let price = require_price(&state, pizza_id).await?;

    let line = state
        .sessions()
        .update(&mut session, |s| {
            s.cart.add(pizza_id, quantity, price).map_err(AppError::from)
        })
        .await?;
    tracing::debug!(%pizza_id, line_quantity = line, "Added to cart");

    Ok(Json(CartResponse::from(&session.cart)))
}

/// Set the quantity of one line. Zero removes it.
#[instrument(skip_all, fields(session = %session.id))]
pub async fn update(
    State(state): State<AppState>,
    CurrentSession(mut session): CurrentSession,
    Path(pizza_id): Path<String>,
    ApiJson(body): ApiJson<SetQuantityRequest>,
) -> Result<Json<CartResponse>> {
    let pizza_id = parse_pizza_id(&pizza_id)?;
    let quantity = body.validate()?;

    let price = if quantity == 0 {
        current_price(&state, pizza_id).await?.unwrap_or(Price::ZERO)
    } else {
        require_price(&state, pizza_id).await?
    };

    state
        .sessions()
        .update(&mut session, |s| {
            s.cart
                .set_quantity(pizza_id, quantity, price)
                .map_err(AppError::from)
        })
        .await?;

    Ok(Json(CartResponse::from(&session.cart)))
}

/// Remove one line from the cart.
///
/// A line whose pizza has left the catalog can still be removed.
#[instrument(skip_all, fields(session = %session.id))]
pub async fn remove(
    State(state): State<AppState>,
    CurrentSession(mut session): CurrentSession,
    Path(pizza_id): Path<String>,
) -> Result<Json<CartResponse>> {
    let pizza_id = parse_pizza_id(&pizza_id)?;
    if session.cart.quantity_of(pizza_id).is_none() {
        return Err(CartError::NotInCart(pizza_id).into());
    }
    let price = current_price(&state, pizza_id)
        .await?
        .unwrap_or(Price::ZERO);

    state
        .sessions()
        .update(&mut session, |s| {
            s.cart.remove(pizza_id, price).map_err(AppError::from)
        })
        .await?;

    Ok(Json(CartResponse::from(&session.cart)))
}

/// Empty the cart.
#[instrument(skip_all, fields(session = %session.id))]
pub async fn clear(
    State(state): State<AppState>,
    CurrentSession(mut session): CurrentSession,
) -> Result<Json<CartResponse>> {
    if !session.cart.is_empty() {
        state
            .sessions()
            .update(&mut session, |s| {
                s.cart.clear();
                Ok::<_, AppError>(())
            })
            .await?;
    }
    Ok(Json(CartResponse::from(&session.cart)))
}
