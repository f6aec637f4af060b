//! The shopping cart embedded in a visitor session.
//!
//! Every mutation keeps `total` in step with the items incrementally: the old
//! contribution of a line is removed and the new one added, both at the unit
//! price supplied by the caller (the live catalog price at mutation time).
//! Nothing here performs I/O; the caller persists the owning session.

use serde::{Deserialize, Serialize};

use crate::types::{PizzaId, Price};

/// Errors raised by cart mutations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    /// The pizza has no line in the cart.
    #[error("pizza {0} is not in the cart")]
    NotInCart(PizzaId),

    /// Quantity must be at least one for additions.
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    /// The line would hold more than [`MAX_LINE_QUANTITY`] units.
    #[error("quantity is too large")]
    QuantityOverflow,
}

/// Most units of one pizza a single cart line may hold.
///
/// Keeps every order line total inside the `NUMERIC` columns it is stored in.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// One line of the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub pizza_id: PizzaId,
    pub quantity: u32,
}

/// The visitor's pending selection.
///
/// Items keep insertion order and each `pizza_id` appears at most once.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartItem>,
    total: Price,
}

impl Cart {
    /// An empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: Vec::new(),
            total: Price::ZERO,
        }
    }

    /// Lines in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Running total maintained by the mutations.
    #[must_use]
    pub const fn total(&self) -> Price {
        self.total
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Quantity currently held for `pizza_id`, if any.
    #[must_use]
    pub fn quantity_of(&self, pizza_id: PizzaId) -> Option<u32> {
        self.position(pizza_id)
            .and_then(|idx| self.items.get(idx))
            .map(|item| item.quantity)
    }

    /// Distinct pizza IDs in the cart, in insertion order.
    #[must_use]
    pub fn pizza_ids(&self) -> Vec<PizzaId> {
        self.items.iter().map(|item| item.pizza_id).collect()
    }

    /// Set the line for `pizza_id` to exactly `quantity`.
    ///
    /// An existing line is repriced: its old contribution is taken out at
    /// `unit_price` and the new one added at the same price. A missing line
    /// is appended.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidQuantity`] if `quantity` is zero and
    /// [`CartError::QuantityOverflow`] if it exceeds [`MAX_LINE_QUANTITY`].
    pub fn add_or_update(
        &mut self,
        pizza_id: PizzaId,
        quantity: u32,
        unit_price: Price,
    ) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }
        if quantity > MAX_LINE_QUANTITY {
            return Err(CartError::QuantityOverflow);
        }

        match self.position(pizza_id) {
            Some(idx) => {
                if let Some(item) = self.items.get_mut(idx) {
                    let old = unit_price.times(item.quantity);
                    item.quantity = quantity;
                    self.total = self.total.saturating_sub(old) + unit_price.times(quantity);
                }
            }
            None => {
                self.items.push(CartItem { pizza_id, quantity });
                self.total = self.total + unit_price.times(quantity);
            }
        }
        Ok(())
    }

    /// Add `quantity` units on top of whatever is already in the cart.
    ///
    /// Returns the resulting line quantity.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidQuantity`] if `quantity` is zero and
    /// [`CartError::QuantityOverflow`] if the line would exceed
    /// [`MAX_LINE_QUANTITY`].
    pub fn add(
        &mut self,
        pizza_id: PizzaId,
        quantity: u32,
        unit_price: Price,
    ) -> Result<u32, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }
        let current = self.quantity_of(pizza_id).unwrap_or(0);
        let next = current
            .checked_add(quantity)
            .ok_or(CartError::QuantityOverflow)?;
        self.add_or_update(pizza_id, next, unit_price)?;
        Ok(next)
    }

    /// Set semantics where zero means "remove the line".
    ///
    /// # Errors
    ///
    /// Returns [`CartError::NotInCart`] when asked to remove a missing line.
    pub fn set_quantity(
        &mut self,
        pizza_id: PizzaId,
        quantity: u32,
        unit_price: Price,
    ) -> Result<(), CartError> {
        if quantity == 0 {
            self.remove(pizza_id, unit_price).map(|_| ())
        } else {
            self.add_or_update(pizza_id, quantity, unit_price)
        }
    }

    /// Remove the line for `pizza_id`, returning the quantity it held.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::NotInCart`] if there is no such line.
    pub fn remove(&mut self, pizza_id: PizzaId, unit_price: Price) -> Result<u32, CartError> {
        let idx = self
            .position(pizza_id)
            .ok_or(CartError::NotInCart(pizza_id))?;
        let item = self.items.remove(idx);
        self.total = if self.items.is_empty() {
            Price::ZERO
        } else {
            self.total.saturating_sub(unit_price.times(item.quantity))
        };
        Ok(item.quantity)
    }

    /// Take `quantity` units of `pizza_id` out of the cart, dropping the line
    /// when nothing is left. Missing lines are ignored.
    ///
    /// Used after an order is placed so that only what was ordered leaves the
    /// cart; units added by someone else in the meantime stay.
    pub fn subtract(&mut self, pizza_id: PizzaId, quantity: u32, unit_price: Price) {
        let Some(current) = self.quantity_of(pizza_id) else {
            return;
        };
        let left = current.saturating_sub(quantity);
        let result = if left == 0 {
            self.remove(pizza_id, unit_price).map(|_| ())
        } else {
            self.add_or_update(pizza_id, left, unit_price)
        };
        debug_assert!(result.is_ok(), "line {pizza_id} vanished while subtracting");
    }

    /// Empty the cart. Idempotent.
    pub fn clear(&mut self) {
        self.items.clear();
        self.total = Price::ZERO;
    }

    fn position(&self, pizza_id: PizzaId) -> Option<usize> {
        self.items.iter().position(|item| item.pizza_id == pizza_id)
    }
}
