//! Domain models for the storefront.

pub mod account;
pub mod order;
pub mod pizza;
pub mod session;

pub use account::{Account, AccountCredentials, EmailVerification, NewVerification};
pub use order::{NewOrder, Order, OrderItem};
pub use pizza::{Pizza, PizzaFilter, PizzaPage, PricedPizza};
pub use session::{Session, SessionId};

use pizzeria_core::Price;
use serde::Serializer;

/// Serialize a [`Price`] as a JSON number for API responses.
///
/// Stored blobs keep the exact string form; clients get numbers.
pub(crate) fn price_as_number<S>(price: &Price, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    rust_decimal::serde::float::serialize(&price.amount(), serializer)
}
