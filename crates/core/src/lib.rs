//! Pizzeria Core - Shared types and the cart engine.
//!
//! This crate provides the domain vocabulary used by every pizzeria component:
//! - `storefront` - The public REST API (catalog, cart, orders, accounts)
//! - `cli` - Command-line tools for migrations, seeding and housekeeping
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP. This keeps it lightweight and trivially testable.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, emails, and statuses
//! - [`cart`] - The cart value embedded in a session and its mutation rules

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod types;

pub use cart::{Cart, CartError, CartItem, MAX_LINE_QUANTITY};
pub use types::*;
