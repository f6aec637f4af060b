//! Pizzeria Storefront library.
//!
//! The public REST API: catalog browsing, a session-backed cart, order
//! commit, and email-verified accounts. Exposed as a library so the router
//! can be driven in tests without a network listener.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod session;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;
