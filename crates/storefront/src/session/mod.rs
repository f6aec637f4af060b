//! Session storage and management.
//!
//! # Layers
//!
//! - [`KvStore`] - expiring key-value store over opaque strings, with a
//!   conditional write used for optimistic concurrency
//! - [`MemoryKvStore`] / [`PostgresKvStore`] - the two backends
//! - [`SessionManager`] - session identity, lazy creation, versioned
//!   read-modify-write of the session blob, and rate-limit markers
//!
//! Session records and rate-limit markers share one namespace; keys carry a
//! fixed prefix per kind.

mod manager;
mod memory;
mod postgres;
mod store;

pub use manager::{
    RESEND_WINDOW, ResolvedSession, SESSION_TTL, SessionError, SessionManager,
};
pub use memory::MemoryKvStore;
pub use postgres::PostgresKvStore;
pub use store::{KvStore, RESEND_KEY_PREFIX, SESSION_KEY_PREFIX, StoreError, resend_key, session_key};
