//! Key-value store abstraction used for sessions and short-lived markers.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

use crate::models::SessionId;

/// Prefix for session records.
pub const SESSION_KEY_PREFIX: &str = "session:";

/// Prefix for verification-resend rate-limit markers.
pub const RESEND_KEY_PREFIX: &str = "verify-resend:";

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database-backed store failed.
    #[error("session store database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Any other backend failure.
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Expiring key-value store over opaque strings.
///
/// Entries whose expiry has passed are invisible to every operation, whether
/// or not the backend has physically evicted them yet.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a live value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Unconditionally write `value`, expiring `ttl` from now.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    /// Write `value` only if the live value equals `expected`.
    ///
    /// `expected == None` means "only if no live value exists". Returns
    /// `true` when the write happened.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: String,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Remove a key. Returns `true` if a live value was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[must_use]
pub fn session_key(id: &SessionId) -> String {
    format!("{SESSION_KEY_PREFIX}{}", id.as_str())
}

#[must_use]
pub fn resend_key(email: &str) -> String {
    format!("{RESEND_KEY_PREFIX}{email}")
}

/// Absolute expiry for a write made at `now`.
pub(crate) fn expires_at(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
