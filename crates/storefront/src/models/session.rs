//! Visitor session record.
//!
//! A session is stored as one JSON blob in the key-value store. Handlers work
//! on a deserialized copy and write it back through the session manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pizzeria_core::{Cart, UserId};

use crate::services::token;

/// Opaque session token, also the value of the `session` cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh token with 256 bits of entropy.
    #[must_use]
    pub fn generate() -> Self {
        Self(token::generate_token())
    }

    /// Accept a client-supplied token only if it has the shape we issue.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        token::is_well_formed(raw).then(|| Self(raw.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Bearer credential: only a prefix goes to logs
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "{prefix}…")
    }
}

/// One visitor's ephemeral state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub cart: Cart,
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Bumped on every successful write.
    #[serde(default)]
    pub version: u64,
    /// Blob this copy was loaded from, used as the compare-and-set witness.
    #[serde(skip)]
    stored: Option<String>,
}

impl Session {
    /// A new anonymous session with an empty cart.
    #[must_use]
    pub const fn new(id: SessionId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: now,
            updated_at: now,
            cart: Cart::new(),
            user_id: None,
            version: 0,
            stored: None,
        }
    }

    /// Returns `true` when the session is bound to an account.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub(crate) fn stored_blob(&self) -> Option<&str> {
        self.stored.as_deref()
    }

    pub(crate) fn mark_stored(&mut self, blob: String) {
        self.stored = Some(blob);
    }
}
