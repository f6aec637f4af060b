//! Session manager: identity, lazy creation and versioned writes.
//!
//! Every write is a compare-and-set against the blob the caller loaded, so a
//! concurrent writer can never be silently overwritten. [`SessionManager::update`]
//! re-reads and re-applies the mutation when that happens.

use std::sync::Arc;
use std::time::Duration;

use mockable::Clock;
use thiserror::Error;
use tracing::instrument;

use pizzeria_core::UserId;

use super::store::{KvStore, StoreError, session_key};
use crate::models::{Session, SessionId};

/// Lifetime of a session record, restarted by every write.
pub const SESSION_TTL: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// Minimum gap between two verification emails to one address.
pub const RESEND_WINDOW: Duration = Duration::from_secs(60);

const MAX_UPDATE_ATTEMPTS: usize = 3;
const MAX_CREATE_ATTEMPTS: usize = 3;

/// Errors raised while reading or writing sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Backend failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The session could not be encoded.
    #[error("session encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// Another request wrote the session first, on every attempt.
    #[error("session was modified concurrently")]
    Conflict,

    /// The record disappeared (expired or logged out) during an update.
    #[error("session no longer exists")]
    Gone,

    /// Freshly generated ids kept colliding with live records.
    #[error("could not allocate a session id")]
    IdExhausted,
}

/// Outcome of [`SessionManager::resolve`].
#[derive(Debug)]
pub struct ResolvedSession {
    pub session: Session,
    /// `true` when a new session was created and the cookie must be set.
    pub created: bool,
}

/// Owns session identity and the read-modify-write cycle of session records.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self { store, clock }
    }

    /// Load the session named by the cookie, or create and persist a new one.
    ///
    /// A missing, malformed, expired or unreadable cookie value all lead to a
    /// fresh anonymous session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Store` if the store is unreachable.
    #[instrument(skip_all)]
    pub async fn resolve(&self, cookie: Option<&str>) -> Result<ResolvedSession, SessionError> {
        if let Some(id) = cookie.and_then(SessionId::parse) {
            if let Some(session) = self.load(&id).await? {
                return Ok(ResolvedSession {
                    session,
                    created: false,
                });
            }
            tracing::debug!(session = %id, "session cookie has no live record");
        }

        let session = self.create(None).await?;
        tracing::debug!(session = %session.id, "created anonymous session");
        Ok(ResolvedSession {
            session,
            created: true,
        })
    }

    /// Read a live session without touching its expiry.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Store` if the store is unreachable.
    pub async fn load(&self, id: &SessionId) -> Result<Option<Session>, SessionError> {
        let Some(blob) = self.store.get(&session_key(id)).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<Session>(&blob) {
            Ok(mut session) if session.id == *id => {
                session.mark_stored(blob);
                Ok(Some(session))
            }
            Ok(_) => {
                tracing::warn!(session = %id, "session record stored under the wrong key");
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(session = %id, error = %e, "discarding unreadable session record");
                Ok(None)
            }
        }
    }

    /// Create and persist a new session, optionally bound to an account.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Store` if the store is unreachable.
    pub async fn create(&self, user_id: Option<UserId>) -> Result<Session, SessionError> {
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let mut session = Session::new(SessionId::generate(), self.clock.utc());
            session.user_id = user_id;
            let blob = serde_json::to_string(&session)?;

            if self
                .store
                .compare_and_set(&session_key(&session.id), None, blob.clone(), SESSION_TTL)
                .await?
            {
                session.mark_stored(blob);
                return Ok(session);
            }
        }
        Err(SessionError::IdExhausted)
    }

    /// Write `session` back, bumping its version and refreshing the TTL.
    ///
    /// The write only succeeds if the stored record is still the one this copy
    /// was loaded from. On success `session` reflects what was stored; on
    /// failure it is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Conflict` if another writer got there first.
    pub async fn persist(&self, session: &mut Session) -> Result<(), SessionError> {
        let mut next = session.clone();
        next.version += 1;
        next.updated_at = self.clock.utc();
        let blob = serde_json::to_string(&next)?;

        let written = self
            .store
            .compare_and_set(
                &session_key(&next.id),
                session.stored_blob(),
                blob.clone(),
                SESSION_TTL,
            )
            .await?;

        if !written {
            return Err(SessionError::Conflict);
        }

        next.mark_stored(blob);
        *session = next;
        Ok(())
    }

    /// Apply `mutate` and persist, retrying on concurrent modification.
    ///
    /// On conflict the record is reloaded and `mutate` runs again against the
    /// fresh copy, so it must be safe to call more than once. After
    /// `MAX_UPDATE_ATTEMPTS` conflicts the update fails with
    /// `SessionError::Conflict`. Errors from `mutate` abort without writing.
    ///
    /// # Errors
    ///
    /// Returns the mutation's own error, or a `SessionError` converted into `E`.
    pub async fn update<T, E, F>(&self, session: &mut Session, mut mutate: F) -> Result<T, E>
    where
        F: FnMut(&mut Session) -> Result<T, E>,
        E: From<SessionError>,
    {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let mut draft = session.clone();
            let output = mutate(&mut draft)?;

            match self.persist(&mut draft).await {
                Ok(()) => {
                    *session = draft;
                    return Ok(output);
                }
                Err(SessionError::Conflict) => {
                    let id = session.id.clone();
                    tracing::debug!(session = %id, attempt, "session changed underneath, reloading");
                    *session = self.load(&id).await?.ok_or(SessionError::Gone)?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!(session = %session.id, "giving up on contended session update");
        Err(SessionError::Conflict.into())
    }

    /// Delete a session record. Returns `true` if a live record existed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Store` if the store is unreachable.
    pub async fn destroy(&self, id: &SessionId) -> Result<bool, SessionError> {
        Ok(self.store.delete(&session_key(id)).await?)
    }

    /// Set a short-lived marker unless one is already live.
    ///
    /// Returns `false` when a live marker exists.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Store` if the store is unreachable.
    pub async fn arm_marker(&self, key: &str, ttl: Duration) -> Result<bool, SessionError> {
        let now = self.clock.utc().to_rfc3339();
        Ok(self.store.compare_and_set(key, None, now, ttl).await?)
    }

    /// Remove a marker set by [`Self::arm_marker`].
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Store` if the store is unreachable.
    pub async fn disarm_marker(&self, key: &str) -> Result<(), SessionError> {
        self.store.delete(key).await?;
        Ok(())
    }

    /// Connectivity check for readiness probes.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Store` if the store is unreachable.
    pub async fn ping(&self) -> Result<(), SessionError> {
        Ok(self.store.ping().await?)
    }
}
