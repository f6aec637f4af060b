//! Authentication service.
//!
//! Registration, email verification, and password login. Accounts move
//! `Unverified -> Verified` exactly once; only verified accounts can log in.

mod error;
mod password;

pub use error::AuthError;
pub use password::{MIN_PASSWORD_LENGTH, PasswordService, validate_password};

use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use tracing::instrument;

use pizzeria_core::Email;

use crate::config::StorefrontConfig;
use crate::db::{AccountRepository, RepositoryError};
use crate::models::{Account, NewVerification, Session, SessionId};
use crate::services::email::EmailService;
use crate::services::token::generate_token;
use crate::session::{RESEND_WINDOW, SessionManager, resend_key};
use crate::state::AppState;

/// How long a verification link stays valid, in hours.
pub const VERIFICATION_TTL_HOURS: i64 = 24;

/// Authentication service.
pub struct AuthService<'a> {
    accounts: &'a dyn AccountRepository,
    sessions: &'a SessionManager,
    passwords: &'a PasswordService,
    email: &'a EmailService,
    clock: &'a (dyn Clock + Send + Sync),
    config: &'a StorefrontConfig,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service over the shared state.
    #[must_use]
    pub fn new(state: &'a AppState) -> Self {
        Self {
            accounts: state.accounts(),
            sessions: state.sessions(),
            passwords: state.passwords(),
            email: state.email(),
            clock: state.clock(),
            config: state.config(),
        }
    }

    // =========================================================================
    // Registration & Verification
    // =========================================================================

    /// Register a new, unverified account and email it a verification link.
    ///
    /// Input is validated before any store access. The email is sent in the
    /// background; delivery failures are logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::AccountExists` if the email is already registered.
    #[instrument(skip(self, password))]
    pub async fn register(&self, email: &str, password: &str) -> Result<Account, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password)?;

        if self.accounts.find_by_email(&email).await?.is_some() {
            return Err(AuthError::AccountExists);
        }

        let password_hash = self.passwords.hash(password)?;
        let now = self.clock.utc();
        let verification = new_verification(now);

        let account = self
            .accounts
            .create_with_verification(&email, &password_hash, &verification, now)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::AccountExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %account.id, "Account registered");
        self.send_link(account.email.clone(), &verification.token);
        Ok(account)
    }

    /// Issue a fresh verification link, at most once per [`RESEND_WINDOW`]
    /// per address.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::AccountNotFound` if there is no unverified account.
    /// Returns `AuthError::RateLimited` if a link was sent too recently.
    #[instrument(skip(self))]
    pub async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        let email = Email::parse(email)?;

        let account = match self.accounts.find_by_email(&email).await? {
            Some(creds) if !creds.account.verified => creds.account,
            _ => return Err(AuthError::AccountNotFound),
        };

        let marker = resend_key(account.email.as_str());
        if !self.sessions.arm_marker(&marker, RESEND_WINDOW).await? {
            return Err(AuthError::RateLimited);
        }

        let now = self.clock.utc();
        let verification = new_verification(now);

        if let Err(e) = self
            .accounts
            .replace_verification(&account, &verification, now)
            .await
        {
            // Don't hold the window open for a send that never happened
            if let Err(disarm) = self.sessions.disarm_marker(&marker).await {
                tracing::warn!(error = %disarm, "Failed to clear resend marker");
            }
            return Err(e.into());
        }

        tracing::info!(user_id = %account.id, "Verification email re-sent");
        self.send_link(account.email, &verification.token);
        Ok(())
    }

    /// Redeem a verification token.
    ///
    /// The token is deleted and the account flagged verified together, so a
    /// token can succeed at most once.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if the token is unknown, used or expired.
    /// Returns `AuthError::AlreadyVerified` if the account needs no verification.
    #[instrument(skip_all)]
    pub async fn verify(&self, token: &str) -> Result<Account, AuthError> {
        let verification = self
            .accounts
            .find_verification(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if verification.is_expired(self.clock.utc()) {
            return Err(AuthError::InvalidToken);
        }

        let account = self
            .accounts
            .find_by_id(verification.user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if account.status().is_verified() {
            return Err(AuthError::AlreadyVerified);
        }

        if !self.accounts.consume_verification(&verification).await? {
            return Err(AuthError::InvalidToken);
        }

        tracing::info!(user_id = %account.id, "Email verified");
        Ok(Account {
            verified: true,
            ..account
        })
    }

    // =========================================================================
    // Login & Logout
    // =========================================================================

    /// Check credentials and start a new session bound to the account.
    ///
    /// The session behind the caller's current cookie is left as it is.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::AccountNotFound` if the email is not registered.
    /// Returns `AuthError::NotVerified` if the email has not been confirmed.
    /// Returns `AuthError::InvalidCredentials` if the password is wrong.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<(Account, Session), AuthError> {
        let email = Email::parse(email)?;

        let creds = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        if !creds.account.status().is_verified() {
            return Err(AuthError::NotVerified);
        }

        self.passwords.verify(password, &creds.password_hash)?;

        let session = self.sessions.create(Some(creds.account.id)).await?;
        tracing::info!(user_id = %creds.account.id, "Login succeeded");
        Ok((creds.account, session))
    }

    /// Delete the session named by the cookie.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NoSession` if no cookie was sent.
    #[instrument(skip_all)]
    pub async fn logout(&self, cookie: Option<&str>) -> Result<(), AuthError> {
        let cookie = cookie.filter(|c| !c.is_empty()).ok_or(AuthError::NoSession)?;

        // A value we never issued has no record to delete
        if let Some(id) = SessionId::parse(cookie) {
            let existed = self.sessions.destroy(&id).await?;
            tracing::debug!(session = %id, existed, "Session destroyed");
        }
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn send_link(&self, to: Email, token: &str) {
        let link = self.config.verification_link(token);
        self.email.spawn_verification(to, link);
    }
}

fn new_verification(now: DateTime<Utc>) -> NewVerification {
    NewVerification {
        token: generate_token(),
        expires_at: now + TimeDelta::hours(VERIFICATION_TTL_HOURS),
    }
}
