//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;
use crate::session::SessionError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Required fields were missing or blank. Carries the client message.
    #[error("{0}")]
    MissingField(&'static str),

    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] pizzeria_core::EmailError),

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Account already exists.
    #[error("account already exists")]
    AccountExists,

    /// No account with that email.
    #[error("account not found")]
    AccountNotFound,

    /// Account exists but has not confirmed its email.
    #[error("email not verified")]
    NotVerified,

    /// Account is already verified.
    #[error("email already verified")]
    AlreadyVerified,

    /// Wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Verification token unknown, consumed or expired.
    #[error("invalid or expired verification token")]
    InvalidToken,

    /// A verification email was sent too recently.
    #[error("verification email rate limited")]
    RateLimited,

    /// Logout without a session cookie.
    #[error("no session")]
    NoSession,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Session store error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
