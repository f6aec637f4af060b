//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers return `Result<T, AppError>`.
//!
//! Every error body is JSON: `{"error": "<message>"}`. Server-side failures
//! are reported as `"Internal server error"` without details.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pizzeria_core::{CartError, MAX_LINE_QUANTITY};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::orders::OrderError;
use crate::session::SessionError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Session store operation failed.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Cart mutation rejected.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Order commit failed.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Malformed or missing input.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

const INTERNAL: &str = "Internal server error";
const SESSION_CONFLICT: &str = "Session was modified concurrently, please retry";

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Session(err) => session_status(err),
            Self::Cart(err) => match err {
                CartError::NotInCart(_) => StatusCode::NOT_FOUND,
                CartError::InvalidQuantity | CartError::QuantityOverflow => StatusCode::BAD_REQUEST,
            },
            Self::Order(err) => match err {
                OrderError::EmptyCart => StatusCode::BAD_REQUEST,
                OrderError::ItemUnavailable(_) => StatusCode::NOT_FOUND,
                OrderError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
                OrderError::Session(err) => session_status(err),
            },
            Self::Auth(err) => match err {
                AuthError::MissingField(_)
                | AuthError::InvalidEmail(_)
                | AuthError::WeakPassword(_)
                | AuthError::AlreadyVerified
                | AuthError::NoSession => StatusCode::BAD_REQUEST,
                AuthError::AccountExists => StatusCode::CONFLICT,
                AuthError::AccountNotFound | AuthError::NotVerified | AuthError::InvalidToken => {
                    StatusCode::NOT_FOUND
                }
                AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                AuthError::Session(err) => session_status(err),
                AuthError::Repository(_) | AuthError::PasswordHash => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Client-facing message. Never includes internal details.
    fn message(&self) -> String {
        match self {
            Self::Database(_) | Self::Internal(_) => INTERNAL.to_string(),
            Self::Session(err) => session_message(err),
            Self::Cart(err) => match err {
                CartError::NotInCart(_) => "Item not in cart".to_string(),
                CartError::InvalidQuantity => "Quantity must be a positive integer".to_string(),
                CartError::QuantityOverflow => {
                    format!("Quantity must be at most {MAX_LINE_QUANTITY}")
                }
            },
            Self::Order(err) => match err {
                OrderError::EmptyCart => "Cart is empty".to_string(),
                OrderError::ItemUnavailable(ids) => {
                    let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
                    format!("Pizza not found: {}", ids.join(", "))
                }
                OrderError::Repository(_) => INTERNAL.to_string(),
                OrderError::Session(err) => session_message(err),
            },
            Self::Auth(err) => match err {
                AuthError::MissingField(message) => (*message).to_string(),
                AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
                AuthError::WeakPassword(msg) => msg.clone(),
                AuthError::AccountExists => "An account with this email already exists".to_string(),
                AuthError::AccountNotFound => "User not found".to_string(),
                AuthError::NotVerified => "Email not verified".to_string(),
                AuthError::AlreadyVerified => "Email already verified".to_string(),
                AuthError::InvalidCredentials => "Invalid credentials".to_string(),
                AuthError::InvalidToken => "Invalid or expired verification token".to_string(),
                AuthError::RateLimited => {
                    "Please wait before requesting another verification email".to_string()
                }
                AuthError::NoSession => "No active session".to_string(),
                AuthError::Session(err) => session_message(err),
                AuthError::Repository(_) | AuthError::PasswordHash => INTERNAL.to_string(),
            },
            Self::BadRequest(msg) | Self::NotFound(msg) => msg.clone(),
        }
    }
}

const fn session_status(err: &SessionError) -> StatusCode {
    match err {
        SessionError::Conflict | SessionError::Gone => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn session_message(err: &SessionError) -> String {
    match err {
        SessionError::Conflict => SESSION_CONFLICT.to_string(),
        SessionError::Gone => "Session expired, please retry".to_string(),
        _ => INTERNAL.to_string(),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        (status, Json(json!({ "error": self.message() }))).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(format!("Invalid query string: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(format!("Invalid path: {}", rejection.body_text()))
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}
