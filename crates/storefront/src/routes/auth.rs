//! Authentication route handlers.
//!
//! Registration, email verification, login and logout. Business rules live in
//! [`AuthService`]; these handlers check presence of input, translate
//! cookies, and shape responses.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use pizzeria_core::UserId;

use super::extract::{ApiJson, ApiQuery};
use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{removal_cookie, session_cookie, session_cookie_value, set_cookie};
use crate::services::{AuthError, AuthService};
use crate::state::AppState;

// =============================================================================
// Request / Response Types
// =============================================================================

/// Credentials for register and login.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl CredentialsRequest {
    fn required(&self) -> Result<(&str, &str)> {
        match (non_blank(self.email.as_deref()), self.password.as_deref()) {
            (Some(email), Some(password)) if !password.is_empty() => Ok((email, password)),
            _ => Err(AuthError::MissingField("Email and password are required").into()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResendRequest {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserResponse,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

const fn message(message: &'static str) -> Json<MessageResponse> {
    Json(MessageResponse { message })
}

// =============================================================================
// Handlers
// =============================================================================

/// Register a new account.
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CredentialsRequest>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    let (email, password) = body.required()?;
    AuthService::new(&state).register(email, password).await?;

    Ok((
        StatusCode::CREATED,
        message("Registration successful. Please check your email to verify your account."),
    ))
}

/// Send a fresh verification link.
#[instrument(skip_all)]
pub async fn resend_verification(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ResendRequest>,
) -> Result<Json<MessageResponse>> {
    let email = non_blank(body.email.as_deref())
        .ok_or(AuthError::MissingField("Email is required"))?;
    AuthService::new(&state).resend_verification(email).await?;

    Ok(message("Verification email sent"))
}

/// Redeem a verification link.
#[instrument(skip_all)]
pub async fn verify(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<VerifyQuery>,
) -> Result<Json<MessageResponse>> {
    let token = non_blank(query.token.as_deref())
        .ok_or(AuthError::MissingField("Verification token is required"))?;
    AuthService::new(&state).verify(token).await?;

    Ok(message("Email verified successfully"))
}

/// Log in and receive a session cookie bound to the account.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CredentialsRequest>,
) -> Result<Response> {
    let (email, password) = body.required()?;
    let (account, session) = AuthService::new(&state).login(email, password).await?;

    set_sentry_user(&account.id, Some(account.email.as_str()));

    let mut response = Json(LoginResponse {
        user: UserResponse {
            id: account.id,
            email: account.email.as_str().to_owned(),
        },
    })
    .into_response();
    set_cookie(&mut response, &session_cookie(&session.id));
    Ok(response)
}

/// Delete the session named by the cookie and clear the cookie.
#[instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    let cookie = session_cookie_value(&headers);
    AuthService::new(&state).logout(cookie.as_deref()).await?;

    clear_sentry_user();

    let mut response = message("Logged out successfully").into_response();
    set_cookie(&mut response, &removal_cookie());
    Ok(response)
}
