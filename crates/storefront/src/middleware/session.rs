//! Session cookie middleware and extractor.
//!
//! Resolves the `session` cookie to a live [`Session`] before the handler
//! runs, creating one when needed, and issues the cookie for new sessions.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, HeaderValue, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use cookie::{Cookie, SameSite};

use crate::error::AppError;
use crate::models::{Session, SessionId};
use crate::state::AppState;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "session";

/// Read the raw session cookie value from request headers.
#[must_use]
pub fn session_cookie_value(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == SESSION_COOKIE_NAME)
        .map(|c| c.value().to_owned())
}

/// Cookie carrying `id`.
///
/// No `Max-Age`: the record's lifetime is enforced by the session store.
#[must_use]
pub fn session_cookie(id: &SessionId) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, id.as_str().to_owned()))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

/// Cookie instructing the client to drop its session cookie.
#[must_use]
pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build((SESSION_COOKIE_NAME, ""))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build();
    cookie.make_removal();
    cookie
}

/// Append a `Set-Cookie` header to `response`.
pub fn set_cookie(response: &mut Response, cookie: &Cookie<'_>) {
    match HeaderValue::from_str(&cookie.encoded().to_string()) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::error!(error = %e, "session cookie is not a valid header value"),
    }
}

/// Middleware that loads or creates the visitor's session.
///
/// The resolved [`Session`] is placed in request extensions for the
/// [`CurrentSession`] extractor. When a new session was created the response
/// carries its cookie.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let cookie = session_cookie_value(request.headers());

    let resolved = match state.sessions().resolve(cookie.as_deref()).await {
        Ok(resolved) => resolved,
        Err(e) => return AppError::from(e).into_response(),
    };

    let issued = resolved.created.then(|| session_cookie(&resolved.session.id));
    if let Some(user_id) = resolved.session.user_id {
        tracing::Span::current().record("user_id", tracing::field::display(user_id));
    }
    request.extensions_mut().insert(resolved.session);

    let mut response = next.run(request).await;
    if let Some(cookie) = issued {
        set_cookie(&mut response, &cookie);
    }
    response
}

/// Extractor for the session resolved by [`session_middleware`].
///
/// Handlers receive their own copy and write changes back through
/// [`crate::session::SessionManager::update`].
pub struct CurrentSession(pub Session);

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .remove::<Session>()
            .map(Self)
            .ok_or_else(|| AppError::Internal("session middleware not installed".to_string()))
    }
}
