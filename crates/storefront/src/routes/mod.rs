//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                              - Liveness
//! GET    /health/ready                        - Readiness (database + session store)
//!
//! # Catalog
//! GET    /api/v1/pizzas?tags=&limit=&offset=  - Paged listing, all tags must match
//! GET    /api/v1/pizzas/{id}                  - Pizza detail
//!
//! # Cart (session)
//! GET    /api/v1/cart                         - Show cart
//! POST   /api/v1/cart                         - Add {pizzaId, quantity}
//! PUT    /api/v1/cart/{pizzaId}               - Set {quantity}, 0 removes
//! DELETE /api/v1/cart/{pizzaId}               - Remove line
//! DELETE /api/v1/cart                         - Empty cart
//!
//! # Orders (session)
//! POST   /api/v1/orders                       - Commit cart as an order
//! GET    /api/v1/orders                       - Orders of this session
//! GET    /api/v1/orders/{id}                  - One order of this session
//!
//! # Auth (rate limited per IP)
//! POST   /api/v1/auth/register
//! POST   /api/v1/auth/resend-verification
//! GET    /api/v1/auth/verify?token=
//! POST   /api/v1/auth/login
//! POST   /api/v1/auth/logout
//! ```

pub mod auth;
pub mod cart;
pub mod extract;
pub mod orders;
pub mod pizzas;

#[cfg(test)]
mod tests;

use std::time::Duration;

use axum::{
    Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::error::AppError;
use crate::middleware::{
    auth_rate_limiter, make_request_span, request_id_middleware, session_middleware,
};
use crate::state::AppState;

/// Prefix of every API route.
pub const API_PREFIX: &str = "/api/v1";

/// Create the catalog routes router.
pub fn pizza_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(pizzas::list))
        .route("/{id}", get(pizzas::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).post(cart::add).delete(cart::clear))
        .route("/{pizza_id}", put(cart::update).delete(cart::remove))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::list).post(orders::create))
        .route("/{id}", get(orders::show))
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/resend-verification", post(auth::resend_verification))
        .route("/verify", get(auth::verify))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
}

/// Create all API routes, with session resolution where a cart is involved.
pub fn api_routes(state: &AppState) -> Router<AppState> {
    let session = from_fn_with_state(state.clone(), session_middleware);

    let mut auth = auth_routes();
    if state.config().auth_rate_limit
        && let Some(limiter) = auth_rate_limiter()
    {
        auth = auth.layer(limiter);
    }

    Router::new()
        .nest("/pizzas", pizza_routes())
        .nest("/cart", cart_routes().route_layer(session.clone()))
        .nest("/orders", order_routes().route_layer(session))
        .nest("/auth", auth)
}

/// Build the complete application with middleware.
pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest(API_PREFIX, api_routes(&state))
        .fallback(not_found)
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(make_request_span)
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    if let Some(cors) = cors_layer(&state.config().allowed_origins) {
        router = router.layer(cors);
    }

    router
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// CORS for browser clients on other origins. Cookies are allowed, so
/// origins must be listed explicitly.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(Duration::from_secs(60 * 60)),
    )
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database or the session store is
/// not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    if let Err(e) = state.catalog().ping().await {
        tracing::warn!(error = %e, "readiness: database unavailable");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    if let Err(e) = state.sessions().ping().await {
        tracing::warn!(error = %e, "readiness: session store unavailable");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

async fn not_found() -> AppError {
    AppError::NotFound("Route not found".to_string())
}
