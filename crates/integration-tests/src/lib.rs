//! Integration tests for the pizzeria storefront.
//!
//! These run against a live server and database, so every test is
//! `#[ignore]`d by default.
//!
//! # Running Tests
//!
//! ```bash
//! pizzeria migrate && pizzeria seed
//! cargo run -p pizzeria-storefront &
//! cargo test -p pizzeria-integration-tests -- --ignored
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_BASE_URL` - Server under test (default `http://localhost:3000`)
//! - `STOREFRONT_DATABASE_URL` - Used to read verification tokens, since
//!   the server only delivers them by email
//!
//! The session cookie is `Secure`, which a cookie jar will not replay over
//! plain HTTP, so [`Shopper`] carries it by hand.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Client, Method, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use sqlx::PgPool;

/// Base URL of the storefront under test.
#[must_use]
pub fn base_url() -> String {
    std::env::var("STOREFRONT_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// Connect to the storefront database.
pub async fn pool() -> PgPool {
    let url = std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .expect("STOREFRONT_DATABASE_URL must be set for integration tests");
    PgPool::connect(url.expose_secret())
        .await
        .expect("Failed to connect to database")
}

/// A unique address so tests can run repeatedly against one database.
#[must_use]
pub fn unique_email() -> String {
    format!("it-{}@example.com", uuid::Uuid::new_v4().simple())
}

/// Most recent verification token issued to `email`.
pub async fn latest_token(pool: &PgPool, email: &str) -> Option<String> {
    sqlx::query_scalar(
        r"
        SELECT token FROM storefront.email_verification
        WHERE email = $1
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        ",
    )
    .bind(email)
    .fetch_optional(pool)
    .await
    .expect("Failed to read verification token")
}

/// An HTTP client that holds on to one session cookie.
pub struct Shopper {
    client: Client,
    base_url: String,
    pub cookie: Option<String>,
}

impl Default for Shopper {
    fn default() -> Self {
        Self::new()
    }
}

impl Shopper {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: base_url(),
            cookie: None,
        }
    }

    /// Send a request, remembering any session cookie the server sets.
    pub async fn send(&mut self, method: Method, path: &str, body: Option<Value>) -> Response {
        let mut request = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        if let Some(cookie) = &self.cookie {
            request = request.header(COOKIE, format!("session={cookie}"));
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.expect("Request failed");
        for value in response.headers().get_all(SET_COOKIE) {
            let value = value.to_str().unwrap_or_default();
            if let Some(rest) = value.strip_prefix("session=") {
                let token = rest.split(';').next().unwrap_or_default();
                self.cookie = (!token.is_empty() && !value.contains("Max-Age=0"))
                    .then(|| token.to_string());
            }
        }
        response
    }

    /// Send a request and decode the JSON body, asserting the status.
    pub async fn json(
        &mut self,
        method: Method,
        path: &str,
        body: Option<Value>,
        expected: StatusCode,
    ) -> Value {
        let response = self.send(method, path, body).await;
        assert_eq!(response.status(), expected, "{path}");
        response.json().await.expect("Response was not JSON")
    }
}
