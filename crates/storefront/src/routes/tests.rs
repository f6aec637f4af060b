//! Router tests: the whole application over in-memory stores.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use cookie::Cookie;
use serde_json::{Value, json};
use tower::ServiceExt;

use pizzeria_core::{MAX_LINE_QUANTITY, PizzaId, Price, UserId};

use crate::session::{RESEND_WINDOW, SESSION_TTL};
use crate::test_support::{BrittleStore, TestApp};

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl Reply {
    /// Value of the `session` cookie set by this response, if any.
    fn session_cookie(&self) -> Option<String> {
        self.set_cookie()
            .map(|c| c.value().to_owned())
            .filter(|v| !v.is_empty())
    }

    fn set_cookie(&self) -> Option<Cookie<'static>> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|raw| Cookie::parse(raw.to_owned()).ok())
            .find(|c| c.name() == "session")
    }

    fn error(&self) -> &str {
        self.body["error"].as_str().unwrap_or_default()
    }
}

async fn call(
    app: &TestApp,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> Reply {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, format!("session={cookie}"));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Reply {
        status,
        headers,
        body,
    }
}

async fn get(app: &TestApp, uri: &str, cookie: Option<&str>) -> Reply {
    call(app, Method::GET, uri, cookie, None).await
}

async fn post(app: &TestApp, uri: &str, cookie: Option<&str>, body: Value) -> Reply {
    call(app, Method::POST, uri, cookie, Some(body)).await
}

fn price(cents: i64) -> Price {
    Price::from_cents(cents).unwrap()
}

fn money(value: &Value) -> f64 {
    value.as_f64().unwrap()
}

/// Start a session and return its cookie.
async fn new_session(app: &TestApp) -> String {
    get(app, "/api/v1/cart", None)
        .await
        .session_cookie()
        .unwrap()
}

async fn add_to_cart(app: &TestApp, cookie: &str, pizza: PizzaId, quantity: i64) -> Reply {
    post(
        app,
        "/api/v1/cart",
        Some(cookie),
        json!({ "pizzaId": pizza.as_i32(), "quantity": quantity }),
    )
    .await
}

/// Token from the most recent verification email.
async fn latest_token(app: &TestApp, expected_emails: usize) -> String {
    let sent = app.mailer.wait_for(expected_emails).await;
    let body = &sent.last().unwrap().text_body;
    let start = body.find("token=").unwrap() + "token=".len();
    body[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

async fn register(app: &TestApp, email: &str, password: &str) -> Reply {
    post(
        app,
        "/api/v1/auth/register",
        None,
        json!({ "email": email, "password": password }),
    )
    .await
}

// =============================================================================
// Health & fallbacks
// =============================================================================

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new();
    assert_eq!(get(&app, "/health", None).await.status, StatusCode::OK);
    assert_eq!(get(&app, "/health/ready", None).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let app = TestApp::new();
    let reply = get(&app, "/api/v1/nope", None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert!(reply.error().contains("not found"));
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let app = TestApp::new();
    let reply = get(&app, "/health", None).await;
    assert!(reply.headers.contains_key("x-request-id"));
}

// =============================================================================
// Catalog
// =============================================================================

#[tokio::test]
async fn test_pizza_paging() {
    let app = TestApp::new();
    for n in 1..=10 {
        app.catalog.insert(&format!("Pizza {n}"), price(900), &[]);
    }

    let first = get(&app, "/api/v1/pizzas?limit=3&offset=0", None).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["total"], 10);
    assert_eq!(first.body["limit"], 3);
    assert_eq!(first.body["offset"], 0);
    assert_eq!(first.body["results"].as_array().unwrap().len(), 3);

    let last = get(&app, "/api/v1/pizzas?limit=3&offset=9", None).await;
    assert_eq!(last.body["total"], 10);
    assert_eq!(last.body["results"].as_array().unwrap().len(), 1);

    let default = get(&app, "/api/v1/pizzas", None).await;
    assert_eq!(default.body["limit"], 20);
    assert_eq!(default.body["results"].as_array().unwrap().len(), 10);

    let empty = get(&app, "/api/v1/pizzas?limit=0", None).await;
    assert_eq!(empty.status, StatusCode::OK);
    assert_eq!(empty.body["total"], 10);
    assert!(empty.body["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_pizza_limit_out_of_range() {
    let app = TestApp::new();
    for uri in ["/api/v1/pizzas?limit=101", "/api/v1/pizzas?limit=-1", "/api/v1/pizzas?limit=x"] {
        let reply = get(&app, uri, None).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(reply.error().contains("Invalid limit"), "{uri}");
    }
}

#[tokio::test]
async fn test_pizza_tag_filter_requires_every_tag() {
    let app = TestApp::new();
    app.catalog.insert("Margherita", price(900), &["veggie"]);
    app.catalog.insert("Arrabbiata", price(1000), &["veggie", "spicy"]);
    app.catalog.insert("Diavola", price(1100), &["spicy"]);

    let reply = get(&app, "/api/v1/pizzas?tags=Spicy,VEGGIE", None).await;
    assert_eq!(reply.body["total"], 1);
    assert_eq!(reply.body["results"][0]["name"], "Arrabbiata");

    let reply = get(&app, "/api/v1/pizzas?tags=spicy", None).await;
    assert_eq!(reply.body["total"], 2);
}

#[tokio::test]
async fn test_pizza_detail() {
    let app = TestApp::new();
    let id = app.catalog.insert("Quattro Formaggi", price(1250), &["veggie"]);

    let reply = get(&app, &format!("/api/v1/pizzas/{id}"), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["name"], "Quattro Formaggi");
    assert!((money(&reply.body["price"]) - 12.5).abs() < f64::EPSILON);
    assert_eq!(reply.body["tags"], json!(["veggie"]));
    assert!(reply.body["ingredients"].is_array());

    assert_eq!(
        get(&app, "/api/v1/pizzas/999", None).await.status,
        StatusCode::NOT_FOUND
    );
    let bad = get(&app, "/api/v1/pizzas/abc", None).await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    assert!(bad.error().contains("Invalid pizza id"));
}

// =============================================================================
// Sessions & cart
// =============================================================================

#[tokio::test]
async fn test_first_request_issues_secure_cookie() {
    let app = TestApp::new();
    let reply = get(&app, "/api/v1/cart", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!({ "items": [], "total": 0.0 }));

    let cookie = reply.set_cookie().unwrap();
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.secure(), Some(true));
    assert!(cookie.max_age().is_none());

    // A live cookie is reused without re-issuing
    let again = get(&app, "/api/v1/cart", Some(cookie.value())).await;
    assert!(again.set_cookie().is_none());
}

#[tokio::test]
async fn test_unknown_or_expired_cookie_gets_fresh_session() {
    let app = TestApp::new();
    let unknown = get(&app, "/api/v1/cart", Some("made-up")).await;
    assert!(unknown.session_cookie().is_some());

    let cookie = new_session(&app).await;
    app.clock.advance(SESSION_TTL + Duration::from_secs(1));
    let expired = get(&app, "/api/v1/cart", Some(&cookie)).await;
    let fresh = expired.session_cookie().unwrap();
    assert_ne!(fresh, cookie);
}

#[tokio::test]
async fn test_cart_lifecycle() {
    let app = TestApp::new();
    let margherita = app.catalog.insert("Margherita", price(1000), &[]);
    let funghi = app.catalog.insert("Funghi", price(1200), &[]);
    let cookie = new_session(&app).await;

    let reply = add_to_cart(&app, &cookie, margherita, 2).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!((money(&reply.body["total"]) - 20.0).abs() < f64::EPSILON);

    // POST is additive
    let reply = add_to_cart(&app, &cookie, margherita, 1).await;
    assert_eq!(reply.body["items"][0]["quantity"], 3);
    assert!((money(&reply.body["total"]) - 30.0).abs() < f64::EPSILON);

    let reply = add_to_cart(&app, &cookie, funghi, 1).await;
    assert_eq!(reply.body["items"].as_array().unwrap().len(), 2);
    assert!((money(&reply.body["total"]) - 42.0).abs() < f64::EPSILON);

    let reply = call(
        &app,
        Method::DELETE,
        &format!("/api/v1/cart/{margherita}"),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["items"].as_array().unwrap().len(), 1);
    assert!((money(&reply.body["total"]) - 12.0).abs() < f64::EPSILON);

    let reply = call(
        &app,
        Method::DELETE,
        &format!("/api/v1/cart/{funghi}"),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(reply.body, json!({ "items": [], "total": 0.0 }));

    // Persisted, not just echoed
    let reply = get(&app, "/api/v1/cart", Some(&cookie)).await;
    assert!(reply.body["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_cart_set_quantity() {
    let app = TestApp::new();
    let pizza = app.catalog.insert("Calzone", price(1100), &[]);
    let cookie = new_session(&app).await;
    add_to_cart(&app, &cookie, pizza, 4).await;

    let uri = format!("/api/v1/cart/{pizza}");
    let reply = call(&app, Method::PUT, &uri, Some(&cookie), Some(json!({ "quantity": 1 }))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["items"][0]["quantity"], 1);
    assert!((money(&reply.body["total"]) - 11.0).abs() < f64::EPSILON);

    let reply = call(&app, Method::PUT, &uri, Some(&cookie), Some(json!({ "quantity": 0 }))).await;
    assert_eq!(reply.body, json!({ "items": [], "total": 0.0 }));
}

#[tokio::test]
async fn test_cart_rejects_bad_input() {
    let app = TestApp::new();
    let pizza = app.catalog.insert("Marinara", price(800), &[]);
    let cookie = new_session(&app).await;

    let reply = add_to_cart(&app, &cookie, PizzaId::new(999), 1).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert!(reply.error().contains("Pizza not found"));

    let reply = add_to_cart(&app, &cookie, pizza, 0).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = post(&app, "/api/v1/cart", Some(&cookie), json!({ "pizzaId": pizza.as_i32() })).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = post(&app, "/api/v1/cart", Some(&cookie), json!({ "pizzaId": "x", "quantity": 1 }))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(!reply.error().is_empty());

    let reply = call(&app, Method::DELETE, "/api/v1/cart/abc", Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = call(
        &app,
        Method::DELETE,
        &format!("/api/v1/cart/{pizza}"),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert!(reply.error().contains("not in cart"));
}

#[tokio::test]
async fn test_cart_line_quantity_is_capped() {
    let app = TestApp::new();
    let pizza = app.catalog.insert("Quattro Formaggi", price(1000), &[]);
    let cookie = new_session(&app).await;
    let cap = i64::from(MAX_LINE_QUANTITY);

    let reply = add_to_cart(&app, &cookie, pizza, cap).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["items"][0]["quantity"], cap);

    let reply = add_to_cart(&app, &cookie, pizza, 1).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.error(), format!("Quantity must be at most {cap}"));

    let reply = add_to_cart(&app, &cookie, pizza, 4_294_967_295).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let uri = format!("/api/v1/cart/{pizza}");
    let reply = call(&app, Method::PUT, &uri, Some(&cookie), Some(json!({ "quantity": cap + 1 }))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    // The capped cart still commits
    let reply = call(&app, Method::POST, "/api/v1/orders", Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert!((money(&reply.body["total"]) - 990.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_clear_cart() {
    let app = TestApp::new();
    let pizza = app.catalog.insert("Capricciosa", price(1300), &[]);
    let cookie = new_session(&app).await;
    add_to_cart(&app, &cookie, pizza, 2).await;

    let reply = call(&app, Method::DELETE, "/api/v1/cart", Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!({ "items": [], "total": 0.0 }));
}

#[tokio::test]
async fn test_discontinued_pizza_can_still_be_removed() {
    let app = TestApp::new();
    let pizza = app.catalog.insert("Seasonal", price(1500), &[]);
    let cookie = new_session(&app).await;
    add_to_cart(&app, &cookie, pizza, 1).await;
    app.catalog.delete(pizza);

    let reply = call(
        &app,
        Method::DELETE,
        &format!("/api/v1/cart/{pizza}"),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!({ "items": [], "total": 0.0 }));
}

#[tokio::test]
async fn test_concurrent_adds_are_not_lost() {
    let app = TestApp::new();
    let pizza = app.catalog.insert("Hawaii", price(1000), &[]);
    let cookie = new_session(&app).await;

    let (a, b) = tokio::join!(
        add_to_cart(&app, &cookie, pizza, 1),
        add_to_cart(&app, &cookie, pizza, 1)
    );
    assert_eq!(a.status, StatusCode::OK);
    assert_eq!(b.status, StatusCode::OK);

    let reply = get(&app, "/api/v1/cart", Some(&cookie)).await;
    assert_eq!(reply.body["items"][0]["quantity"], 2);
    assert!((money(&reply.body["total"]) - 20.0).abs() < f64::EPSILON);
}

// =============================================================================
// Orders
// =============================================================================

#[tokio::test]
async fn test_empty_cart_order() {
    let app = TestApp::new();
    let reply = call(&app, Method::POST, "/api/v1/orders", None, None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.error().contains("Cart is empty"));
    assert!(app.orders.all().is_empty());
}

#[tokio::test]
async fn test_order_commit() {
    let app = TestApp::new();
    let margherita = app.catalog.insert("Margherita", price(1000), &[]);
    let diavola = app.catalog.insert("Diavola", price(1250), &[]);
    let cookie = new_session(&app).await;
    add_to_cart(&app, &cookie, margherita, 2).await;
    add_to_cart(&app, &cookie, diavola, 1).await;

    let reply = call(&app, Method::POST, "/api/v1/orders", Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert!((money(&reply.body["total"]) - 32.5).abs() < f64::EPSILON);
    assert_eq!(reply.body["status"], "pending");
    assert!(reply.body["createdAt"].is_string());
    let items = reply.body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["name"], "Margherita");
    assert!((money(&items[0]["unitPrice"]) - 10.0).abs() < f64::EPSILON);
    assert!((money(&items[0]["totalPrice"]) - 20.0).abs() < f64::EPSILON);
    let order_id = reply.body["orderId"].as_i64().unwrap();

    // Cart emptied
    let cart = get(&app, "/api/v1/cart", Some(&cookie)).await;
    assert_eq!(cart.body, json!({ "items": [], "total": 0.0 }));

    // Visible from the same session
    let list = get(&app, "/api/v1/orders", Some(&cookie)).await;
    assert_eq!(list.body["orders"].as_array().unwrap().len(), 1);
    assert_eq!(list.body["orders"][0]["orderId"], order_id);

    let detail = get(&app, &format!("/api/v1/orders/{order_id}"), Some(&cookie)).await;
    assert_eq!(detail.status, StatusCode::OK);
    assert_eq!(detail.body["items"][1]["name"], "Diavola");

    // Not visible from another session
    let stranger = new_session(&app).await;
    let other = get(&app, &format!("/api/v1/orders/{order_id}"), Some(&stranger)).await;
    assert_eq!(other.status, StatusCode::NOT_FOUND);
    let bad = get(&app, "/api/v1/orders/xyz", Some(&stranger)).await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_order_returned_when_cart_clear_fails() {
    let mut brittle = None;
    let app = TestApp::with_store(|clock| {
        let store = Arc::new(BrittleStore::new(clock));
        brittle = Some(store.clone());
        store
    });
    let brittle = brittle.unwrap();
    let pizza = app.catalog.insert("Ortolana", price(950), &[]);
    let cookie = new_session(&app).await;
    add_to_cart(&app, &cookie, pizza, 2).await;

    brittle.fail_overwrites(true);
    let reply = call(&app, Method::POST, "/api/v1/orders", Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert!((money(&reply.body["total"]) - 19.0).abs() < f64::EPSILON);
    assert_eq!(app.orders.all().len(), 1);

    // The stale cart is left in place
    let cart = get(&app, "/api/v1/cart", Some(&cookie)).await;
    assert_eq!(cart.status, StatusCode::OK);
    assert_eq!(cart.body["items"][0]["quantity"], 2);

    // Once writes recover the customer can empty it
    brittle.fail_overwrites(false);
    let cleared = call(&app, Method::DELETE, "/api/v1/cart", Some(&cookie), None).await;
    assert_eq!(cleared.body, json!({ "items": [], "total": 0.0 }));
}

#[tokio::test]
async fn test_orders_listed_newest_first() {
    let app = TestApp::new();
    let pizza = app.catalog.insert("Bianca", price(900), &[]);
    let cookie = new_session(&app).await;

    for _ in 0..2 {
        add_to_cart(&app, &cookie, pizza, 1).await;
        call(&app, Method::POST, "/api/v1/orders", Some(&cookie), None).await;
        app.clock.advance(Duration::from_secs(60));
    }

    let list = get(&app, "/api/v1/orders", Some(&cookie)).await;
    let orders = list.body["orders"].as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert!(orders[0]["orderId"].as_i64() > orders[1]["orderId"].as_i64());
}

#[tokio::test]
async fn test_order_immutable_after_price_change() {
    let app = TestApp::new();
    let pizza = app.catalog.insert("Prosciutto", price(1400), &[]);
    let cookie = new_session(&app).await;
    add_to_cart(&app, &cookie, pizza, 2).await;
    let placed = call(&app, Method::POST, "/api/v1/orders", Some(&cookie), None).await;
    let order_id = placed.body["orderId"].as_i64().unwrap();

    app.catalog.set_price(pizza, price(1900));

    let detail = get(&app, &format!("/api/v1/orders/{order_id}"), Some(&cookie)).await;
    assert!((money(&detail.body["total"]) - 28.0).abs() < f64::EPSILON);
    assert!((money(&detail.body["items"][0]["unitPrice"]) - 14.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_order_with_discontinued_pizza_is_rejected() {
    let app = TestApp::new();
    let pizza = app.catalog.insert("Limited", price(1000), &[]);
    let cookie = new_session(&app).await;
    add_to_cart(&app, &cookie, pizza, 1).await;
    app.catalog.delete(pizza);

    let reply = call(&app, Method::POST, "/api/v1/orders", Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert!(app.orders.all().is_empty());

    // Cart kept for the customer to fix
    let cart = get(&app, "/api/v1/cart", Some(&cookie)).await;
    assert_eq!(cart.body["items"].as_array().unwrap().len(), 1);
}

// =============================================================================
// Accounts
// =============================================================================

#[tokio::test]
async fn test_register_verify_login_flow() {
    let app = TestApp::new();

    let reply = register(&app, "Luigi@Pizza.test", "mozzarella1").await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert!(reply.body["message"].is_string());

    let sent = app.mailer.wait_for(1).await;
    assert_eq!(sent[0].to, "luigi@pizza.test");

    // Not verified yet
    let login = post(
        &app,
        "/api/v1/auth/login",
        None,
        json!({ "email": "luigi@pizza.test", "password": "mozzarella1" }),
    )
    .await;
    assert_eq!(login.status, StatusCode::NOT_FOUND);
    assert!(login.error().contains("not verified"));

    let token = latest_token(&app, 1).await;
    let verified = get(&app, &format!("/api/v1/auth/verify?token={token}"), None).await;
    assert_eq!(verified.status, StatusCode::OK);

    let login = post(
        &app,
        "/api/v1/auth/login",
        None,
        json!({ "email": "luigi@pizza.test", "password": "mozzarella1" }),
    )
    .await;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.body["user"]["email"], "luigi@pizza.test");
    assert!(login.body["user"]["id"].is_number());
    let cookie = login.session_cookie().unwrap();

    // Orders placed with the login session are bound to the account
    let pizza = app.catalog.insert("Salame", price(1100), &[]);
    add_to_cart(&app, &cookie, pizza, 1).await;
    let placed = call(&app, Method::POST, "/api/v1/orders", Some(&cookie), None).await;
    assert_eq!(placed.status, StatusCode::CREATED);
    let user_id = login.body["user"]["id"].as_i64().unwrap();
    assert_eq!(
        app.orders.all()[0].user_id,
        Some(UserId::new(i32::try_from(user_id).unwrap()))
    );
}

#[tokio::test]
async fn test_login_leaves_existing_session_alone() {
    let app = TestApp::new();
    let pizza = app.catalog.insert("Ortolana", price(1000), &[]);
    let anonymous = new_session(&app).await;
    add_to_cart(&app, &anonymous, pizza, 1).await;

    register(&app, "anna@pizza.test", "basilico12").await;
    let token = latest_token(&app, 1).await;
    get(&app, &format!("/api/v1/auth/verify?token={token}"), None).await;

    let login = call(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        Some(&anonymous),
        Some(json!({ "email": "anna@pizza.test", "password": "basilico12" })),
    )
    .await;
    let bound = login.session_cookie().unwrap();
    assert_ne!(bound, anonymous);

    let old = get(&app, "/api/v1/cart", Some(&anonymous)).await;
    assert_eq!(old.body["items"].as_array().unwrap().len(), 1);
    let new = get(&app, "/api/v1/cart", Some(&bound)).await;
    assert!(new.body["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_verification_token_single_use() {
    let app = TestApp::new();
    register(&app, "mario@pizza.test", "pepperoni9").await;
    let token = latest_token(&app, 1).await;

    let uri = format!("/api/v1/auth/verify?token={token}");
    assert_eq!(get(&app, &uri, None).await.status, StatusCode::OK);
    let second = get(&app, &uri, None).await;
    assert_eq!(second.status, StatusCode::NOT_FOUND);
    assert!(second.error().contains("Invalid or expired"));
}

#[tokio::test]
async fn test_verification_token_expires() {
    let app = TestApp::new();
    register(&app, "late@pizza.test", "pepperoni9").await;
    let token = latest_token(&app, 1).await;

    app.clock.advance(Duration::from_secs(24 * 60 * 60));
    let reply = get(&app, &format!("/api/v1/auth/verify?token={token}"), None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_verify_requires_token() {
    let app = TestApp::new();
    let reply = get(&app, "/api/v1/auth/verify", None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let reply = get(&app, "/api/v1/auth/verify?token=unknown", None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_register_validation() {
    let app = TestApp::new();

    let missing = post(&app, "/api/v1/auth/register", None, json!({ "email": "a@b.test" })).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert!(missing.error().contains("required"));

    let invalid = register(&app, "not-an-email", "longenough").await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    assert!(invalid.error().contains("Invalid email"));

    let weak = register(&app, "weak@pizza.test", "short").await;
    assert_eq!(weak.status, StatusCode::BAD_REQUEST);
    assert!(weak.error().contains("at least 8"));

    assert_eq!(
        register(&app, "dup@pizza.test", "longenough").await.status,
        StatusCode::CREATED
    );
    let dup = register(&app, "DUP@pizza.test", "longenough").await;
    assert_eq!(dup.status, StatusCode::CONFLICT);
    assert!(dup.error().contains("already exists"));
}

#[tokio::test]
async fn test_login_failures() {
    let app = TestApp::new();
    register(&app, "chef@pizza.test", "oregano123").await;
    let token = latest_token(&app, 1).await;
    get(&app, &format!("/api/v1/auth/verify?token={token}"), None).await;

    let wrong = post(
        &app,
        "/api/v1/auth/login",
        None,
        json!({ "email": "chef@pizza.test", "password": "oregano124" }),
    )
    .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert!(wrong.session_cookie().is_none());

    let unknown = post(
        &app,
        "/api/v1/auth/login",
        None,
        json!({ "email": "ghost@pizza.test", "password": "oregano123" }),
    )
    .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);

    let missing = post(&app, "/api/v1/auth/login", None, json!({})).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_already_verified() {
    let app = TestApp::new();
    register(&app, "twice@pizza.test", "oregano123").await;
    let first = latest_token(&app, 1).await;

    // Second resend replaces the first token
    app.clock.advance(RESEND_WINDOW);
    post(
        &app,
        "/api/v1/auth/resend-verification",
        None,
        json!({ "email": "twice@pizza.test" }),
    )
    .await;
    let second = latest_token(&app, 2).await;
    assert_ne!(first, second);
    assert_eq!(
        get(&app, &format!("/api/v1/auth/verify?token={first}"), None)
            .await
            .status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        get(&app, &format!("/api/v1/auth/verify?token={second}"), None)
            .await
            .status,
        StatusCode::OK
    );

    // Resending to a verified address is refused
    let resend = post(
        &app,
        "/api/v1/auth/resend-verification",
        None,
        json!({ "email": "twice@pizza.test" }),
    )
    .await;
    assert_eq!(resend.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_resend_rate_limit_window() {
    let app = TestApp::new();
    register(&app, "slow@pizza.test", "oregano123").await;
    let body = json!({ "email": "slow@pizza.test" });

    let first = post(&app, "/api/v1/auth/resend-verification", None, body.clone()).await;
    assert_eq!(first.status, StatusCode::OK);

    let second = post(&app, "/api/v1/auth/resend-verification", None, body.clone()).await;
    assert_eq!(second.status, StatusCode::TOO_MANY_REQUESTS);

    app.clock.advance(RESEND_WINDOW + Duration::from_secs(1));
    let third = post(&app, "/api/v1/auth/resend-verification", None, body).await;
    assert_eq!(third.status, StatusCode::OK);

    // Register + two successful resends
    assert_eq!(app.mailer.wait_for(3).await.len(), 3);
}

#[tokio::test]
async fn test_resend_unknown_or_missing_email() {
    let app = TestApp::new();
    let unknown = post(
        &app,
        "/api/v1/auth/resend-verification",
        None,
        json!({ "email": "nobody@pizza.test" }),
    )
    .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);

    let missing = post(&app, "/api/v1/auth/resend-verification", None, json!({})).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_logout() {
    let app = TestApp::new();

    let without = call(&app, Method::POST, "/api/v1/auth/logout", None, None).await;
    assert_eq!(without.status, StatusCode::BAD_REQUEST);
    assert!(without.error().contains("No active session"));

    let pizza = app.catalog.insert("Tonno", price(1000), &[]);
    let cookie = new_session(&app).await;
    add_to_cart(&app, &cookie, pizza, 1).await;

    let reply = call(&app, Method::POST, "/api/v1/auth/logout", Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let cleared = reply.set_cookie().unwrap();
    assert_eq!(cleared.value(), "");
    assert_eq!(cleared.max_age(), Some(cookie::time::Duration::ZERO));

    // The record is gone: the old cookie now gets a fresh, empty session
    let after = get(&app, "/api/v1/cart", Some(&cookie)).await;
    assert!(after.session_cookie().is_some());
    assert!(after.body["items"].as_array().unwrap().is_empty());
}
