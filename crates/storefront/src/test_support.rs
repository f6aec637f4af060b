//! Shared fixtures for unit and router tests.

#![allow(clippy::unwrap_used)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use argon2::Params;
use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;
use secrecy::SecretString;
use url::Url;

use crate::config::{SessionBackend, StorefrontConfig};
use crate::db::memory::{MemoryAccounts, MemoryCatalog, MemoryOrders};
use crate::services::email::{EmailError, Mailer, OutgoingEmail};
use crate::services::PasswordService;
use crate::session::{KvStore, MemoryKvStore, StoreError};
use crate::state::{AppState, StateParts};

// =============================================================================
// Clock
// =============================================================================

/// A clock that only moves when told to.
pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn advance(&self, delta: Duration) {
        let delta = TimeDelta::from_std(delta).unwrap();
        *self.0.lock().unwrap() += delta;
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

// =============================================================================
// Mailer
// =============================================================================

/// Keeps every message instead of delivering it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    /// Wait until at least `count` messages were sent by background tasks.
    pub async fn wait_for(&self, count: usize) -> Vec<OutgoingEmail> {
        for _ in 0..1_000 {
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {count} emails, got {}", self.sent().len());
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

// =============================================================================
// Session store
// =============================================================================

/// In-memory store whose overwrites can be made to fail on demand.
///
/// Reads, deletes and first writes (`expected == None`) always work, so
/// sessions can still be resolved and created while overwrites are broken.
pub struct BrittleStore {
    inner: MemoryKvStore,
    failing: AtomicBool,
}

impl BrittleStore {
    pub fn new(clock: Arc<MutableClock>) -> Self {
        Self {
            inner: MemoryKvStore::new(10_000, clock),
            failing: AtomicBool::new(false),
        }
    }

    pub fn fail_overwrites(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl KvStore for BrittleStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.inner.set(key, value, ttl).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: String,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        if expected.is_some() && self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write refused".to_string()));
        }
        self.inner.compare_and_set(key, expected, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

// =============================================================================
// Application
// =============================================================================

pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://unused"),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        base_url: Url::parse("https://pizza.example.com").unwrap(),
        session_backend: SessionBackend::Memory,
        session_capacity: 10_000,
        allowed_origins: Vec::new(),
        auth_rate_limit: false,
        email: None,
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// The full application over in-memory stores.
pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub clock: Arc<MutableClock>,
    pub mailer: Arc<RecordingMailer>,
    pub catalog: Arc<MemoryCatalog>,
    pub orders: Arc<MemoryOrders>,
    pub accounts: Arc<MemoryAccounts>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_store(|clock| Arc::new(MemoryKvStore::new(10_000, clock)))
    }

    /// Build over the session store returned by `make_store`.
    pub fn with_store(
        make_store: impl FnOnce(Arc<MutableClock>) -> Arc<dyn KvStore>,
    ) -> Self {
        let clock = Arc::new(MutableClock::new(Utc::now()));
        let mailer = Arc::new(RecordingMailer::default());
        let catalog = Arc::new(MemoryCatalog::default());
        let orders = Arc::new(MemoryOrders::default());
        let accounts = Arc::new(MemoryAccounts::default());

        let state = AppState::from_parts(
            test_config(),
            StateParts {
                catalog: catalog.clone(),
                orders: orders.clone(),
                accounts: accounts.clone(),
                kv: make_store(clock.clone()),
                mailer: mailer.clone(),
                passwords: PasswordService::new(Params::new(8, 1, 1, None).unwrap()),
                clock: clock.clone(),
            },
        );
        let router = crate::routes::app(state.clone());

        Self {
            state,
            router,
            clock,
            mailer,
            catalog,
            orders,
            accounts,
        }
    }
}
