//! Application state shared across handlers.

use std::sync::Arc;

use mockable::{Clock, DefaultClock};
use sqlx::PgPool;

use crate::config::{SessionBackend, StorefrontConfig};
use crate::db::{
    AccountRepository, CatalogRepository, OrderRepository, PgAccountRepository,
    PgCatalogRepository, PgOrderRepository,
};
use crate::services::{EmailService, LogMailer, Mailer, PasswordService, SmtpMailer};
use crate::session::{KvStore, MemoryKvStore, PostgresKvStore, SessionManager};

/// Error assembling the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("SMTP transport: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. Every store sits behind a
/// trait object so tests can swap in in-memory doubles.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    catalog: Arc<dyn CatalogRepository>,
    orders: Arc<dyn OrderRepository>,
    accounts: Arc<dyn AccountRepository>,
    sessions: SessionManager,
    email: EmailService,
    passwords: PasswordService,
    clock: Arc<dyn Clock + Send + Sync>,
}

/// Individually constructed dependencies for [`AppState::from_parts`].
pub struct StateParts {
    pub catalog: Arc<dyn CatalogRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub accounts: Arc<dyn AccountRepository>,
    pub kv: Arc<dyn KvStore>,
    pub mailer: Arc<dyn Mailer>,
    pub passwords: PasswordService,
    pub clock: Arc<dyn Clock + Send + Sync>,
}

impl AppState {
    /// Create the production state over a `PostgreSQL` pool.
    ///
    /// The session store backend and the mailer are chosen from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the SMTP transport cannot be configured.
    pub fn from_pool(config: StorefrontConfig, pool: PgPool) -> Result<Self, StateError> {
        let clock: Arc<dyn Clock + Send + Sync> = Arc::new(DefaultClock);

        let kv: Arc<dyn KvStore> = match config.session_backend {
            SessionBackend::Postgres => Arc::new(PostgresKvStore::new(pool.clone(), clock.clone())),
            SessionBackend::Memory => {
                Arc::new(MemoryKvStore::new(config.session_capacity, clock.clone()))
            }
        };

        let mailer: Arc<dyn Mailer> = match &config.email {
            Some(email) => Arc::new(SmtpMailer::new(email)?),
            None => {
                tracing::warn!("SMTP not configured, verification emails will only be logged");
                Arc::new(LogMailer)
            }
        };

        Ok(Self::from_parts(
            config,
            StateParts {
                catalog: Arc::new(PgCatalogRepository::new(pool.clone())),
                orders: Arc::new(PgOrderRepository::new(pool.clone())),
                accounts: Arc::new(PgAccountRepository::new(pool)),
                kv,
                mailer,
                passwords: PasswordService::default(),
                clock,
            },
        ))
    }

    /// Assemble state from already-built dependencies.
    #[must_use]
    pub fn from_parts(config: StorefrontConfig, parts: StateParts) -> Self {
        let sessions = SessionManager::new(parts.kv, parts.clock.clone());
        Self {
            inner: Arc::new(AppStateInner {
                config,
                catalog: parts.catalog,
                orders: parts.orders,
                accounts: parts.accounts,
                sessions,
                email: EmailService::new(parts.mailer),
                passwords: parts.passwords,
                clock: parts.clock,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn catalog(&self) -> &dyn CatalogRepository {
        self.inner.catalog.as_ref()
    }

    #[must_use]
    pub fn orders(&self) -> &dyn OrderRepository {
        self.inner.orders.as_ref()
    }

    #[must_use]
    pub fn accounts(&self) -> &dyn AccountRepository {
        self.inner.accounts.as_ref()
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.inner.sessions
    }

    #[must_use]
    pub fn email(&self) -> &EmailService {
        &self.inner.email
    }

    #[must_use]
    pub fn passwords(&self) -> &PasswordService {
        &self.inner.passwords
    }

    /// Source of "now" for expiry and timestamps.
    #[must_use]
    pub fn clock(&self) -> &(dyn Clock + Send + Sync) {
        self.inner.clock.as_ref()
    }
}
