//! Housekeeping for expiring rows.
//!
//! Expired sessions and tokens are already ignored on read; this only
//! reclaims the space. Safe to run from cron at any interval.

use std::sync::Arc;

use mockable::{Clock, DefaultClock};
use pizzeria_storefront::db::{self, AccountRepository, PgAccountRepository};
use pizzeria_storefront::session::PostgresKvStore;

use super::database_url;

/// Delete expired key-value entries and verification tokens.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a delete fails.
pub async fn expired() -> Result<(), Box<dyn std::error::Error>> {
    let pool = db::create_pool(&database_url()?).await?;
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(DefaultClock);
    let now = clock.utc();

    let entries = PostgresKvStore::new(pool.clone(), clock)
        .purge_expired(now)
        .await?;
    tracing::info!(count = entries, "Purged expired key-value entries");

    let tokens = PgAccountRepository::new(pool)
        .purge_expired_verifications(now)
        .await?;
    tracing::info!(count = tokens, "Purged expired verification tokens");

    Ok(())
}
