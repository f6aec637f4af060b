//! `PostgreSQL`-backed session store.
//!
//! Rows live in `storefront.kv_entry`. Expired rows are filtered out on read
//! and removed in bulk by [`PostgresKvStore::purge_expired`] (run from
//! `pizzeria purge`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use sqlx::PgPool;

use super::store::{KvStore, StoreError, expires_at};

/// [`KvStore`] over a `PostgreSQL` table.
#[derive(Clone)]
pub struct PostgresKvStore {
    pool: PgPool,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl PostgresKvStore {
    #[must_use]
    pub fn new(pool: PgPool, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self { pool, clock }
    }

    /// Delete every row that expired at or before `now`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the delete fails.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM storefront.kv_entry WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl KvStore for PostgresKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value: Option<String> = sqlx::query_scalar(
            r"
            SELECT value FROM storefront.kv_entry
            WHERE key = $1 AND expires_at > $2
            ",
        )
        .bind(key)
        .bind(self.clock.utc())
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let expiry = expires_at(self.clock.utc(), ttl);
        sqlx::query(
            r"
            INSERT INTO storefront.kv_entry (key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE
                SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            ",
        )
        .bind(key)
        .bind(value)
        .bind(expiry)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: String,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = self.clock.utc();
        let expiry = expires_at(now, ttl);

        let result = match expected {
            // Insert, or take over a row that has already expired
            None => {
                sqlx::query(
                    r"
                    INSERT INTO storefront.kv_entry (key, value, expires_at)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (key) DO UPDATE
                        SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
                        WHERE storefront.kv_entry.expires_at <= $4
                    ",
                )
                .bind(key)
                .bind(value)
                .bind(expiry)
                .bind(now)
                .execute(&self.pool)
                .await?
            }
            Some(expected) => {
                sqlx::query(
                    r"
                    UPDATE storefront.kv_entry
                    SET value = $2, expires_at = $3
                    WHERE key = $1 AND value = $4 AND expires_at > $5
                    ",
                )
                .bind(key)
                .bind(value)
                .bind(expiry)
                .bind(expected)
                .bind(now)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let expiry: Option<DateTime<Utc>> = sqlx::query_scalar(
            "DELETE FROM storefront.kv_entry WHERE key = $1 RETURNING expires_at",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(expiry.is_some_and(|at| at > self.clock.utc()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
