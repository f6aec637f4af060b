//! In-process session store backed by `moka`.
//!
//! Each entry carries its own TTL, which `moka` uses for eviction. Visibility
//! is decided separately against the injected clock so that expiry behaves
//! the same under a mocked clock as it does in production.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use moka::Expiry;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};

use super::store::{KvStore, StoreError, expires_at};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Evict each entry after its own TTL, restarting on overwrite.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Bounded in-memory [`KvStore`].
///
/// Sessions do not survive a restart and are not shared between processes.
#[derive(Clone)]
pub struct MemoryKvStore {
    cache: Cache<String, Entry>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl MemoryKvStore {
    /// Create a store holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: u64, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache, clock }
    }

    fn entry(&self, value: String, ttl: Duration) -> Entry {
        Entry {
            value,
            ttl,
            expires_at: expires_at(self.clock.utc(), ttl),
        }
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.utc();
        Ok(self
            .cache
            .get(key)
            .await
            .filter(|e| e.is_live(now))
            .map(|e| e.value))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let entry = self.entry(value, ttl);
        self.cache.insert(key.to_owned(), entry).await;
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
        let replacement = self.entry(value, ttl);
        let expected = expected.map(str::to_owned);

        let result = self
            .cache
            .entry(key.to_owned())
            .and_compute_with(move |current| {
                let live = current.map(|e| e.into_value()).filter(|e| e.is_live(now));
                let matches = match (&live, &expected) {
                    (None, None) => true,
                    (Some(entry), Some(expected)) => entry.value == *expected,
                    _ => false,
                };
                std::future::ready(if matches {
                    Op::Put(replacement)
                } else {
                    Op::Nop
                })
            })
            .await;

        Ok(matches!(
            result,
            CompResult::Inserted(_) | CompResult::ReplacedWith(_)
        ))
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = self.clock.utc();
        Ok(self
            .cache
            .remove(key)
            .await
            .is_some_and(|e| e.is_live(now)))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
