use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CacheKey, CacheKind};
use crate::api::ApiError;
use crate::clock::Clock;
use crate::error::Result;
use crate::store::KeyValueStore;

/// Entries older than this are ignored even within the same calendar day.
pub const CACHE_MAX_AGE_HOURS: i64 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: DateTime<Utc>,
}

/// Why an entry is no longer served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Written on an earlier local calendar day; deleted on read
    CalendarDay,
    /// Older than `CACHE_MAX_AGE_HOURS`; left in place until overwritten
    MaxAge,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, now: DateTime<FixedOffset>) -> Self {
        Self {
            data,
            timestamp: now.with_timezone(&Utc),
        }
    }

    pub fn age(&self, now: DateTime<FixedOffset>) -> Duration {
        now.with_timezone(&Utc) - self.timestamp
    }

    pub fn expiry(&self, now: DateTime<FixedOffset>) -> Option<Expiry> {
        let created_on = self.timestamp.with_timezone(now.offset()).date_naive();
        if now.date_naive() > created_on {
            Some(Expiry::CalendarDay)
        } else if self.age(now) > Duration::hours(CACHE_MAX_AGE_HOURS) {
            Some(Expiry::MaxAge)
        } else {
            None
        }
    }
}

/// Memoized access to API results, stored as JSON in the key-value store.
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl CacheManager {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Read a live entry. Unparseable entries are reported as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>> {
        let key = key.to_string();
        let Some(raw) = self.store.get_string(&key).await? else {
            return Ok(None);
        };

        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring corrupt cache entry");
                return Ok(None);
            }
        };

        match entry.expiry(self.clock.now()) {
            None => Ok(Some(entry.data)),
            Some(Expiry::CalendarDay) => {
                debug!(key = %key, "Cache entry is from an earlier day, removing");
                if let Err(e) = self.store.remove_key(&key).await {
                    warn!(key = %key, error = %e, "Failed to remove expired cache entry");
                }
                Ok(None)
            }
            Some(Expiry::MaxAge) => {
                debug!(key = %key, "Cache entry is stale");
                Ok(None)
            }
        }
    }

    /// Write `data` with the current time, replacing any previous entry.
    pub async fn set<T: Serialize>(&self, key: &CacheKey, data: &T) -> Result<()> {
        let entry = CacheEntry::new(data, self.clock.now());
        let contents = serde_json::to_string(&entry)?;
        self.store.set_string(&key.to_string(), &contents).await?;
        Ok(())
    }

    /// Serve `key` from the cache, or run `fetch` and cache its result.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: &CacheKey, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, ApiError>>,
    {
        if let Some(cached) = self.get(key).await? {
            return Ok(cached);
        }
        let fresh = fetch().await?;
        self.set(key, &fresh).await?;
        Ok(fresh)
    }

    /// Best-effort removal of a single entry
    pub async fn invalidate(&self, key: &CacheKey) {
        let key = key.to_string();
        if let Err(e) = self.store.remove_key(&key).await {
            warn!(key = %key, error = %e, "Failed to remove cache entry");
        }
    }

    /// Remove every key starting with `prefix`. Returns how many keys were
    /// removed, `0` when the removal failed. Listing failures propagate;
    /// removal failures are logged.
    pub async fn clear_by_prefix(&self, prefix: &str) -> Result<usize> {
        let keys: Vec<String> = self
            .store
            .list_keys()
            .await?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect();

        if keys.is_empty() {
            return Ok(0);
        }
        match self.store.remove_keys(&keys).await {
            Ok(()) => {
                debug!(prefix, count = keys.len(), "Cleared cache entries");
                Ok(keys.len())
            }
            Err(e) => {
                warn!(prefix, count = keys.len(), error = %e, "Failed to clear cache entries");
                Ok(0)
            }
        }
    }

    pub async fn clear_kind(&self, kind: CacheKind) -> Result<usize> {
        self.clear_by_prefix(&kind.prefix()).await
    }
}

// ============================================================================
// Tests
// ============================================================================
