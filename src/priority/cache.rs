//! Time-boxed single-value cache.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct CachedValue<T> {
    value: T,
    expires_at: Instant,
}

/// Holds one value until its TTL elapses, then refreshes it on the next read.
///
/// The lock is held across the refresh, so concurrent readers wait for one
/// refresh instead of each issuing their own.
#[derive(Debug)]
pub struct TtlCache<T> {
    ttl: Duration,
    entry: Mutex<Option<CachedValue<T>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    /// The cached value if still fresh, otherwise the result of `refresh`.
    ///
    /// A failed refresh is returned as-is and leaves the cache empty.
    pub async fn get_or_refresh<F, Fut, E>(&self, refresh: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut entry = self.entry.lock().await;
        if let Some(cached) = entry.as_ref() {
            if Instant::now() < cached.expires_at {
                return Ok(cached.value.clone());
            }
        }

        *entry = None;
        let value = refresh().await?;
        *entry = Some(CachedValue {
            value: value.clone(),
            expires_at: Instant::now() + self.ttl,
        });
        Ok(value)
    }

    pub async fn invalidate(&self) {
        *self.entry.lock().await = None;
    }
}
