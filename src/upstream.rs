//! Guarded Upstream
//!
//! Memoizes responses from a rate-limited upstream. Cache hits never touch
//! the limiter, so only real calls count against the upstream's budget.

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use tracing::debug;

use crate::cache::SweepCache;
use crate::error::UpstreamError;
use crate::ratelimit::RateLimiter;

pub struct GuardedUpstream<K, V> {
    cache: SweepCache<K, V>,
    limiter: Arc<RateLimiter>,
}

impl<K, V> Clone for GuardedUpstream<K, V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            limiter: Arc::clone(&self.limiter),
        }
    }
}

impl<K, V> GuardedUpstream<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn new(cache: SweepCache<K, V>, limiter: Arc<RateLimiter>) -> Self {
        Self { cache, limiter }
    }

    pub fn cache(&self) -> &SweepCache<K, V> {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    // == Get Or Fetch ==
    /// Returns the memoized value for `key`, or calls `fetch` if the limiter
    /// admits the request.
    ///
    /// Failed fetches are not memoized.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<V, UpstreamError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<V>>,
    {
        if let Some(value) = self.cache.get(&key).await {
            return Ok(value);
        }

        self.limiter.check_request().await?;
        self.fetch_and_store(key, fetch).await
    }

    /// Like [`GuardedUpstream::get_or_fetch`], but waits for the limiter
    /// instead of failing.
    pub async fn get_or_fetch_waiting<F, Fut>(&self, key: K, fetch: F) -> Result<V, UpstreamError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<V>>,
    {
        if let Some(value) = self.cache.get(&key).await {
            return Ok(value);
        }

        self.limiter.stack_up_request().await;
        self.fetch_and_store(key, fetch).await
    }

    async fn fetch_and_store<F, Fut>(&self, key: K, fetch: F) -> Result<V, UpstreamError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<V>>,
    {
        debug!(api = %self.limiter.api_name(), ?key, "Fetching from upstream");
        let value = fetch().await?;
        self.cache.add(key, value.clone()).await;
        Ok(value)
    }
}
