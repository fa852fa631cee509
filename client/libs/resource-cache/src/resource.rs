use crate::{CacheEntry, CacheResult, ResourceCache};
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use subscriber_registry::Subscription;

/// Shared fetcher for a bound resource
pub type BoxFetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// A cache key bound to its fetcher and TTL.
///
/// Notifications and profile are both served through this one type; only the
/// fetcher and TTL differ.
pub struct Resource<T> {
    cache: ResourceCache<T>,
    key: String,
    ttl: Duration,
    fetcher: BoxFetcher<T>,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            key: self.key.clone(),
            ttl: self.ttl,
            fetcher: Arc::clone(&self.fetcher),
        }
    }
}

impl<T: Send + Sync + 'static> Resource<T> {
    pub fn new<F, Fut>(cache: ResourceCache<T>, key: impl Into<String>, ttl: Duration, fetcher: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            cache,
            key: key.into(),
            ttl,
            fetcher: Arc::new(move || fetcher().boxed()),
        }
    }

    /// Bind with the cache's configured `default_ttl`
    pub fn with_default_ttl<F, Fut>(cache: ResourceCache<T>, key: impl Into<String>, fetcher: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let ttl = cache.config().default_ttl;
        Self::new(cache, key, ttl, fetcher)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self) -> CacheResult<Arc<T>> {
        let fetcher = Arc::clone(&self.fetcher);
        self.cache.get(&self.key, move || fetcher(), self.ttl).await
    }

    pub async fn refresh(&self) -> CacheResult<Arc<T>> {
        let fetcher = Arc::clone(&self.fetcher);
        self.cache.refresh(&self.key, move || fetcher()).await
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&CacheEntry<T>) + Send + Sync + 'static,
    {
        self.cache.subscribe(&self.key, callback)
    }

    pub fn invalidate(&self) {
        self.cache.invalidate(&self.key)
    }

    pub fn set(&self, value: T) {
        self.cache.set(&self.key, value)
    }

    pub fn entry(&self) -> CacheEntry<T> {
        self.cache.entry(&self.key)
    }

    /// Optimistic update reconciled through this resource's own fetcher
    pub async fn optimistic_update<M, R, ME, MutFut>(&self, mutator: M, mutation: MutFut) -> CacheResult<R>
    where
        M: FnOnce(&T) -> T,
        MutFut: Future<Output = Result<R, ME>>,
        ME: std::fmt::Display,
    {
        let fetcher = Arc::clone(&self.fetcher);
        self.cache
            .optimistic_update(&self.key, mutator, mutation, move || fetcher())
            .await
    }
}
