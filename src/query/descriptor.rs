//! Query declarations.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use super::config::QueryConfig;
use super::retry::RetryPolicy;
use crate::Result;
use crate::keys::CacheKey;

pub(crate) type AnyValue = Arc<dyn Any + Send + Sync>;
type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// How to populate the cache entry under one key.
///
/// `stale_time`, `gc_time` and `retry` fall back to the cache's
/// [`QueryConfig`] when not set.
pub struct QueryDescriptor<T> {
    key: CacheKey,
    fetch: Fetcher<T>,
    stale_time: Option<Duration>,
    gc_time: Option<Duration>,
    retry: Option<RetryPolicy>,
    enabled: bool,
}

impl<T> Clone for QueryDescriptor<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            fetch: Arc::clone(&self.fetch),
            stale_time: self.stale_time,
            gc_time: self.gc_time,
            retry: self.retry.clone(),
            enabled: self.enabled,
        }
    }
}

impl<T: Send + Sync + 'static> QueryDescriptor<T> {
    pub fn new<F, Fut>(key: CacheKey, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            key,
            fetch: Arc::new(move || fetch().boxed()),
            stale_time: None,
            gc_time: None,
            retry: None,
            enabled: true,
        }
    }

    pub fn stale_time(mut self, d: Duration) -> Self {
        self.stale_time = Some(d);
        self
    }

    pub fn gc_time(mut self, d: Duration) -> Self {
        self.gc_time = Some(d);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// A disabled query never fetches on subscribe or invalidation.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Resolve defaults and drop the value type.
    pub(crate) fn erase(&self, config: &QueryConfig) -> ErasedQuery {
        let fetch = Arc::clone(&self.fetch);
        ErasedQuery {
            fetch: Arc::new(move || {
                fetch()
                    .map(|result| result.map(|value| Arc::new(value) as AnyValue))
                    .boxed()
            }),
            stale_time: self.stale_time.unwrap_or(config.stale_time),
            gc_time: self.gc_time.unwrap_or(config.gc_time),
            retry: self.retry.clone().unwrap_or_else(|| config.retry.clone()),
            enabled: self.enabled,
        }
    }
}

/// A descriptor with defaults resolved and the value type erased, as
/// stored on cache entries for invalidation refetches.
#[derive(Clone)]
pub(crate) struct ErasedQuery {
    pub fetch: Fetcher<AnyValue>,
    pub stale_time: Duration,
    pub gc_time: Duration,
    pub retry: RetryPolicy,
    pub enabled: bool,
}
