//! Query observers.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use super::cache::{Inner, downcast};
use super::descriptor::ErasedQuery;
use super::entry::QueryState;
use crate::keys::CacheKey;
use crate::{HuginnError, Result};

/// Snapshot of one cache entry as seen by an observer.
#[derive(Debug, Clone)]
pub struct QueryResult<T> {
    /// Last good data, kept across failed refetches.
    pub data: Option<T>,
    pub error: Option<Arc<HuginnError>>,
    pub state: QueryState,
    /// Fetching with nothing to show yet.
    pub is_loading: bool,
    pub is_fetching: bool,
    pub is_stale: bool,
    pub fetched_at: Option<Instant>,
}

impl<T> QueryResult<T> {
    fn empty() -> Self {
        Self {
            data: None,
            error: None,
            state: QueryState::Idle,
            is_loading: false,
            is_fetching: false,
            is_stale: true,
            fetched_at: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == QueryState::Success
    }

    pub fn is_error(&self) -> bool {
        self.state == QueryState::Error
    }
}

/// A registered interest in one cache key.
///
/// While an observer is alive its entry is never garbage collected and is
/// refetched on invalidation. Dropping the observer unsubscribes and starts
/// the entry's GC countdown; it does not cancel a fetch in flight.
pub struct QueryObserver<T> {
    inner: Arc<Inner>,
    key: CacheKey,
    query: ErasedQuery,
    incarnation: AtomicU64,
    seen: u64,
    ticks: watch::Receiver<u64>,
    _value: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for QueryObserver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryObserver")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> QueryObserver<T> {
    pub(crate) fn new(
        inner: Arc<Inner>,
        key: CacheKey,
        query: ErasedQuery,
        incarnation: u64,
        version: u64,
    ) -> Self {
        let ticks = inner.subscribe_ticks();
        Self {
            inner,
            key,
            query,
            incarnation: AtomicU64::new(incarnation),
            seen: version,
            ticks,
            _value: PhantomData,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Current state of the observed entry.
    pub fn result(&self) -> QueryResult<T> {
        let now = Instant::now();
        let state = self.inner.lock();
        if state.disposed {
            return QueryResult {
                error: Some(Arc::new(HuginnError::Disposed)),
                ..QueryResult::empty()
            };
        }
        let Some(entry) = state.entries.get(&self.key) else {
            return QueryResult::empty();
        };

        let (data, mut error) = match entry.data.as_ref().map(|d| downcast::<T>(&self.key, d)) {
            Some(Ok(value)) => (Some(value), None),
            Some(Err(e)) => (None, Some(Arc::new(e))),
            None => (None, None),
        };
        if error.is_none() {
            error = entry.error.clone();
        }
        let is_fetching = entry.state == QueryState::Fetching;
        QueryResult {
            is_loading: is_fetching && data.is_none(),
            data,
            error,
            state: entry.state,
            is_fetching,
            is_stale: entry.is_stale(now),
            fetched_at: entry.fetched_at,
        }
    }

    /// Shorthand for `result().data`.
    pub fn data(&self) -> Option<T> {
        self.result().data
    }

    fn version(&self) -> Result<u64> {
        let state = self.inner.lock();
        if state.disposed {
            return Err(HuginnError::Disposed);
        }
        Ok(state.entries.get(&self.key).map_or(0, |entry| entry.version))
    }

    /// Wait until the observed entry changes.
    pub async fn changed(&mut self) -> Result<()> {
        loop {
            let version = self.version()?;
            if version != self.seen {
                self.seen = version;
                return Ok(());
            }
            self.ticks
                .changed()
                .await
                .map_err(|_| HuginnError::Disposed)?;
        }
    }

    /// Wait until the entry has settled (success or error) and return it.
    ///
    /// A disabled query never fetches, so its current snapshot is returned
    /// as soon as no fetch is running, `Idle` included.
    pub async fn settled(&mut self) -> Result<QueryResult<T>> {
        loop {
            let result = self.result();
            let idle_is_final = !self.query.enabled;
            if !result.is_fetching && (result.state != QueryState::Idle || idle_is_final) {
                return Ok(result);
            }
            self.changed().await?;
        }
    }

    /// Fetch now, even if the data is fresh, and wait for the result.
    pub async fn refetch(&self) -> Result<T> {
        let pending = {
            let now = Instant::now();
            let mut state = self.inner.lock_live()?;
            let entry = state.entry_or_create(&self.key, self.query.gc_time, now);
            if entry.incarnation != self.incarnation.load(Ordering::Acquire) {
                // The entry was removed under us; re-register on the new one.
                entry.subscribers += 1;
                entry.gc_at = None;
                entry.query = Some(self.query.clone());
                self.incarnation.store(entry.incarnation, Ordering::Release);
            }
            self.inner
                .start_fetch(&mut state, &self.key, &self.query, now)?
        };
        self.inner.notify();

        match pending.await {
            Ok(value) => downcast(&self.key, &value),
            Err(e) => Err((*e).clone()),
        }
    }

    /// Stop observing. Equivalent to dropping the observer.
    pub fn unsubscribe(self) {}
}

impl<T> Drop for QueryObserver<T> {
    fn drop(&mut self) {
        let now = Instant::now();
        let mut state = self.inner.lock();
        let incarnation = *self.incarnation.get_mut();
        if let Some(entry) = state
            .entries
            .get_mut(&self.key)
            .filter(|entry| entry.incarnation == incarnation && entry.subscribers > 0)
        {
            entry.subscribers -= 1;
            if entry.subscribers == 0 {
                entry.gc_at = Some(now + entry.gc_time);
                debug!(key = %self.key, gc_ms = entry.gc_time.as_millis() as u64, "last observer gone");
            }
        }
    }
}
