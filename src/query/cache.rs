//! The query cache.
//!
//! A [`QueryCache`] owns every cached result, keyed by [`CacheKey`]. Reads are
//! served from fresh entries; stale or missing entries are fetched through the
//! query's descriptor, with at most one fetch in flight per key. Fetches run
//! as spawned tasks, so an observer going away never aborts the request.
//!
//! State lives behind a plain mutex that is never held across an `.await`:
//! every operation is an atomic state transition, and tasks only suspend
//! inside the fetch itself.
//!
//! # Race guard
//!
//! Each entry carries a generation drawn from a cache-wide counter. Starting
//! a fetch, invalidating, patching and re-creating an entry all take a new
//! generation. A finished fetch commits only if its entry still exists with
//! the generation captured at start; otherwise the response is discarded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use super::config::QueryConfig;
use super::descriptor::{AnyValue, ErasedQuery, QueryDescriptor};
use super::entry::{CacheEntry, Outcome, QueryState, SharedFetch};
use super::events::CacheEvent;
use super::observer::QueryObserver;
use super::retry::with_retry;
use crate::keys::CacheKey;
use crate::telemetry;
use crate::{HuginnError, Result};

/// How many superseded fetches `fetch_query` follows before giving up.
const MAX_SUPERSEDED: usize = 4;

pub(crate) struct State {
    pub entries: HashMap<CacheKey, CacheEntry>,
    clock: u64,
    pub disposed: bool,
}

impl State {
    pub fn next(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Look up a live entry, evicting it first if it is due for collection.
    pub fn lookup(&mut self, key: &CacheKey, now: Instant) -> Option<&mut CacheEntry> {
        if self
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_collectable(now))
        {
            self.entries.remove(key);
            metrics::counter!(telemetry::GC_EVICTIONS_TOTAL).increment(1);
            debug!(key = %key, "evicted expired entry on lookup");
        }
        self.entries.get_mut(key)
    }

    pub fn entry_or_create(
        &mut self,
        key: &CacheKey,
        gc_time: Duration,
        now: Instant,
    ) -> &mut CacheEntry {
        let live = self.lookup(key, now).is_some();
        let id = if live { self.clock } else { self.next() };
        self.entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(id, gc_time, now))
    }
}

pub(crate) struct Inner {
    pub config: QueryConfig,
    state: Mutex<State>,
    events: broadcast::Sender<CacheEvent>,
    tick: watch::Sender<u64>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    pub fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn sweeper(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.sweeper.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Lock, failing once the cache has been disposed.
    pub fn lock_live(&self) -> Result<MutexGuard<'_, State>> {
        let state = self.lock();
        if state.disposed {
            return Err(HuginnError::Disposed);
        }
        Ok(state)
    }

    pub fn subscribe_ticks(&self) -> watch::Receiver<u64> {
        self.tick.subscribe()
    }

    /// Wake observers after a state change.
    pub fn notify(&self) {
        self.tick.send_modify(|tick| *tick = tick.wrapping_add(1));
    }

    fn emit(&self, event: CacheEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// Join the in-flight fetch for `key`, or start one.
    pub fn start_fetch(
        self: &Arc<Self>,
        state: &mut State,
        key: &CacheKey,
        query: &ErasedQuery,
        now: Instant,
    ) -> Result<SharedFetch> {
        if let Some(pending) = state
            .lookup(key, now)
            .and_then(|entry| entry.in_flight.clone())
        {
            return Ok(pending);
        }

        let handle = Handle::try_current().map_err(|_| {
            HuginnError::Configuration("fetching requires a tokio runtime".into())
        })?;

        let generation = state.next();
        let entry = state.entry_or_create(key, query.gc_time, now);
        entry.generation = generation;
        entry.version = generation;
        entry.state = QueryState::Fetching;

        let inner = Arc::clone(self);
        let fetch = Arc::clone(&query.fetch);
        let retry = query.retry.clone();
        let stale_time = query.stale_time;
        let task_key = key.clone();
        debug!(key = %key, generation, "fetch started");

        let task = handle.spawn(async move {
            let operation = format!("fetch:{}", task_key.entity());
            let result = with_retry(&retry, &operation, || fetch()).await;
            inner.commit(&task_key, generation, stale_time, result)
        });
        let pending = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(_) => Err(Arc::new(HuginnError::Cancelled)),
            }
        }
        .boxed()
        .shared();

        entry.in_flight = Some(pending.clone());
        Ok(pending)
    }

    fn commit(
        &self,
        key: &CacheKey,
        generation: u64,
        stale_time: Duration,
        result: Result<AnyValue>,
    ) -> Outcome {
        let now = Instant::now();
        let entity = key.entity().to_owned();
        let mut state = self.lock();
        let version = state.next();

        let Some(entry) = state
            .entries
            .get_mut(key)
            .filter(|entry| entry.generation == generation)
        else {
            metrics::counter!(telemetry::DISCARDED_RESPONSES_TOTAL, "entity" => entity)
                .increment(1);
            warn!(key = %key, generation, "discarding response from superseded fetch");
            return Err(Arc::new(HuginnError::Cancelled));
        };

        entry.in_flight = None;
        entry.version = version;
        entry.touch(now);
        let (outcome, event) = match result {
            Ok(value) => {
                entry.data = Some(Arc::clone(&value));
                entry.error = None;
                entry.fetched_at = Some(now);
                entry.stale_at = Some(now + stale_time);
                entry.state = QueryState::Success;
                metrics::counter!(telemetry::FETCHES_TOTAL, "entity" => entity, "status" => "ok")
                    .increment(1);
                debug!(key = %key, generation, "fetch committed");
                (Ok(value), CacheEvent::QuerySuccess { key: key.clone() })
            }
            Err(e) => {
                let error = Arc::new(e);
                entry.error = Some(Arc::clone(&error));
                entry.state = QueryState::Error;
                metrics::counter!(telemetry::FETCHES_TOTAL, "entity" => entity, "status" => "error")
                    .increment(1);
                debug!(key = %key, generation, error = %error, "fetch failed");
                (
                    Err(Arc::clone(&error)),
                    CacheEvent::QueryError {
                        key: key.clone(),
                        error,
                    },
                )
            }
        };
        drop(state);

        self.notify();
        self.emit(event);
        outcome
    }

    /// Remove unobserved entries whose GC time has passed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_collectable(now));
        let evicted = before - state.entries.len();
        drop(state);

        if evicted > 0 {
            metrics::counter!(telemetry::GC_EVICTIONS_TOTAL).increment(evicted as u64);
            info!(evicted, "gc sweep");
            self.notify();
        }
        evicted
    }
}

pub(crate) fn downcast<T: Clone + 'static>(key: &CacheKey, value: &AnyValue) -> Result<T> {
    (**value)
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| HuginnError::TypeMismatch {
            key: key.to_string(),
        })
}

/// Process-wide store of query results.
///
/// Cloning is cheap; clones share the same entries.
#[derive(Clone)]
pub struct QueryCache {
    pub(crate) inner: Arc<Inner>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(QueryConfig::default())
    }
}

impl QueryCache {
    pub fn new(config: QueryConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        let (tick, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    entries: HashMap::new(),
                    clock: 0,
                    disposed: false,
                }),
                events,
                tick,
                sweeper: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.inner.config
    }

    /// Start the periodic GC sweep. Calling it again is a no-op.
    pub fn init(&self) -> Result<()> {
        drop(self.inner.lock_live()?);
        let handle = Handle::try_current().map_err(|_| {
            HuginnError::Configuration("init requires a tokio runtime".into())
        })?;

        let mut sweeper = self.inner.sweeper();
        if sweeper.is_some() {
            return Ok(());
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.gc_interval.max(Duration::from_millis(1));
        *sweeper = Some(handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                inner.sweep();
            }
        }));
        debug!(interval_ms = period.as_millis() as u64, "query cache initialised");
        Ok(())
    }

    /// Stop the sweeper and drop every entry. Later operations fail with
    /// [`HuginnError::Disposed`].
    pub fn dispose(&self) {
        let task = self.inner.sweeper().take();
        if let Some(task) = task {
            task.abort();
        }
        let mut state = self.inner.lock();
        state.disposed = true;
        state.entries.clear();
        drop(state);
        self.inner.notify();
        debug!("query cache disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }

    pub(crate) fn emit(&self, event: CacheEvent) {
        self.inner.emit(event);
    }

    /// Receive every cache event from now on.
    pub fn events(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    /// [`events`](Self::events) as a `Stream`.
    pub fn event_stream(&self) -> BroadcastStream<CacheEvent> {
        BroadcastStream::new(self.events())
    }

    /// Register an observer for `descriptor.key`, fetching if the entry is
    /// missing or stale and the query is enabled.
    pub fn subscribe<T>(&self, descriptor: QueryDescriptor<T>) -> Result<QueryObserver<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let query = descriptor.erase(&self.inner.config);
        let key = descriptor.key().clone();
        let now = Instant::now();
        let mut state = self.inner.lock_live()?;

        let entry = state.entry_or_create(&key, query.gc_time, now);
        entry.subscribers += 1;
        entry.gc_at = None;
        entry.gc_time = query.gc_time;
        entry.query = Some(query.clone());
        let incarnation = entry.incarnation;
        let fresh = entry.data.is_some() && !entry.is_stale(now);
        let needs_fetch = query.enabled && !fresh && entry.in_flight.is_none();
        record_read(&key, fresh);

        if needs_fetch {
            if let Err(e) = self.inner.start_fetch(&mut state, &key, &query, now) {
                warn!(key = %key, error = %e, "could not start fetch on subscribe");
            }
        }
        let version = state.entries.get(&key).map_or(0, |entry| entry.version);
        drop(state);
        self.inner.notify();

        Ok(QueryObserver::new(
            Arc::clone(&self.inner),
            key,
            query,
            incarnation,
            version,
        ))
    }

    /// Return fresh cached data, or fetch (joining any in-flight fetch) and
    /// return the committed value.
    pub async fn fetch_query<T>(&self, descriptor: &QueryDescriptor<T>) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let query = descriptor.erase(&self.inner.config);
        let key = descriptor.key();

        for _ in 0..MAX_SUPERSEDED {
            let pending = {
                let now = Instant::now();
                let mut state = self.inner.lock_live()?;
                if let Some(data) = state
                    .lookup(key, now)
                    .filter(|entry| !entry.is_stale(now))
                    .and_then(|entry| entry.data.clone())
                {
                    record_read(key, true);
                    return downcast(key, &data);
                }
                record_read(key, false);
                self.inner.start_fetch(&mut state, key, &query, now)?
            };
            self.inner.notify();

            match pending.await {
                Ok(value) => return downcast(key, &value),
                Err(e) if matches!(*e, HuginnError::Cancelled) => continue,
                Err(e) => return Err((*e).clone()),
            }
        }
        Err(HuginnError::Cancelled)
    }

    /// Populate an entry ahead of use. Fetch failures are logged, not returned.
    pub async fn prefetch<T>(&self, descriptor: &QueryDescriptor<T>) -> Result<()>
    where
        T: Clone + Send + Sync + 'static,
    {
        match self.fetch_query(descriptor).await {
            Ok(_) => Ok(()),
            Err(HuginnError::Disposed) => Err(HuginnError::Disposed),
            Err(e) => {
                debug!(key = %descriptor.key(), error = %e, "prefetch failed");
                Ok(())
            }
        }
    }

    /// Cached data under `key`, fresh or stale.
    pub fn get_query_data<T: Clone + 'static>(&self, key: &CacheKey) -> Result<Option<T>> {
        let mut state = self.inner.lock_live()?;
        match state
            .lookup(key, Instant::now())
            .and_then(|entry| entry.data.clone())
        {
            Some(data) => downcast(key, &data).map(Some),
            None => Ok(None),
        }
    }

    /// Write `value` directly into the entry under `key`, marking it fresh.
    /// Any fetch in flight for the key is superseded.
    pub fn set_query_data<T: Send + Sync + 'static>(&self, key: &CacheKey, value: T) -> Result<()> {
        self.set_query_data_any(key, Arc::new(value))
    }

    pub(crate) fn set_query_data_any(&self, key: &CacheKey, value: AnyValue) -> Result<()> {
        let now = Instant::now();
        let mut state = self.inner.lock_live()?;
        let generation = state.next();
        let default_stale = self.inner.config.stale_time;
        let entry = state.entry_or_create(key, self.inner.config.gc_time, now);
        let stale_time = entry.query.as_ref().map_or(default_stale, |q| q.stale_time);

        entry.supersede(generation);
        entry.data = Some(value);
        entry.error = None;
        entry.fetched_at = Some(now);
        entry.stale_at = Some(now + stale_time);
        entry.state = QueryState::Success;
        entry.touch(now);
        drop(state);

        debug!(key = %key, generation, "patched");
        self.inner.notify();
        Ok(())
    }

    /// Mark `prefix` and its descendants stale. Observed entries refetch
    /// immediately. Returns how many entries matched.
    pub fn invalidate(&self, prefix: &CacheKey) -> Result<usize> {
        let now = Instant::now();
        let mut state = self.inner.lock_live()?;
        let matching: Vec<CacheKey> = state
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();

        let mut refetch = Vec::new();
        for key in &matching {
            let generation = state.next();
            let Some(entry) = state.entries.get_mut(key) else {
                continue;
            };
            entry.supersede(generation);
            if entry.stale_at.is_some() {
                entry.stale_at = Some(now);
            }
            if entry.subscribers > 0 {
                if let Some(query) = entry.query.clone().filter(|q| q.enabled) {
                    refetch.push((key.clone(), query));
                }
            }
        }
        for (key, query) in &refetch {
            if let Err(e) = self.inner.start_fetch(&mut state, key, query, now) {
                warn!(key = %key, error = %e, "could not refetch after invalidation");
            }
        }
        drop(state);

        let count = matching.len();
        if count > 0 {
            metrics::counter!(telemetry::INVALIDATIONS_TOTAL, "entity" => prefix.entity().to_owned())
                .increment(count as u64);
        }
        debug!(prefix = %prefix, count, refetching = refetch.len(), "invalidated");
        self.inner.notify();
        self.inner.emit(CacheEvent::Invalidated {
            prefix: prefix.clone(),
            count,
        });
        Ok(count)
    }

    /// Delete `prefix` and its descendants outright. In-flight fetches for
    /// removed entries are discarded when they finish.
    pub fn remove_queries(&self, prefix: &CacheKey) -> Result<usize> {
        let mut state = self.inner.lock_live()?;
        let before = state.entries.len();
        state.entries.retain(|key, _| !key.starts_with(prefix));
        let count = before - state.entries.len();
        drop(state);

        debug!(prefix = %prefix, count, "removed");
        self.inner.notify();
        self.inner.emit(CacheEvent::Removed {
            prefix: prefix.clone(),
            count,
        });
        Ok(count)
    }

    /// Evict unobserved entries past their GC time.
    pub fn gc_sweep(&self) -> usize {
        self.inner.sweep()
    }

    /// Drop every entry.
    pub fn clear(&self) -> Result<usize> {
        self.remove_queries(&CacheKey::root())
    }

    pub fn entry_state(&self, key: &CacheKey) -> Option<QueryState> {
        let mut state = self.inner.lock();
        state
            .lookup(key, Instant::now())
            .map(|entry| entry.state)
    }

    /// Whether a live entry under `key` is stale. `None` when there is no entry.
    pub fn is_stale(&self, key: &CacheKey) -> Option<bool> {
        let now = Instant::now();
        let mut state = self.inner.lock();
        state.lookup(key, now).map(|entry| entry.is_stale(now))
    }

    /// Observer count for `key`.
    pub fn subscriber_count(&self, key: &CacheKey) -> usize {
        self.inner
            .lock()
            .entries
            .get(key)
            .map_or(0, |entry| entry.subscribers)
    }

    /// Number of entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn record_read(key: &CacheKey, hit: bool) {
    let entity = key.entity().to_owned();
    if hit {
        metrics::counter!(telemetry::CACHE_HITS_TOTAL, "entity" => entity).increment(1);
    } else {
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "entity" => entity).increment(1);
    }
}
