//! Cache entries.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, Shared};
use tokio::time::Instant;

use super::descriptor::{AnyValue, ErasedQuery};
use crate::HuginnError;

/// Settled result of one fetch as seen by every waiter.
pub(crate) type Outcome = std::result::Result<AnyValue, Arc<HuginnError>>;
pub(crate) type SharedFetch = Shared<BoxFuture<'static, Outcome>>;

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum QueryState {
    #[default]
    Idle,
    Fetching,
    Success,
    Error,
}

pub(crate) struct CacheEntry {
    pub data: Option<AnyValue>,
    pub error: Option<Arc<HuginnError>>,
    pub fetched_at: Option<Instant>,
    /// `None` until the first successful fetch; the entry is stale until then.
    pub stale_at: Option<Instant>,
    pub state: QueryState,
    pub subscribers: usize,
    /// Collection deadline while unobserved. Reset by the last unsubscribe
    /// and by every commit or patch that lands with no observers.
    pub gc_at: Option<Instant>,
    pub gc_time: Duration,
    /// Bumped by fetch start, invalidation and patches; a fetch commits only
    /// if this still equals the value it captured when it started.
    pub generation: u64,
    /// Identity of this entry; a removed and re-created key gets a new one.
    pub incarnation: u64,
    /// Bumped on every observable change.
    pub version: u64,
    pub in_flight: Option<SharedFetch>,
    /// Last subscribed query, used to refetch after invalidation.
    pub query: Option<ErasedQuery>,
}

impl CacheEntry {
    pub fn new(id: u64, gc_time: Duration, now: Instant) -> Self {
        Self {
            data: None,
            error: None,
            fetched_at: None,
            stale_at: None,
            state: QueryState::Idle,
            subscribers: 0,
            gc_at: Some(now + gc_time),
            gc_time,
            generation: id,
            incarnation: id,
            version: id,
            in_flight: None,
            query: None,
        }
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        self.stale_at.is_none_or(|at| now >= at)
    }

    /// Observed entries and entries with a fetch in flight are never collected.
    pub fn is_collectable(&self, now: Instant) -> bool {
        self.subscribers == 0
            && self.in_flight.is_none()
            && self.gc_at.is_some_and(|at| now >= at)
    }

    /// Restart the GC countdown if nothing observes the entry.
    pub fn touch(&mut self, now: Instant) {
        if self.subscribers == 0 {
            self.gc_at = Some(now + self.gc_time);
        }
    }

    /// Drop the in-flight fetch and settle the state it left behind.
    pub fn supersede(&mut self, generation: u64) {
        self.generation = generation;
        self.version = generation;
        self.in_flight = None;
        if self.state == QueryState::Fetching {
            self.state = match (&self.data, &self.error) {
                (Some(_), _) => QueryState::Success,
                (None, Some(_)) => QueryState::Error,
                (None, None) => QueryState::Idle,
            };
        }
    }
}
