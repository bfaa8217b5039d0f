//! Structured cache events.
//!
//! The cache never calls back into presentation code; it broadcasts a
//! [`CacheEvent`] for every settled query and mutation instead. Receivers that
//! fall behind see `RecvError::Lagged` and skip ahead.

use std::sync::Arc;

use crate::HuginnError;
use crate::keys::CacheKey;

#[derive(Debug, Clone)]
pub enum CacheEvent {
    QuerySuccess {
        key: CacheKey,
    },
    /// A fetch failed for good (terminal error or retries exhausted).
    QueryError {
        key: CacheKey,
        error: Arc<HuginnError>,
    },
    MutationSuccess {
        name: String,
    },
    MutationError {
        name: String,
        error: Arc<HuginnError>,
    },
    Invalidated {
        prefix: CacheKey,
        count: usize,
    },
    Removed {
        prefix: CacheKey,
        count: usize,
    },
}

impl CacheEvent {
    /// Whether the event reports a failure.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            CacheEvent::QueryError { .. } | CacheEvent::MutationError { .. }
        )
    }
}
