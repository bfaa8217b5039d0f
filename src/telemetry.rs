//! Telemetry metric name constants.
//!
//! Centralised metric names for huginn operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `huginn_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `entity`: first segment of the cache key (e.g. "events", "favorites")
//! - `mutation`: mutation name (e.g. "create_event")
//! - `status`: outcome: "ok" or "error"

/// Reads served from a fresh cache entry without touching the backend.
///
/// Labels: `entity`.
pub const CACHE_HITS_TOTAL: &str = "huginn_cache_hits_total";

/// Reads that found no entry, or a stale one.
///
/// Labels: `entity`.
pub const CACHE_MISSES_TOTAL: &str = "huginn_cache_misses_total";

/// Fetches started (after de-duplication).
///
/// Labels: `entity`, `status` ("ok" | "error").
pub const FETCHES_TOTAL: &str = "huginn_fetches_total";

/// Retry attempts (not counting the initial request).
///
/// Labels: `operation`.
pub const RETRIES_TOTAL: &str = "huginn_retries_total";

/// Entries marked stale by invalidation.
///
/// Labels: `entity`.
pub const INVALIDATIONS_TOTAL: &str = "huginn_invalidations_total";

/// Responses discarded because the entry moved on while the fetch was in flight.
///
/// Labels: `entity`.
pub const DISCARDED_RESPONSES_TOTAL: &str = "huginn_discarded_responses_total";

/// Entries evicted by garbage collection.
pub const GC_EVICTIONS_TOTAL: &str = "huginn_gc_evictions_total";

/// Mutations executed.
///
/// Labels: `mutation`, `status` ("ok" | "error").
pub const MUTATIONS_TOTAL: &str = "huginn_mutations_total";
