//! Tests for metrics integration.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter. Each test drives a
//! current-thread runtime inside the local recorder scope so counters
//! emitted from spawned fetch tasks are captured too.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

use huginn::keys::{self, Entity};
use huginn::telemetry;
use huginn::{HuginnError, MutationDescriptor, QueryCache, QueryDescriptor, RetryPolicy};

// ============================================================================
// Snapshot type alias for readability
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

// ============================================================================
// Helpers
// ============================================================================

/// Sum all counter values matching a given metric name.
fn counter_total(snapshot: &SnapshotVec, name: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Sum counters for `name` carrying the label `label=value`.
fn counter_with_label(snapshot: &SnapshotVec, name: &str, label: &str, value: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| {
            key.kind() == MetricKind::Counter
                && key.key().name() == name
                && key
                    .key()
                    .labels()
                    .any(|l| l.key() == label && l.value() == value)
        })
        .map(|(_, _, _, v)| match v {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Run `body` on a fresh current-thread runtime with a local recorder installed.
fn recorded<F, Fut>(body: F) -> (Snapshotter, Fut::Output)
where
    F: FnOnce() -> Fut,
    Fut: Future,
{
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let output = metrics::with_local_recorder(&recorder, || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(body())
    });
    (snapshotter, output)
}

fn constant(key: huginn::CacheKey, calls: &Arc<AtomicU32>) -> QueryDescriptor<u32> {
    let calls = Arc::clone(calls);
    QueryDescriptor::new(key, move || {
        let calls = Arc::clone(&calls);
        async move { Ok(calls.fetch_add(1, Ordering::SeqCst)) }
    })
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn reads_record_hits_misses_and_fetches() {
    let (snapshotter, ()) = recorded(|| async {
        let calls = Arc::new(AtomicU32::new(0));
        let cache = QueryCache::default();
        let query = constant(keys::detail(Entity::Events, "e1"), &calls);
        cache.fetch_query(&query).await.unwrap();
        cache.fetch_query(&query).await.unwrap();
        cache.fetch_query(&query).await.unwrap();
    });
    let snapshot = snapshotter.snapshot().into_vec();

    assert_eq!(counter_total(&snapshot, telemetry::CACHE_MISSES_TOTAL), 1);
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_HITS_TOTAL), 2);
    assert_eq!(
        counter_with_label(&snapshot, telemetry::FETCHES_TOTAL, "status", "ok"),
        1
    );
    assert_eq!(
        counter_with_label(&snapshot, telemetry::CACHE_HITS_TOTAL, "entity", "events"),
        2
    );
}

#[test]
fn invalidation_counts_matching_entries() {
    let (snapshotter, count) = recorded(|| async {
        let cache = QueryCache::default();
        cache.set_query_data(&keys::list(Entity::Speakers), 1u8).unwrap();
        cache
            .set_query_data(&keys::detail(Entity::Speakers, "s1"), 2u8)
            .unwrap();
        cache.set_query_data(&keys::list(Entity::Events), 3u8).unwrap();
        cache.invalidate(&keys::all(Entity::Speakers)).unwrap()
    });
    assert_eq!(count, 2);

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter_with_label(&snapshot, telemetry::INVALIDATIONS_TOTAL, "entity", "speakers"),
        2
    );
}

#[test]
fn superseded_response_is_counted_as_discarded() {
    let (snapshotter, ()) = recorded(|| async {
        let cache = QueryCache::default();
        let key = keys::favorites::check("u1", "ev1");
        let query = QueryDescriptor::new(key.clone(), || async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(false)
        });
        let observer = cache.subscribe(query).unwrap();
        cache.set_query_data(&key, true).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(observer.data(), Some(true));
    });
    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter_total(&snapshot, telemetry::DISCARDED_RESPONSES_TOTAL),
        1
    );
}

#[test]
fn mutation_retries_and_outcome_are_recorded() {
    let attempts = Arc::new(AtomicU32::new(0));
    let (snapshotter, result) = recorded(|| {
        let attempts = Arc::clone(&attempts);
        async move {
            let cache = QueryCache::default();
            let descriptor = MutationDescriptor::new("flaky_write", move |n: u32| {
                let attempts = Arc::clone(&attempts);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(HuginnError::Http("connection reset".into()))
                    } else {
                        Ok(n * 2)
                    }
                }
            })
            .retry(RetryPolicy::mutation().initial_delay(Duration::from_millis(1)));
            cache.mutate(&descriptor, 21).await
        }
    });
    assert_eq!(result.unwrap(), 42);

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::RETRIES_TOTAL), 1);
    assert_eq!(
        counter_with_label(&snapshot, telemetry::MUTATIONS_TOTAL, "status", "ok"),
        1
    );
    assert_eq!(
        counter_with_label(&snapshot, telemetry::MUTATIONS_TOTAL, "mutation", "flaky_write"),
        1
    );
}

#[test]
fn gc_sweep_records_evictions() {
    let (snapshotter, evicted) = recorded(|| async {
        let cache = QueryCache::new(huginn::QueryConfig::new().gc_time(Duration::from_millis(5)));
        cache.set_query_data(&keys::list(Entity::Events), 1u8).unwrap();
        cache.set_query_data(&keys::list(Entity::Speakers), 1u8).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.gc_sweep()
    });
    assert_eq!(evicted, 2);

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::GC_EVICTIONS_TOTAL), 2);
}
