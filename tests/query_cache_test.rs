//! Query cache behaviour: de-duplication, freshness, invalidation, retry,
//! stale-response races, observers and garbage collection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use huginn::keys::{self, Entity};
use huginn::{
    CacheEvent, HuginnError, QueryCache, QueryConfig, QueryDescriptor, QueryState, Result,
};

// ============================================================================
// Helpers
// ============================================================================

/// Counts calls and returns `value` after `delay`.
fn counting(
    key: huginn::CacheKey,
    calls: &Arc<AtomicU32>,
    delay: Duration,
    value: &'static str,
) -> QueryDescriptor<String> {
    let calls = Arc::clone(calls);
    QueryDescriptor::new(key, move || {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            Ok(value.to_string())
        }
    })
}

/// Fails every call with `error`.
fn failing(
    key: huginn::CacheKey,
    calls: &Arc<AtomicU32>,
    error: fn() -> HuginnError,
) -> QueryDescriptor<String> {
    let calls = Arc::clone(calls);
    QueryDescriptor::new(key, move || {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>(error())
        }
    })
}

fn server_error() -> HuginnError {
    HuginnError::Api {
        status: 500,
        code: None,
        message: "internal".into(),
    }
}

// ============================================================================
// De-duplication and freshness
// ============================================================================

#[tokio::test(start_paused = true)]
async fn concurrent_reads_share_one_fetch() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicU32::new(0));
    let query = counting(
        keys::detail(Entity::Events, "e1"),
        &calls,
        Duration::from_millis(50),
        "event",
    );

    let (a, b, c) = tokio::join!(
        cache.fetch_query(&query),
        cache.fetch_query(&query),
        cache.fetch_query(&query)
    );
    assert_eq!(a.unwrap(), "event");
    assert_eq!(b.unwrap(), "event");
    assert_eq!(c.unwrap(), "event");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn in_flight_fetch_survives_zero_gc_time() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicU32::new(0));
    let query = counting(
        keys::detail(Entity::Events, "e1"),
        &calls,
        Duration::from_millis(50),
        "event",
    )
    .gc_time(Duration::ZERO);

    let sweeps = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.gc_sweep()
    };
    let (a, b, c, swept) = tokio::join!(
        cache.fetch_query(&query),
        cache.fetch_query(&query),
        cache.fetch_query(&query),
        sweeps
    );
    assert_eq!(a.unwrap(), "event");
    assert_eq!(b.unwrap(), "event");
    assert_eq!(c.unwrap(), "event");
    assert_eq!(swept, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Once committed and unobserved, the entry is collectable again.
    assert_eq!(cache.gc_sweep(), 1);
}

#[tokio::test(start_paused = true)]
async fn fresh_reads_never_hit_the_backend() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicU32::new(0));
    let query = counting(keys::list(Entity::Speakers), &calls, Duration::ZERO, "list")
        .stale_time(Duration::from_secs(60));

    cache.fetch_query(&query).await.unwrap();
    tokio::time::advance(Duration::from_secs(59)).await;
    cache.fetch_query(&query).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.is_stale(query.key()), Some(false));

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(cache.is_stale(query.key()), Some(true));
    cache.fetch_query(&query).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Invalidation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn invalidation_stales_only_the_prefix() {
    let cache = QueryCache::default();
    let event_detail = keys::detail(Entity::Events, "e1");
    let event_list = keys::list(Entity::Events);
    let speaker_detail = keys::detail(Entity::Speakers, "s1");
    cache.set_query_data(&event_detail, 1u32).unwrap();
    cache.set_query_data(&event_list, 2u32).unwrap();
    cache.set_query_data(&speaker_detail, 3u32).unwrap();

    let count = cache.invalidate(&keys::all(Entity::Events)).unwrap();
    assert_eq!(count, 2);
    assert_eq!(cache.is_stale(&event_detail), Some(true));
    assert_eq!(cache.is_stale(&event_list), Some(true));
    assert_eq!(cache.is_stale(&speaker_detail), Some(false));

    // Stale data is still readable until replaced.
    assert_eq!(cache.get_query_data::<u32>(&event_detail).unwrap(), Some(1));
}

#[tokio::test(start_paused = true)]
async fn invalidation_refetches_observed_entries() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicU32::new(0));
    let query = counting(keys::events::featured(), &calls, Duration::ZERO, "featured");

    let mut observer = cache.subscribe(query).unwrap();
    observer.settled().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    cache.invalidate(&keys::all(Entity::Events)).unwrap();
    observer.changed().await.unwrap();
    let result = observer.settled().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(result.data.as_deref(), Some("featured"));
    assert!(!result.is_stale);
}

#[tokio::test(start_paused = true)]
async fn removed_entry_never_receives_a_late_response() {
    let cache = QueryCache::default();
    let key = keys::detail(Entity::Events, "gone");
    let gate = Arc::new(Notify::new());
    let calls = Arc::new(AtomicU32::new(0));

    let query = {
        let (gate, calls) = (Arc::clone(&gate), Arc::clone(&calls));
        QueryDescriptor::new(key.clone(), move || {
            let (gate, calls) = (Arc::clone(&gate), Arc::clone(&calls));
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    gate.notified().await;
                    Ok("deleted".to_string())
                } else {
                    Err(HuginnError::not_found("events", "gone"))
                }
            }
        })
    };

    let reader = {
        let (cache, query) = (cache.clone(), query.clone());
        tokio::spawn(async move { cache.fetch_query(&query).await })
    };
    while calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    // The delete lands while the first fetch is still in flight.
    cache.remove_queries(&key).unwrap();
    gate.notify_one();

    let result: Result<String> = reader.await.unwrap();
    assert!(matches!(result, Err(HuginnError::NotFound { .. })));
    assert_ne!(
        cache.get_query_data::<String>(&key).unwrap().as_deref(),
        Some("deleted")
    );
}

#[tokio::test(start_paused = true)]
async fn patch_supersedes_in_flight_fetch() {
    let cache = QueryCache::default();
    let key = keys::favorites::check("u1", "ev1");
    let gate = Arc::new(Notify::new());
    let started = Arc::new(AtomicU32::new(0));

    let query = {
        let (gate, started) = (Arc::clone(&gate), Arc::clone(&started));
        QueryDescriptor::new(key.clone(), move || {
            let (gate, started) = (Arc::clone(&gate), Arc::clone(&started));
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                Ok(false)
            }
        })
    };

    let observer = cache.subscribe(query).unwrap();
    while started.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }
    cache.set_query_data(&key, true).unwrap();
    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(observer.data(), Some(true));
}

// ============================================================================
// Retry (Scenario D)
// ============================================================================

#[tokio::test(start_paused = true)]
async fn not_found_is_not_retried() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicU32::new(0));
    let query = failing(keys::detail(Entity::Events, "missing"), &calls, || {
        HuginnError::not_found("events", "missing")
    });

    let err = cache.fetch_query(&query).await.unwrap_err();
    assert!(matches!(err, HuginnError::NotFound { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.entry_state(query.key()), Some(QueryState::Error));
}

#[tokio::test(start_paused = true)]
async fn server_errors_retry_with_doubling_backoff() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicU32::new(0));
    let query = failing(keys::list(Entity::Events), &calls, server_error);

    let start = Instant::now();
    let err = cache.fetch_query(&query).await.unwrap_err();
    assert!(matches!(err, HuginnError::Api { status: 500, .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    // 1s + 2s + 4s
    assert_eq!(start.elapsed(), Duration::from_millis(7000));
}

#[tokio::test(start_paused = true)]
async fn failed_refetch_keeps_last_good_data() {
    let cache = QueryCache::new(QueryConfig::new().retry(huginn::RetryPolicy::disabled()));
    let key = keys::all(Entity::AboutPage);
    cache.set_query_data(&key, "about".to_string()).unwrap();
    cache.invalidate(&key).unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let mut observer = cache.subscribe(failing(key.clone(), &calls, server_error)).unwrap();
    let result = observer.settled().await.unwrap();

    assert_eq!(result.state, QueryState::Error);
    assert!(result.error.is_some());
    assert_eq!(result.data.as_deref(), Some("about"));
}

// ============================================================================
// Garbage collection (Scenario E) and lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn unobserved_entry_is_gone_after_gc_time() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicU32::new(0));
    let query = counting(keys::detail(Entity::Speakers, "s1"), &calls, Duration::ZERO, "s1")
        .stale_time(Duration::from_secs(3600))
        .gc_time(Duration::from_secs(60));

    let mut observer = cache.subscribe(query.clone()).unwrap();
    observer.settled().await.unwrap();
    assert_eq!(cache.subscriber_count(query.key()), 1);

    // Observed entries survive any amount of time.
    tokio::time::advance(Duration::from_secs(600)).await;
    assert_eq!(cache.gc_sweep(), 0);

    drop(observer);
    assert_eq!(cache.subscriber_count(query.key()), 0);
    tokio::time::advance(Duration::from_secs(61)).await;

    // Lookup evicts, so the next read goes to the backend despite stale_time.
    assert_eq!(cache.get_query_data::<String>(query.key()).unwrap(), None);
    cache.fetch_query(&query).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn periodic_sweep_evicts_expired_entries() {
    let cache = QueryCache::new(
        QueryConfig::new()
            .gc_time(Duration::from_secs(10))
            .gc_interval(Duration::from_secs(5)),
    );
    cache.init().unwrap();
    cache.set_query_data(&keys::list(Entity::Events), 1u8).unwrap();
    assert_eq!(cache.len(), 1);

    tokio::time::sleep(Duration::from_secs(16)).await;
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn dispose_rejects_later_operations() {
    let cache = QueryCache::default();
    cache.init().unwrap();
    let key = keys::list(Entity::Events);
    cache.set_query_data(&key, 1u8).unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let mut observer = cache
        .subscribe(counting(key.clone(), &calls, Duration::ZERO, "x"))
        .unwrap();

    cache.dispose();
    assert!(cache.is_disposed());
    assert!(cache.is_empty());
    assert!(matches!(
        cache.set_query_data(&key, 2u8),
        Err(HuginnError::Disposed)
    ));
    assert!(matches!(cache.invalidate(&key), Err(HuginnError::Disposed)));
    assert!(matches!(observer.changed().await, Err(HuginnError::Disposed)));
}

#[tokio::test(start_paused = true)]
async fn wrong_type_is_reported() {
    let cache = QueryCache::default();
    let key = keys::detail(Entity::Profiles, "p1");
    cache.set_query_data(&key, 42u64).unwrap();
    assert!(matches!(
        cache.get_query_data::<String>(&key),
        Err(HuginnError::TypeMismatch { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn events_are_broadcast() {
    let cache = QueryCache::default();
    let mut events = cache.events();
    let calls = Arc::new(AtomicU32::new(0));
    let key = keys::detail(Entity::Events, "e9");

    cache
        .fetch_query(&counting(key.clone(), &calls, Duration::ZERO, "ok"))
        .await
        .unwrap();
    cache.invalidate(&keys::all(Entity::Events)).unwrap();

    match events.recv().await.unwrap() {
        CacheEvent::QuerySuccess { key: got } => assert_eq!(got, key),
        other => panic!("unexpected event: {other:?}"),
    }
    match events.recv().await.unwrap() {
        CacheEvent::Invalidated { count, .. } => assert_eq!(count, 1),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn disabled_query_does_not_fetch() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicU32::new(0));
    let query =
        counting(keys::search(Entity::Events, ""), &calls, Duration::ZERO, "x").enabled(false);

    let observer = cache.subscribe(query).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(observer.result().state, QueryState::Idle);
}
