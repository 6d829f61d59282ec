//! Integration Tests for the Cache Service
//!
//! Concurrency, expiry and refresh-behind scenarios against the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use memo_cache::{CacheError, CacheOptions, CacheService};

const TTL: Duration = Duration::from_secs(60);

// == Helper Functions ==

/// Factory returning how many times any factory built from `calls` has run.
fn counting_factory(
    calls: &Arc<AtomicUsize>,
    delay: Duration,
) -> impl FnOnce() -> BoxFuture<'static, anyhow::Result<usize>> + Send + 'static {
    let calls = calls.clone();
    move || {
        async move {
            tokio::time::sleep(delay).await;
            Ok(calls.fetch_add(1, Ordering::SeqCst) + 1)
        }
        .boxed()
    }
}

// == Single Flight ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_run_factory_once() {
    let cache = CacheService::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let cache = cache.clone();
            let factory = counting_factory(&calls, Duration::from_millis(100));
            tokio::spawn(async move {
                cache
                    .cache::<usize, _, _>("users::1", TTL, factory)
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 1);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let stats = cache.category_stats("users");
    assert_eq!(stats.hits + stats.misses, 32);
    assert_eq!(stats.sets, 1);
    assert_eq!(cache.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failure_reaches_every_caller() {
    let cache = CacheService::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                cache
                    .cache::<u32, _, _>("k", TTL, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Err(anyhow::anyhow!("database unavailable"))
                    })
                    .await
            })
        })
        .collect();

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, CacheError::FactoryFailure { .. }));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!cache.contains_key("k"));
}

#[tokio::test]
async fn test_sequential_misses_after_failure_retry() {
    let cache = CacheService::new();
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let calls = calls.clone();
        let result = cache
            .cache::<u32, _, _>("k", TTL, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("nope"))
            })
            .await;
        assert!(result.is_err());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// == Expiry ==

#[tokio::test]
async fn test_expiry_boundary() {
    let cache = CacheService::new();
    cache
        .set_raw("k", &"v", Duration::from_millis(200))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(cache.get::<String>("k").unwrap().as_deref(), Some("v"));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(cache.get::<String>("k").unwrap(), None);
}

#[tokio::test]
async fn test_expired_entry_is_recomputed() {
    let cache = CacheService::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let first = cache
        .cache(
            "k",
            Duration::from_millis(100),
            counting_factory(&calls, Duration::ZERO),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    let second = cache
        .cache(
            "k",
            Duration::from_millis(100),
            counting_factory(&calls, Duration::ZERO),
        )
        .await
        .unwrap();

    assert_eq!((first, second), (1, 2));
}

// == Null / Empty Policy ==

#[tokio::test]
async fn test_null_results_not_cached_by_default() {
    let cache = CacheService::new();
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let calls = calls.clone();
        let value: Option<String> = cache
            .cache("k", TTL, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            })
            .await
            .unwrap();
        assert!(value.is_none());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_null_results_cached_when_enabled() {
    let cache = CacheService::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let options = CacheOptions::new().cache_null_values(true);

    for _ in 0..2 {
        let calls = calls.clone();
        let value: Option<String> = cache
            .cache_with_options("k", TTL, &options, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            })
            .await
            .unwrap();
        assert!(value.is_none());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_collections_skipped_when_disabled() {
    let cache = CacheService::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let options = CacheOptions::new().cache_empty_collections(false);

    for _ in 0..2 {
        let calls = calls.clone();
        let value: Vec<u32> = cache
            .cache_with_options("k", TTL, &options, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            })
            .await
            .unwrap();
        assert!(value.is_empty());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// == Invalidation ==

#[tokio::test]
async fn test_tag_invalidation_scenario() {
    let cache = CacheService::new();
    let ttl = Duration::from_millis(500);
    cache.set_tagged("PAT::A::x", &"x", ttl, ["tA", "tB"]).unwrap();
    cache.set_tagged("PAT::B::y", &"y", ttl, ["tB"]).unwrap();

    assert_eq!(cache.invalidate_by_tags(&["tA"]), 1);

    assert_eq!(cache.get::<String>("PAT::A::x").unwrap(), None);
    assert_eq!(cache.get::<String>("PAT::B::y").unwrap().as_deref(), Some("y"));
}

#[tokio::test]
async fn test_cached_tags_come_from_options() {
    let cache = CacheService::new();
    let options = CacheOptions::new().with_tags(["reports"]);

    let _: u32 = cache
        .cache_with_options("reports::daily", TTL, &options, || async { Ok(7) })
        .await
        .unwrap();

    assert_eq!(cache.invalidate_by_tags(&["reports"]), 1);
    assert!(!cache.contains_key("reports::daily"));
    assert_eq!(cache.category_stats("reports").removals, 1);
}

#[tokio::test]
async fn test_pattern_invalidation_scenario() {
    let cache = CacheService::new();
    for key in ["PAT::A::1", "PAT::A::2", "PAT::B::1", "other::PAT::A::"] {
        cache.set_raw(key, &1, TTL).unwrap();
    }

    assert_eq!(cache.invalidate_by_pattern("^PAT::A::").unwrap(), 2);

    let mut remaining = cache.keys(None);
    remaining.sort();
    assert_eq!(remaining, vec!["PAT::B::1", "other::PAT::A::"]);

    assert!(matches!(
        cache.invalidate_by_pattern("[unclosed"),
        Err(CacheError::InvalidPattern { .. })
    ));
    assert_eq!(cache.keys(None).len(), 2);
}

// == Refresh Behind ==

#[tokio::test]
async fn test_refresh_behind_serves_stale_and_renews() {
    let cache = CacheService::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let ttl = Duration::from_millis(600);
    let threshold = Duration::from_millis(400);

    let first = cache
        .refresh_behind("r::k", ttl, threshold, counting_factory(&calls, Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(first, 1);

    // Still fresh: no factory call
    let fresh = cache
        .refresh_behind("r::k", ttl, threshold, counting_factory(&calls, Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(fresh, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Inside the refresh window: stale value now, refresh in background
    tokio::time::sleep(Duration::from_millis(300)).await;
    let stale = tokio::time::timeout(
        Duration::from_millis(50),
        cache.refresh_behind(
            "r::k",
            ttl,
            threshold,
            counting_factory(&calls, Duration::from_millis(100)),
        ),
    )
    .await
    .expect("stale read must not wait for the factory")
    .unwrap();
    assert_eq!(stale, 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let renewed = cache
        .refresh_behind("r::k", ttl, threshold, counting_factory(&calls, Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(renewed, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_refresh_behind_is_monotonic() {
    let cache = CacheService::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let ttl = Duration::from_millis(300);
    // Every hit is inside the refresh window
    let threshold = ttl;

    let mut last = 0;
    for _ in 0..20 {
        let value = cache
            .refresh_behind("r::m", ttl, threshold, counting_factory(&calls, Duration::from_millis(5)))
            .await
            .unwrap();
        assert!(value >= last, "value went backwards: {value} after {last}");
        last = value;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(last > 1, "background refreshes should have landed");
}

#[tokio::test]
async fn test_refresh_does_not_overwrite_newer_write() {
    let cache = CacheService::new();
    let ttl = Duration::from_secs(10);

    let _: u32 = cache
        .refresh_behind("r::w", ttl, ttl, || async { Ok(1) })
        .await
        .unwrap();

    // Stale hit starts a slow refresh
    let _: u32 = cache
        .refresh_behind("r::w", ttl, ttl, || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(2)
        })
        .await
        .unwrap();

    // A newer write lands while the refresh is running
    cache.set_raw("r::w", &3u32, ttl).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(cache.get::<u32>("r::w").unwrap(), Some(3));
}

#[tokio::test]
async fn test_refresh_does_not_resurrect_invalidated_key() {
    let cache = CacheService::new();
    let ttl = Duration::from_secs(10);
    let options = CacheOptions::new().with_tags(["t"]);

    let _: u32 = cache
        .refresh_behind_with_options("r::i", ttl, ttl, &options, || async { Ok(1) })
        .await
        .unwrap();
    let _: u32 = cache
        .refresh_behind_with_options("r::i", ttl, ttl, &options, || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(2)
        })
        .await
        .unwrap();

    assert_eq!(cache.invalidate_by_tags(&["t"]), 1);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(!cache.contains_key("r::i"));
}

#[tokio::test]
async fn test_refresh_behind_expired_blocks_for_new_value() {
    let cache = CacheService::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let ttl = Duration::from_millis(100);

    cache
        .refresh_behind("r::e", ttl, Duration::ZERO, counting_factory(&calls, Duration::ZERO))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let value = cache
        .refresh_behind("r::e", ttl, Duration::ZERO, counting_factory(&calls, Duration::from_millis(50)))
        .await
        .unwrap();
    assert_eq!(value, 2);
}

#[tokio::test]
async fn test_miss_joining_refresh_is_stored() {
    let cache = CacheService::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let ttl = Duration::from_millis(150);

    cache
        .refresh_behind("p::r", ttl, ttl, counting_factory(&calls, Duration::ZERO))
        .await
        .unwrap();

    // Stale hit starts a refresh that outlives the entry
    let stale = cache
        .refresh_behind("p::r", ttl, ttl, counting_factory(&calls, Duration::from_millis(400)))
        .await
        .unwrap();
    assert_eq!(stale, 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let own_calls = Arc::new(AtomicUsize::new(0));
    let joined = cache
        .cache("p::r", Duration::from_secs(60), counting_factory(&own_calls, Duration::ZERO))
        .await
        .unwrap();

    assert_eq!(joined, 2);
    assert_eq!(own_calls.load(Ordering::SeqCst), 0);
    assert_eq!(cache.get::<usize>("p::r").unwrap(), Some(2));
    assert_eq!(cache.category_stats("p").sets, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stale_reads_refresh_once() {
    let cache = CacheService::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let ttl = Duration::from_secs(10);

    cache
        .refresh_behind("r::c", ttl, ttl, counting_factory(&calls, Duration::ZERO))
        .await
        .unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let cache = cache.clone();
            let factory = counting_factory(&calls, Duration::from_millis(100));
            tokio::spawn(async move { cache.refresh_behind("r::c", ttl, ttl, factory).await })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 1);
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.get::<usize>("r::c").unwrap(), Some(2));
}

#[tokio::test]
async fn test_abandoned_miss_stores_nothing() {
    let cache = CacheService::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        cache.cache::<usize, _, _>("k", TTL, counting_factory(&calls, Duration::from_millis(100))),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(cache.in_flight(), 0);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!cache.contains_key("k"));
}

// == Statistics ==

#[tokio::test]
async fn test_each_read_counts_once() {
    let cache = CacheService::new();
    cache.set_raw("cat::a", &1, TTL).unwrap();

    let before = cache.all_stats()["cat"];
    let _ = cache.get::<u32>("cat::a");
    let _ = cache.get::<u32>("cat::b");
    let _ = cache.get_with_metadata::<u32>("cat::a");
    let _: u32 = cache
        .cache("cat::c", TTL, || async { Ok(1) })
        .await
        .unwrap();
    let _: u32 = cache
        .refresh_behind("cat::c", TTL, Duration::ZERO, || async { Ok(1) })
        .await
        .unwrap();
    let after = cache.all_stats()["cat"];

    assert_eq!((after.hits + after.misses) - (before.hits + before.misses), 5);
    assert_eq!(after.hits - before.hits, 3);
}
