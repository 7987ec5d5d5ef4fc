use ratecache::{
    fingerprint, BucketConfig, CacheConfig, CachedFetcher, FetchRequest, ScheduleError,
    ScheduleErrorKind, Scheduler, SchedulerBuilder, SchedulerConfig, TokenBucket, TtlCache,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{advance, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test(start_paused = true)]
async fn test_bucket_never_exceeds_capacity() {
    let mut bucket = TokenBucket::new(BucketConfig::new(5.0, 1.0));
    assert!(bucket.try_consume(3.0));

    advance(Duration::from_secs(1000)).await;
    assert_eq!(bucket.available(), 5.0);
}

#[tokio::test(start_paused = true)]
async fn test_refill_correctness() {
    let start = Instant::now();
    let mut bucket = TokenBucket::with_tokens_at(BucketConfig::new(100.0, 10.0), 0.0, start);

    let later = start + Duration::from_millis(2500);
    bucket.refill_at(later);
    assert!((bucket.tokens() - 25.0).abs() < 1e-9);
    assert_eq!(bucket.last_refill_at(), later);
}

#[tokio::test(start_paused = true)]
async fn test_priority_ordering_through_scheduler() {
    init_tracing();
    let scheduler = Scheduler::new(
        SchedulerConfig::default().with_resource("twitter", BucketConfig::new(1.0, 1.0)),
    );

    // Spend the only token so everything below has to queue.
    scheduler
        .schedule("twitter", 0, || async { Ok::<_, ()>(()) })
        .await
        .unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for (label, priority) in [("a", 1), ("b", 2), ("c", 1), ("d", 3)] {
        let scheduler = scheduler.clone();
        let order = order.clone();
        handles.push(tokio::spawn(async move {
            scheduler
                .schedule("twitter", priority, move || async move {
                    order.lock().unwrap().push(label);
                    Ok::<_, ()>(())
                })
                .await
        }));
        // Let the spawned task reach the queue before the next one.
        tokio::task::yield_now().await;
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(*order.lock().unwrap(), vec!["d", "b", "a", "c"]);
}

#[tokio::test(start_paused = true)]
async fn test_cache_ttl_expiry() {
    let cache = TtlCache::new(CacheConfig::default());
    cache.set_with_ttl("k", "v", Duration::from_millis(100));
    assert_eq!(cache.get("k"), Some("v"));

    advance(Duration::from_millis(150)).await;
    assert_eq!(cache.get("k"), None);
    assert_eq!(cache.stats().size, 0);
}

#[tokio::test(start_paused = true)]
async fn test_lru_eviction_under_pressure() {
    let cache = TtlCache::new(CacheConfig::new(2, 60_000));
    cache.set("a", 1);
    cache.set("b", 2);
    assert_eq!(cache.get("a"), Some(1));
    cache.set("c", 3);

    assert_eq!(cache.get("b"), None);
    assert_eq!(cache.get("a"), Some(1));
    assert_eq!(cache.get("c"), Some(3));
}

#[tokio::test(start_paused = true)]
async fn test_overwrite_at_capacity_replaces_in_place() {
    let cache = TtlCache::new(CacheConfig::new(2, 60_000));
    cache.set("twitter:alice", 1);
    cache.set("twitter:bob", 2);

    // Full cache, existing key: nothing is evicted.
    cache.set("twitter:alice", 10);
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.stats().evictions, 0);

    // The overwrite counts as a touch, so a new key now evicts bob.
    cache.set("twitter:carol", 3);
    assert_eq!(cache.stats().evictions, 1);
    assert_eq!(cache.get("twitter:bob"), None);
    assert_eq!(cache.get("twitter:alice"), Some(10));
    assert_eq!(cache.get("twitter:carol"), Some(3));
}

#[tokio::test(start_paused = true)]
async fn test_miss_never_creates_entries() {
    let cache: TtlCache<String> = TtlCache::new(CacheConfig::new(4, 1_000));
    for _ in 0..10 {
        assert!(cache.get("nobody").is_none());
    }
    assert_eq!(cache.stats().size, 0);

    cache.set_with_ttl("gone", "x".to_string(), Duration::from_millis(1));
    advance(Duration::from_millis(2)).await;
    for _ in 0..10 {
        assert!(cache.get("gone").is_none());
    }
    assert_eq!(cache.stats().size, 0);
}

#[tokio::test(start_paused = true)]
async fn test_failure_isolation() {
    let scheduler = Scheduler::new(
        SchedulerConfig::default().with_resource("reddit", BucketConfig::new(1.0, 2.0)),
    );
    scheduler
        .schedule("reddit", 0, || async { Ok::<_, String>(()) })
        .await
        .unwrap();

    let failing = tokio::spawn({
        let scheduler = scheduler.clone();
        async move {
            scheduler
                .schedule("reddit", 0, || async { Err::<u32, _>("rate limited upstream".to_string()) })
                .await
        }
    });
    tokio::task::yield_now().await;
    let succeeding = tokio::spawn({
        let scheduler = scheduler.clone();
        async move {
            scheduler
                .schedule("reddit", 0, || async { Ok::<u32, String>(7) })
                .await
        }
    });

    let failed = failing.await.unwrap().unwrap_err();
    assert_eq!(failed.kind(), ScheduleErrorKind::Operation);
    assert_eq!(
        failed.into_operation_error().as_deref(),
        Some("rate limited upstream")
    );
    assert_eq!(succeeding.await.unwrap().unwrap(), 7);
    assert_eq!(scheduler.stats("reddit").unwrap().invocations, 3);
}

#[tokio::test(start_paused = true)]
async fn test_resources_are_independent() {
    let scheduler = SchedulerBuilder::new()
        .resource("twitter", BucketConfig::new(1.0, 0.001))
        .resource("github", BucketConfig::new(10.0, 1.0))
        .build();

    scheduler
        .schedule("twitter", 0, || async { Ok::<_, ()>(()) })
        .await
        .unwrap();

    // Twitter is now empty for ~1000 s; GitHub must not notice.
    let start = Instant::now();
    for _ in 0..10 {
        scheduler
            .schedule("github", 0, || async { Ok::<_, ()>(()) })
            .await
            .unwrap();
    }
    assert_eq!(Instant::now(), start);
    assert_eq!(scheduler.stats("twitter").unwrap().invocations, 1);
    assert_eq!(scheduler.stats("github").unwrap().invocations, 10);
}

#[tokio::test(start_paused = true)]
async fn test_oversized_cost_is_rejected() {
    let scheduler = SchedulerBuilder::new()
        .resource("twitter", BucketConfig::new(5.0, 1.0))
        .build();

    let err = scheduler
        .schedule_with_cost("twitter", 0, 6.0, || async { Ok::<_, ()>(()) })
        .await
        .unwrap_err();
    assert!(matches!(err, ScheduleError::Admission(_)));
    assert_eq!(scheduler.queue_len("twitter"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cached_fetch_end_to_end() {
    init_tracing();
    let scheduler = SchedulerBuilder::new()
        .resource("twitter", BucketConfig::per_hour(200))
        .build();
    let cache = Arc::new(TtlCache::new(CacheConfig::new(100, 300_000)));
    let fetcher = CachedFetcher::new(cache.clone(), scheduler.clone());

    let upstream_calls = Arc::new(Mutex::new(0u32));
    for subject in ["alice", "Alice", " ALICE "] {
        let calls = upstream_calls.clone();
        let profile = fetcher
            .get_or_fetch(FetchRequest::for_subject("twitter", subject), move || async move {
                *calls.lock().unwrap() += 1;
                Ok::<_, String>(format!("profile of {}", subject.trim()))
            })
            .await
            .unwrap();
        assert_eq!(profile, "profile of alice");
    }

    assert_eq!(*upstream_calls.lock().unwrap(), 1);
    assert!(cache.contains_key(&fingerprint("twitter", "alice")));
    assert_eq!(scheduler.stats("twitter").unwrap().invocations, 1);

    let stats = cache.stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_with_fetcher_cache() {
    let cache = Arc::new(TtlCache::new(
        CacheConfig::new(100, 60_000).with_sweep_interval_ms(500),
    ));
    let sweeper = cache.clone().start_sweeper();

    for i in 0..10 {
        cache.set_with_ttl(format!("k{}", i), i, Duration::from_millis(200));
    }
    cache.set("keep", 99);

    advance(Duration::from_millis(600)).await;
    tokio::task::yield_now().await;

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.stats().expirations, 10);
    sweeper.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_config_from_json() {
    let config: SchedulerConfig = serde_json::from_str(
        r#"{
            "resources": {
                "twitter": { "max_tokens": 200.0, "refill_per_second": 0.0555 },
                "github": { "max_tokens": 5000.0, "refill_per_second": 1.3889 }
            },
            "max_wait_tick_ms": 250
        }"#,
    )
    .unwrap();
    let scheduler = Scheduler::try_new(config).unwrap();
    assert_eq!(scheduler.resources(), vec!["github", "twitter"]);

    let cache_config: CacheConfig =
        serde_json::from_str(r#"{ "max_size": 10, "default_ttl_ms": 1000 }"#).unwrap();
    let cache: TtlCache<u8> = TtlCache::try_new(cache_config).unwrap();
    assert_eq!(cache.stats().max_size, 10);
}
