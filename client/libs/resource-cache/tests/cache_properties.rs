/// Behavioural tests for the shared resource cache
use futures::future::join_all;
use parking_lot::Mutex;
use resource_cache::{CacheConfig, CacheError, EntryStatus, ResourceCache};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

fn notifications_cache() -> ResourceCache<Vec<String>> {
    ResourceCache::new("notifications_test", CacheConfig::default())
}

// ==================== Single-flight ====================

#[tokio::test(start_paused = true)]
async fn test_concurrent_gets_share_one_fetch() {
    let cache = notifications_cache();
    let calls = Arc::new(AtomicU32::new(0));

    let readers = (0..16).map(|_| {
        let cache = cache.clone();
        let calls = calls.clone();
        async move {
            cache
                .get(
                    "notifications:u1",
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, String>(vec!["welcome".to_string()])
                    },
                    Duration::from_secs(15),
                )
                .await
        }
    });

    let results = join_all(readers).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let first = results[0].as_ref().unwrap().clone();
    for result in &results {
        assert!(Arc::ptr_eq(result.as_ref().unwrap(), &first));
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_gets_share_one_failure() {
    let cache = notifications_cache();
    let calls = Arc::new(AtomicU32::new(0));

    let readers = (0..4).map(|_| {
        let cache = cache.clone();
        let calls = calls.clone();
        async move {
            cache
                .get(
                    "notifications:u1",
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Err::<Vec<String>, _>("503 service unavailable")
                    },
                    Duration::from_secs(15),
                )
                .await
        }
    });

    let results = join_all(readers).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for result in results {
        assert_eq!(
            result,
            Err(CacheError::Fetch("503 service unavailable".to_string()))
        );
    }
    assert_eq!(cache.entry("notifications:u1").status(), EntryStatus::Failed);
}

// ==================== TTL ====================

#[tokio::test(start_paused = true)]
async fn test_ttl_window_of_fifteen_seconds() {
    let cache = notifications_cache();
    let calls = Arc::new(AtomicU32::new(0));
    let ttl = Duration::from_millis(15_000);

    let fetcher = |calls: Arc<AtomicU32>| {
        move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(vec![format!("batch-{n}")])
        }
    };

    // t = 0
    cache.get("k", fetcher(calls.clone()), ttl).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // t = 10000
    tokio::time::advance(Duration::from_millis(10_000)).await;
    let cached = cache.get("k", fetcher(calls.clone()), ttl).await.unwrap();
    assert_eq!(*cached, vec!["batch-0".to_string()]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // t = 16000
    tokio::time::advance(Duration::from_millis(6_000)).await;
    let refreshed = cache.get("k", fetcher(calls.clone()), ttl).await.unwrap();
    assert_eq!(*refreshed, vec!["batch-1".to_string()]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ==================== Subscribers ====================

#[tokio::test]
async fn test_unsubscribe_does_not_cancel_shared_fetch() {
    let cache = notifications_cache();
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let seen_by_a = Arc::new(Mutex::new(Vec::new()));
    let seen_by_b = Arc::new(Mutex::new(Vec::new()));

    let a = {
        let seen = seen_by_a.clone();
        cache.subscribe("k", move |entry| seen.lock().push(entry.data.clone()))
    };
    let _b = {
        let seen = seen_by_b.clone();
        cache.subscribe("k", move |entry| seen.lock().push(entry.data.clone()))
    };

    let reader = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .refresh("k", move || async move {
                    let _ = release_rx.await;
                    Ok::<_, String>(vec!["from server".to_string()])
                })
                .await
        })
    };
    tokio::task::yield_now().await;
    assert!(cache.is_fetching("k"));

    a.unsubscribe();
    release_tx.send(()).unwrap();
    reader.await.unwrap().unwrap();

    let last_b = seen_by_b.lock().last().cloned().flatten();
    assert_eq!(last_b.as_deref(), Some(&vec!["from server".to_string()]));
    assert!(seen_by_a.lock().iter().all(|data| data.is_none()));
    assert_eq!(cache.subscriber_count("k"), 1);
}

#[tokio::test]
async fn test_subscribers_see_loading_then_result_in_order() {
    let cache: ResourceCache<u32> = ResourceCache::new("ordering_test", CacheConfig::default());
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut subs = Vec::new();
    for name in ["first", "second"] {
        let log = log.clone();
        subs.push(cache.subscribe("k", move |entry| {
            log.lock()
                .push((name, entry.is_loading, entry.data.as_deref().copied()));
        }));
    }
    log.lock().clear();

    cache
        .refresh("k", || async { Ok::<_, String>(9) })
        .await
        .unwrap();

    assert_eq!(
        *log.lock(),
        vec![
            ("first", true, None),
            ("second", true, None),
            ("first", false, Some(9)),
            ("second", false, Some(9)),
        ]
    );
}

// ==================== Optimistic updates ====================

#[tokio::test]
async fn test_rejected_optimistic_update_converges_to_server_value() {
    let cache: ResourceCache<u32> = ResourceCache::new("optimistic_test", CacheConfig::default());
    let server_value = Arc::new(Mutex::new(10u32));

    let fetcher = |server: Arc<Mutex<u32>>| move || async move { Ok::<_, String>(*server.lock()) };

    cache
        .get("unread", fetcher(server_value.clone()), Duration::from_secs(60))
        .await
        .unwrap();

    let observed = Arc::new(Mutex::new(Vec::new()));
    let _sub = {
        let observed = observed.clone();
        cache.subscribe("unread", move |entry| {
            if let Some(value) = entry.data.as_deref() {
                observed.lock().push(*value);
            }
        })
    };

    let result = cache
        .optimistic_update(
            "unread",
            |count| count - 1,
            async { Err::<(), _>("403 forbidden") },
            fetcher(server_value.clone()),
        )
        .await;

    assert_eq!(result, Err(CacheError::Mutation("403 forbidden".to_string())));
    assert!(observed.lock().contains(&9));
    assert_eq!(observed.lock().last(), Some(&10));
    assert_eq!(cache.entry("unread").data.as_deref(), Some(&10));
    assert!(!cache.entry("unread").is_stale);
}

#[tokio::test]
async fn test_accepted_optimistic_update_keeps_local_value() {
    let cache: ResourceCache<u32> = ResourceCache::new("optimistic_ok_test", CacheConfig::default());
    cache.set("unread", 3);

    let result = cache
        .optimistic_update(
            "unread",
            |_| 0,
            async { Ok::<_, String>("marked") },
            || async { Ok::<_, String>(99) },
        )
        .await;

    assert_eq!(result, Ok("marked"));
    assert_eq!(cache.entry("unread").data.as_deref(), Some(&0));
}

// ==================== Stale result guard ====================

#[tokio::test]
async fn test_slow_detached_fetch_cannot_overwrite_newer_fetch() {
    let cache: ResourceCache<&'static str> = ResourceCache::new("guard_test", CacheConfig::default());
    let (release_slow, slow_gate) = oneshot::channel::<()>();

    let slow = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .refresh("profile", move || async move {
                    let _ = slow_gate.await;
                    Ok::<_, String>("old")
                })
                .await
        })
    };
    tokio::task::yield_now().await;

    cache.invalidate("profile");
    let fast = cache
        .refresh("profile", || async { Ok::<_, String>("new") })
        .await
        .unwrap();
    assert_eq!(*fast, "new");

    release_slow.send(()).unwrap();
    let slow_result = slow.await.unwrap().unwrap();

    assert_eq!(*slow_result, "new");
    assert_eq!(cache.entry("profile").data.as_deref(), Some(&"new"));
    assert!(!cache.entry("profile").is_loading);
}

#[tokio::test]
async fn test_fetch_detached_by_invalidate_leaves_entry_stale() {
    let cache: ResourceCache<&'static str> = ResourceCache::new("detached_test", CacheConfig::default());
    let (release, gate) = oneshot::channel::<()>();

    let detached = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .refresh("notifications:u1", move || async move {
                    let _ = gate.await;
                    Ok::<_, String>("before-change")
                })
                .await
        })
    };
    tokio::task::yield_now().await;
    assert!(cache.is_fetching("notifications:u1"));

    cache.invalidate("notifications:u1");
    release.send(()).unwrap();
    assert_eq!(*detached.await.unwrap().unwrap(), "before-change");

    let entry = cache.entry("notifications:u1");
    assert_eq!(entry.data.as_deref(), Some(&"before-change"));
    assert!(entry.is_stale);

    let calls = Arc::new(AtomicU32::new(0));
    let fetched = {
        let calls = calls.clone();
        cache
            .get(
                "notifications:u1",
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>("after-change")
                },
                Duration::from_secs(15),
            )
            .await
            .unwrap()
    };

    assert_eq!(*fetched, "after-change");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!cache.entry("notifications:u1").is_stale);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_timeout_surfaces_on_entry() {
    let cache: ResourceCache<u32> = ResourceCache::new(
        "timeout_test",
        CacheConfig {
            fetch_timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        },
    );
    cache.set("k", 1);

    let result = cache
        .refresh("k", || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, String>(2)
        })
        .await;

    assert_eq!(result, Err(CacheError::Timeout(Duration::from_secs(5))));
    let entry = cache.entry("k");
    assert_eq!(entry.data.as_deref(), Some(&1));
    assert!(entry.error.is_some());
}
