use idempotency::{RunOptions, RunStatus, Stats};

use crate::{CallCounter, NOW, setup_cache};

#[tokio::test(start_paused = true)]
async fn test_completed_outcome_is_reused() {
    let cache = setup_cache(|_| {});
    let first = CallCounter::new();
    let second = CallCounter::new();

    let result = cache
        .run_with_outcome("order-1", first.returning("v1", NOW), RunOptions::new())
        .await
        .unwrap();
    assert_eq!(result.value, "v1");
    assert_eq!(result.status(), RunStatus::MissExecuted);

    let result = cache
        .run_with_outcome("order-1", second.returning("v2", NOW), RunOptions::new())
        .await
        .unwrap();
    assert_eq!(result.value, "v1");
    assert_eq!(result.status(), RunStatus::HitCompleted);

    assert_eq!(first.get(), 1);
    assert_eq!(second.get(), 0);
    assert_eq!(
        cache.stats(),
        Stats {
            runs: 2,
            hits_completed: 1,
            misses_executed: 1,
            size: 1,
            ..Default::default()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_distinct_keys_execute_separately() {
    let cache = setup_cache(|_| {});
    let counter = CallCounter::new();

    let a = cache.run("a", counter.returning("A", NOW), RunOptions::new());
    let b = cache.run("b", counter.returning("B", NOW), RunOptions::new());
    let (a, b) = tokio::join!(a, b);

    assert_eq!(a, Ok("A"));
    assert_eq!(b, Ok("B"));
    assert_eq!(counter.get(), 2);
    assert_eq!(cache.size(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_key_prefix() {
    let cache = setup_cache(|config| config.key_prefix = "payments".into());
    let counter = CallCounter::new();

    let result = cache
        .run_with_outcome("k1", counter.returning("ok", NOW), RunOptions::new())
        .await
        .unwrap();
    assert_eq!(result.meta.key, "payments:k1");

    // Management operations take the key as passed to `run`.
    assert!(cache.delete("k1"));
    assert!(!cache.delete("payments:k1"));
    assert_eq!(cache.size(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_empty_prefix_keeps_key() {
    let cache = setup_cache(|_| {});

    let result = cache
        .run_with_outcome("k1", || async { Ok("ok") }, RunOptions::new())
        .await
        .unwrap();
    assert_eq!(result.meta.key, "k1");
}

#[tokio::test(start_paused = true)]
async fn test_delete_forces_execution() {
    let cache = setup_cache(|_| {});
    let counter = CallCounter::new();

    cache
        .run("k", counter.returning("first", NOW), RunOptions::new())
        .await
        .unwrap();
    assert!(cache.delete("k"));
    assert!(!cache.delete("k"));

    let result = cache
        .run("k", counter.returning("second", NOW), RunOptions::new())
        .await;
    assert_eq!(result, Ok("second"));
    assert_eq!(counter.get(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_clear() {
    let cache = setup_cache(|_| {});
    let counter = CallCounter::new();

    for key in ["a", "b", "c"] {
        cache
            .run(key, counter.returning("v", NOW), RunOptions::new())
            .await
            .unwrap();
    }
    assert_eq!(cache.size(), 3);

    cache.clear();
    assert_eq!(cache.size(), 0);

    cache
        .run("a", counter.returning("v", NOW), RunOptions::new())
        .await
        .unwrap();
    assert_eq!(counter.get(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_dispose() {
    let cache = setup_cache(|config| config.cleanup_interval = Some(crate::millis(10)));
    let counter = CallCounter::new();

    cache
        .run("k", counter.returning("v", NOW), RunOptions::new())
        .await
        .unwrap();
    cache.dispose();
    assert_eq!(cache.size(), 0);
    assert_eq!(cache.stats().in_flight, 0);

    // Disposing twice is harmless.
    cache.dispose();
}

#[tokio::test(start_paused = true)]
async fn test_clones_share_state() {
    let cache = setup_cache(|_| {});
    let other = cache.clone();
    let counter = CallCounter::new();

    cache
        .run("k", counter.returning("v", NOW), RunOptions::new())
        .await
        .unwrap();
    let result = other
        .run_with_outcome("k", counter.returning("unused", NOW), RunOptions::new())
        .await
        .unwrap();

    assert_eq!(result.status(), RunStatus::HitCompleted);
    assert_eq!(counter.get(), 1);
    assert_eq!(other.stats().runs, 2);
}
