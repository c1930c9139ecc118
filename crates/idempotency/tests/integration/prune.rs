use idempotency::RunOptions;

use crate::{CallCounter, NOW, TestError, millis, setup_cache};

#[tokio::test(start_paused = true)]
async fn test_prune_removes_expired() {
    let cache = setup_cache(|config| {
        config.ttl = millis(20);
        config.cache_failures = true;
    });
    let counter = CallCounter::new();

    cache
        .run("a", counter.returning("v", NOW), RunOptions::new())
        .await
        .unwrap();
    cache
        .run("b", counter.failing(TestError::new("boom"), NOW), RunOptions::new())
        .await
        .unwrap_err();
    cache
        .run(
            "c",
            counter.returning("v", NOW),
            RunOptions::new().with_ttl(millis(1_000)),
        )
        .await
        .unwrap();
    assert_eq!(cache.prune(), 0);
    assert_eq!(cache.size(), 3);

    tokio::time::sleep(millis(50)).await;
    assert_eq!(cache.prune(), 2);
    assert_eq!(cache.size(), 1);
    assert_eq!(cache.prune(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_prune_empty() {
    let cache = setup_cache(|_| {});
    assert_eq!(cache.prune(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_background_cleanup() {
    let cache = setup_cache(|config| {
        config.ttl = millis(20);
        config.cleanup_interval = Some(millis(30));
    });
    let counter = CallCounter::new();

    for key in ["a", "b"] {
        cache
            .run(key, counter.returning("v", NOW), RunOptions::new())
            .await
            .unwrap();
    }
    assert_eq!(cache.size(), 2);

    tokio::time::sleep(millis(100)).await;
    assert_eq!(cache.size(), 0);
    assert_eq!(cache.prune(), 0);
}
