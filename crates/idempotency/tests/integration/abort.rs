use idempotency::{RunError, RunOptions, RunStatus};
use tokio_util::sync::CancellationToken;

use crate::{CallCounter, NOW, millis, setup_cache};

#[tokio::test(start_paused = true)]
async fn test_aborted_waiter_does_not_affect_others() {
    let cache = setup_cache(|_| {});
    let counter = CallCounter::new();
    let token = CancellationToken::new();

    let aborted = cache.run(
        "k",
        counter.returning("ok", millis(50)),
        RunOptions::new().with_cancellation(token.clone()),
    );
    let patient = cache.run("k", counter.returning("unused", NOW), RunOptions::new());
    let cancel = async {
        tokio::time::sleep(millis(10)).await;
        token.cancel();
    };
    let (aborted, patient, ()) = tokio::join!(aborted, patient, cancel);

    assert_eq!(aborted, Err(RunError::Aborted));
    assert_eq!(patient, Ok("ok"));
    assert_eq!(counter.get(), 1);

    let stats = cache.stats();
    assert_eq!(stats.aborted_waits, 1);
    assert_eq!(stats.inflight_hits, 1);
    assert_eq!(stats.misses_executed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_execution_still_stores_outcome() {
    let cache = setup_cache(|_| {});
    let counter = CallCounter::new();
    let token = CancellationToken::new();

    let aborted = cache.run(
        "k",
        counter.returning("late", millis(50)),
        RunOptions::new().with_cancellation(token.clone()),
    );
    let cancel = async {
        tokio::time::sleep(millis(10)).await;
        token.cancel();
    };
    let (aborted, ()) = tokio::join!(aborted, cancel);
    assert!(aborted.unwrap_err().is_aborted());

    tokio::time::sleep(millis(100)).await;
    let result = cache
        .run_with_outcome("k", counter.returning("unused", NOW), RunOptions::new())
        .await
        .unwrap();
    assert_eq!(result.value, "late");
    assert_eq!(result.status(), RunStatus::HitCompleted);
    assert_eq!(counter.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_already_cancelled() {
    let cache = setup_cache(|_| {});
    let counter = CallCounter::new();
    let token = CancellationToken::new();
    token.cancel();

    let result = cache
        .run(
            "k",
            counter.returning("unused", NOW),
            RunOptions::new().with_cancellation(token),
        )
        .await;

    assert_eq!(result, Err(RunError::Aborted));
    assert_eq!(counter.get(), 0);
    assert_eq!(cache.size(), 0);

    let stats = cache.stats();
    assert_eq!(stats.runs, 1);
    assert_eq!(stats.aborted_waits, 1);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn test_already_cancelled_ignores_stored_outcome() {
    let cache = setup_cache(|_| {});
    let counter = CallCounter::new();

    cache
        .run("k", counter.returning("v", NOW), RunOptions::new())
        .await
        .unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let result = cache
        .run(
            "k",
            counter.returning("v", NOW),
            RunOptions::new().with_cancellation(token),
        )
        .await;
    assert_eq!(result, Err(RunError::Aborted));
    assert_eq!(cache.stats().hits_completed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_token_cancelled_after_completion() {
    let cache = setup_cache(|_| {});
    let token = CancellationToken::new();

    let result = cache
        .run(
            "k",
            || async { Ok("done") },
            RunOptions::new().with_cancellation(token.clone()),
        )
        .await;
    token.cancel();

    assert_eq!(result, Ok("done"));
    assert_eq!(cache.stats().aborted_waits, 0);
}
