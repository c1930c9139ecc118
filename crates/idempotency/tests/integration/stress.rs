use std::time::{Duration, Instant};

use futures::future::join_all;
use idempotency::{RunOptions, Stats};

use crate::{CallCounter, TestError, millis, setup_cache};

/// The keys a request of the given index goes to.
///
/// Most requests hit a handful of hot keys, some go to a larger warm set, and a few hit keys
/// whose producer always fails.
fn workload(request: usize) -> (String, bool) {
    match request % 10 {
        0 => (format!("fail-{}", request % 7), true),
        1..=3 => (format!("warm-{}", request % 97), false),
        _ => (format!("hot-{}", request % 5), false),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "long running"]
async fn test_mixed_workload() {
    let cache = setup_cache(|config| {
        config.ttl = millis(200);
        config.failure_ttl = Some(millis(20));
        config.max_size = Some(64);
        config.cleanup_interval = Some(millis(50));
    });
    let counter = CallCounter::new();
    let requests = 20_000;

    let start = Instant::now();
    let calls = (0..requests).map(|request| {
        let cache = cache.clone();
        let (key, fails) = workload(request);
        let delay = Duration::from_micros((request % 3) as u64 * 500);
        let producer = counter.count(move || async move {
            tokio::time::sleep(delay).await;
            if fails {
                Err(TestError::new("flaky upstream"))
            } else {
                Ok("ok")
            }
        });
        let options = RunOptions::new().with_cache_failures(fails);
        tokio::spawn(async move { cache.run(&key, producer, options).await })
    });
    let results = join_all(calls).await;
    let elapsed = start.elapsed();

    let mut failed = 0;
    for result in results {
        match result.unwrap() {
            Ok(value) => assert_eq!(value, "ok"),
            Err(error) => {
                assert_eq!(error.into_error(), Some(TestError::new("flaky upstream")));
                failed += 1;
            }
        }
    }

    let stats = cache.stats();
    println!("{requests} requests in {elapsed:?}, {failed} failed: {stats:#?}");

    let Stats {
        runs,
        hits_completed,
        hits_failed,
        inflight_hits,
        misses_executed,
        misses_executed_failed,
        aborted_waits,
        size,
        in_flight,
    } = stats;
    assert_eq!(runs, requests as u64);
    assert_eq!(aborted_waits, 0);
    assert_eq!(in_flight, 0);
    assert!(size <= 64);
    // Every call resolved through exactly one path, and every execution ran its producer once.
    assert_eq!(
        hits_completed + hits_failed + inflight_hits + misses_executed + misses_executed_failed,
        runs
    );
    assert_eq!(
        misses_executed + misses_executed_failed,
        counter.get() as u64
    );
    assert!(counter.get() < requests);
}
