use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Process-local counters of an [`IdempotencyCache`](crate::IdempotencyCache).
///
/// Counters only ever increase. Updates use relaxed atomics, so a [`Stats`] snapshot can be
/// taken at any time without blocking callers, but it is not a consistent cut across counters.
#[derive(Debug, Default)]
pub struct Counters {
    runs: AtomicU64,
    hits_completed: AtomicU64,
    hits_failed: AtomicU64,
    inflight_hits: AtomicU64,
    misses_executed: AtomicU64,
    misses_executed_failed: AtomicU64,
    aborted_waits: AtomicU64,
    /// Number of entries in the in-flight table. Kept here so reading it never takes the lock.
    in_flight: AtomicUsize,
}

/// A snapshot of [`Counters`], together with the current store size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub runs: u64,
    pub hits_completed: u64,
    pub hits_failed: u64,
    pub inflight_hits: u64,
    pub misses_executed: u64,
    pub misses_executed_failed: u64,
    pub aborted_waits: u64,
    /// Entries currently held by the store.
    pub size: usize,
    /// Executions currently running.
    pub in_flight: usize,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Counters {
    pub(crate) fn run(&self) {
        bump(&self.runs)
    }

    pub(crate) fn hit_completed(&self) {
        bump(&self.hits_completed)
    }

    pub(crate) fn hit_failed(&self) {
        bump(&self.hits_failed)
    }

    pub(crate) fn inflight_hit(&self) {
        bump(&self.inflight_hits)
    }

    pub(crate) fn miss_executed(&self) {
        bump(&self.misses_executed)
    }

    pub(crate) fn miss_executed_failed(&self) {
        bump(&self.misses_executed_failed)
    }

    pub(crate) fn aborted_wait(&self) {
        bump(&self.aborted_waits)
    }

    pub(crate) fn set_in_flight(&self, in_flight: usize) {
        self.in_flight.store(in_flight, Ordering::Relaxed);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Takes a snapshot of all the counters, reporting `size` as the store size.
    pub fn snapshot(&self, size: usize) -> Stats {
        Stats {
            runs: self.runs.load(Ordering::Relaxed),
            hits_completed: self.hits_completed.load(Ordering::Relaxed),
            hits_failed: self.hits_failed.load(Ordering::Relaxed),
            inflight_hits: self.inflight_hits.load(Ordering::Relaxed),
            misses_executed: self.misses_executed.load(Ordering::Relaxed),
            misses_executed_failed: self.misses_executed_failed.load(Ordering::Relaxed),
            aborted_waits: self.aborted_waits.load(Ordering::Relaxed),
            size,
            in_flight: self.in_flight(),
        }
    }
}
