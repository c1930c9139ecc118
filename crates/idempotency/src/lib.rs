//! # Keyed request deduplication
//!
//! This crate deduplicates expensive or side-effecting asynchronous operations that are
//! identified by a key, typically an idempotency key sent by a client that retries its
//! requests. Concurrent and subsequent calls for the same key reuse the result of a single
//! execution instead of running the operation again.
//!
//! ## Layers
//!
//! A call to [`IdempotencyCache::run`] goes through the following steps:
//!
//! - The key is normalized by prepending the configured [`Config::key_prefix`].
//! - The [`ResultStore`] is consulted. A completed [`Outcome`] is returned right away, a failed
//!   one only if failure caching is enabled for this call.
//! - On miss, the table of in-flight executions is consulted. If the operation is already
//!   running for this key, the caller waits for that execution instead of starting another.
//! - Otherwise the producer is spawned as a new execution. Once it settles, its outcome is
//!   written to the store and the in-flight entry is removed.
//!
//! The store lookup and the in-flight lookup-and-insert happen under a single lock, so there is
//! at most one execution per normalized key at any time.
//!
//! ## Cancellation
//!
//! Every call can carry its own [`CancellationToken`](tokio_util::sync::CancellationToken) via
//! [`RunOptions`]. Cancelling it only abandons the wait of that one caller, see [`cancel`]. The
//! shared execution keeps running, since it is spawned on the runtime, and it still delivers its
//! outcome to every other waiter and to the store.
//!
//! ## Failures
//!
//! Producer errors are handed to the caller unchanged inside [`RunError::Failed`], tagged with the
//! [`RunStatus`] describing the path that produced them. With [`Config::cache_failures`] enabled,
//! failures are stored for [`Config::failure_ttl`] and served as `hit_failed` until they expire.
//!
//! ## Metrics
//!
//! The following metrics are emitted through [`metrics`] if a statsd client is configured:
//!
//! - `idempotency.run`: Every call that resolved, tagged with its `status`.
//! - `idempotency.aborted`: Calls abandoned because their cancellation token fired.
//! - `idempotency.inflight`: Gauge of currently running executions.
//! - `idempotency.size`: Gauge of entries held by the store.
//!
//! Independent of statsd, [`IdempotencyCache::stats`] returns a snapshot of the process-local
//! [`Stats`].

#[macro_use]
pub mod metrics;

pub mod cancel;
pub mod config;
pub mod logging;
pub mod store;

mod coordinator;
mod error;
mod outcome;
mod stats;

pub use cancel::Aborted;
pub use config::{Config, RunOptions};
pub use coordinator::IdempotencyCache;
pub use error::RunError;
pub use outcome::{Completion, Outcome, RunMeta, RunStatus};
pub use stats::{Counters, Stats};
pub use store::{BoundedStore, ResultStore, StoreConfig};
