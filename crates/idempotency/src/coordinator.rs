use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use parking_lot::Mutex;
use tracing::Instrument;

use crate::cancel::with_caller_abort;
use crate::config::{Config, Effective, RunOptions};
use crate::error::RunError;
use crate::outcome::{Completion, Outcome, RunMeta, RunStatus};
use crate::stats::{Counters, Stats};
use crate::store::{BoundedStore, ResultStore};

type ExecutionChannel<T, E> = Shared<oneshot::Receiver<Outcome<T, E>>>;

/// A running execution, registered under its normalized key.
struct Execution<T, E> {
    /// Distinguishes this execution from a later one registered under the same key.
    id: u64,
    channel: ExecutionChannel<T, E>,
}

struct InFlightTable<T, E> {
    executions: HashMap<String, Execution<T, E>>,
    next_id: u64,
}

type InFlight<T, E> = Arc<Mutex<InFlightTable<T, E>>>;

/// Deduplicates executions of keyed asynchronous operations.
///
/// See the [crate documentation](crate) for how calls are resolved.
///
/// Cloning an `IdempotencyCache` is cheap, and the clone shares the in-flight executions, the
/// store and the counters with the cache it was cloned from.
pub struct IdempotencyCache<T, E, S = BoundedStore<Outcome<T, E>>> {
    config: Arc<Config>,

    /// Settled outcomes.
    store: Arc<S>,

    /// Used for deduplicating concurrent executions.
    in_flight: InFlight<T, E>,

    counters: Arc<Counters>,
}

impl<T, E, S> fmt::Debug for IdempotencyCache<T, E, S>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdempotencyCache")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("running executions", &self.counters.in_flight())
            .finish()
    }
}

impl<T, E, S> Clone for IdempotencyCache<T, E, S> {
    fn clone(&self) -> Self {
        // https://github.com/rust-lang/rust/issues/26925
        Self {
            config: Arc::clone(&self.config),
            store: Arc::clone(&self.store),
            in_flight: Arc::clone(&self.in_flight),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<T, E> IdempotencyCache<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates a cache backed by a [`BoundedStore`].
    ///
    /// If [`Config::cleanup_interval`] is set, this should be called within a Tokio runtime, see
    /// [`BoundedStore::new`].
    pub fn new(config: Config) -> Self {
        let store = BoundedStore::new(config.store_config());
        Self::with_store(config, store)
    }
}

impl<T, E, S> IdempotencyCache<T, E, S>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    S: ResultStore<Outcome<T, E>>,
{
    /// Creates a cache on top of a custom store.
    ///
    /// The store is expected to honor its own size and expiry settings,
    /// [`Config::max_size`] and [`Config::cleanup_interval`] are not applied to it.
    pub fn with_store(config: Config, store: S) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            in_flight: Arc::new(Mutex::new(InFlightTable {
                executions: HashMap::new(),
                next_id: 0,
            })),
            counters: Arc::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the result of `producer`, or of a previous or concurrent execution for `key`.
    ///
    /// # Errors
    ///
    /// - [`RunError::Aborted`] if the cancellation token in `options` is cancelled before or
    ///   while this call waits.
    /// - [`RunError::Failed`] with the producer's error, if the execution this call resolved
    ///   with failed, or a cached failure was served.
    /// - [`RunError::Interrupted`] if the execution was dropped before it settled.
    pub async fn run<F, Fut>(
        &self,
        key: &str,
        producer: F,
        options: RunOptions,
    ) -> Result<T, RunError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.run_with_outcome(key, producer, options)
            .await
            .map(Completion::into_value)
    }

    /// Like [`run`](Self::run), but also reports how the call was resolved.
    ///
    /// On success the [`RunMeta`] carries the [`RunStatus`] of the call. Producer errors carry
    /// their status within [`RunError::Failed`].
    pub async fn run_with_outcome<F, Fut>(
        &self,
        key: &str,
        producer: F,
        options: RunOptions,
    ) -> Result<Completion<T>, RunError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.counters.run();
        if options.is_cancelled() {
            self.record_aborted();
            return Err(RunError::Aborted);
        }

        let key = self.config.normalize_key(key);
        let effective = Effective::resolve(&self.config, &options);

        let (channel, status) = {
            // Both lookups and the registration of a new execution happen under this lock, so
            // there is at most one execution per key.
            let mut in_flight = self.in_flight.lock();

            match self.store.get(&key) {
                Some(Outcome::Completed(value)) => {
                    self.counters.hit_completed();
                    tracing::trace!(key, "Served completed outcome from the store");
                    return Ok(self.resolved(key, value, RunStatus::HitCompleted));
                }
                Some(Outcome::Failed(error)) if effective.cache_failures => {
                    self.counters.hit_failed();
                    tracing::trace!(key, "Served failed outcome from the store");
                    return Err(self.failed(error, RunStatus::HitFailed));
                }
                // A failure stored by a call that had failure caching enabled does not count
                // for this one. It gets replaced once the new execution settles.
                Some(Outcome::Failed(_)) | None => {}
            }

            match in_flight.executions.get(&key) {
                Some(execution) => {
                    self.counters.inflight_hit();
                    tracing::trace!(key, "Joined running execution");
                    (execution.channel.clone(), RunStatus::InflightHit)
                }
                None => {
                    let channel = self.spawn_execution(&mut in_flight, &key, producer, effective);
                    (channel, RunStatus::MissExecuted)
                }
            }
        };

        let outcome = match with_caller_abort(channel, options.cancellation.as_ref()).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_canceled)) => {
                tracing::warn!(key, "Execution was dropped before it settled");
                return Err(RunError::Interrupted);
            }
            Err(_aborted) => {
                self.record_aborted();
                tracing::trace!(key, %status, "Caller stopped waiting");
                return Err(RunError::Aborted);
            }
        };

        match outcome.into_result() {
            Ok(value) => Ok(self.resolved(key, value, status)),
            Err(error) => {
                let status = match status {
                    RunStatus::MissExecuted => RunStatus::MissExecutedFailed,
                    status => status,
                };
                Err(self.failed(error, status))
            }
        }
    }

    /// Removes the stored outcome for `key`, returning whether there was one.
    ///
    /// A running execution for `key` is not affected, and will store its outcome once it settles.
    pub fn delete(&self, key: &str) -> bool {
        self.store.delete(&self.config.normalize_key(key))
    }

    /// Removes all stored outcomes.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Removes all expired outcomes, returning how many were removed.
    pub fn prune(&self) -> usize {
        let removed = self.store.prune();
        metric!(gauge("idempotency.size") = self.store.len() as u64);
        removed
    }

    /// The number of outcomes held by the store.
    pub fn size(&self) -> usize {
        self.store.len()
    }

    pub fn stats(&self) -> Stats {
        self.counters.snapshot(self.store.len())
    }

    /// Forgets all running executions and disposes of the store.
    ///
    /// Executions that are still running are not cancelled. Their callers still receive the
    /// outcome, but new calls will no longer join them.
    pub fn dispose(&self) {
        let mut in_flight = self.in_flight.lock();
        in_flight.executions.clear();
        self.counters.set_in_flight(0);
        drop(in_flight);

        self.store.dispose();
    }

    fn record_aborted(&self) {
        self.counters.aborted_wait();
        metric!(counter("idempotency.aborted") += 1);
    }

    fn resolved(&self, key: String, value: T, status: RunStatus) -> Completion<T> {
        metric!(counter("idempotency.run") += 1, "status" => status.as_str());
        Completion {
            value,
            meta: RunMeta { key, status },
        }
    }

    fn failed(&self, error: E, status: RunStatus) -> RunError<E> {
        metric!(counter("idempotency.run") += 1, "status" => status.as_str());
        RunError::Failed { error, status }
    }

    /// Spawns `producer` as a new execution, and registers it in the in-flight table.
    ///
    /// The execution runs as a separate task, so it settles and stores its outcome even if all
    /// callers stop waiting for it. Its in-flight entry is removed right before the outcome is
    /// broadcast to the waiters, or when the task is dropped without settling.
    fn spawn_execution<F, Fut>(
        &self,
        in_flight: &mut InFlightTable<T, E>,
        key: &str,
        producer: F,
        effective: Effective,
    ) -> ExecutionChannel<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();

        let id = in_flight.next_id;
        in_flight.next_id += 1;

        let settle_token = SettleToken {
            in_flight: Arc::clone(&self.in_flight),
            counters: Arc::clone(&self.counters),
            key: key.to_owned(),
            id,
        };

        let store = Arc::clone(&self.store);
        let counters = Arc::clone(&self.counters);
        let table_key = key.to_owned();
        let key = key.to_owned();

        let execution = async move {
            tracing::debug!(key, "Starting execution");
            let outcome: Outcome<T, E> = producer().await.into();
            match outcome {
                Outcome::Completed(_) => {
                    counters.miss_executed();
                    store.set(&key, outcome.clone(), effective.ttl);
                }
                Outcome::Failed(_) if effective.cache_failures => {
                    counters.miss_executed_failed();
                    store.set(&key, outcome.clone(), effective.failure_ttl);
                }
                Outcome::Failed(_) => {
                    counters.miss_executed_failed();
                    // Drops a failure stored by an earlier call that cached failures.
                    store.delete(&key);
                }
            }
            tracing::debug!(key, completed = outcome.is_completed(), "Execution settled");
            metric!(gauge("idempotency.size") = store.len() as u64);

            // Drop the token first to evict from the table. This ensures that callers either
            // find the stored outcome, or get a channel that will receive it.
            drop(settle_token);
            sender.send(outcome).ok();
        }
        .in_current_span();

        tokio::spawn(execution);

        let channel = receiver.shared();
        let evicted = in_flight.executions.insert(
            table_key,
            Execution {
                id,
                channel: channel.clone(),
            },
        );
        debug_assert!(evicted.is_none());

        let running = in_flight.executions.len();
        self.counters.set_in_flight(running);
        metric!(gauge("idempotency.inflight") = running as u64);

        channel
    }
}

/// Removes an execution from the in-flight table when dropped.
///
/// This is moved into the execution task, so the entry is removed exactly once, whether the
/// execution settles, panics, or is dropped along with the runtime.
struct SettleToken<T, E> {
    in_flight: InFlight<T, E>,
    counters: Arc<Counters>,
    key: String,
    id: u64,
}

impl<T, E> Drop for SettleToken<T, E> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock();
        // The table may have been cleared by `dispose`, and a newer execution registered since.
        if in_flight
            .executions
            .get(&self.key)
            .is_some_and(|execution| execution.id == self.id)
        {
            in_flight.executions.remove(&self.key);
        }
        let running = in_flight.executions.len();
        self.counters.set_in_flight(running);
        drop(in_flight);

        metric!(gauge("idempotency.inflight") = running as u64);
    }
}
