//! Helpers for testing the idempotency cache.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - Prefer `#[tokio::test(start_paused = true)]` for anything involving ttls. Expiry is measured
//!    on the Tokio clock, so sleeping in a paused test advances time instantly and
//!    deterministically.
//!
//!  - Use a [`Gate`] to hold a producer open until the test has lined up its concurrent callers,
//!    and a [`CallCounter`] to assert how often a producer actually ran.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `idempotency` crate and mutes all
///    other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("idempotency=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// A producer error with a plain message, comparable in assertions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TestError(pub String);

impl TestError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Counts how often the producers it hands out were invoked.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of producer invocations so far.
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Wraps `producer`, counting every invocation.
    pub fn count<F, Fut>(&self, producer: F) -> impl FnOnce() -> Fut + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future,
    {
        let counter = Arc::clone(&self.0);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            producer()
        }
    }

    /// A producer that resolves with `value` after `delay`.
    pub fn returning<T, E>(
        &self,
        value: T,
        delay: Duration,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<T, E>> + Send + 'static
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        self.count(move || {
            async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(value)
            }
            .boxed()
        })
    }

    /// A producer that fails with `error` after `delay`.
    pub fn failing<T, E>(
        &self,
        error: E,
        delay: Duration,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<T, E>> + Send + 'static
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        self.count(move || {
            async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Err(error)
            }
            .boxed()
        })
    }
}

/// A future that stays pending until its [`Gate`] is opened.
pub type Opened = Shared<BoxFuture<'static, ()>>;

/// Holds producers pending until the test opens it.
///
/// All clones of the [`Opened`] future returned by [`Gate::new`] resolve together once
/// [`Gate::open`] is called, or once the gate is dropped.
#[derive(Debug)]
pub struct Gate {
    sender: oneshot::Sender<()>,
}

impl Gate {
    pub fn new() -> (Self, Opened) {
        let (sender, receiver) = oneshot::channel();
        let opened = receiver.map(|_| ()).boxed().shared();
        (Self { sender }, opened)
    }

    pub fn open(self) {
        self.sender.send(()).ok();
    }
}
