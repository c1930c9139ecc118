//! Storage of settled outcomes.
//!
//! The [`IdempotencyCache`](crate::IdempotencyCache) only talks to its store through the
//! [`ResultStore`] trait. Eviction and expiry are entirely up to the store. [`BoundedStore`] is
//! the default implementation, a size- and time-bounded LRU map.

use std::time::Duration;

mod bounded;

pub use bounded::BoundedStore;

/// A time-bounded key/value store for outcomes.
pub trait ResultStore<V>: Send + Sync + 'static {
    /// Returns the live value stored under `key`.
    ///
    /// Values whose ttl has elapsed are never returned.
    fn get(&self, key: &str) -> Option<V>;

    /// Stores `value` under `key` for `ttl`, replacing any previous value.
    fn set(&self, key: &str, value: V, ttl: Duration);

    /// Removes `key`, returning whether it was present.
    fn delete(&self, key: &str) -> bool;

    /// Removes all values.
    fn clear(&self);

    /// Removes all values whose ttl has elapsed, returning how many were removed.
    fn prune(&self) -> usize;

    /// The number of stored values.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Releases background resources and drops all values.
    fn dispose(&self);
}

/// Construction-time settings of a [`BoundedStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// The ttl of values stored without an explicit one.
    pub ttl: Duration,
    /// Maximum number of values, `None` or `Some(0)` for no bound.
    pub max_size: Option<usize>,
    /// Interval of the background prune task, `None` to disable it.
    pub cleanup_interval: Option<Duration>,
}
