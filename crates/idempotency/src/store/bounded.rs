use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::{ResultStore, StoreConfig};

/// A value together with the point in time it expires at.
#[derive(Clone, Debug)]
struct StoredItem<V> {
    /// `None` if the ttl is too large to be represented, which never expires.
    deadline: Option<Instant>,
    value: V,
}

impl<V> StoredItem<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }
}

type Entries<V> = Mutex<LruCache<String, StoredItem<V>>>;

/// A size- and time-bounded [`ResultStore`].
///
/// Every value expires after its own ttl. Expired values are dropped lazily when they are looked
/// up, by [`prune`](ResultStore::prune), or by a background task if a cleanup interval is
/// configured. Once [`StoreConfig::max_size`] is reached, storing a new key evicts the least
/// recently used one.
///
/// Deadlines are measured with [`tokio::time::Instant`], so they follow a paused test clock.
pub struct BoundedStore<V> {
    config: StoreConfig,
    entries: Arc<Entries<V>>,
    cleanup: Mutex<Option<JoinHandle<()>>>,
}

impl<V> fmt::Debug for BoundedStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self
            .entries
            .try_lock()
            .map(|entries| entries.len())
            .unwrap_or_default();
        f.debug_struct("BoundedStore")
            .field("config", &self.config)
            .field("entries", &entries)
            .finish()
    }
}

impl<V> BoundedStore<V>
where
    V: Clone + Send + 'static,
{
    /// Creates a new store.
    ///
    /// The background cleanup task is spawned on the current Tokio runtime. Without a runtime,
    /// the task is skipped and expired values are only removed lazily.
    pub fn new(config: StoreConfig) -> Self {
        let entries = match config.max_size.and_then(NonZeroUsize::new) {
            Some(max_size) => LruCache::new(max_size),
            None => LruCache::unbounded(),
        };
        let entries = Arc::new(Mutex::new(entries));

        let cleanup = config
            .cleanup_interval
            .and_then(|every| spawn_cleanup(Arc::downgrade(&entries), every));

        Self {
            config,
            entries,
            cleanup: Mutex::new(cleanup),
        }
    }

    /// Stores `value` under `key` with the default ttl.
    pub fn insert(&self, key: &str, value: V) {
        self.set(key, value, self.config.ttl);
    }
}

/// Spawns the periodic prune, which stops once the store is dropped.
fn spawn_cleanup<V>(entries: Weak<Entries<V>>, every: Duration) -> Option<JoinHandle<()>>
where
    V: Send + 'static,
{
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!("No runtime available, background cleanup of the result store is disabled");
        return None;
    };
    if every.is_zero() {
        return None;
    }

    let task = async move {
        let mut interval = tokio::time::interval_at(Instant::now() + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let Some(entries) = entries.upgrade() else {
                break;
            };
            let removed = prune_expired(&mut entries.lock(), Instant::now());
            if removed > 0 {
                tracing::trace!(removed, "Pruned expired outcomes");
            }
        }
    };
    Some(runtime.spawn(task))
}

fn prune_expired<V>(entries: &mut LruCache<String, StoredItem<V>>, now: Instant) -> usize {
    let expired: Vec<String> = entries
        .iter()
        .filter(|(_, item)| item.is_expired(now))
        .map(|(key, _)| key.clone())
        .collect();
    for key in &expired {
        entries.pop(key);
    }
    expired.len()
}

impl<V> ResultStore<V> for BoundedStore<V>
where
    V: Clone + Send + 'static,
{
    fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        let expired = match entries.get(key) {
            Some(item) if !item.is_expired(now) => return Some(item.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    fn set(&self, key: &str, value: V, ttl: Duration) {
        let deadline = Instant::now().checked_add(ttl);
        let item = StoredItem { deadline, value };
        self.entries.lock().put(key.to_owned(), item);
    }

    fn delete(&self, key: &str) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }

    fn prune(&self) -> usize {
        prune_expired(&mut self.entries.lock(), Instant::now())
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn dispose(&self) {
        if let Some(cleanup) = self.cleanup.lock().take() {
            cleanup.abort();
        }
        self.clear();
    }
}

impl<V> Drop for BoundedStore<V> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.get_mut().take() {
            cleanup.abort();
        }
    }
}
