use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::logging::Logging;
use crate::metrics::Metrics;
use crate::store::StoreConfig;

/// The default lifetime of cached outcomes.
const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Configuration of an [`IdempotencyCache`](crate::IdempotencyCache).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How long successful outcomes are kept.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Whether failed outcomes are cached by default.
    pub cache_failures: bool,

    /// How long failed outcomes are kept. Defaults to [`ttl`](Self::ttl).
    #[serde(with = "humantime_serde")]
    pub failure_ttl: Option<Duration>,

    /// Maximum number of stored outcomes. The least recently used outcome is evicted
    /// once this is exceeded.
    ///
    /// Leaving this as `None` keeps the store unbounded.
    pub max_size: Option<usize>,

    /// How often expired outcomes are pruned in the background.
    ///
    /// Leaving this as `None` disables the background task. Expired outcomes are then only
    /// removed lazily on access, or through an explicit prune.
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Option<Duration>,

    /// Prepended to every key, separated by a `:`.
    pub key_prefix: String,

    /// Controls the logging system.
    ///
    /// Not applied by [`IdempotencyCache::new`](crate::IdempotencyCache::new). Pass it to
    /// [`init_logging`](crate::logging::init_logging) once at startup.
    pub logging: Logging,

    /// Controls the metrics.
    ///
    /// Not applied by [`IdempotencyCache::new`](crate::IdempotencyCache::new). Pass it to
    /// [`metrics::configure`](crate::metrics::configure) once at startup.
    pub metrics: Metrics,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            cache_failures: false,
            failure_ttl: None,
            max_size: None,
            cleanup_interval: None,
            key_prefix: String::new(),
            logging: Logging::default(),
            metrics: Metrics::default(),
        }
    }
}

impl Config {
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    pub fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }

    /// The lifetime of failed outcomes, falling back to [`ttl`](Self::ttl).
    pub fn effective_failure_ttl(&self) -> Duration {
        self.failure_ttl.unwrap_or(self.ttl)
    }

    /// The part of the configuration that is forwarded to the result store.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            ttl: self.ttl,
            max_size: self.max_size,
            cleanup_interval: self.cleanup_interval,
        }
    }

    /// Forms the key used for both the store and the in-flight table.
    pub(crate) fn normalize_key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_owned()
        } else {
            format!("{}:{key}", self.key_prefix)
        }
    }
}

/// Overrides for a single call to [`IdempotencyCache::run`](crate::IdempotencyCache::run).
///
/// Every option that is left unset falls back to the [`Config`] of the cache. Overrides only
/// apply to the decisions taken by that one call, for example the lifetime of the outcome it
/// writes when it ends up executing the producer.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    pub ttl: Option<Duration>,
    pub cache_failures: Option<bool>,
    pub failure_ttl: Option<Duration>,
    /// Abandons this caller's wait once cancelled.
    pub cancellation: Option<CancellationToken>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_cache_failures(mut self, cache_failures: bool) -> Self {
        self.cache_failures = Some(cache_failures);
        self
    }

    pub fn with_failure_ttl(mut self, failure_ttl: Duration) -> Self {
        self.failure_ttl = Some(failure_ttl);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

/// The settings a single call ends up using, after applying its [`RunOptions`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Effective {
    pub ttl: Duration,
    pub cache_failures: bool,
    pub failure_ttl: Duration,
}

impl Effective {
    pub fn resolve(config: &Config, options: &RunOptions) -> Self {
        Self {
            ttl: options.ttl.unwrap_or(config.ttl),
            cache_failures: options.cache_failures.unwrap_or(config.cache_failures),
            failure_ttl: options
                .failure_ttl
                .unwrap_or_else(|| config.effective_failure_ttl()),
        }
    }
}
