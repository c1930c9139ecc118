use std::fmt;

use serde::Serialize;

/// The settled result of one execution.
///
/// This is both what gets stored in the [`ResultStore`](crate::ResultStore), and what is
/// broadcast to every caller waiting on that execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    /// The producer returned a value.
    Completed(T),
    /// The producer returned an error.
    Failed(E),
}

impl<T, E> Outcome<T, E> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Completed(value) => Ok(value),
            Self::Failed(error) => Err(error),
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Completed(value),
            Err(error) => Self::Failed(error),
        }
    }
}

/// The path a call took to produce its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Served a completed outcome from the store.
    HitCompleted,
    /// Served a cached failure from the store.
    HitFailed,
    /// Waited for an execution started by another caller.
    InflightHit,
    /// Started a new execution, which completed.
    MissExecuted,
    /// Started a new execution, which failed.
    MissExecutedFailed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HitCompleted => "hit_completed",
            Self::HitFailed => "hit_failed",
            Self::InflightHit => "inflight_hit",
            Self::MissExecuted => "miss_executed",
            Self::MissExecutedFailed => "miss_executed_failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes how a call was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunMeta {
    /// The normalized key, including the configured prefix.
    pub key: String,
    pub status: RunStatus,
}

/// A successful call to [`IdempotencyCache::run_with_outcome`](crate::IdempotencyCache::run_with_outcome).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion<T> {
    pub value: T,
    pub meta: RunMeta,
}

impl<T> Completion<T> {
    pub fn status(&self) -> RunStatus {
        self.meta.status
    }

    pub fn into_value(self) -> T {
        self.value
    }
}
