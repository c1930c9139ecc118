use thiserror::Error;

use crate::cancel::Aborted;
use crate::outcome::RunStatus;

/// The reasons a call to [`IdempotencyCache::run`](crate::IdempotencyCache::run) can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError<E> {
    /// The caller's cancellation token fired before or while it was waiting.
    ///
    /// This only concerns the one caller. The execution it was waiting on, if any, carries on.
    #[error("the operation was aborted")]
    Aborted,
    /// The execution was dropped before it settled.
    ///
    /// This happens when the producer panics, or the runtime shuts down while it is running.
    /// Nothing is cached in that case.
    #[error("the execution was dropped before it settled")]
    Interrupted,
    /// The producer failed.
    ///
    /// `error` is the producer's own error. `status` tells whether it was served from the store
    /// ([`RunStatus::HitFailed`]), observed by waiting on another caller's execution
    /// ([`RunStatus::InflightHit`]), or produced by this caller's own execution
    /// ([`RunStatus::MissExecutedFailed`]).
    #[error("{error}")]
    Failed { error: E, status: RunStatus },
}

impl<E> RunError<E> {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// The path that produced the producer error, if this is one.
    pub fn status(&self) -> Option<RunStatus> {
        match self {
            Self::Failed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the producer's error, if this is one.
    pub fn into_error(self) -> Option<E> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl<E> From<Aborted> for RunError<E> {
    fn from(_: Aborted) -> Self {
        Self::Aborted
    }
}
