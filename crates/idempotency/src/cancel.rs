//! Per-caller cancellation of a shared wait.
//!
//! Many callers may wait on the same execution. Each of them can bring its own
//! [`CancellationToken`] and stop waiting independently via [`with_caller_abort`]. Abandoning a
//! wait only drops that caller's handle to the shared future. It never cancels the execution
//! itself, and it does not affect any other caller's wait.

use std::future::Future;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// The caller's cancellation token fired before the awaited future resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("the operation was aborted")]
pub struct Aborted;

/// Awaits `future`, unless `token` is cancelled first.
///
/// Resolves with the output of `future`, or fails with [`Aborted`] as soon as the token is
/// cancelled, whichever happens first. A token that is already cancelled fails right away
/// without polling `future`. When both are ready at the same time, the cancellation wins.
///
/// The registration on the token lives inside the returned future and is released as soon as
/// either side resolves, or when the returned future is dropped.
pub async fn with_caller_abort<F>(
    future: F,
    token: Option<&CancellationToken>,
) -> Result<F::Output, Aborted>
where
    F: Future,
{
    let Some(token) = token else {
        return Ok(future.await);
    };
    if token.is_cancelled() {
        return Err(Aborted);
    }

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Aborted),
        output = future => Ok(output),
    }
}
