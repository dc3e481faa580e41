//! Cancellation scopes for a call and its attempts.
//!
//! A [`CallScope`] composes the caller's cancellation token with the total
//! deadline fixed at call start. Each guarded future additionally races an
//! optional per-attempt deadline. Whichever fires first is reported as an
//! [`Interrupt`], so the engine knows exactly which timer won. Timers are
//! plain futures and are dropped with the guard, on every exit path.

use crate::error::{Deadline, Error};
use std::future::{pending, Future};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// What cut a guarded future short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupt {
    /// The total deadline fired.
    Total,
    /// The per-attempt deadline fired.
    Attempt,
    /// The caller's cancellation token fired.
    Cancelled,
}

/// A per-attempt deadline and the timeout it was derived from.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AttemptDeadline {
    at: Instant,
    timeout: Duration,
}

impl AttemptDeadline {
    /// Starts the per-attempt timer now. A zero timeout disables it.
    pub(crate) fn start(timeout: Duration) -> Option<Self> {
        (!timeout.is_zero()).then(|| Self {
            at: Instant::now() + timeout,
            timeout,
        })
    }
}

#[derive(Debug)]
pub(crate) struct CallScope {
    cancel: Option<CancellationToken>,
    total: Option<(Instant, Duration)>,
}

impl CallScope {
    /// Opens a scope. The total timer starts now; a zero timeout disables it.
    pub(crate) fn open(cancel: Option<CancellationToken>, total_timeout: Duration) -> Self {
        let total = (!total_timeout.is_zero()).then(|| (Instant::now() + total_timeout, total_timeout));
        Self { cancel, total }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    pub(crate) fn total_elapsed(&self) -> bool {
        self.total.is_some_and(|(deadline, _)| Instant::now() >= deadline)
    }

    /// Runs `fut` until it completes or the scope is interrupted.
    ///
    /// When several signals are ready at once, the total deadline wins over
    /// the attempt deadline, which wins over cancellation.
    pub(crate) async fn guard<F: Future>(
        &self,
        attempt: Option<AttemptDeadline>,
        fut: F,
    ) -> Result<F::Output, Interrupt> {
        let total = async {
            match self.total {
                Some((deadline, _)) => sleep_until(deadline).await,
                None => pending().await,
            }
        };
        let per_attempt = async {
            match attempt {
                Some(deadline) => sleep_until(deadline.at).await,
                None => pending().await,
            }
        };
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = total => Err(Interrupt::Total),
            _ = per_attempt => Err(Interrupt::Attempt),
            _ = cancelled => Err(Interrupt::Cancelled),
            output = fut => Ok(output),
        }
    }

    /// Sleeps for `delay` unless interrupted first.
    pub(crate) async fn sleep(&self, delay: Duration) -> Result<(), Interrupt> {
        self.guard(None, tokio::time::sleep(delay)).await
    }

    /// Normalizes an interrupt into the matching error.
    pub(crate) fn classify(&self, interrupt: Interrupt, attempt: Option<AttemptDeadline>) -> Error {
        match (interrupt, self.total, attempt) {
            (Interrupt::Total, Some((_, after)), _) => Error::Timeout {
                deadline: Deadline::Total,
                after,
            },
            (Interrupt::Attempt, _, Some(deadline)) => Error::Timeout {
                deadline: Deadline::Attempt,
                after: deadline.timeout,
            },
            _ => Error::aborted(),
        }
    }

    /// The error for a call whose total deadline passed between attempts.
    pub(crate) fn total_timeout_error(&self) -> Error {
        self.classify(Interrupt::Total, None)
    }
}
