//! Long-polling after a successful call.
//!
//! Once a call with a [`PollConfig`] succeeds, a detached task re-runs the
//! same call on a fixed interval and hands every successful result to the
//! update callback. Failed polls are dropped. The task lives until the poll's
//! cancellation token fires.

use crate::engine::{Call, Engine};
use crate::hooks::isolate;
use crate::response::Response;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Long-polling options.
///
/// ```
/// use ricochet::PollConfig;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// let stop = CancellationToken::new();
/// let poll = PollConfig::new(Duration::from_secs(5), stop.clone(), |response| {
///     println!("update: {:?}", response.data);
/// });
/// // Later: stop.cancel();
/// # let _ = poll;
/// ```
#[derive(Clone)]
pub struct PollConfig {
    /// Time between the end of one poll and the start of the next.
    pub interval: Duration,
    /// Stops the poller. Checked before and after every sleep.
    pub cancel: CancellationToken,
    /// Receives every successful poll result.
    pub on_update: Arc<dyn Fn(Response) + Send + Sync>,
}

impl PollConfig {
    /// Creates a poll configuration.
    pub fn new(
        interval: Duration,
        cancel: CancellationToken,
        on_update: impl Fn(Response) + Send + Sync + 'static,
    ) -> Self {
        Self {
            interval,
            cancel,
            on_update: Arc::new(on_update),
        }
    }
}

impl fmt::Debug for PollConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollConfig")
            .field("interval", &self.interval)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

/// Spawns the poller for `call`.
///
/// Each poll runs as a background pass: it neither reads nor writes the cache
/// and cannot start another poller.
pub(crate) fn spawn(engine: Arc<Engine>, call: Call, config: PollConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut polls = 0usize;
        loop {
            if config.cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = config.cancel.cancelled() => break,
                _ = tokio::time::sleep(config.interval) => {}
            }
            if config.cancel.is_cancelled() {
                break;
            }

            polls += 1;
            let outcome = tokio::select! {
                _ = config.cancel.cancelled() => break,
                outcome = engine.execute(&call, true) => outcome,
            };
            match outcome {
                Ok(response) => {
                    isolate("on_update", || (config.on_update)(response));
                }
                Err(failure) => {
                    tracing::debug!(poll = polls, error = %failure.error, "Dropping failed poll");
                }
            }
        }
        tracing::debug!(polls, "Long-polling stopped");
    })
}
