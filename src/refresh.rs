//! Single-flight credential refresh.
//!
//! When several in-flight calls discover expired credentials at the same time,
//! only the first one starts the refresh. Everyone else awaits that same
//! operation. The pending slot is cleared as soon as the refresh settles,
//! whatever its outcome, so a failed refresh never wedges later calls.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Boxed error type returned by refresh operations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A refresh operation, invoked once per single-flight round.
pub type RefreshFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Adapts an async function into a [`RefreshFn`].
pub fn refresh_fn<F, Fut, E>(f: F) -> RefreshFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError>,
{
    Arc::new(move || f().map(|outcome| outcome.map_err(Into::into)).boxed())
}

/// The shared refresh failed.
#[derive(thiserror::Error, Debug, Clone)]
#[error("credential refresh failed: {0}")]
pub struct RefreshError(Arc<str>);

type SharedRefresh = Shared<BoxFuture<'static, Result<(), RefreshError>>>;

struct InFlight {
    id: u64,
    operation: SharedRefresh,
}

/// Coordinates at most one in-flight refresh per client.
#[derive(Clone, Default)]
pub struct RefreshCoordinator {
    pending: Arc<Mutex<Option<InFlight>>>,
    next_id: Arc<AtomicU64>,
}

impl RefreshCoordinator {
    /// Creates an idle coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` while a refresh is in flight.
    pub fn is_refreshing(&self) -> bool {
        lock(&self.pending).is_some()
    }

    /// Waits for the in-flight refresh, starting one with `refresh` if none is.
    ///
    /// The check-or-start step happens under one lock acquisition, so two
    /// callers can never both start a refresh. The operation runs on its own
    /// task and settles even if every waiter goes away.
    pub async fn ensure_refreshed(&self, refresh: &RefreshFn) -> Result<(), RefreshError> {
        let operation = {
            let mut slot = lock(&self.pending);
            match slot.as_ref() {
                Some(in_flight) => {
                    tracing::debug!(refresh_id = in_flight.id, "Joining in-flight credential refresh");
                    in_flight.operation.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let operation = self.start(id, refresh);
                    *slot = Some(InFlight {
                        id,
                        operation: operation.clone(),
                    });
                    operation
                }
            }
        };

        operation.await
    }

    fn start(&self, id: u64, refresh: &RefreshFn) -> SharedRefresh {
        tracing::info!(refresh_id = id, "Starting credential refresh");

        let pending = Arc::clone(&self.pending);
        let refresh = refresh();
        let task = tokio::spawn(async move {
            let outcome = refresh
                .await
                .map_err(|e| RefreshError(Arc::from(e.to_string())));

            // Runs before any waiter observes the outcome.
            let mut slot = lock(&pending);
            if slot.as_ref().is_some_and(|in_flight| in_flight.id == id) {
                *slot = None;
            }
            drop(slot);

            match &outcome {
                Ok(()) => tracing::info!(refresh_id = id, "Credential refresh succeeded"),
                Err(e) => tracing::warn!(refresh_id = id, error = %e, "Credential refresh failed"),
            }
            outcome
        });

        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(RefreshError(Arc::from(e.to_string()))),
            }
        }
        .boxed()
        .shared()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
