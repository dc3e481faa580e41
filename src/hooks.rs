//! Caller-supplied collaborators: observers, error mapping, authentication.
//!
//! Hooks never influence control flow by misbehaving. A panicking observer
//! or error mapper is caught, logged and ignored.

use crate::error::{Error, Failure};
use crate::refresh::RefreshFn;
use crate::response::Response;
use futures::future::BoxFuture;
use http::{HeaderMap, Method, StatusCode};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use url::Url;

/// Maps a normalized error to another one. Returning `None` keeps the original.
pub type ErrorMapper = Arc<dyn Fn(&Error) -> Option<Error> + Send + Sync>;

/// Produces authentication headers, awaited before every attempt.
pub type AuthHeadersFn = Arc<dyn Fn() -> BoxFuture<'static, HeaderMap> + Send + Sync>;

/// Decides whether a status should trigger a credential refresh.
pub type RefreshTrigger = Arc<dyn Fn(StatusCode) -> bool + Send + Sync>;

/// Reports whether the network is reachable.
pub type NetworkCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Accepts or rejects a parsed body with a cause.
pub type Validator = Arc<dyn Fn(&crate::Payload) -> Result<(), String> + Send + Sync>;

/// Describes an attempt about to be sent.
#[derive(Debug, Clone, Copy)]
pub struct RequestInfo<'a> {
    /// The HTTP method.
    pub method: &'a Method,
    /// The resolved URL.
    pub url: &'a Url,
    /// The 1-based attempt number.
    pub attempt: usize,
}

type RequestObserver = Arc<dyn Fn(&RequestInfo<'_>) + Send + Sync>;
type ResponseObserver = Arc<dyn Fn(&Response) + Send + Sync>;
type ErrorObserver = Arc<dyn Fn(&Failure) + Send + Sync>;

/// Fire-and-forget observers.
#[derive(Clone, Default)]
pub(crate) struct Observers {
    pub(crate) on_request: Option<RequestObserver>,
    pub(crate) on_response: Option<ResponseObserver>,
    pub(crate) on_error: Option<ErrorObserver>,
}

impl Observers {
    pub(crate) fn request(&self, info: &RequestInfo<'_>) {
        if let Some(observer) = &self.on_request {
            isolate("on_request", || observer(info));
        }
    }

    pub(crate) fn response(&self, response: &Response) {
        if let Some(observer) = &self.on_response {
            isolate("on_response", || observer(response));
        }
    }

    pub(crate) fn error(&self, failure: &Failure) {
        if let Some(observer) = &self.on_error {
            isolate("on_error", || observer(failure));
        }
    }
}

/// Instance-wide hooks.
#[derive(Clone, Default)]
pub(crate) struct Hooks {
    pub(crate) observers: Observers,
    pub(crate) map_error: Option<ErrorMapper>,
    pub(crate) auth_headers: Option<AuthHeadersFn>,
    pub(crate) refresh: Option<RefreshFn>,
    pub(crate) refresh_trigger: Option<RefreshTrigger>,
    pub(crate) network_check: Option<NetworkCheck>,
}

impl Hooks {
    /// Whether `status` should trigger a refresh. Defaults to 401.
    pub(crate) fn should_refresh(&self, status: StatusCode) -> bool {
        match &self.refresh_trigger {
            Some(trigger) => isolate("refresh_trigger", || trigger(status)).unwrap_or(false),
            None => status == StatusCode::UNAUTHORIZED,
        }
    }

    /// `false` only when a network check is configured and reports offline.
    pub(crate) fn network_available(&self) -> bool {
        match &self.network_check {
            Some(check) => isolate("network_check", || check()).unwrap_or(true),
            None => true,
        }
    }
}

/// Passes `error` through `mapper`, keeping the original if the mapper
/// declines or panics.
pub(crate) fn map_error(mapper: Option<&ErrorMapper>, error: Error) -> Error {
    let Some(mapper) = mapper else {
        return error;
    };
    match isolate("map_error", || mapper(&error)) {
        Some(Some(mapped)) => mapped,
        _ => error,
    }
}

/// Runs a caller hook, swallowing panics.
pub(crate) fn isolate<R>(hook: &'static str, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(hook, "Hook panicked; ignoring");
            None
        }
    }
}
