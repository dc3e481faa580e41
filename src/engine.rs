//! The attempt loop.
//!
//! One logical call runs as one or two *passes*. A pass resolves the target,
//! consults the cache, opens the total-timeout scope and then loops over
//! attempts until it reaches a terminal result. A pass that sees the refresh
//! trigger awaits the shared refresh inside its own scope, so the caller's
//! cancellation and the total deadline still apply, then hands control back to
//! [`Engine::execute`], which runs a second pass flagged as a refresh retry.
//! That flag stops the second pass from refreshing again.

use crate::body::{parse_body, ParseMode, Payload};
use crate::cache::{cache_key, ResponseCache};
use crate::error::{Error, Failure, Result};
use crate::hooks::{isolate, map_error, Hooks, RequestInfo};
use crate::refresh::RefreshCoordinator;
use crate::request::RequestOptions;
use crate::response::Response;
use crate::retry::{self, RetryContext};
use crate::scope::{AttemptDeadline, CallScope, Interrupt};
use crate::target::{build_url, Query, Target};
use crate::transport::{RawResponse, Transport, TransportRequest};
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::HeaderMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// A logical call: where to send it and how.
#[derive(Clone, Debug)]
pub(crate) struct Call {
    pub(crate) target: Target,
    pub(crate) options: RequestOptions,
}

/// Instance state shared by every call made through one client.
pub(crate) struct Engine {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) base_url: Option<Url>,
    pub(crate) default_headers: HeaderMap,
    pub(crate) default_query: Query,
    pub(crate) timeout: Duration,
    pub(crate) total_timeout: Duration,
    pub(crate) parse_mode: ParseMode,
    pub(crate) hooks: Hooks,
    pub(crate) cache: ResponseCache,
    pub(crate) refresh: RefreshCoordinator,
}

/// How a pass ended.
enum Pass {
    Done(Result<Response>),
    /// The refresh trigger matched and the shared refresh succeeded.
    Refreshed,
}

/// How a single attempt ended, before any retry decision.
enum Attempt {
    Received(RawResponse),
    /// A retryable-in-principle failure without a response.
    Failed(Error),
    /// Cancellation or the total deadline. Never retried.
    Interrupted(Error),
}

/// A classified attempt outcome that the retry policy can inspect.
struct Settled {
    outcome: std::result::Result<Payload, Error>,
    response: Option<RawResponse>,
}

impl Settled {
    fn context(&self, attempt: usize) -> RetryContext<'_> {
        RetryContext {
            attempt,
            error: self.outcome.as_ref().err(),
            response: self.response.as_ref(),
            data: self.outcome.as_ref().ok(),
        }
    }
}

impl Engine {
    /// Runs a logical call to its terminal result.
    ///
    /// `background` marks long-polling iterations, which bypass the cache.
    pub(crate) async fn execute(&self, call: &Call, background: bool) -> Result<Response> {
        let started = Instant::now();
        let mut refresh_retry = false;

        let outcome = loop {
            match self.pass(call, started, background, refresh_retry).await {
                Pass::Done(outcome) => break outcome,
                Pass::Refreshed => refresh_retry = true,
            }
        };

        self.finish(call, outcome)
    }

    /// Awaits the shared refresh within `scope`.
    ///
    /// A rejected refresh reports `failure`, the response that triggered it.
    /// Cancellation and the total deadline end the call like anywhere else.
    async fn await_refresh(&self, scope: &CallScope, failure: Failure) -> Pass {
        let Some(refresh) = self.hooks.refresh.as_ref() else {
            return Pass::Done(Err(failure));
        };
        match scope.guard(None, self.refresh.ensure_refreshed(refresh)).await {
            Ok(Ok(())) => Pass::Refreshed,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Refresh failed; reporting the original response");
                Pass::Done(Err(failure))
            }
            Err(interrupt) => Pass::Done(Err(Failure::new(scope.classify(interrupt, None)))),
        }
    }

    /// Maps errors and notifies observers.
    fn finish(&self, call: &Call, outcome: Result<Response>) -> Result<Response> {
        match outcome {
            Ok(response) => {
                self.hooks.observers.response(&response);
                Ok(response)
            }
            Err(mut failure) => {
                let mapper = call.options.map_error.as_ref().or(self.hooks.map_error.as_ref());
                failure.error = map_error(mapper, failure.error);
                self.hooks.observers.error(&failure);
                Err(failure)
            }
        }
    }

    async fn pass(
        &self,
        call: &Call,
        started: Instant,
        background: bool,
        refresh_retry: bool,
    ) -> Pass {
        let options = &call.options;
        let scope = CallScope::open(
            options.cancel.clone(),
            options.total_timeout.unwrap_or(self.total_timeout),
        );
        let attempt_timeout = options.timeout.unwrap_or(self.timeout);
        let parse_mode = options.parse_mode.unwrap_or(self.parse_mode);
        let retry = options.retry.clone().unwrap_or_default();
        let cache = options.cache.as_ref().filter(|_| !background);

        if !self.hooks.network_available() {
            return Pass::Done(Err(Failure::new(Error::network("network unavailable"))));
        }

        let mut url = match self.resolve_url(call) {
            Ok(url) => url,
            Err(failure) => return Pass::Done(Err(failure)),
        };
        let key = cache_key(&options.method, &url);

        if let Some(policy) = cache.filter(|_| !refresh_retry) {
            if let Some(stale) = self.cache.lookup(&key, policy.cache_time) {
                if let Some(on_stale) = &policy.on_stale {
                    isolate("on_stale", || on_stale(&stale));
                }
            }
        }

        let body = options.body.as_ref().map(|body| body.encode());
        let mut attempt = 0;

        loop {
            attempt += 1;
            if attempt > 1 {
                url = match self.resolve_url(call) {
                    Ok(url) => url,
                    Err(failure) => return Pass::Done(Err(failure)),
                };
            }

            if scope.is_cancelled() {
                return Pass::Done(Err(Failure::new(Error::aborted())));
            }
            if scope.total_elapsed() {
                return Pass::Done(Err(Failure::new(scope.total_timeout_error())));
            }

            let deadline = AttemptDeadline::start(attempt_timeout);
            let settled = match self
                .attempt(call, &scope, deadline, &url, body.as_ref(), attempt)
                .await
            {
                Attempt::Interrupted(error) => return Pass::Done(Err(Failure::new(error))),
                Attempt::Failed(error) => Settled {
                    outcome: Err(error),
                    response: None,
                },
                Attempt::Received(raw) => {
                    let data = parse_body(&raw, parse_mode);
                    if !raw.status.is_success() {
                        let error = Error::http(raw.status, data);
                        if !refresh_retry
                            && self.hooks.refresh.is_some()
                            && self.hooks.should_refresh(raw.status)
                        {
                            let failure = Failure::with_response(error, raw);
                            return self.await_refresh(&scope, failure).await;
                        }
                        Settled {
                            outcome: Err(error),
                            response: Some(raw),
                        }
                    } else {
                        let outcome = match &options.validator {
                            Some(validate) => match isolate("validator", || validate(&data)) {
                                Some(Err(cause)) => Err(Error::validation(cause)),
                                None => Err(Error::validation("validator panicked")),
                                Some(Ok(())) => Ok(data),
                            },
                            None => Ok(data),
                        };
                        Settled {
                            outcome,
                            response: Some(raw),
                        }
                    }
                }
            };

            if let Err(error) = &settled.outcome {
                tracing::warn!(
                    error = %error,
                    attempt = attempt,
                    method = %options.method,
                    url = %url,
                    "Request failed"
                );
            }

            if scope.is_cancelled() || !retry::should_retry(&retry, &settled.context(attempt)) {
                return Pass::Done(self.conclude(settled, cache.map(|_| key), started, attempt));
            }

            let delay = retry::delay_for(&retry, attempt, settled.response.as_ref());
            tracing::info!(
                delay_ms = delay.as_millis() as u64,
                attempt = attempt,
                "Retrying request after delay"
            );
            if let Err(interrupt) = scope.sleep(delay).await {
                return Pass::Done(Err(Failure::new(scope.classify(interrupt, None))));
            }
        }
    }

    /// Turns the final attempt into the pass result, caching successes.
    fn conclude(
        &self,
        settled: Settled,
        cache_key: Option<String>,
        started: Instant,
        attempts: usize,
    ) -> Result<Response> {
        match (settled.outcome, settled.response) {
            (Ok(data), Some(raw)) => {
                if let Some(key) = cache_key {
                    self.cache.store(key, data.clone());
                }
                Ok(Response::new(data, raw, started.elapsed(), attempts))
            }
            (Ok(_), None) => Err(Failure::new(Error::network("no response received"))),
            (Err(error), response) => Err(Failure { error, response }),
        }
    }

    /// Performs one transport exchange inside `scope`.
    async fn attempt(
        &self,
        call: &Call,
        scope: &CallScope,
        deadline: Option<AttemptDeadline>,
        url: &Url,
        body: Option<&(Bytes, Option<&'static str>)>,
        attempt: usize,
    ) -> Attempt {
        let options = &call.options;
        let interrupted = |interrupt: Interrupt| {
            let error = scope.classify(interrupt, deadline);
            match interrupt {
                Interrupt::Attempt => Attempt::Failed(error),
                Interrupt::Total | Interrupt::Cancelled => Attempt::Interrupted(error),
            }
        };

        let mut headers = self.default_headers.clone();
        headers.extend(options.headers.clone());
        if let Some((_, Some(content_type))) = body {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
        }
        if let Some(auth_headers) = &self.hooks.auth_headers {
            match scope.guard(deadline, auth_headers()).await {
                Ok(auth) => headers.extend(auth),
                Err(interrupt) => return interrupted(interrupt),
            }
        }

        tracing::debug!(
            method = %options.method,
            url = %url,
            attempt = attempt,
            "Executing HTTP request"
        );
        self.hooks.observers.request(&RequestInfo {
            method: &options.method,
            url,
            attempt,
        });

        let request = TransportRequest {
            method: options.method.clone(),
            url: url.clone(),
            headers,
            body: body.map(|(bytes, _)| bytes.clone()),
        };

        match scope.guard(deadline, self.transport.perform(request)).await {
            Ok(Ok(raw)) => {
                tracing::debug!(
                    status = raw.status.as_u16(),
                    attempt = attempt,
                    "Received HTTP response"
                );
                Attempt::Received(raw)
            }
            Ok(Err(e)) => Attempt::Failed(e.into()),
            Err(interrupt) => interrupted(interrupt),
        }
    }

    fn resolve_url(&self, call: &Call) -> Result<Url> {
        let target = call.target.resolve();
        let query = call.options.query.resolve();
        build_url(self.base_url.as_ref(), &target, &self.default_query, &query).map_err(|e| {
            Failure::new(Error::network(format!("invalid request URL {target:?}: {e}")))
        })
    }
}
