//! Retry decisions and backoff delays.
//!
//! A [`RetryConfig`] bounds how many transport invocations a call may make and
//! how long to wait between them. A [`RetryPredicate`] decides whether a given
//! attempt outcome, failed *or* successful, should be retried.

use crate::body::Payload;
use crate::transport::RawResponse;
use crate::Error;
use http::{HeaderMap, StatusCode};
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Default base delay for exponential backoff.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(300);

/// Default cap for exponential backoff.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(2000);

/// Fraction of the backoff delay added as random jitter, at most.
const JITTER_RATIO: f64 = 0.2;

/// How often and how patiently to retry.
///
/// # Examples
///
/// ```
/// use ricochet::RetryConfig;
/// use std::time::Duration;
///
/// // Up to 5 transport invocations, polling until the body says "ready".
/// let config = RetryConfig::times(5)
///     .delays(Duration::from_millis(50), Duration::from_secs(1))
///     .retry_on(|ctx: &ricochet::RetryContext<'_>| {
///         ctx.data
///             .and_then(|d| d.field("status"))
///             .is_some_and(|s| s == "pending")
///     });
/// assert_eq!(config.times, 5);
/// ```
#[derive(Clone)]
pub struct RetryConfig {
    /// Total number of transport invocations allowed, first attempt included.
    pub times: usize,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Upper bound for any computed backoff delay.
    pub max_delay: Duration,
    /// Sole authority on retrying when set; otherwise [`RetryOnRetryable`] applies.
    pub retry_on: Option<Arc<dyn RetryPredicate>>,
}

impl RetryConfig {
    /// Allows up to `times` transport invocations with default delays.
    pub fn times(times: usize) -> Self {
        Self {
            times,
            ..Self::default()
        }
    }

    /// Sets the base and maximum backoff delays.
    pub fn delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Replaces the default predicate.
    pub fn retry_on(mut self, predicate: impl RetryPredicate + 'static) -> Self {
        self.retry_on = Some(Arc::new(predicate));
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            times: 0,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            retry_on: None,
        }
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("times", &self.times)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("retry_on", &self.retry_on.as_ref().map(|_| ".."))
            .finish()
    }
}

/// What a [`RetryPredicate`] sees about the attempt that just finished.
#[derive(Debug, Clone, Copy)]
pub struct RetryContext<'a> {
    /// The 1-based attempt number.
    pub attempt: usize,
    /// The normalized error, if the attempt failed.
    pub error: Option<&'a Error>,
    /// The response, if one was received.
    pub response: Option<&'a RawResponse>,
    /// The parsed body of a successful response.
    pub data: Option<&'a Payload>,
}

impl RetryContext<'_> {
    /// The response status, if a response was received.
    pub fn status(&self) -> Option<StatusCode> {
        self.response.map(|r| r.status)
    }
}

/// Decides whether an attempt outcome should be retried.
///
/// Closures taking a [`RetryContext`] implement this trait.
///
/// ```
/// use ricochet::{Error, RetryContext, RetryPredicate};
///
/// struct RetryOnRateLimit;
///
/// impl RetryPredicate for RetryOnRateLimit {
///     fn should_retry(&self, ctx: &RetryContext<'_>) -> bool {
///         ctx.status().is_some_and(|s| s.as_u16() == 429)
///     }
/// }
/// ```
pub trait RetryPredicate: Send + Sync {
    /// Returns `true` to schedule another attempt.
    fn should_retry(&self, ctx: &RetryContext<'_>) -> bool;
}

impl<F> RetryPredicate for F
where
    F: Fn(&RetryContext<'_>) -> bool + Send + Sync,
{
    fn should_retry(&self, ctx: &RetryContext<'_>) -> bool {
        self(ctx)
    }
}

/// The default predicate: retry errors that [`Error::is_retryable`] accepts.
///
/// Successful attempts are never retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnRetryable;

impl RetryPredicate for RetryOnRetryable {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> bool {
        ctx.error.is_some_and(Error::is_retryable)
    }
}

/// Retry only on 5xx server errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryOn5xx;

impl RetryPredicate for RetryOn5xx {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> bool {
        matches!(ctx.error, Some(Error::Http { status, .. }) if status.as_u16() >= 500)
    }
}

/// Retry only on timeout errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnTimeout;

impl RetryPredicate for RetryOnTimeout {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> bool {
        matches!(ctx.error, Some(Error::Timeout { .. }))
    }
}

/// Retry only on network/connection errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnConnectionError;

impl RetryPredicate for RetryOnConnectionError {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> bool {
        matches!(ctx.error, Some(Error::Network { .. }))
    }
}

/// Combine multiple retry predicates with OR logic.
///
/// Retries if ANY of the predicates return `true`.
pub struct OrPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl OrPredicate {
    /// Creates a new `OrPredicate` from a list of predicates.
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for OrPredicate {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> bool {
        self.predicates.iter().any(|p| p.should_retry(ctx))
    }
}

/// Combine multiple retry predicates with AND logic.
///
/// Retries only if ALL of the predicates return `true`. Handy for gating the
/// default behaviour to idempotent methods.
pub struct AndPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl AndPredicate {
    /// Creates a new `AndPredicate` from a list of predicates.
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for AndPredicate {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> bool {
        self.predicates.iter().all(|p| p.should_retry(ctx))
    }
}

/// Decides whether to make another attempt after `ctx.attempt`.
///
/// The attempt budget is a hard stop. Within it, a custom predicate is the
/// sole authority; without one, [`RetryOnRetryable`] decides.
pub fn should_retry(config: &RetryConfig, ctx: &RetryContext<'_>) -> bool {
    if ctx.attempt >= config.times {
        return false;
    }
    match &config.retry_on {
        Some(predicate) => predicate.should_retry(ctx),
        None => RetryOnRetryable.should_retry(ctx),
    }
}

/// The un-jittered backoff for `attempt`: `min(max, base * 2^(attempt-1))`.
pub fn base_backoff(attempt: usize, base_delay: Duration, max_delay: Duration) -> Duration {
    let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    let multiplier = 2u32.saturating_pow(exponent);
    base_delay.saturating_mul(multiplier).min(max_delay)
}

/// The backoff for `attempt` plus up to 20% random jitter, rounded to the
/// millisecond and never above `max_delay`.
pub fn backoff_delay(attempt: usize, base_delay: Duration, max_delay: Duration) -> Duration {
    let base = base_backoff(attempt, base_delay, max_delay);
    let base_ms = base.as_secs_f64() * 1000.0;
    let jitter_ms = rand::thread_rng().gen_range(0.0..=JITTER_RATIO) * base_ms;
    Duration::from_millis((base_ms + jitter_ms).round() as u64).min(max_delay)
}

/// Parses a `Retry-After` header.
///
/// Integer seconds are tried first, then an HTTP date, which is converted to
/// the time remaining from now (zero if it has passed).
pub fn retry_after_delay(headers: &HeaderMap) -> Option<Duration> {
    let header = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = header.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = httpdate::parse_http_date(header).ok()?;
    Some(
        date.duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO),
    )
}

/// The delay before the attempt following `attempt`.
///
/// A 429 with a `Retry-After` header overrides the computed backoff.
pub(crate) fn delay_for(
    config: &RetryConfig,
    attempt: usize,
    response: Option<&RawResponse>,
) -> Duration {
    if let Some(response) = response {
        if response.status == StatusCode::TOO_MANY_REQUESTS {
            if let Some(delay) = retry_after_delay(&response.headers) {
                return delay;
            }
        }
    }
    backoff_delay(attempt, config.base_delay, config.max_delay)
}
