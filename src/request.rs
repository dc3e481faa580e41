//! Per-call options.

use crate::body::{ParseMode, Payload, RequestBody};
use crate::cache::CachePolicy;
use crate::error::{ConfigError, Error};
use crate::hooks::{ErrorMapper, Validator};
use crate::polling::PollConfig;
use crate::retry::RetryConfig;
use crate::target::{Query, Resolvable};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Everything about one logical call except its target.
///
/// Options are read-only for the lifetime of the call, including any
/// background polls it starts. Unset values fall back to the client's
/// defaults.
///
/// # Examples
///
/// ```
/// use ricochet::{RequestOptions, RetryConfig};
/// use http::Method;
/// use std::time::Duration;
///
/// let options = RequestOptions::new(Method::POST)
///     .with_header("x-request-id", "abc-123")?
///     .with_query_param("dry_run", "true")
///     .with_json(&serde_json::json!({"name": "Alice"}))?
///     .timeout(Duration::from_secs(2))
///     .total_timeout(Duration::from_secs(10))
///     .retries(RetryConfig::times(3));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct RequestOptions {
    /// The HTTP method.
    pub method: Method,
    /// Headers for this call, overriding client defaults with the same name.
    pub headers: HeaderMap,
    /// Query parameters, appended after the client's default query.
    pub query: Resolvable<Query>,
    /// The request body.
    pub body: Option<RequestBody>,
    /// Overrides the client's parse mode.
    pub parse_mode: Option<ParseMode>,
    /// Overrides the client's per-attempt timeout. Zero disables it.
    pub timeout: Option<Duration>,
    /// Overrides the client's total timeout. Zero disables it.
    pub total_timeout: Option<Duration>,
    /// Retry budget and policy. `None` means a single attempt.
    pub retry: Option<RetryConfig>,
    /// Enables the response cache for this call.
    pub cache: Option<CachePolicy>,
    /// Starts background polling after a successful call.
    pub poll: Option<PollConfig>,
    /// Cancels the call, including any in-flight attempt.
    pub cancel: Option<CancellationToken>,
    /// Rejects successful bodies with a validation error.
    pub validator: Option<Validator>,
    /// Overrides the client's error mapper.
    pub map_error: Option<ErrorMapper>,
}

impl RequestOptions {
    /// Creates options for `method` with everything else unset.
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            query: Resolvable::default(),
            body: None,
            parse_mode: None,
            timeout: None,
            total_timeout: None,
            retry: None,
            cache: None,
            poll: None,
            cancel: None,
            validator: None,
            map_error: None,
        }
    }

    /// Adds a header to the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, ConfigError> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| ConfigError::InvalidHeader(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| ConfigError::InvalidHeader(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Adds a query parameter.
    ///
    /// If the query is computed per attempt, the pair is appended to every
    /// computed query.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let pair = (key.into(), Some(value.into()));
        self.query = match self.query {
            Resolvable::Value(mut query) => {
                query.push(pair);
                Resolvable::Value(query)
            }
            Resolvable::Producer(produce) => Resolvable::from_fn(move || {
                let mut query = produce();
                query.push(pair.clone());
                query
            }),
        };
        self
    }

    /// Computes the query afresh for every attempt.
    pub fn with_query_fn(mut self, produce: impl Fn() -> Query + Send + Sync + 'static) -> Self {
        self.query = Resolvable::from_fn(produce);
        self
    }

    /// Sets the request body.
    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the JSON request body.
    pub fn with_json<T: serde::Serialize + ?Sized>(
        mut self,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        self.body = Some(RequestBody::json(value)?);
        Ok(self)
    }

    /// Sets how the response body is parsed.
    pub fn parse_as(mut self, mode: ParseMode) -> Self {
        self.parse_mode = Some(mode);
        self
    }

    /// Sets the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the total timeout.
    pub fn total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = Some(timeout);
        self
    }

    /// Sets the retry configuration.
    pub fn retries(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Enables caching.
    pub fn cached(mut self, policy: CachePolicy) -> Self {
        self.cache = Some(policy);
        self
    }

    /// Enables background polling after the first success.
    pub fn long_polling(mut self, poll: PollConfig) -> Self {
        self.poll = Some(poll);
        self
    }

    /// Ties the call to a cancellation token.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Validates successful bodies; an `Err` becomes a validation error.
    pub fn validate(
        mut self,
        validator: impl Fn(&Payload) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Maps errors for this call. Returning `None` keeps the original.
    pub fn map_error(
        mut self,
        mapper: impl Fn(&Error) -> Option<Error> + Send + Sync + 'static,
    ) -> Self {
        self.map_error = Some(Arc::new(mapper));
        self
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("query", &self.query)
            .field("body", &self.body)
            .field("parse_mode", &self.parse_mode)
            .field("timeout", &self.timeout)
            .field("total_timeout", &self.total_timeout)
            .field("retry", &self.retry)
            .field("cache", &self.cache)
            .field("poll", &self.poll)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}
