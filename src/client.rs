//! The client: configuration, the `call` entry point and per-method helpers.
//!
//! The [`Client`] type is the main entry point for making requests.
//! Use [`ClientBuilder`] to configure and create clients.

use crate::body::{ParseMode, RequestBody};
use crate::cache::ResponseCache;
use crate::engine::{Call, Engine};
use crate::error::{ConfigError, Error, Failure};
use crate::hooks::{Hooks, RequestInfo};
use crate::polling;
use crate::refresh::{refresh_fn, BoxError, RefreshCoordinator};
use crate::request::RequestOptions;
use crate::response::Response;
use crate::target::{Query, Target};
use crate::transport::{ReqwestTransport, Transport};
use crate::Result;
use futures::FutureExt;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// An HTTP client that orchestrates timeouts, retries, credential refresh,
/// caching and long-polling around a [`Transport`].
///
/// The client is cheap to clone and designed to be shared. Clones share the
/// response cache and the refresh coordinator.
///
/// # Examples
///
/// ```no_run
/// use ricochet::{Client, RequestOptions, RetryConfig};
/// use http::Method;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .timeout(Duration::from_secs(5))
///     .total_timeout(Duration::from_secs(30))
///     .build()?;
///
/// // GET with defaults
/// let hello = client.get("/hello").await?;
/// println!("hello = {:?}", hello.data.field("hello"));
///
/// // A call with per-call options
/// let options = RequestOptions::new(Method::POST)
///     .with_json(&serde_json::json!({"name": "Alice"}))?
///     .retries(RetryConfig::times(3));
/// let created = client.call("/users", options).await?;
/// println!("created after {} attempt(s)", created.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<Engine>,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Runs a logical call.
    ///
    /// Never fails across the boundary with anything but a [`Failure`]: the
    /// result is either the accepted response or one normalized error plus
    /// the response that caused it, if any.
    ///
    /// If `options` carry a [`PollConfig`](crate::PollConfig) and the call
    /// succeeds, a background poller is started before this returns.
    pub async fn call(&self, target: impl Into<Target>, options: RequestOptions) -> Result<Response> {
        let call = Call {
            target: target.into(),
            options,
        };
        let outcome = self.inner.execute(&call, false).await;

        if outcome.is_ok() {
            if let Some(poll) = call.options.poll.clone() {
                polling::spawn(Arc::clone(&self.inner), call, poll);
            }
        }
        outcome
    }

    /// Makes a GET request.
    pub async fn get(&self, target: impl Into<Target>) -> Result<Response> {
        self.call(target, RequestOptions::new(Method::GET)).await
    }

    /// Makes a POST request with the given body.
    pub async fn post(
        &self,
        target: impl Into<Target>,
        body: impl Into<RequestBody>,
    ) -> Result<Response> {
        self.call(target, RequestOptions::new(Method::POST).with_body(body))
            .await
    }

    /// Makes a PUT request with the given body.
    pub async fn put(
        &self,
        target: impl Into<Target>,
        body: impl Into<RequestBody>,
    ) -> Result<Response> {
        self.call(target, RequestOptions::new(Method::PUT).with_body(body))
            .await
    }

    /// Makes a PATCH request with the given body.
    pub async fn patch(
        &self,
        target: impl Into<Target>,
        body: impl Into<RequestBody>,
    ) -> Result<Response> {
        self.call(target, RequestOptions::new(Method::PATCH).with_body(body))
            .await
    }

    /// Makes a DELETE request.
    pub async fn delete(&self, target: impl Into<Target>) -> Result<Response> {
        self.call(target, RequestOptions::new(Method::DELETE)).await
    }

    /// The response cache shared by this client and its clones.
    pub fn cache(&self) -> &ResponseCache {
        &self.inner.cache
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use ricochet::ClientBuilder;
/// use http::{HeaderMap, HeaderValue, StatusCode};
/// use std::sync::{Arc, RwLock};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), ricochet::ConfigError> {
/// let token = Arc::new(RwLock::new(String::from("initial")));
/// let reader = Arc::clone(&token);
/// let writer = Arc::clone(&token);
///
/// let client = ClientBuilder::new()
///     .base_url("https://api.example.com")?
///     .default_header("User-Agent", "my-app/1.0")?
///     .timeout(Duration::from_secs(10))
///     .auth_headers(move || {
///         let token = reader.read().unwrap().clone();
///         async move {
///             let mut headers = HeaderMap::new();
///             if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
///                 headers.insert("authorization", value);
///             }
///             headers
///         }
///     })
///     .refresh_token(move || {
///         let writer = Arc::clone(&writer);
///         async move {
///             *writer.write().unwrap() = String::from("rotated");
///             Ok::<(), std::io::Error>(())
///         }
///     })
///     .refresh_when(|status| status == StatusCode::UNAUTHORIZED)
///     .build()?;
/// # let _ = client;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    base_url: Option<Url>,
    default_headers: HeaderMap,
    default_query: Query,
    timeout: Duration,
    total_timeout: Duration,
    parse_mode: ParseMode,
    hooks: Hooks,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings: no base URL, no
    /// timeouts, JSON parsing and the `reqwest` transport.
    pub fn new() -> Self {
        Self {
            transport: None,
            base_url: None,
            default_headers: HeaderMap::new(),
            default_query: Query::new(),
            timeout: Duration::ZERO,
            total_timeout: Duration::ZERO,
            parse_mode: ParseMode::default(),
            hooks: Hooks::default(),
        }
    }

    /// Sets the base URL that relative targets are resolved against.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> std::result::Result<Self, ConfigError> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> std::result::Result<Self, ConfigError> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| ConfigError::InvalidHeader(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| ConfigError::InvalidHeader(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Adds a default query parameter, sent before any per-call query.
    pub fn default_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_query.push((key.into(), Some(value.into())));
        self
    }

    /// Sets the default per-attempt timeout. Zero disables it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the default total timeout. Zero disables it.
    pub fn total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = timeout;
        self
    }

    /// Sets the default parse mode.
    pub fn parse_mode(mut self, mode: ParseMode) -> Self {
        self.parse_mode = mode;
        self
    }

    /// Replaces the transport.
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Maps every terminal error. Returning `None` keeps the original.
    pub fn map_error(
        mut self,
        mapper: impl Fn(&Error) -> Option<Error> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.map_error = Some(Arc::new(mapper));
        self
    }

    /// Observes every attempt just before it is sent.
    pub fn on_request(mut self, observer: impl Fn(&RequestInfo<'_>) + Send + Sync + 'static) -> Self {
        self.hooks.observers.on_request = Some(Arc::new(observer));
        self
    }

    /// Observes every successful terminal result.
    pub fn on_response(mut self, observer: impl Fn(&Response) + Send + Sync + 'static) -> Self {
        self.hooks.observers.on_response = Some(Arc::new(observer));
        self
    }

    /// Observes every failed terminal result, after error mapping.
    pub fn on_error(mut self, observer: impl Fn(&Failure) + Send + Sync + 'static) -> Self {
        self.hooks.observers.on_error = Some(Arc::new(observer));
        self
    }

    /// Provides authentication headers, awaited before every attempt.
    pub fn auth_headers<F, Fut>(mut self, provider: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HeaderMap> + Send + 'static,
    {
        self.hooks.auth_headers = Some(Arc::new(move || provider().boxed()));
        self
    }

    /// Sets the credential refresh operation.
    pub fn refresh_token<F, Fut, E>(mut self, refresh: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.hooks.refresh = Some(refresh_fn(refresh));
        self
    }

    /// Sets which statuses trigger a refresh. Defaults to 401.
    pub fn refresh_when(mut self, trigger: impl Fn(StatusCode) -> bool + Send + Sync + 'static) -> Self {
        self.hooks.refresh_trigger = Some(Arc::new(trigger));
        self
    }

    /// Checks network availability before each call.
    pub fn network_check(mut self, check: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.hooks.network_check = Some(Arc::new(check));
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if the default transport cannot be created.
    pub fn build(self) -> std::result::Result<Client, ConfigError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                ReqwestTransport::new()
                    .map_err(|e| ConfigError::Transport(Arc::from(e.to_string())))?,
            ),
        };

        Ok(Client {
            inner: Arc::new(Engine {
                transport,
                base_url: self.base_url,
                default_headers: self.default_headers,
                default_query: self.default_query,
                timeout: self.timeout,
                total_timeout: self.total_timeout,
                parse_mode: self.parse_mode,
                hooks: self.hooks,
                cache: ResponseCache::new(),
                refresh: RefreshCoordinator::new(),
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
