//! The single-exchange transport the engine drives.
//!
//! A [`Transport`] performs exactly one HTTP exchange and reports either a
//! fully-read [`RawResponse`] (whatever its status) or a [`TransportError`].
//! Cancellation is expressed by dropping the returned future; the engine does
//! that when a deadline or the caller's cancellation signal fires.

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use http::{HeaderMap, Method, StatusCode};
use std::future::Future;
use std::sync::Arc;
use url::Url;

/// One outgoing exchange.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// The HTTP method.
    pub method: Method,
    /// The fully resolved URL, query included.
    pub url: Url,
    /// Merged default, per-call and authentication headers.
    pub headers: HeaderMap,
    /// The encoded body, if any.
    pub body: Option<Bytes>,
}

/// A received response with its body fully read.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The response body.
    pub body: Bytes,
}

impl RawResponse {
    /// Creates a new `RawResponse`.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// The canonical reason phrase for the status, or an empty string.
    pub fn status_text(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or_default()
    }

    /// Returns a header value by name, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// The body decoded as UTF-8 (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The transport could not complete an exchange.
#[derive(thiserror::Error, Debug, Clone)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    /// Creates an error from a message alone.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an underlying error, keeping it as the source.
    pub fn from_source(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::from_source(err)
    }
}

/// Performs one HTTP exchange.
///
/// Implementations must not retry, time out or interpret status codes; the
/// engine owns all of that. A non-2xx status is a successful exchange.
pub trait Transport: Send + Sync + 'static {
    /// Sends `request` and reads the whole response.
    fn perform(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<RawResponse, TransportError>>;
}

/// The default transport, backed by a `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with a default `reqwest::Client`.
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
        })
    }

    /// Wraps an existing `reqwest::Client`, keeping its connection pool.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    fn perform(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<RawResponse, TransportError>> {
        let client = self.client.clone();
        async move {
            let mut builder = client
                .request(request.method, request.url)
                .headers(request.headers);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;

            Ok(RawResponse::new(status, headers, body))
        }
        .boxed()
    }
}

/// A [`Transport`] built from an async function. See [`transport_fn`].
#[derive(Clone)]
pub struct TransportFn<F> {
    f: F,
}

/// Creates a [`Transport`] from an async function.
///
/// Useful for tests and for adapting other HTTP stacks.
///
/// ```
/// use ricochet::transport::{transport_fn, RawResponse};
/// use http::{HeaderMap, StatusCode};
///
/// let transport = transport_fn(|_request| async {
///     Ok(RawResponse::new(StatusCode::OK, HeaderMap::new(), "{}".into()))
/// });
/// # let _ = transport;
/// ```
pub fn transport_fn<F, Fut>(f: F) -> TransportFn<F>
where
    F: Fn(TransportRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<RawResponse, TransportError>> + Send + 'static,
{
    TransportFn { f }
}

impl<F, Fut> Transport for TransportFn<F>
where
    F: Fn(TransportRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<RawResponse, TransportError>> + Send + 'static,
{
    fn perform(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<RawResponse, TransportError>> {
        (self.f)(request).boxed()
    }
}
