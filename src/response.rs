//! Successful call results.
//!
//! A [`Response`] carries the parsed body together with the raw response it
//! came from and metadata about the call: latency and the number of
//! transport attempts it took.

use crate::body::Payload;
use crate::transport::RawResponse;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// A successful, terminal call result.
///
/// # Examples
///
/// ```
/// use ricochet::{Payload, Response, RawResponse};
/// use http::{HeaderMap, StatusCode};
/// use std::time::Duration;
///
/// let raw = RawResponse::new(StatusCode::OK, HeaderMap::new(), r#"{"hello":"world"}"#.into());
/// let response = Response::new(
///     Payload::Json(serde_json::json!({"hello": "world"})),
///     raw,
///     Duration::from_millis(12),
///     1,
/// );
///
/// assert_eq!(response.status(), StatusCode::OK);
/// assert_eq!(response.data.field("hello").unwrap(), "world");
/// assert!(!response.was_retried());
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    /// The parsed body.
    pub data: Payload,

    /// The raw response the body was parsed from.
    pub raw: RawResponse,

    /// Time from the start of the call until this response was accepted,
    /// including every retry and any credential refresh.
    pub latency: Duration,

    /// The number of transport attempts in the pass that produced this
    /// response. `1` means it succeeded on the first try.
    pub attempts: usize,
}

impl Response {
    /// Creates a new `Response`.
    pub fn new(data: Payload, raw: RawResponse, latency: Duration, attempts: usize) -> Self {
        Self {
            data,
            raw,
            latency,
            attempts,
        }
    }

    /// The HTTP status code.
    pub fn status(&self) -> StatusCode {
        self.raw.status
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.raw.headers
    }

    /// Returns a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.raw.header(name)
    }

    /// Returns `true` if the call needed more than one attempt.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Deserializes the parsed body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        self.data.deserialize()
    }

    /// Maps the parsed body while keeping the metadata.
    pub fn map(self, f: impl FnOnce(Payload) -> Payload) -> Self {
        Self {
            data: f(self.data),
            ..self
        }
    }
}

impl AsRef<Payload> for Response {
    fn as_ref(&self) -> &Payload {
        &self.data
    }
}

impl std::ops::Deref for Response {
    type Target = Payload;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}
