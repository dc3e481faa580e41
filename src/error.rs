//! Error types for orchestrated HTTP calls.
//!
//! Every call resolves to either a [`Response`](crate::Response) or a [`Failure`].
//! A failure carries exactly one normalized [`Error`] from a closed set of four
//! kinds, plus the raw response when one was received. Nothing else escapes a
//! call as an error.

use crate::body::Payload;
use crate::transport::{RawResponse, TransportError};
use http::StatusCode;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The stable discriminant of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The transport could not complete the exchange.
    Network,
    /// A deadline elapsed.
    Timeout,
    /// A non-2xx status was received.
    Http,
    /// A caller-supplied validator rejected the body.
    Validation,
}

impl ErrorKind {
    /// Returns the tag as a static string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Http => "http",
            ErrorKind::Validation => "validation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which deadline fired for a [`Error::Timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Deadline {
    /// The per-attempt timer, restarted for every attempt.
    Attempt,
    /// The total timer, started once when the call begins.
    Total,
}

impl fmt::Display for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deadline::Attempt => f.write_str("per-attempt"),
            Deadline::Total => f.write_str("total"),
        }
    }
}

/// A normalized call error.
///
/// # Examples
///
/// ```
/// use ricochet::{Error, ErrorKind, Payload};
/// use http::StatusCode;
///
/// let err = Error::http(StatusCode::SERVICE_UNAVAILABLE, Payload::Null);
/// assert_eq!(err.kind(), ErrorKind::Http);
/// assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
/// assert!(err.is_retryable());
/// ```
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// The transport could not complete, or the call was aborted.
    #[error("Network error: {message}")]
    Network {
        /// Human-readable description.
        message: String,
        /// The underlying transport failure, when there was one.
        #[source]
        source: Option<TransportError>,
    },

    /// A deadline elapsed before the call could complete.
    #[error("Request timed out after {}ms ({deadline} timeout)", .after.as_millis())]
    Timeout {
        /// Which deadline fired.
        deadline: Deadline,
        /// The configured duration of that deadline.
        after: Duration,
    },

    /// The server answered with a status outside `200..=299`.
    #[error("HTTP error {status}: {status_text}")]
    Http {
        /// The HTTP status code.
        status: StatusCode,
        /// The canonical reason phrase for the status.
        status_text: String,
        /// The response body, parsed with the call's parse mode.
        body: Payload,
    },

    /// A validator rejected the parsed body.
    #[error("Validation failed: {cause}")]
    Validation {
        /// The validator's reported cause.
        cause: String,
    },
}

impl Error {
    /// Creates a network error without an underlying cause.
    pub fn network(message: impl Into<String>) -> Self {
        Error::Network {
            message: message.into(),
            source: None,
        }
    }

    /// The error used when the caller's cancellation signal fires.
    pub fn aborted() -> Self {
        Error::network("request aborted")
    }

    /// Creates an HTTP error for `status` with the given parsed body.
    pub fn http(status: StatusCode, body: Payload) -> Self {
        Error::Http {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        }
    }

    /// Creates a validation error.
    pub fn validation(cause: impl Into<String>) -> Self {
        Error::Validation {
            cause: cause.into(),
        }
    }

    /// Returns the stable discriminant of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network { .. } => ErrorKind::Network,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Http { .. } => ErrorKind::Http,
            Error::Validation { .. } => ErrorKind::Validation,
        }
    }

    /// Returns the human-readable message.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Returns `true` if this error is retryable under the default policy.
    ///
    /// Network errors, timeouts, 5xx responses and 429 are retryable.
    /// Other 4xx responses and validation failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network { .. } => true,
            Error::Timeout { .. } => true,
            Error::Http { status, .. } => {
                status.as_u16() >= 500 || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Error::Validation { .. } => false,
        }
    }

    /// Returns the HTTP status code for `Http` errors.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the parsed response body for `Http` errors.
    pub fn body(&self) -> Option<&Payload> {
        match self {
            Error::Http { body, .. } => Some(body),
            _ => None,
        }
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Network {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// A failed call: the normalized error and, if one arrived, the raw response.
#[derive(thiserror::Error, Debug, Clone)]
#[error("{error}")]
pub struct Failure {
    /// The normalized error, already passed through any error mapper.
    pub error: Error,
    /// The response that produced the error. Absent for pure network and
    /// timeout failures.
    pub response: Option<RawResponse>,
}

impl Failure {
    /// Creates a failure that never received a response.
    pub fn new(error: Error) -> Self {
        Self {
            error,
            response: None,
        }
    }

    /// Creates a failure paired with the response that caused it.
    pub fn with_response(error: Error, response: RawResponse) -> Self {
        Self {
            error,
            response: Some(response),
        }
    }

    /// Shorthand for `self.error.kind()`.
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Failure::new(error)
    }
}

/// Errors raised while configuring a client or a request.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ConfigError {
    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A header name or value was rejected.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// The default transport could not be created.
    #[error("Failed to build HTTP transport: {0}")]
    Transport(Arc<str>),
}

/// A specialized `Result` type for orchestrated calls.
pub type Result<T> = std::result::Result<T, Failure>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_duration_and_deadline() {
        let err = Error::Timeout {
            deadline: Deadline::Total,
            after: Duration::from_millis(10),
        };
        let message = err.message();
        assert!(message.contains("10"), "{message}");
        assert!(message.contains("total"), "{message}");
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn http_error_carries_status_text() {
        let err = Error::http(StatusCode::NOT_FOUND, Payload::Text("gone".into()));
        match &err {
            Error::Http {
                status,
                status_text,
                body,
            } => {
                assert_eq!(status.as_u16(), 404);
                assert_eq!(status_text, "Not Found");
                assert_eq!(body.as_text(), Some("gone"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!err.is_retryable());
    }

    #[test]
    fn default_retryability() {
        assert!(Error::aborted().is_retryable());
        assert!(Error::http(StatusCode::TOO_MANY_REQUESTS, Payload::Null).is_retryable());
        assert!(Error::http(StatusCode::BAD_GATEWAY, Payload::Null).is_retryable());
        assert!(!Error::http(StatusCode::UNAUTHORIZED, Payload::Null).is_retryable());
        assert!(!Error::validation("nope").is_retryable());
    }

    #[test]
    fn nonstandard_statuses_above_500_are_retryable() {
        let status = StatusCode::from_u16(600).unwrap();
        assert!(Error::http(status, Payload::Null).is_retryable());
        let status = StatusCode::from_u16(499).unwrap();
        assert!(!Error::http(status, Payload::Null).is_retryable());
    }

    #[test]
    fn transport_error_keeps_source() {
        use std::error::Error as _;

        let err: Error = TransportError::new("connection refused").into();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.source().is_some());
    }
}
