//! Request body encoding and response body parsing.

use crate::transport::RawResponse;
use bytes::Bytes;
use http::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// How a response body is turned into a [`Payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Parse as JSON. Unparseable bodies become [`Payload::Null`].
    #[default]
    Json,
    /// Decode as UTF-8 text (lossy).
    Text,
    /// Keep the bytes.
    Binary,
    /// Do not parse; read the bytes from the raw response instead.
    Raw,
}

/// A parsed response body.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    /// No body, an empty-body status, or a body that failed to parse.
    #[default]
    Null,
    /// A JSON document.
    Json(Value),
    /// A text body.
    Text(String),
    /// A binary body.
    Binary(Bytes),
}

impl Payload {
    /// Returns `true` for [`Payload::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Payload::Null)
    }

    /// Returns the JSON document, if this is one.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the text body, if this is one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the binary body, if this is one.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Payload::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Looks up a top-level field of a JSON object body.
    ///
    /// ```
    /// use ricochet::Payload;
    ///
    /// let payload = Payload::Json(serde_json::json!({"status": "pending"}));
    /// assert_eq!(payload.field("status").and_then(|v| v.as_str()), Some("pending"));
    /// assert!(Payload::Null.field("status").is_none());
    /// ```
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.as_json()?.get(key)
    }

    /// Deserializes the payload into `T`.
    ///
    /// JSON payloads are deserialized directly; text and binary payloads are
    /// parsed as JSON first.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match self {
            Payload::Null => T::deserialize(&Value::Null),
            Payload::Json(value) => T::deserialize(value),
            Payload::Text(text) => serde_json::from_str(text),
            Payload::Binary(bytes) => serde_json::from_slice(bytes),
        }
    }
}

/// Parses a raw response body according to `mode`.
///
/// In JSON mode, 204 and 205 responses yield [`Payload::Null`] without
/// touching the body, and a body that is not valid JSON also yields `Null`.
pub fn parse_body(response: &RawResponse, mode: ParseMode) -> Payload {
    match mode {
        ParseMode::Json => {
            if matches!(
                response.status,
                StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT
            ) {
                return Payload::Null;
            }
            match serde_json::from_slice(&response.body) {
                Ok(value) => Payload::Json(value),
                Err(e) => {
                    if !response.body.is_empty() {
                        tracing::debug!(
                            error = %e,
                            status = response.status.as_u16(),
                            "Response body is not valid JSON; treating as null"
                        );
                    }
                    Payload::Null
                }
            }
        }
        ParseMode::Text => Payload::Text(String::from_utf8_lossy(&response.body).into_owned()),
        ParseMode::Binary => Payload::Binary(response.body.clone()),
        ParseMode::Raw => Payload::Null,
    }
}

/// A request body.
///
/// Bytes, text and form bodies are sent as given. Anything else is JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// A JSON document.
    Json(Value),
    /// Pre-encoded text.
    Text(String),
    /// Raw bytes, for example a pre-built multipart body.
    Bytes(Bytes),
    /// Form fields, sent as `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
}

impl RequestBody {
    /// Serializes `value` into a JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(RequestBody::Json(serde_json::to_value(value)?))
    }

    /// Builds a form body from key/value pairs.
    pub fn form<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        RequestBody::Form(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Encodes the body into wire bytes and the content type to send with it.
    pub fn encode(&self) -> (Bytes, Option<&'static str>) {
        match self {
            RequestBody::Json(value) => (
                Bytes::from(value.to_string()),
                Some("application/json"),
            ),
            RequestBody::Text(text) => (
                Bytes::from(text.clone()),
                Some("text/plain;charset=UTF-8"),
            ),
            RequestBody::Bytes(bytes) => (bytes.clone(), None),
            RequestBody::Form(pairs) => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs)
                    .finish();
                (
                    Bytes::from(encoded),
                    Some("application/x-www-form-urlencoded"),
                )
            }
        }
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        RequestBody::Text(text.to_string())
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderMap;
    use serde_json::json;

    fn raw(status: u16, body: &'static [u8]) -> RawResponse {
        RawResponse::new(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            Bytes::from_static(body),
        )
    }

    #[test]
    fn json_mode_parses_documents() {
        let payload = parse_body(&raw(200, br#"{"hello":"world"}"#), ParseMode::Json);
        assert_eq!(payload, Payload::Json(json!({"hello": "world"})));
    }

    #[test]
    fn json_mode_degrades_to_null() {
        assert!(parse_body(&raw(200, b"not json"), ParseMode::Json).is_null());
        assert!(parse_body(&raw(500, b""), ParseMode::Json).is_null());
        assert!(parse_body(&raw(204, b"{}"), ParseMode::Json).is_null());
        assert!(parse_body(&raw(205, b"{}"), ParseMode::Json).is_null());
    }

    #[test]
    fn other_modes() {
        let response = raw(200, b"plain");
        assert_eq!(
            parse_body(&response, ParseMode::Text).as_text(),
            Some("plain")
        );
        assert_eq!(
            parse_body(&response, ParseMode::Binary).as_bytes().map(|b| &b[..]),
            Some(&b"plain"[..])
        );
        assert!(parse_body(&response, ParseMode::Raw).is_null());
    }

    #[test]
    fn encode_passes_wire_ready_bodies_through() {
        let bytes = Bytes::from_static(b"--boundary--");
        let (encoded, content_type) = RequestBody::Bytes(bytes.clone()).encode();
        assert_eq!(encoded, bytes);
        assert_eq!(content_type, None);

        let (encoded, content_type) = RequestBody::form([("a", "1"), ("b", "x y")]).encode();
        assert_eq!(&encoded[..], b"a=1&b=x+y");
        assert_eq!(content_type, Some("application/x-www-form-urlencoded"));
    }

    #[test]
    fn encode_json() {
        let body = RequestBody::json(&json!({"n": 1})).unwrap();
        let (encoded, content_type) = body.encode();
        assert_eq!(&encoded[..], br#"{"n":1}"#);
        assert_eq!(content_type, Some("application/json"));
    }

    #[test]
    fn deserialize_payload() {
        #[derive(serde::Deserialize)]
        struct Hello {
            hello: String,
        }

        let payload = Payload::Json(json!({"hello": "world"}));
        let hello: Hello = payload.deserialize().unwrap();
        assert_eq!(hello.hello, "world");

        let none: Option<Hello> = Payload::Null.deserialize().unwrap();
        assert!(none.is_none());
    }
}
