//! Responses and per-attempt records.
//!
//! [`HttpResponse`] is a fully-read wire response. Interceptors may rewrite its
//! body and headers before the retry policy and the response handler see it.
//! [`AttemptRecord`] describes one physical attempt: the request that was sent,
//! the response or error that came back, and when it happened.

use crate::{request::HttpRequest, Error};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::collections::BTreeMap;
use std::time::{Duration, Instant, SystemTime};

const UTF8_BOM: char = '\u{feff}';

/// A response received from the transport.
///
/// # Examples
///
/// ```
/// use redial::HttpResponse;
/// use http::{HeaderMap, StatusCode};
///
/// let response = HttpResponse::new(StatusCode::OK, HeaderMap::new(), "\u{feff}{\"id\":1}");
/// assert_eq!(response.text(), "{\"id\":1}");
/// assert_eq!(response.json_value().unwrap()["id"], 1);
/// ```
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl HttpResponse {
    /// Creates a new `HttpResponse`.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Returns the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the numeric status code.
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Returns `true` for 2xx responses.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the response headers for modification.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Returns a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Returns the headers as a plain string map.
    ///
    /// The map is empty when the response carried no headers. Repeated headers
    /// keep their last value; values that are not visible ASCII are skipped.
    pub fn header_map(&self) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect()
    }

    /// Returns the raw body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Replaces the body.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Returns the body as text with a leading UTF-8 byte-order mark removed.
    ///
    /// Invalid UTF-8 sequences are replaced.
    pub fn text(&self) -> String {
        let text = String::from_utf8_lossy(&self.body);
        match text.strip_prefix(UTF8_BOM) {
            Some(stripped) => stripped.to_string(),
            None => text.into_owned(),
        }
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.text())
    }

    /// Parses the body as a JSON value, returning `None` for empty or invalid bodies.
    pub fn json_value(&self) -> Option<serde_json::Value> {
        let text = self.text();
        if text.trim().is_empty() {
            return None;
        }
        serde_json::from_str(&text).ok()
    }
}

impl Serialize for HttpResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let headers = self.header_map();
        let mut state = serializer.serialize_struct("HttpResponse", 2)?;
        state.serialize_field("status_code", &self.status_code())?;
        if headers.is_empty() {
            state.skip_field("headers")?;
        } else {
            state.serialize_field("headers", &headers)?;
        }
        state.end()
    }
}

/// The outcome of one physical attempt.
///
/// A fresh record is created for every attempt; the last one is handed to the
/// [`ResponseHandler`](crate::ResponseHandler).
#[derive(Debug)]
pub struct AttemptRecord {
    request: HttpRequest,
    response: Option<HttpResponse>,
    error: Option<Error>,
    retries_attempted: u32,
    started_at: SystemTime,
    started: Instant,
    finished: Instant,
}

impl AttemptRecord {
    pub(crate) fn new(
        request: HttpRequest,
        response: Option<HttpResponse>,
        error: Option<Error>,
        retries_attempted: u32,
        started_at: SystemTime,
        started: Instant,
    ) -> Self {
        Self {
            request,
            response,
            error,
            retries_attempted,
            started_at,
            started,
            finished: Instant::now(),
        }
    }

    /// Returns the request as it was sent, including interceptor changes.
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// Returns the response, absent when the attempt failed before one arrived.
    pub fn response(&self) -> Option<&HttpResponse> {
        self.response.as_ref()
    }

    /// Consumes the record, returning the response.
    pub fn into_response(self) -> Option<HttpResponse> {
        self.response
    }

    /// Returns the status code of the response, if there was one.
    pub fn status_code(&self) -> Option<u16> {
        self.response.as_ref().map(HttpResponse::status_code)
    }

    /// Returns the error that prevented a response, if any.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Returns how many retries preceded this attempt. The first attempt has `0`.
    pub fn retries_attempted(&self) -> u32 {
        self.retries_attempted
    }

    /// Returns the wall-clock time at which the attempt started.
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Returns the wall-clock time at which the attempt finished.
    pub fn finished_at(&self) -> SystemTime {
        self.started_at + self.elapsed()
    }

    /// Returns how long the attempt took.
    pub fn elapsed(&self) -> Duration {
        self.finished.saturating_duration_since(self.started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_text_strips_bom() {
        let response = HttpResponse::new(StatusCode::OK, HeaderMap::new(), "\u{feff}hello");
        assert_eq!(response.text(), "hello");

        let response = HttpResponse::new(StatusCode::OK, HeaderMap::new(), "plain");
        assert_eq!(response.text(), "plain");
    }

    #[test]
    fn test_header_map_is_empty_without_headers() {
        let response = HttpResponse::new(StatusCode::OK, HeaderMap::new(), "");
        assert!(response.header_map().is_empty());
        assert!(response.json_value().is_none());
    }

    #[test]
    fn test_set_body_and_headers() {
        let mut response = HttpResponse::new(StatusCode::OK, HeaderMap::new(), "{}");
        response
            .headers_mut()
            .insert("x-injected", HeaderValue::from_static("yes"));
        response.set_body(r#"{"injected":true}"#);

        assert_eq!(response.header("x-injected"), Some("yes"));
        assert_eq!(response.json_value().unwrap()["injected"], true);
        assert_eq!(
            response.header_map().get("x-injected").map(String::as_str),
            Some("yes")
        );
    }

    #[test]
    fn test_typed_json() {
        #[derive(serde::Deserialize)]
        struct Echo {
            data: String,
        }

        let response = HttpResponse::new(StatusCode::OK, HeaderMap::new(), r#"{"data":"x"}"#);
        let echo: Echo = response.json().unwrap();
        assert_eq!(echo.data, "x");
    }

    #[test]
    fn test_serialize_skips_empty_headers() {
        let response = HttpResponse::new(StatusCode::SERVICE_UNAVAILABLE, HeaderMap::new(), "");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, serde_json::json!({ "status_code": 503 }));
    }
}
