//! Per-attempt telemetry records.
//!
//! Every attempt produces one [`AttemptLog`] handed to the client's
//! [`TelemetrySink`]. Sinks cannot fail, so logging never changes the outcome
//! of a call.

use crate::{
    payload::Payload,
    request::{HttpMethod, HttpRequest, Params},
    response::{AttemptRecord, HttpResponse},
};
use serde::Serialize;

/// The action name carried by every attempt record.
pub const HTTP_REQUEST_ACTION: &str = "httpRequest";

/// A request as it appears in telemetry. Passwords are never included.
#[derive(Debug, Serialize)]
pub struct LoggableRequest<'a> {
    /// The request's diagnostic name.
    pub name: &'a str,
    /// The HTTP method.
    pub method: HttpMethod,
    /// The destination host name.
    pub host: &'a str,
    /// The request path.
    pub endpoint: &'a str,
    /// The basic-auth username, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<&'a str>,
    /// Headers as sent, including interceptor changes.
    #[serde(skip_serializing_if = "no_params")]
    pub headers: &'a Params,
    /// Query parameters as sent.
    #[serde(skip_serializing_if = "no_params")]
    pub query_parameters: &'a Params,
    /// The payload description. File contents are summarised by size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<&'a Payload>,
}

fn no_params(params: &&Params) -> bool {
    params.is_empty()
}

impl<'a> From<&'a HttpRequest> for LoggableRequest<'a> {
    fn from(request: &'a HttpRequest) -> Self {
        Self {
            name: request.name(),
            method: request.method(),
            host: request.host().host_str().unwrap_or_default(),
            endpoint: request.endpoint(),
            username: request.username(),
            headers: request.headers(),
            query_parameters: request.query_parameters(),
            payload: request.payload(),
        }
    }
}

/// The structured record emitted for one attempt.
#[derive(Debug, Serialize)]
pub struct AttemptLog<'a> {
    /// Always [`HTTP_REQUEST_ACTION`].
    pub action: &'static str,
    /// The request as sent.
    pub http_request: LoggableRequest<'a>,
    /// The response, absent when the attempt failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_response: Option<&'a HttpResponse>,
    /// How many retries preceded this attempt.
    pub retries_attempted: u32,
    /// How long the attempt took, in milliseconds.
    pub execution_time_ms: u64,
    /// The error that prevented a response, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<'a> From<&'a AttemptRecord> for AttemptLog<'a> {
    fn from(record: &'a AttemptRecord) -> Self {
        Self {
            action: HTTP_REQUEST_ACTION,
            http_request: LoggableRequest::from(record.request()),
            http_response: record.response(),
            retries_attempted: record.retries_attempted(),
            execution_time_ms: u64::try_from(record.elapsed().as_millis()).unwrap_or(u64::MAX),
            error: record.error().map(ToString::to_string),
        }
    }
}

/// Receives one record per attempt.
pub trait TelemetrySink: Send + Sync {
    /// Records an attempt.
    fn record(&self, log: &AttemptLog<'_>);
}

/// Emits attempt records as `tracing` events on the `redial::telemetry` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record(&self, log: &AttemptLog<'_>) {
        match serde_json::to_string(&log.http_request) {
            Ok(request) => tracing::info!(
                target: "redial::telemetry",
                action = log.action,
                http_request = %request,
                status = log.http_response.map(HttpResponse::status_code),
                retries_attempted = log.retries_attempted,
                execution_time_ms = log.execution_time_ms,
                error = log.error.as_deref(),
                "HTTP attempt"
            ),
            Err(e) => tracing::debug!(
                target: "redial::telemetry",
                error = %e,
                "Failed to serialize attempt record"
            ),
        }
    }
}

/// Discards all records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn record(&self, _log: &AttemptLog<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{FilePart, Form, FormPart, MULTIPART_FORM_DATA};
    use http::{HeaderMap, StatusCode};
    use std::time::{Instant, SystemTime};

    #[test]
    fn test_attempt_log_omits_password_and_file_contents() {
        let request = HttpRequest::builder("Upload", HttpMethod::Post)
            .host("https://example.test")
            .unwrap()
            .endpoint("/upload")
            .basic_auth("alice", "hunter2")
            .payload(Payload::form(
                "UTF-8",
                MULTIPART_FORM_DATA,
                Form::new().field(
                    "files",
                    vec![FormPart::File(FilePart::new("notes.txt", "top secret"))],
                ),
            ))
            .build()
            .unwrap();
        let response = HttpResponse::new(StatusCode::CREATED, HeaderMap::new(), "ok");
        let record = AttemptRecord::new(
            request,
            Some(response),
            None,
            2,
            SystemTime::now(),
            Instant::now(),
        );

        let json = serde_json::to_value(AttemptLog::from(&record)).unwrap();
        let text = json.to_string();

        assert_eq!(json["action"], "httpRequest");
        assert_eq!(json["retries_attempted"], 2);
        assert_eq!(json["http_request"]["method"], "POST");
        assert_eq!(json["http_request"]["host"], "example.test");
        assert_eq!(json["http_request"]["username"], "alice");
        assert_eq!(json["http_response"]["status_code"], 201);
        assert_eq!(
            json["http_request"]["payload"]["content"]["form"]["files"][0]["size"],
            10
        );
        assert!(!text.contains("hunter2"));
        assert!(!text.contains("top secret"));
        assert!(json.get("error").is_none());
    }
}
