//! Turns an [`HttpRequest`] into a transport-ready [`http::Request`].

use crate::{
    payload::{EncodedPayload, Payload},
    request::{validate_header, HttpMethod, HttpRequest},
    Error, Result,
};
use bytes::Bytes;
use http::HeaderMap;
use std::fmt;
use std::time::Duration;

const CONTENT_TYPE: &str = "Content-Type";

/// Basic-auth credentials travelling with one assembled request.
///
/// Stored as a request extension so they only ever apply to the destination
/// of that request; the transport turns them into an `Authorization` header.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    /// The username.
    pub username: String,
    /// The password.
    pub password: String,
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Per-request timeout, stored as a request extension for the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTimeout(pub Duration);

/// Builds the wire request for one attempt.
///
/// `request` is the attempt's working copy. When a payload is present its
/// `Content-Type` is written into the working copy's headers, replacing any
/// header of the same name regardless of case. Client-wide `default_headers`
/// are applied first so request headers override them.
///
/// GET requests carry a body whenever a payload is set. DELETE requests never
/// carry one, so their payload is neither encoded nor given a `Content-Type`.
/// A multipart payload travels as a [`MultipartBody`](crate::payload::MultipartBody)
/// request extension with an empty body.
///
/// # Errors
///
/// * [`Error::Uri`] if the request URI cannot be resolved
/// * [`Error::Encoding`] if the payload cannot be encoded
/// * [`Error::InvalidHeader`] if a header is not valid on the wire
pub fn assemble_request(
    request: &mut HttpRequest,
    default_headers: &HeaderMap,
    timeout: Option<Duration>,
) -> Result<http::Request<Bytes>> {
    let url = request.uri()?;
    let uri = http::Uri::try_from(url.as_str())
        .map_err(|e| Error::Uri(format!("{}: {}", url, e)))?;

    let encoded = match request.method() {
        HttpMethod::Delete => None,
        _ => request.payload().map(Payload::encode).transpose()?,
    };
    if let Some(encoded) = &encoded {
        set_content_type(request, encoded.content_type());
    }

    let mut multipart = None;
    let body = match encoded {
        Some(EncodedPayload::Raw { body, .. }) => body,
        Some(EncodedPayload::Multipart(form)) => {
            multipart = Some(form);
            Bytes::new()
        }
        None => Bytes::new(),
    };

    let mut headers = default_headers.clone();
    for (name, value) in request.headers().iter() {
        let (name, value) = validate_header(name, value).map_err(Error::InvalidHeader)?;
        headers.insert(name, value);
    }

    let mut wire = http::Request::builder()
        .method(request.method().as_http())
        .uri(uri)
        .body(body)
        .map_err(|e| Error::Uri(e.to_string()))?;
    *wire.headers_mut() = headers;

    if request.has_credentials() {
        wire.extensions_mut().insert(BasicCredentials {
            username: request.username().unwrap_or_default().to_string(),
            password: request.password().unwrap_or_default().to_string(),
        });
    }
    if let Some(timeout) = timeout {
        wire.extensions_mut().insert(RequestTimeout(timeout));
    }
    if let Some(form) = multipart {
        wire.extensions_mut().insert(form);
    }

    Ok(wire)
}

fn set_content_type(request: &mut HttpRequest, content_type: &str) {
    let existing = request
        .headers()
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(CONTENT_TYPE))
        .map(|(name, _)| name.to_string());
    let key = existing.unwrap_or_else(|| CONTENT_TYPE.to_string());
    request.set_header(key, content_type);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{
        FilePart, Form, MultipartBody, MultipartPart, FORM_URLENCODED, MULTIPART_FORM_DATA,
    };
    use crate::HttpRequestBuilder;
    use http::HeaderValue;

    fn builder(method: HttpMethod) -> HttpRequestBuilder {
        HttpRequest::builder("test", method)
            .host("https://example.test")
            .unwrap()
            .endpoint("/echo")
    }

    #[test]
    fn test_post_with_json_body() {
        let mut request = builder(HttpMethod::Post)
            .query_parameter("utm_source", "redial")
            .payload(Payload::json(r#"{"k":"v"}"#))
            .build()
            .unwrap();

        let wire = assemble_request(&mut request, &HeaderMap::new(), None).unwrap();

        assert_eq!(wire.method(), http::Method::POST);
        assert_eq!(wire.uri(), "https://example.test/echo?utm_source=redial");
        assert_eq!(wire.body(), &Bytes::from_static(br#"{"k":"v"}"#));
        assert_eq!(wire.headers()["content-type"], "application/json");
        assert_eq!(request.headers().get("Content-Type"), Some("application/json"));
    }

    #[test]
    fn test_get_with_payload_keeps_body() {
        let mut request = builder(HttpMethod::Get)
            .payload(Payload::body("UTF-8", "text/plain", "query body"))
            .build()
            .unwrap();

        let wire = assemble_request(&mut request, &HeaderMap::new(), None).unwrap();
        assert_eq!(wire.method(), http::Method::GET);
        assert_eq!(wire.body(), &Bytes::from_static(b"query body"));
    }

    #[test]
    fn test_get_without_payload_has_no_body_or_content_type() {
        let mut request = builder(HttpMethod::Get).build().unwrap();
        let wire = assemble_request(&mut request, &HeaderMap::new(), None).unwrap();
        assert!(wire.body().is_empty());
        assert!(wire.headers().get("content-type").is_none());
        assert!(request.headers().is_empty());
    }

    #[test]
    fn test_delete_drops_payload_body() {
        let mut request = builder(HttpMethod::Delete)
            .payload(Payload::json("{}"))
            .build()
            .unwrap();
        let wire = assemble_request(&mut request, &HeaderMap::new(), None).unwrap();
        assert!(wire.body().is_empty());
        assert!(wire.headers().get("content-type").is_none());
        assert!(request.headers().get("Content-Type").is_none());
    }

    #[test]
    fn test_delete_skips_payload_encoding() {
        let mut request = builder(HttpMethod::Delete)
            .payload(Payload::body("no-such-charset", "text/plain", "x"))
            .build()
            .unwrap();
        let wire = assemble_request(&mut request, &HeaderMap::new(), None).unwrap();
        assert!(wire.body().is_empty());
        assert!(wire.headers().get("content-type").is_none());
    }

    #[test]
    fn test_multipart_payload_travels_as_extension() {
        let form = Form::new()
            .field("title", "report")
            .field("upload", FilePart::new("notes.txt", "hello"));
        let mut request = builder(HttpMethod::Post)
            .payload(Payload::form("UTF-8", MULTIPART_FORM_DATA, form))
            .build()
            .unwrap();

        let wire = assemble_request(&mut request, &HeaderMap::new(), None).unwrap();

        assert!(wire.body().is_empty());
        assert_eq!(wire.headers()["content-type"], MULTIPART_FORM_DATA);
        assert_eq!(request.headers().get("Content-Type"), Some(MULTIPART_FORM_DATA));
        let names: Vec<&str> = wire
            .extensions()
            .get::<MultipartBody>()
            .unwrap()
            .parts()
            .iter()
            .map(MultipartPart::name)
            .collect();
        assert_eq!(names, vec!["title", "upload"]);
    }

    #[test]
    fn test_content_type_replaces_existing_header_case_insensitively() {
        let mut request = builder(HttpMethod::Put)
            .header("content-type", "text/plain")
            .unwrap()
            .payload(Payload::form("UTF-8", FORM_URLENCODED, Form::new().field("a", "1")))
            .build()
            .unwrap();

        let wire = assemble_request(&mut request, &HeaderMap::new(), None).unwrap();
        assert_eq!(
            wire.headers()["content-type"],
            "application/x-www-form-urlencoded; charset=UTF-8"
        );
        assert_eq!(request.headers().len(), 1);
    }

    #[test]
    fn test_request_headers_override_defaults() {
        let mut defaults = HeaderMap::new();
        defaults.insert("user-agent", HeaderValue::from_static("redial"));
        defaults.insert("accept", HeaderValue::from_static("*/*"));
        let mut request = builder(HttpMethod::Get)
            .header("Accept", "application/json")
            .unwrap()
            .build()
            .unwrap();

        let wire = assemble_request(&mut request, &defaults, None).unwrap();
        assert_eq!(wire.headers()["accept"], "application/json");
        assert_eq!(wire.headers()["user-agent"], "redial");
    }

    #[test]
    fn test_credentials_and_timeout_extensions() {
        let mut request = builder(HttpMethod::Get)
            .basic_auth("user", "secret")
            .build()
            .unwrap();
        let wire =
            assemble_request(&mut request, &HeaderMap::new(), Some(Duration::from_secs(5))).unwrap();

        let credentials = wire.extensions().get::<BasicCredentials>().unwrap();
        assert_eq!(credentials.username, "user");
        assert_eq!(credentials.password, "secret");
        assert!(!format!("{:?}", credentials).contains("secret"));
        assert_eq!(
            wire.extensions().get::<RequestTimeout>(),
            Some(&RequestTimeout(Duration::from_secs(5)))
        );
    }

    #[test]
    fn test_invalid_header_from_interceptor_is_rejected() {
        let mut request = builder(HttpMethod::Get).build().unwrap();
        request.set_header("bad header", "x");
        let result = assemble_request(&mut request, &HeaderMap::new(), None);
        assert!(matches!(result, Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn test_unsupported_charset_fails_assembly() {
        let mut request = builder(HttpMethod::Post)
            .payload(Payload::body("no-such-charset", "text/plain", "x"))
            .build()
            .unwrap();
        let result = assemble_request(&mut request, &HeaderMap::new(), None);
        assert!(matches!(result, Err(Error::Encoding(_))));
    }
}
