//! Declarative description of one logical HTTP call.
//!
//! An [`HttpRequest`] is built once through [`HttpRequestBuilder`] and then
//! handed to [`HttpClient::execute`](crate::HttpClient::execute). The client
//! never mutates it: every attempt works on its own copy, so interceptors can
//! freely add headers or query parameters without those changes leaking into
//! the next attempt.

use crate::{payload::Payload, retry::RetryPolicy, Error, Result};
use http::{HeaderName, HeaderValue};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// The HTTP methods a request can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// `GET`. May carry a body when a payload is set.
    Get,
    /// `POST`.
    Post,
    /// `PUT`.
    Put,
    /// `DELETE`. Never carries a body.
    Delete,
}

impl HttpMethod {
    /// Returns the matching [`http::Method`].
    pub fn as_http(&self) -> http::Method {
        match self {
            HttpMethod::Get => http::Method::GET,
            HttpMethod::Post => http::Method::POST,
            HttpMethod::Put => http::Method::PUT,
            HttpMethod::Delete => http::Method::DELETE,
        }
    }

    /// Returns the canonical upper-case method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for HttpMethod {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(Error::ConfigurationError(format!(
                "Unsupported HTTP method: {}",
                other
            ))),
        }
    }
}

/// An insertion-ordered string map with unique keys.
///
/// Used for request headers and query parameters. Inserting an existing key
/// replaces its value in place, keeping the original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, String)>,
}

impl Params {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the previous one if the key was present.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for Params {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        params.extend(iter);
        params
    }
}

impl Serialize for Params {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// One logical HTTP call.
///
/// # Examples
///
/// ```
/// use redial::{HttpMethod, HttpRequest};
///
/// # fn example() -> Result<(), redial::Error> {
/// let request = HttpRequest::builder("GetUser", HttpMethod::Get)
///     .host("https://api.example.com")?
///     .endpoint("/users/123")
///     .query_parameter("fields", "name")
///     .header("Accept", "application/json")?
///     .build()?;
///
/// assert_eq!(
///     request.uri()?.as_str(),
///     "https://api.example.com/users/123?fields=name"
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpRequest {
    name: String,
    method: HttpMethod,
    host: Url,
    port: u16,
    endpoint: String,
    username: Option<String>,
    password: Option<String>,
    headers: Params,
    query_parameters: Params,
    payload: Option<Arc<Payload>>,
    retry_policy: Option<Arc<RetryPolicy>>,
}

impl HttpRequest {
    /// Creates a new `HttpRequestBuilder`.
    pub fn builder(name: impl Into<String>, method: HttpMethod) -> HttpRequestBuilder {
        HttpRequestBuilder::new(name, method)
    }

    /// Returns the diagnostic name of this request.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Returns the destination authority (scheme, host and optional port).
    pub fn host(&self) -> &Url {
        &self.host
    }

    /// Returns the explicit port, `0` meaning the scheme default.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the request path.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the basic-auth username, if any.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Returns the basic-auth password, if any.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Params {
        &self.headers
    }

    /// Returns the request headers for modification.
    pub fn headers_mut(&mut self) -> &mut Params {
        &mut self.headers
    }

    /// Sets a header, replacing any previous value.
    ///
    /// The header is validated when the wire request is assembled.
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.insert(key, value);
        self
    }

    /// Returns the query parameters.
    pub fn query_parameters(&self) -> &Params {
        &self.query_parameters
    }

    /// Returns the query parameters for modification.
    pub fn query_parameters_mut(&mut self) -> &mut Params {
        &mut self.query_parameters
    }

    /// Sets a query parameter, replacing any previous value.
    pub fn set_query_parameter(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.query_parameters.insert(key, value);
        self
    }

    /// Returns the payload, if any.
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_deref()
    }

    /// Returns the retry policy, if any.
    pub fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry_policy.as_deref()
    }

    /// Returns `true` when basic-auth credentials should be attached.
    pub fn has_credentials(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
            || self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Resolves the absolute request URI.
    ///
    /// The path replaces the host's path, an explicit non-zero port overrides
    /// the scheme default, and query parameters are appended in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Uri`] if the port cannot be applied to the host.
    pub fn uri(&self) -> Result<Url> {
        let mut url = self.host.clone();

        if self.port != 0 {
            url.set_port(Some(self.port))
                .map_err(|_| Error::Uri(format!("cannot set port {} on {}", self.port, self.host)))?;
        }

        if !self.endpoint.is_empty() {
            url.set_path(&self.endpoint);
        }

        if !self.query_parameters.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in self.query_parameters.iter() {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }
}

/// Builder for [`HttpRequest`].
///
/// Header names and values and the host are validated as they are set, so
/// configuration mistakes surface before the request is ever executed.
pub struct HttpRequestBuilder {
    name: String,
    method: HttpMethod,
    host: Option<Url>,
    port: u16,
    endpoint: String,
    username: Option<String>,
    password: Option<String>,
    headers: Params,
    query_parameters: Params,
    payload: Option<Arc<Payload>>,
    retry_policy: Option<Arc<RetryPolicy>>,
}

impl HttpRequestBuilder {
    /// Creates a new builder for a request with the given diagnostic name.
    pub fn new(name: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            name: name.into(),
            method,
            host: None,
            port: 0,
            endpoint: String::new(),
            username: None,
            password: None,
            headers: Params::new(),
            query_parameters: Params::new(),
            payload: None,
            retry_policy: None,
        }
    }

    /// Sets the destination authority, e.g. `https://api.example.com`.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is not an absolute `http` or `https` URL.
    pub fn host(mut self, host: impl AsRef<str>) -> Result<Self> {
        let url = Url::parse(host.as_ref())?;
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(Error::ConfigurationError(format!(
                "Host must be an absolute URL with an authority: {}",
                host.as_ref()
            )));
        }
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::ConfigurationError(format!(
                "Unsupported scheme: {}",
                url.scheme()
            )));
        }
        self.host = Some(url);
        Ok(self)
    }

    /// Sets an explicit port. `0` keeps the scheme default.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the request path.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets basic-auth credentials.
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Adds a header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        validate_header(name.as_ref(), value.as_ref()).map_err(Error::ConfigurationError)?;
        self.headers.insert(name.as_ref(), value.as_ref());
        Ok(self)
    }

    /// Adds multiple headers.
    ///
    /// # Errors
    ///
    /// Returns an error on the first invalid header name or value.
    pub fn headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in headers {
            self = self.header(name, value)?;
        }
        Ok(self)
    }

    /// Adds a query parameter.
    pub fn query_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_parameters.insert(key, value);
        self
    }

    /// Adds multiple query parameters.
    pub fn query_parameters<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query_parameters.extend(params);
        self
    }

    /// Sets the payload.
    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = Some(Arc::new(payload));
        self
    }

    /// Sets the retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(Arc::new(policy));
        self
    }

    /// Sets a retry policy shared with other requests.
    pub fn shared_retry_policy(mut self, policy: Arc<RetryPolicy>) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Builds the request.
    ///
    /// # Errors
    ///
    /// Returns an error if no host was provided.
    pub fn build(self) -> Result<HttpRequest> {
        let host = self
            .host
            .ok_or_else(|| Error::ConfigurationError("Host is required".to_string()))?;

        Ok(HttpRequest {
            name: self.name,
            method: self.method,
            host,
            port: self.port,
            endpoint: self.endpoint,
            username: self.username,
            password: self.password,
            headers: self.headers,
            query_parameters: self.query_parameters,
            payload: self.payload,
            retry_policy: self.retry_policy,
        })
    }
}

pub(crate) fn validate_header(
    name: &str,
    value: &str,
) -> std::result::Result<(HeaderName, HeaderValue), String> {
    let name =
        HeaderName::try_from(name).map_err(|e| format!("Invalid header name {:?}: {}", name, e))?;
    let value = HeaderValue::try_from(value)
        .map_err(|e| format!("Invalid header value for {}: {}", name, e))?;
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> HttpRequestBuilder {
        HttpRequest::builder("test", HttpMethod::Get)
            .host("https://example.test")
            .unwrap()
    }

    #[test]
    fn test_params_replace_keeps_position() {
        let mut params = Params::new();
        params.insert("a", "1");
        params.insert("b", "2");
        assert_eq!(params.insert("a", "3"), Some("1".to_string()));

        let entries: Vec<_> = params.iter().collect();
        assert_eq!(entries, vec![("a", "3"), ("b", "2")]);
        assert_eq!(params.remove("a"), Some("3".to_string()));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_uri_resolution_with_port_and_query() {
        let request = request()
            .port(8443)
            .endpoint("/status/500")
            .query_parameter("utm_source", "redial")
            .query_parameter("q", "a b")
            .build()
            .unwrap();

        assert_eq!(
            request.uri().unwrap().as_str(),
            "https://example.test:8443/status/500?utm_source=redial&q=a+b"
        );
    }

    #[test]
    fn test_uri_without_query_has_no_question_mark() {
        let request = request().endpoint("/get").build().unwrap();
        assert_eq!(request.uri().unwrap().as_str(), "https://example.test/get");
    }

    #[test]
    fn test_missing_host_is_configuration_error() {
        let result = HttpRequest::builder("test", HttpMethod::Get).build();
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }

    #[test]
    fn test_malformed_host_is_rejected() {
        let result = HttpRequest::builder("test", HttpMethod::Get).host("not a host");
        assert!(matches!(result, Err(Error::InvalidUrl(_))));

        let result = HttpRequest::builder("test", HttpMethod::Get).host("ftp://example.test");
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let result = request().header("bad header", "value");
        assert!(matches!(result, Err(Error::ConfigurationError(_))));

        let result = request().header("X-Ok", "line\nbreak");
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }

    #[test]
    fn test_credentials_detection() {
        assert!(!request().build().unwrap().has_credentials());
        assert!(request().basic_auth("user", "").build().unwrap().has_credentials());
        assert!(request().basic_auth("", "secret").build().unwrap().has_credentials());
        assert!(!request().basic_auth("", "").build().unwrap().has_credentials());
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(HttpMethod::try_from("put").unwrap(), HttpMethod::Put);
        assert!(HttpMethod::try_from("PATCH").is_err());
        assert_eq!(HttpMethod::Delete.as_http(), http::Method::DELETE);
    }
}
