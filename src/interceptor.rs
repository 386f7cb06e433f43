//! Interceptor hooks and the execution context they share.
//!
//! Interceptors are registered on an [`ExecutionContext`] and invoked in
//! registration order at three points of every attempt:
//!
//! 1. [`before_send`](Interceptor::before_send), before the wire request is assembled
//! 2. [`after_response`](Interceptor::after_response), when the transport returned a response
//! 3. [`on_error`](Interceptor::on_error), when no response could be obtained
//!
//! A non-2xx status is a response, not an error: a 500 goes to `after_response`.

use crate::{
    error::{BoxError, Hook},
    request::HttpRequest,
    response::HttpResponse,
    Error, Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Caller-supplied hooks around every attempt.
///
/// All hooks default to doing nothing. Returning an error from a hook aborts
/// the call with [`Error::Interceptor`] unless the context isolates failures
/// (see [`InterceptorFailureMode`]).
///
/// # Examples
///
/// ```
/// use redial::{BoxError, HttpRequest, Interceptor, Metadata};
///
/// struct RequestId;
///
/// impl Interceptor for RequestId {
///     fn before_send(&self, metadata: &mut Metadata, request: &mut HttpRequest) -> Result<(), BoxError> {
///         let attempt = metadata.get("attempt").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
///         metadata.insert("attempt", attempt);
///         request.set_header("Request-Id", format!("req-{}", attempt));
///         Ok(())
///     }
/// }
/// ```
pub trait Interceptor: Send + Sync {
    /// Runs before every attempt, including retries.
    ///
    /// Changes to `request` apply to this attempt only.
    fn before_send(
        &self,
        _metadata: &mut Metadata,
        _request: &mut HttpRequest,
    ) -> std::result::Result<(), BoxError> {
        Ok(())
    }

    /// Runs when the transport returned a response, before the retry policy sees it.
    fn after_response(
        &self,
        _metadata: &mut Metadata,
        _request: &HttpRequest,
        _response: &mut HttpResponse,
    ) -> std::result::Result<(), BoxError> {
        Ok(())
    }

    /// Runs when the attempt failed without a response.
    fn on_error(
        &self,
        _metadata: &mut Metadata,
        _request: &HttpRequest,
        _error: &Error,
    ) -> std::result::Result<(), BoxError> {
        Ok(())
    }
}

/// Free-form key/value state shared by all hooks across all attempts of a call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    values: HashMap<String, serde_json::Value>,
}

impl Metadata {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Stores a value, returning the previous one.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Option<serde_json::Value> {
        self.values.insert(key.into(), value.into())
    }

    /// Removes a value.
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.values.remove(key)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// What happens when a hook returns an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InterceptorFailureMode {
    /// Abort the call with [`Error::Interceptor`], including pending retries.
    #[default]
    Propagate,
    /// Log the failure and carry on with the next interceptor.
    Isolate,
}

/// Per-call state: the interceptors, their shared metadata and an optional
/// cancellation token.
///
/// A context can be reused for several calls; metadata persists between them.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    interceptors: Vec<Arc<dyn Interceptor>>,
    metadata: Metadata,
    failure_mode: InterceptorFailureMode,
    cancellation: Option<CancellationToken>,
}

impl ExecutionContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an interceptor after the existing ones.
    pub fn add_interceptor(&mut self, interceptor: impl Interceptor + 'static) -> &mut Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Registers an interceptor, builder style.
    pub fn with_interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.add_interceptor(interceptor);
        self
    }

    /// Replaces all interceptors.
    pub fn set_interceptors(&mut self, interceptors: Vec<Arc<dyn Interceptor>>) -> &mut Self {
        self.interceptors = interceptors;
        self
    }

    /// Returns the registered interceptors in invocation order.
    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.interceptors
    }

    /// Returns the shared metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns the shared metadata for modification.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Sets how hook failures are handled.
    pub fn with_failure_mode(mut self, mode: InterceptorFailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Returns how hook failures are handled.
    pub fn failure_mode(&self) -> InterceptorFailureMode {
        self.failure_mode
    }

    /// Attaches a cancellation token checked before every attempt and during backoff.
    ///
    /// Cancellation never interrupts a request that is already on the wire.
    ///
    /// # Examples
    ///
    /// ```
    /// use redial::{CancellationToken, ExecutionContext};
    ///
    /// let token = CancellationToken::new();
    /// let context = ExecutionContext::new().with_cancellation(token.clone());
    ///
    /// token.cancel();
    /// assert!(context.cancellation().unwrap().is_cancelled());
    /// ```
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Returns the cancellation token, if any.
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    pub(crate) fn before_send(&mut self, request: &mut HttpRequest) -> Result<()> {
        for interceptor in &self.interceptors {
            let result = interceptor.before_send(&mut self.metadata, request);
            handle_hook_result(self.failure_mode, Hook::BeforeSend, result)?;
        }
        Ok(())
    }

    pub(crate) fn after_response(
        &mut self,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> Result<()> {
        for interceptor in &self.interceptors {
            let result = interceptor.after_response(&mut self.metadata, request, response);
            handle_hook_result(self.failure_mode, Hook::AfterResponse, result)?;
        }
        Ok(())
    }

    pub(crate) fn on_error(&mut self, request: &HttpRequest, error: &Error) -> Result<()> {
        for interceptor in &self.interceptors {
            let result = interceptor.on_error(&mut self.metadata, request, error);
            handle_hook_result(self.failure_mode, Hook::OnError, result)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("interceptors", &self.interceptors.len())
            .field("metadata", &self.metadata)
            .field("failure_mode", &self.failure_mode)
            .field("cancellation", &self.cancellation)
            .finish()
    }
}

fn handle_hook_result(
    mode: InterceptorFailureMode,
    hook: Hook,
    result: std::result::Result<(), BoxError>,
) -> Result<()> {
    match (result, mode) {
        (Ok(()), _) => Ok(()),
        (Err(source), InterceptorFailureMode::Propagate) => Err(Error::interceptor(hook, source)),
        (Err(source), InterceptorFailureMode::Isolate) => {
            tracing::warn!(hook = %hook, error = %source, "Interceptor failed, continuing");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HttpMethod;
    use http::{HeaderMap, StatusCode};
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Interceptor for Recorder {
        fn before_send(
            &self,
            _metadata: &mut Metadata,
            request: &mut HttpRequest,
        ) -> std::result::Result<(), BoxError> {
            self.calls.lock().unwrap().push(format!("{}:before", self.name));
            request.set_header(format!("X-{}", self.name), "1");
            Ok(())
        }

        fn after_response(
            &self,
            _metadata: &mut Metadata,
            _request: &HttpRequest,
            _response: &mut HttpResponse,
        ) -> std::result::Result<(), BoxError> {
            self.calls.lock().unwrap().push(format!("{}:after", self.name));
            Ok(())
        }
    }

    struct Failing;

    impl Interceptor for Failing {
        fn before_send(
            &self,
            _metadata: &mut Metadata,
            _request: &mut HttpRequest,
        ) -> std::result::Result<(), BoxError> {
            Err("refused by policy".into())
        }
    }

    fn request() -> HttpRequest {
        HttpRequest::builder("test", HttpMethod::Get)
            .host("https://example.test")
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_hooks_run_in_registration_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut context = ExecutionContext::new()
            .with_interceptor(Recorder { name: "a", calls: calls.clone() })
            .with_interceptor(Recorder { name: "b", calls: calls.clone() });

        let mut request = request();
        context.before_send(&mut request).unwrap();
        let mut response = HttpResponse::new(StatusCode::OK, HeaderMap::new(), "");
        context.after_response(&request, &mut response).unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["a:before", "b:before", "a:after", "b:after"]
        );
        assert_eq!(request.headers().get("X-a"), Some("1"));
        assert_eq!(request.headers().get("X-b"), Some("1"));
    }

    #[test]
    fn test_failure_propagates_by_default() {
        let mut context = ExecutionContext::new().with_interceptor(Failing);
        let result = context.before_send(&mut request());
        assert!(matches!(
            result,
            Err(Error::Interceptor { hook: Hook::BeforeSend, .. })
        ));
    }

    #[test]
    fn test_isolated_failure_continues_with_next_interceptor() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut context = ExecutionContext::new()
            .with_failure_mode(InterceptorFailureMode::Isolate)
            .with_interceptor(Failing)
            .with_interceptor(Recorder { name: "after_failure", calls: calls.clone() });

        context.before_send(&mut request()).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["after_failure:before"]);
    }

    #[test]
    fn test_metadata_roundtrip() {
        let mut metadata = Metadata::new();
        assert!(metadata.insert("count", 1).is_none());
        assert_eq!(metadata.insert("count", 2), Some(serde_json::json!(1)));
        assert_eq!(metadata.get("count"), Some(&serde_json::json!(2)));
        assert!(metadata.contains_key("count"));
        metadata.remove("count");
        assert!(metadata.is_empty());
    }
}
