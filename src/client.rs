//! The execution engine: runs a request through interceptors, the transport
//! and its retry policy.
//!
//! [`HttpClient`] is the main entry point. Use [`ClientBuilder`] to configure
//! client-wide defaults and to plug in a custom [`Transport`].

use crate::{
    assemble::assemble_request,
    handler::ResponseHandler,
    interceptor::ExecutionContext,
    request::HttpRequest,
    response::AttemptRecord,
    retry::{RetryDecision, MAX_BACKOFF},
    telemetry::{AttemptLog, TelemetrySink, TracingSink},
    transport::Transport,
    Error, Result,
};
use http::{header::USER_AGENT, HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio_util::sync::CancellationToken;

/// Executes [`HttpRequest`]s with interceptors, retries and telemetry.
///
/// The client holds no per-call state and is cheap to clone; clones share the
/// transport and configuration.
///
/// # Examples
///
/// ```no_run
/// use redial::{ExecutionContext, HttpClient, HttpMethod, HttpRequest, OutcomeHandler, Payload};
///
/// # async fn example() -> Result<(), redial::Error> {
/// let client = HttpClient::new()?;
/// let request = HttpRequest::builder("CreateUser", HttpMethod::Post)
///     .host("https://api.example.com")?
///     .endpoint("/users")
///     .payload(Payload::json(r#"{"name":"Alice"}"#))
///     .build()?;
///
/// let outcome = client
///     .execute(&mut ExecutionContext::new(), &request, &mut OutcomeHandler)
///     .await?;
/// if let Some(response) = outcome.response() {
///     println!("{}: {}", response.status_code(), response.text());
/// }
/// # Ok(())
/// # }
/// ```
pub struct HttpClient<T = reqwest::Client> {
    inner: Arc<ClientInner<T>>,
}

struct ClientInner<T> {
    transport: T,
    default_headers: HeaderMap,
    telemetry: Arc<dyn TelemetrySink>,
    max_backoff: Duration,
    timeout: Option<Duration>,
}

impl<T> Clone for HttpClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl HttpClient {
    /// Creates a client with default settings over a `reqwest` transport.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the transport cannot be created.
    pub fn new() -> Result<Self> {
        ClientBuilder::new().build()
    }

    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

impl<T: Transport> HttpClient<T> {
    /// Creates a client with default settings over `transport`.
    pub fn with_transport(transport: T) -> Self {
        ClientBuilder::new().into_client(transport)
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Executes `request` until its retry policy is satisfied and hands the
    /// last attempt to `handler`.
    ///
    /// `request` is never modified. Every attempt works on a fresh copy, so
    /// changes made by interceptors last for one attempt only. Without a retry
    /// policy exactly one attempt is made.
    ///
    /// Failures of a single attempt (connection errors, payload encoding
    /// errors, error statuses) are not returned as `Err`: they reach `handler`
    /// as a record whose response is absent or carries the error status.
    ///
    /// # Errors
    ///
    /// * [`Error::Interceptor`] if a hook failed and the context propagates failures
    /// * [`Error::Cancelled`] if the context's cancellation token fired
    pub async fn execute<R, H>(
        &self,
        context: &mut ExecutionContext,
        request: &HttpRequest,
        handler: &mut H,
    ) -> Result<R>
    where
        H: ResponseHandler<R> + ?Sized,
    {
        let mut retries_attempted = 0u32;

        loop {
            if context.cancellation().is_some_and(CancellationToken::is_cancelled) {
                tracing::info!(
                    name = %request.name(),
                    attempts = retries_attempted,
                    "Call cancelled"
                );
                return Err(Error::Cancelled {
                    attempts: retries_attempted,
                });
            }

            let record = self.attempt(context, request, retries_attempted).await?;

            let Some(policy) = request.retry_policy() else {
                return Ok(handler.on_response(record));
            };

            match policy.decide(&record) {
                RetryDecision::Complete => return Ok(handler.on_response(record)),
                RetryDecision::Exhausted => {
                    tracing::warn!(
                        name = %request.name(),
                        status = record.status_code(),
                        retries_attempted = retries_attempted,
                        "Maximum retries attempted"
                    );
                    return Ok(handler.on_max_retry_attempted(record));
                }
                RetryDecision::Retry(delay) => {
                    let delay = delay.min(self.inner.max_backoff);
                    tracing::info!(
                        name = %request.name(),
                        delay_ms = delay.as_millis(),
                        retries_attempted = retries_attempted,
                        "Retrying request after delay"
                    );
                    drop(record);

                    if !wait(context.cancellation(), delay).await {
                        return Err(Error::Cancelled {
                            attempts: retries_attempted + 1,
                        });
                    }
                    retries_attempted = retries_attempted.saturating_add(1);
                }
            }
        }
    }

    /// Executes a single attempt on a fresh copy of `request`.
    async fn attempt(
        &self,
        context: &mut ExecutionContext,
        request: &HttpRequest,
        retries_attempted: u32,
    ) -> Result<AttemptRecord> {
        let started_at = SystemTime::now();
        let started = Instant::now();

        let mut working = request.clone();
        context.before_send(&mut working)?;

        tracing::debug!(
            name = %working.name(),
            method = %working.method(),
            endpoint = %working.endpoint(),
            retries_attempted = retries_attempted,
            "Executing HTTP request"
        );

        let sent = match assemble_request(
            &mut working,
            &self.inner.default_headers,
            self.inner.timeout,
        ) {
            Ok(wire) => self.inner.transport.send(wire).await.map_err(Error::from),
            Err(e) => Err(e),
        };

        let (response, error) = match sent {
            Ok(mut response) => {
                tracing::info!(
                    status = response.status_code(),
                    latency_ms = started.elapsed().as_millis(),
                    retries_attempted = retries_attempted,
                    "Received HTTP response"
                );
                context.after_response(&working, &mut response)?;
                (Some(response), None)
            }
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    retries_attempted = retries_attempted,
                    method = %working.method(),
                    endpoint = %working.endpoint(),
                    "Request failed"
                );
                context.on_error(&working, &error)?;
                (None, Some(error))
            }
        };

        let record = AttemptRecord::new(
            working,
            response,
            error,
            retries_attempted,
            started_at,
            started,
        );
        self.inner.telemetry.record(&AttemptLog::from(&record));

        Ok(record)
    }
}

/// Sleeps for `delay`. Returns `false` if `cancellation` fired first.
async fn wait(cancellation: Option<&CancellationToken>, delay: Duration) -> bool {
    match cancellation {
        Some(token) => tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = token.cancelled() => false,
        },
        None => {
            tokio::time::sleep(delay).await;
            true
        }
    }
}

/// Builder for configuring and creating an [`HttpClient`].
///
/// # Examples
///
/// ```no_run
/// use redial::ClientBuilder;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), redial::Error> {
/// let client = ClientBuilder::new()
///     .timeout(Duration::from_secs(30))
///     .user_agent("my-app/1.0")?
///     .default_header("Accept", "application/json")?
///     .max_backoff(Duration::from_secs(60))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder<T = reqwest::Client> {
    transport: Option<T>,
    default_headers: HeaderMap,
    telemetry: Arc<dyn TelemetrySink>,
    max_backoff: Duration,
    timeout: Option<Duration>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            transport: None,
            default_headers: HeaderMap::new(),
            telemetry: Arc::new(TracingSink),
            max_backoff: MAX_BACKOFF,
            timeout: None,
        }
    }
}

impl<T: Transport> ClientBuilder<T> {
    /// Sets the transport that sends wire requests.
    pub fn transport<U: Transport>(self, transport: U) -> ClientBuilder<U> {
        ClientBuilder {
            transport: Some(transport),
            default_headers: self.default_headers,
            telemetry: self.telemetry,
            max_backoff: self.max_backoff,
            timeout: self.timeout,
        }
    }

    /// Sets the timeout applied to every attempt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Adds a header sent with every request unless the request sets it itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the `User-Agent` default header.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a valid header value.
    pub fn user_agent(self, user_agent: impl AsRef<str>) -> Result<Self> {
        self.default_header(USER_AGENT.as_str(), user_agent)
    }

    /// Sets the sink receiving one record per attempt. Defaults to [`TracingSink`].
    pub fn telemetry(mut self, sink: impl TelemetrySink + 'static) -> Self {
        self.telemetry = Arc::new(sink);
        self
    }

    /// Lowers the ceiling applied to every backoff delay.
    ///
    /// Values above [`MAX_BACKOFF`] are clamped to it.
    pub fn max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff.min(MAX_BACKOFF);
        self
    }

    /// Builds the configured `HttpClient`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no transport was set and the default
    /// one cannot be created.
    pub fn build(mut self) -> Result<HttpClient<T>> {
        let transport = match self.transport.take() {
            Some(transport) => transport,
            None => T::default_transport().map_err(|e| {
                Error::ConfigurationError(format!("Failed to build HTTP transport: {}", e))
            })?,
        };
        Ok(self.into_client(transport))
    }

    fn into_client<U>(self, transport: U) -> HttpClient<U> {
        HttpClient {
            inner: Arc::new(ClientInner {
                transport,
                default_headers: self.default_headers,
                telemetry: self.telemetry,
                max_backoff: self.max_backoff,
                timeout: self.timeout,
            }),
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
