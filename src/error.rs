//! Error types for request execution.
//!
//! Errors fall into two groups. Configuration errors, interceptor errors and
//! cancellation abort a call and are returned from
//! [`HttpClient::execute`](crate::HttpClient::execute). Encoding, URI and
//! transport errors belong to a single attempt: they are handed to the
//! interceptors' `on_error` hook, recorded on the [`AttemptRecord`](crate::AttemptRecord)
//! and never returned from `execute`.

use std::fmt;

/// A boxed error returned by caller-supplied hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The interceptor lifecycle point a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    /// [`Interceptor::before_send`](crate::Interceptor::before_send).
    BeforeSend,
    /// [`Interceptor::after_response`](crate::Interceptor::after_response).
    AfterResponse,
    /// [`Interceptor::on_error`](crate::Interceptor::on_error).
    OnError,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Hook::BeforeSend => "before_send",
            Hook::AfterResponse => "after_response",
            Hook::OnError => "on_error",
        };
        f.write_str(name)
    }
}

/// The broad category of a [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The connection could not be established.
    Connect,
    /// The transport gave up waiting for the server.
    Timeout,
    /// The request could not be built or the response violated the protocol.
    Protocol,
    /// The response body could not be read.
    Body,
    /// Anything else.
    Other,
}

/// A failure reported by a [`Transport`](crate::Transport).
#[derive(thiserror::Error, Debug)]
#[error("{kind:?} failure: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl TransportError {
    /// Creates a transport error without an underlying cause.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a transport error wrapping an underlying cause.
    pub fn with_source(
        kind: TransportErrorKind,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the category of this failure.
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Returns the human readable message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            TransportErrorKind::Timeout
        } else if error.is_connect() {
            TransportErrorKind::Connect
        } else if error.is_body() || error.is_decode() {
            TransportErrorKind::Body
        } else if error.is_builder() || error.is_request() {
            TransportErrorKind::Protocol
        } else {
            TransportErrorKind::Other
        };
        Self::with_source(kind, error.to_string(), error)
    }
}

/// The main error type of the crate.
///
/// # Examples
///
/// ```
/// use redial::{Error, RetryPolicy, DefaultRetryCondition, DefaultBackoffStrategy};
///
/// let result = RetryPolicy::new(DefaultRetryCondition, DefaultBackoffStrategy, -1);
/// match result {
///     Err(Error::ConfigurationError(message)) => assert!(message.contains("max_error_retry")),
///     _ => panic!("negative retry counts are rejected"),
/// }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid configuration was provided.
    ///
    /// Raised while building a request, a payload, a retry policy or a client.
    /// Never retried.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The host could not be parsed as an absolute URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The resolved request URI was rejected while assembling the wire request.
    #[error("Invalid request URI: {0}")]
    Uri(String),

    /// A header set on the request is not a valid HTTP header.
    ///
    /// Headers given to the builder are validated up front; this covers headers
    /// added later by interceptors.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// The payload could not be encoded.
    ///
    /// Unsupported charsets, characters the charset cannot represent and file
    /// parts in URL-encoded forms end up here.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The transport failed to deliver the request or read the response.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// An interceptor hook failed.
    ///
    /// This aborts the whole call, including any pending retries.
    #[error("Interceptor failed in {hook}: {source}")]
    Interceptor {
        /// The hook that failed.
        hook: Hook,
        /// The error returned by the hook.
        source: BoxError,
    },

    /// The call was cancelled through its [`CancellationToken`](crate::CancellationToken).
    #[error("Cancelled after {attempts} attempts")]
    Cancelled {
        /// The number of attempts that were started before cancellation.
        attempts: u32,
    },
}

impl Error {
    /// Returns `true` if this error describes a problem with how the call was
    /// configured rather than with a particular attempt.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::ConfigurationError(_) | Error::InvalidUrl(_))
    }

    /// Returns `true` if this error is potentially transient.
    ///
    /// Only transport failures qualify. Whether a transient failure is actually
    /// retried is decided by the request's [`RetryPolicy`](crate::RetryPolicy).
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::ConfigurationError(_) => false,
            Error::InvalidUrl(_) => false,
            Error::Uri(_) => false,
            Error::InvalidHeader(_) => false,
            Error::Encoding(_) => false,
            Error::Interceptor { .. } => false,
            Error::Cancelled { .. } => false,
        }
    }

    /// Returns the transport error if this is one.
    pub fn as_transport(&self) -> Option<&TransportError> {
        match self {
            Error::Transport(e) => Some(e),
            _ => None,
        }
    }

    pub(crate) fn interceptor(hook: Hook, source: BoxError) -> Self {
        Error::Interceptor { hook, source }
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_errors_are_retryable() {
        let transport = Error::Transport(TransportError::new(
            TransportErrorKind::Connect,
            "connection refused",
        ));
        assert!(transport.is_retryable());
        assert!(!Error::Encoding("bad charset".into()).is_retryable());
        assert!(!Error::ConfigurationError("bad".into()).is_retryable());
        assert!(!Error::Cancelled { attempts: 1 }.is_retryable());
    }

    #[test]
    fn test_configuration_classification() {
        let parse_err = url::Url::parse("not a url").unwrap_err();
        assert!(Error::InvalidUrl(parse_err).is_configuration());
        assert!(Error::ConfigurationError("x".into()).is_configuration());
        assert!(!Error::Uri("x".into()).is_configuration());
    }

    #[test]
    fn test_interceptor_error_display_names_hook() {
        let err = Error::interceptor(Hook::AfterResponse, "boom".into());
        assert_eq!(err.to_string(), "Interceptor failed in after_response: boom");
    }

    #[test]
    fn test_transport_error_keeps_kind() {
        let err = TransportError::new(TransportErrorKind::Timeout, "slow");
        assert_eq!(err.kind(), TransportErrorKind::Timeout);
        assert_eq!(err.message(), "slow");
        assert_eq!(err.to_string(), "Timeout failure: slow");
    }
}
