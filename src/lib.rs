//! # Redial - configurable HTTP request execution
//!
//! Redial executes declaratively described HTTP requests. A request carries
//! its method, destination, headers, query parameters, optional payload and
//! optional retry policy. The engine runs every attempt through caller-supplied
//! interceptors, hands the wire request to a pluggable transport, evaluates the
//! retry policy and finally delivers the last attempt to a response handler.
//!
//! ## Quick Start
//!
//! ```no_run
//! use redial::{
//!     DefaultRetryPolicy, ExecutionContext, HttpClient, HttpMethod, HttpRequest, Outcome,
//!     OutcomeHandler,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), redial::Error> {
//!     let client = HttpClient::new()?;
//!
//!     let request = HttpRequest::builder("GetUser", HttpMethod::Get)
//!         .host("https://api.example.com")?
//!         .endpoint("/users/123")
//!         .header("Accept", "application/json")?
//!         .retry_policy(DefaultRetryPolicy::get())
//!         .build()?;
//!
//!     let mut context = ExecutionContext::new();
//!     match client.execute(&mut context, &request, &mut OutcomeHandler).await? {
//!         Outcome::Completed(record) => {
//!             println!("status {:?} after {} retries", record.status_code(), record.retries_attempted());
//!         }
//!         Outcome::Exhausted(record) => {
//!             eprintln!("gave up, last status {:?}", record.status_code());
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Payloads** - raw bodies in a chosen charset, URL-encoded and multipart forms with file parts
//! - **Interceptors** - `before_send`, `after_response` and `on_error` hooks sharing per-call metadata
//! - **Retry policies** - pluggable conditions and backoff strategies, retry budgets and retry-forever
//! - **Failures as data** - connection and encoding errors reach the handler as attempts without a response
//! - **Telemetry** - one structured record per attempt, emitted through `tracing` by default
//! - **Cancellation** - a token checked before every attempt and during backoff
//! - **Pluggable transport** - `reqwest` out of the box, anything implementing [`Transport`] otherwise
//!
//! ## Retry Policies
//!
//! ```
//! use redial::retry::{AnyCondition, DefaultRetryCondition, ExponentialBackoff, RetryOnTransportError};
//! use redial::RetryPolicy;
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), redial::Error> {
//! let policy = RetryPolicy::new(
//!     AnyCondition::new(vec![Box::new(DefaultRetryCondition), Box::new(RetryOnTransportError)]),
//!     ExponentialBackoff {
//!         base: Duration::from_millis(200),
//!         max: Duration::from_secs(10),
//!         jitter: true,
//!     },
//!     4,
//! )?;
//! assert_eq!(policy.max_error_retry(), 4);
//! # Ok(())
//! # }
//! ```

mod assemble;
mod client;
mod error;
mod handler;
mod interceptor;
pub mod payload;
pub mod rate_limit;
mod request;
mod response;
pub mod retry;
pub mod telemetry;
mod transport;

pub use assemble::{assemble_request, BasicCredentials, RequestTimeout};
pub use client::{ClientBuilder, HttpClient};
pub use error::{BoxError, Error, Hook, Result, TransportError, TransportErrorKind};
pub use handler::{Outcome, OutcomeHandler, ResponseHandler};
pub use interceptor::{ExecutionContext, Interceptor, InterceptorFailureMode, Metadata};
pub use payload::{EncodedPayload, Payload};
pub use request::{HttpMethod, HttpRequest, HttpRequestBuilder, Params};
pub use response::{AttemptRecord, HttpResponse};
pub use retry::{
    BackoffStrategy, DefaultBackoffStrategy, DefaultRetryCondition, DefaultRetryPolicy,
    RetryCondition, RetryDecision, RetryPolicy,
};
pub use telemetry::{TelemetrySink, TracingSink};
pub use transport::Transport;

pub use tokio_util::sync::CancellationToken;
