//! Example demonstrating interceptors and telemetry.
//!
//! This example shows how to:
//! - Stamp every attempt with a request id in `before_send`
//! - Rewrite responses in `after_response` before the handler sees them
//! - Observe transport failures in `on_error`
//! - Plug in a custom `TelemetrySink`
//!
//! Run with: `cargo run --example interceptors`

use redial::telemetry::AttemptLog;
use redial::{
    BoxError, DefaultRetryPolicy, Error, ExecutionContext, HttpClient, HttpMethod, HttpRequest,
    HttpResponse, Interceptor, InterceptorFailureMode, Metadata, OutcomeHandler, TelemetrySink,
};
use std::time::Duration;

struct RequestId;

impl Interceptor for RequestId {
    fn before_send(&self, metadata: &mut Metadata, request: &mut HttpRequest) -> Result<(), BoxError> {
        let attempt = metadata.get("attempt").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
        metadata.insert("attempt", attempt);
        request.set_header("X-Request-Id", format!("demo-{}", attempt));
        Ok(())
    }
}

struct AnnotateBody;

impl Interceptor for AnnotateBody {
    fn after_response(
        &self,
        metadata: &mut Metadata,
        _request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> Result<(), BoxError> {
        if let Some(serde_json::Value::Object(mut body)) = response.json_value() {
            if let Some(attempt) = metadata.get("attempt") {
                body.insert("_attempt".to_string(), attempt.clone());
            }
            response.set_body(serde_json::to_vec(&body)?);
        }
        Ok(())
    }
}

struct LogErrors;

impl Interceptor for LogErrors {
    fn on_error(
        &self,
        _metadata: &mut Metadata,
        request: &HttpRequest,
        error: &Error,
    ) -> Result<(), BoxError> {
        eprintln!("{} failed: {}", request.name(), error);
        Ok(())
    }
}

/// Prints one line per attempt.
struct PrintSink;

impl TelemetrySink for PrintSink {
    fn record(&self, log: &AttemptLog<'_>) {
        println!(
            "[{}] {} {} -> {:?} in {}ms (retries: {})",
            log.action,
            log.http_request.method,
            log.http_request.endpoint,
            log.http_response.map(HttpResponse::status_code),
            log.execution_time_ms,
            log.retries_attempted
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("redial=debug,interceptors=info")
        .init();

    let client = HttpClient::builder()
        .timeout(Duration::from_secs(10))
        .telemetry(PrintSink)
        .build()?;

    let mut context = ExecutionContext::new()
        .with_failure_mode(InterceptorFailureMode::Isolate)
        .with_interceptor(RequestId)
        .with_interceptor(AnnotateBody)
        .with_interceptor(LogErrors);

    let request = HttpRequest::builder("Headers", HttpMethod::Get)
        .host("https://httpbin.org")?
        .endpoint("/headers")
        .retry_policy(DefaultRetryPolicy::get())
        .build()?;

    let outcome = client.execute(&mut context, &request, &mut OutcomeHandler).await?;
    if let Some(response) = outcome.response() {
        println!("{}", response.text());
    }

    let unreachable = HttpRequest::builder("Unreachable", HttpMethod::Get)
        .host("http://127.0.0.1:9")?
        .endpoint("/")
        .build()?;
    let outcome = client
        .execute(&mut context, &unreachable, &mut OutcomeHandler)
        .await?;
    println!("Response present: {}", outcome.response().is_some());
    println!("Metadata after both calls: {:?}", context.metadata());

    Ok(())
}
