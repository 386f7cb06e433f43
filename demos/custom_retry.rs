//! Example demonstrating custom retry conditions and backoff strategies.
//!
//! This example shows how to:
//! - Implement a domain-specific `RetryCondition`
//! - Combine conditions with `AnyCondition` / `AllCondition`
//! - Honour `Retry-After` with `RetryAfterBackoff`
//! - Tell "completed" apart from "gave up" with a custom `ResponseHandler`
//!
//! Run with: `cargo run --example custom_retry`

use redial::rate_limit::RetryAfterBackoff;
use redial::retry::{
    AllCondition, AnyCondition, ExponentialBackoff, FixedBackoff, RetryOnStatus,
    RetryOnTransportError,
};
use redial::{
    AttemptRecord, DefaultRetryPolicy, Error, ExecutionContext, HttpClient, HttpMethod,
    HttpRequest, ResponseHandler, RetryCondition, RetryPolicy,
};
use std::time::Duration;

/// Retries when the body mentions one of the given patterns.
struct RetryOnErrorMessage {
    patterns: Vec<String>,
}

impl RetryCondition for RetryOnErrorMessage {
    fn should_retry(&self, record: &AttemptRecord, _retries_attempted: u32) -> bool {
        record
            .response()
            .map(|response| response.text())
            .is_some_and(|body| self.patterns.iter().any(|pattern| body.contains(pattern)))
    }
}

/// Prints a one-line summary of how the call ended.
struct Summary;

impl ResponseHandler<String> for Summary {
    fn on_response(&mut self, record: AttemptRecord) -> String {
        match record.status_code() {
            Some(status) => format!(
                "completed with {} after {} retries",
                status,
                record.retries_attempted()
            ),
            None => format!(
                "failed without a response: {}",
                record.error().map(ToString::to_string).unwrap_or_default()
            ),
        }
    }

    fn on_max_retry_attempted(&mut self, record: AttemptRecord) -> String {
        format!(
            "gave up after {} retries, last status {:?}",
            record.retries_attempted(),
            record.status_code()
        )
    }
}

async fn run(client: &HttpClient, title: &str, request: HttpRequest) -> Result<(), Error> {
    println!("=== {} ===", title);
    let summary = client
        .execute(&mut ExecutionContext::new(), &request, &mut Summary)
        .await?;
    println!("{}", summary);
    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("redial=info,custom_retry=info")
        .init();

    let client = HttpClient::builder()
        .timeout(Duration::from_secs(10))
        .max_backoff(Duration::from_secs(5))
        .build()?;

    // The reference policy retries 500 and 503 up to five times.
    let request = HttpRequest::builder("Outage", HttpMethod::Get)
        .host("https://httpbin.org")?
        .endpoint("/status/503")
        .retry_policy(DefaultRetryPolicy::get())
        .build()?;
    run(&client, "Example 1: Default policy", request).await?;

    // Retry on 429 or on connection failures, waiting as long as the server asks.
    let condition = AnyCondition::new(vec![
        Box::new(RetryOnStatus(vec![429])),
        Box::new(RetryOnTransportError),
    ]);
    let backoff = RetryAfterBackoff::new(Duration::from_secs(30))
        .with_fallback(FixedBackoff(Duration::from_millis(500)));
    let request = HttpRequest::builder("RateLimited", HttpMethod::Get)
        .host("https://httpbin.org")?
        .endpoint("/status/429")
        .retry_policy(RetryPolicy::new(condition, backoff, 2)?)
        .build()?;
    run(&client, "Example 2: Rate limits", request).await?;

    // Retry only 5xx responses whose body names a transient problem.
    let condition = AllCondition::new(vec![
        Box::new(RetryOnStatus(vec![500, 502, 503, 504])),
        Box::new(RetryOnErrorMessage {
            patterns: vec!["temporarily".to_string(), "try again".to_string()],
        }),
    ]);
    let backoff = ExponentialBackoff {
        base: Duration::from_millis(100),
        max: Duration::from_secs(2),
        jitter: true,
    };
    let request = HttpRequest::builder("Transient", HttpMethod::Get)
        .host("https://httpbin.org")?
        .endpoint("/status/500")
        .retry_policy(RetryPolicy::new(condition, backoff, 3)?)
        .build()?;
    run(&client, "Example 3: Combined conditions", request).await?;

    // Keep polling until the job reports completion.
    let until_done = |record: &AttemptRecord, _retries_attempted: u32| {
        record
            .response()
            .and_then(|response| response.json_value())
            .and_then(|json| json.get("status").and_then(|s| s.as_str()).map(str::to_owned))
            .is_some_and(|status| status != "done")
    };
    let request = HttpRequest::builder("Poll", HttpMethod::Get)
        .host("https://httpbin.org")?
        .endpoint("/json")
        .retry_policy(
            RetryPolicy::new(until_done, FixedBackoff(Duration::from_secs(1)), 0)?.retry_forever(),
        )
        .build()?;
    run(&client, "Example 4: Retry forever while the condition holds", request).await?;

    Ok(())
}
