//! Rate-limit header parsing and a backoff strategy that honours it.
//!
//! Servers that throttle usually say when to come back, through `Retry-After`
//! or a reset timestamp. [`RetryAfterBackoff`] waits for exactly that long and
//! falls back to another strategy when the response carries no such hint.

use crate::{
    response::AttemptRecord,
    retry::{BackoffStrategy, DefaultBackoffStrategy},
};
use http::HeaderMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Information extracted from rate limit headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// When the rate limit resets (from X-RateLimit-Reset or RateLimit-Reset headers).
    pub reset_at: Option<SystemTime>,

    /// How long to wait before retrying (from Retry-After header).
    pub retry_after: Option<Duration>,

    /// Number of requests remaining in the current window.
    pub remaining: Option<u64>,
}

impl RateLimitInfo {
    /// Extracts rate limit information from HTTP response headers.
    ///
    /// Parses common rate limit headers including:
    /// - `Retry-After` (standard HTTP, seconds or HTTP date)
    /// - `X-RateLimit-Reset` (Unix timestamp)
    /// - `RateLimit-Reset` (draft standard, Unix timestamp)
    /// - `X-RateLimit-Remaining`
    ///
    /// # Examples
    ///
    /// ```
    /// use redial::rate_limit::RateLimitInfo;
    /// use http::HeaderMap;
    ///
    /// let mut headers = HeaderMap::new();
    /// headers.insert("retry-after", "60".parse().unwrap());
    /// headers.insert("x-ratelimit-remaining", "0".parse().unwrap());
    ///
    /// let info = RateLimitInfo::from_headers(&headers);
    /// assert!(info.retry_after.is_some());
    /// assert!(info.is_rate_limited());
    /// ```
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            reset_at: parse_rate_limit_reset(headers),
            retry_after: parse_retry_after(headers),
            remaining: parse_rate_limit_remaining(headers),
        }
    }

    /// Returns the recommended delay before retrying, capped by `max_wait`.
    ///
    /// `retry_after` wins over `reset_at`. Returns `None` when neither is
    /// present or the reset time has already passed.
    pub fn delay(&self, max_wait: Duration) -> Option<Duration> {
        if let Some(retry_after) = self.retry_after {
            return Some(retry_after.min(max_wait));
        }

        if let Some(reset_at) = self.reset_at {
            if let Ok(until_reset) = reset_at.duration_since(SystemTime::now()) {
                return Some(until_reset.min(max_wait));
            }
        }

        None
    }

    /// Returns `true` if `retry_after` is set or no requests remain.
    pub fn is_rate_limited(&self) -> bool {
        self.retry_after.is_some() || self.remaining == Some(0)
    }
}

/// Waits as long as the server asked, otherwise defers to a fallback strategy.
///
/// # Examples
///
/// ```
/// use redial::rate_limit::RetryAfterBackoff;
/// use redial::retry::{FixedBackoff, RetryOnStatus};
/// use redial::RetryPolicy;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), redial::Error> {
/// let backoff = RetryAfterBackoff::new(Duration::from_secs(60))
///     .with_fallback(FixedBackoff(Duration::from_secs(1)));
/// let _policy = RetryPolicy::new(RetryOnStatus(vec![429, 503]), backoff, 4)?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RetryAfterBackoff {
    max_wait: Duration,
    fallback: Arc<dyn BackoffStrategy>,
}

impl RetryAfterBackoff {
    /// Creates a strategy that waits at most `max_wait` for a server hint and
    /// uses [`DefaultBackoffStrategy`] when there is none.
    pub fn new(max_wait: Duration) -> Self {
        Self {
            max_wait,
            fallback: Arc::new(DefaultBackoffStrategy),
        }
    }

    /// Replaces the fallback strategy.
    pub fn with_fallback(mut self, fallback: impl BackoffStrategy + 'static) -> Self {
        self.fallback = Arc::new(fallback);
        self
    }

    /// Returns the longest delay taken from response headers.
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }
}

impl BackoffStrategy for RetryAfterBackoff {
    fn delay_before_next_retry(&self, record: &AttemptRecord, retries_attempted: u32) -> Duration {
        let hinted = record
            .response()
            .map(|response| RateLimitInfo::from_headers(response.headers()))
            .and_then(|info| info.delay(self.max_wait));

        match hinted {
            Some(delay) => {
                tracing::info!(
                    delay_ms = delay.as_millis(),
                    retries_attempted = retries_attempted,
                    max_wait_secs = self.max_wait.as_secs(),
                    "Rate limited - waiting before retry"
                );
                delay
            }
            None => self.fallback.delay_before_next_retry(record, retries_attempted),
        }
    }
}

impl fmt::Debug for RetryAfterBackoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAfterBackoff")
            .field("max_wait", &self.max_wait)
            .finish_non_exhaustive()
    }
}

/// Parses the Retry-After header.
///
/// Supports both delay-seconds (integer) and HTTP-date formats.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = headers.get("retry-after")?.to_str().ok()?;

    if let Ok(seconds) = header.trim().parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date_time = httpdate::parse_http_date(header).ok()?;
    // A date in the past means "now".
    Some(
        date_time
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO),
    )
}

/// Parses X-RateLimit-Reset or RateLimit-Reset headers (Unix timestamp).
fn parse_rate_limit_reset(headers: &HeaderMap) -> Option<SystemTime> {
    ["x-ratelimit-reset", "ratelimit-reset"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| value.trim().parse::<u64>().ok())
        .map(|timestamp| UNIX_EPOCH + Duration::from_secs(timestamp))
}

/// Parses X-RateLimit-Remaining header.
fn parse_rate_limit_remaining(headers: &HeaderMap) -> Option<u64> {
    let header = headers.get("x-ratelimit-remaining")?.to_str().ok()?;
    header.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::FixedBackoff;
    use crate::{HttpMethod, HttpRequest, HttpResponse};
    use http::{HeaderValue, StatusCode};
    use std::time::Instant;

    fn record_with_headers(headers: HeaderMap) -> AttemptRecord {
        let request = HttpRequest::builder("test", HttpMethod::Get)
            .host("https://example.test")
            .unwrap()
            .build()
            .unwrap();
        let response = HttpResponse::new(StatusCode::TOO_MANY_REQUESTS, headers, "");
        AttemptRecord::new(request, Some(response), None, 0, SystemTime::now(), Instant::now())
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("60"));

        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        let when = SystemTime::now() + Duration::from_secs(90);
        let mut headers = HeaderMap::new();
        headers.insert(
            "retry-after",
            HeaderValue::from_str(&httpdate::fmt_http_date(when)).unwrap(),
        );

        let delay = parse_retry_after(&headers).unwrap();
        assert!(delay > Duration::from_secs(85) && delay <= Duration::from_secs(90));
    }

    #[test]
    fn test_rate_limit_info_with_reset_and_remaining() {
        let mut headers = HeaderMap::new();
        let future_time = SystemTime::now() + Duration::from_secs(2);
        let future_timestamp = future_time.duration_since(UNIX_EPOCH).unwrap().as_secs();

        headers.insert(
            "x-ratelimit-reset",
            HeaderValue::from_str(&future_timestamp.to_string()).unwrap(),
        );
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));

        let info = RateLimitInfo::from_headers(&headers);
        assert!(info.reset_at.is_some());
        assert_eq!(info.remaining, Some(0));
        assert!(info.is_rate_limited(), "Should be rate limited when remaining=0");

        // Unix timestamps truncate to whole seconds, so allow up to a second less.
        let delay = info.delay(Duration::from_secs(300)).expect("Should have a delay");
        assert!(
            delay >= Duration::from_secs(1) && delay <= Duration::from_secs(3),
            "Delay should be 1-3 seconds, got {:?}",
            delay
        );
    }

    #[test]
    fn test_parse_draft_rate_limit_reset() {
        let mut headers = HeaderMap::new();
        headers.insert("ratelimit-reset", HeaderValue::from_static("4102444800"));

        assert_eq!(
            parse_rate_limit_reset(&headers),
            Some(UNIX_EPOCH + Duration::from_secs(4_102_444_800))
        );
    }

    #[test]
    fn test_parse_rate_limit_remaining() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("42"));

        assert_eq!(parse_rate_limit_remaining(&headers), Some(42));
    }

    #[test]
    fn test_rate_limit_delay_capped_by_max_wait() {
        let info = RateLimitInfo {
            reset_at: None,
            retry_after: Some(Duration::from_secs(600)),
            remaining: Some(0),
        };

        assert_eq!(info.delay(Duration::from_secs(300)), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_retry_after_backoff_uses_header() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("7"));
        let backoff = RetryAfterBackoff::new(Duration::from_secs(60))
            .with_fallback(FixedBackoff(Duration::from_millis(1)));

        let delay = backoff.delay_before_next_retry(&record_with_headers(headers), 0);
        assert_eq!(delay, Duration::from_secs(7));
    }

    #[test]
    fn test_retry_after_backoff_falls_back_without_hint() {
        let backoff = RetryAfterBackoff::new(Duration::from_secs(60))
            .with_fallback(FixedBackoff(Duration::from_millis(250)));

        let delay = backoff.delay_before_next_retry(&record_with_headers(HeaderMap::new()), 3);
        assert_eq!(delay, Duration::from_millis(250));
    }

    #[test]
    fn test_retry_after_backoff_default_fallback() {
        let backoff = RetryAfterBackoff::new(Duration::from_secs(60));
        let delay = backoff.delay_before_next_retry(&record_with_headers(HeaderMap::new()), 1);
        assert_eq!(delay, DefaultBackoffStrategy::delay_for(1));
    }
}
