//! Retry policies: when to retry a completed attempt and how long to wait.
//!
//! A [`RetryPolicy`] combines a [`RetryCondition`], a [`BackoffStrategy`] and a
//! bound on the number of retries. After every attempt the policy decides
//! between retrying, completing normally and reporting that retries were
//! exhausted (see [`RetryPolicy::decide`]).
//!
//! Policies hold no per-call state and can be shared between concurrent calls.

use crate::{response::AttemptRecord, Error, Result};
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Hard ceiling applied to every backoff delay.
pub const MAX_BACKOFF: Duration = Duration::from_millis(300_000);

/// Decides whether a completed attempt should be retried.
///
/// Closures of the form `Fn(&AttemptRecord, u32) -> bool` implement this trait.
///
/// # Examples
///
/// ```
/// use redial::{AttemptRecord, RetryCondition};
///
/// struct RetryOnTooManyRequests;
///
/// impl RetryCondition for RetryOnTooManyRequests {
///     fn should_retry(&self, record: &AttemptRecord, _retries_attempted: u32) -> bool {
///         record.status_code() == Some(429)
///     }
/// }
/// ```
pub trait RetryCondition: Send + Sync {
    /// Returns `true` if another attempt should be made.
    ///
    /// # Arguments
    ///
    /// * `record` - The attempt that just completed
    /// * `retries_attempted` - How many retries preceded it (0 for the first attempt)
    fn should_retry(&self, record: &AttemptRecord, retries_attempted: u32) -> bool;
}

impl<F> RetryCondition for F
where
    F: Fn(&AttemptRecord, u32) -> bool + Send + Sync,
{
    fn should_retry(&self, record: &AttemptRecord, retries_attempted: u32) -> bool {
        self(record, retries_attempted)
    }
}

/// Computes the delay before the next attempt.
///
/// Closures of the form `Fn(&AttemptRecord, u32) -> Duration` implement this trait.
pub trait BackoffStrategy: Send + Sync {
    /// Returns how long to wait before retrying.
    fn delay_before_next_retry(&self, record: &AttemptRecord, retries_attempted: u32) -> Duration;
}

impl<F> BackoffStrategy for F
where
    F: Fn(&AttemptRecord, u32) -> Duration + Send + Sync,
{
    fn delay_before_next_retry(&self, record: &AttemptRecord, retries_attempted: u32) -> Duration {
        self(record, retries_attempted)
    }
}

/// Retries when the server reports an outage: status 500 or 503.
///
/// An attempt without a response is never retried by this condition.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRetryCondition;

impl RetryCondition for DefaultRetryCondition {
    fn should_retry(&self, record: &AttemptRecord, _retries_attempted: u32) -> bool {
        matches!(record.status_code(), Some(500) | Some(503))
    }
}

/// Exponential backoff starting at 3 seconds, capped at 2 minutes.
///
/// The delay is `min(3000ms * 2^retries_attempted, 120000ms)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBackoffStrategy;

impl DefaultBackoffStrategy {
    const BASE_DELAY_MS: u64 = 3_000;
    const MAX_DELAY_MS: u64 = 120_000;

    /// Returns the delay for the given retry count.
    pub fn delay_for(retries_attempted: u32) -> Duration {
        let multiplier = 1u64.checked_shl(retries_attempted).unwrap_or(u64::MAX);
        let delay = multiplier
            .saturating_mul(Self::BASE_DELAY_MS)
            .min(Self::MAX_DELAY_MS);
        Duration::from_millis(delay)
    }
}

impl BackoffStrategy for DefaultBackoffStrategy {
    fn delay_before_next_retry(&self, _record: &AttemptRecord, retries_attempted: u32) -> Duration {
        Self::delay_for(retries_attempted)
    }
}

/// Retry on any 5xx response.
#[derive(Debug, Clone, Copy)]
pub struct RetryOn5xx;

impl RetryCondition for RetryOn5xx {
    fn should_retry(&self, record: &AttemptRecord, _retries_attempted: u32) -> bool {
        record
            .response()
            .is_some_and(|response| response.status().is_server_error())
    }
}

/// Retry on a fixed set of status codes.
#[derive(Debug, Clone)]
pub struct RetryOnStatus(pub Vec<u16>);

impl RetryCondition for RetryOnStatus {
    fn should_retry(&self, record: &AttemptRecord, _retries_attempted: u32) -> bool {
        record
            .status_code()
            .is_some_and(|status| self.0.contains(&status))
    }
}

/// Retry when the attempt produced no response because the transport failed.
///
/// Encoding and URI errors are not retried; they would fail the same way again.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnTransportError;

impl RetryCondition for RetryOnTransportError {
    fn should_retry(&self, record: &AttemptRecord, _retries_attempted: u32) -> bool {
        record.response().is_none() && record.error().is_some_and(Error::is_retryable)
    }
}

/// Combine multiple conditions with OR logic.
///
/// # Examples
///
/// ```
/// use redial::retry::{AnyCondition, DefaultRetryCondition, RetryOnTransportError};
///
/// // Retry on outages OR connection failures
/// let condition = AnyCondition::new(vec![
///     Box::new(DefaultRetryCondition),
///     Box::new(RetryOnTransportError),
/// ]);
/// ```
pub struct AnyCondition {
    conditions: Vec<Box<dyn RetryCondition>>,
}

impl AnyCondition {
    /// Creates a new `AnyCondition` from a list of conditions.
    pub fn new(conditions: Vec<Box<dyn RetryCondition>>) -> Self {
        Self { conditions }
    }
}

impl RetryCondition for AnyCondition {
    fn should_retry(&self, record: &AttemptRecord, retries_attempted: u32) -> bool {
        self.conditions
            .iter()
            .any(|c| c.should_retry(record, retries_attempted))
    }
}

/// Combine multiple conditions with AND logic.
pub struct AllCondition {
    conditions: Vec<Box<dyn RetryCondition>>,
}

impl AllCondition {
    /// Creates a new `AllCondition` from a list of conditions.
    pub fn new(conditions: Vec<Box<dyn RetryCondition>>) -> Self {
        Self { conditions }
    }
}

impl RetryCondition for AllCondition {
    fn should_retry(&self, record: &AttemptRecord, retries_attempted: u32) -> bool {
        self.conditions
            .iter()
            .all(|c| c.should_retry(record, retries_attempted))
    }
}

/// Exponential backoff with a configurable base, ceiling and optional jitter.
///
/// The delay before retry `n` (0-based) is `base * 2^n`, capped at `max`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Scale each delay by a random factor between 0.5 and 1.0.
    pub jitter: bool,
}

impl BackoffStrategy for ExponentialBackoff {
    fn delay_before_next_retry(&self, _record: &AttemptRecord, retries_attempted: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(retries_attempted);
        let delay = self.base.saturating_mul(multiplier).min(self.max);

        if self.jitter {
            let jitter_factor = rand::thread_rng().gen_range(0.5..=1.0);
            delay.mul_f64(jitter_factor)
        } else {
            delay
        }
    }
}

/// The same delay before every retry.
#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff(pub Duration);

impl BackoffStrategy for FixedBackoff {
    fn delay_before_next_retry(&self, _record: &AttemptRecord, _retries_attempted: u32) -> Duration {
        self.0
    }
}

/// What to do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait for the delay, then attempt again.
    Retry(Duration),
    /// Deliver the attempt to the response handler.
    Complete,
    /// The retry budget is spent; deliver the attempt as exhausted.
    Exhausted,
}

/// A retry condition, a backoff strategy and a retry budget.
///
/// # Examples
///
/// ```
/// use redial::{DefaultBackoffStrategy, DefaultRetryCondition, RetryPolicy};
///
/// # fn example() -> Result<(), redial::Error> {
/// let policy = RetryPolicy::new(DefaultRetryCondition, DefaultBackoffStrategy, 3)?;
/// assert_eq!(policy.max_error_retry(), 3);
///
/// let forever = RetryPolicy::new(DefaultRetryCondition, DefaultBackoffStrategy, 0)?
///     .retry_forever();
/// assert!(forever.is_retry_forever());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RetryPolicy {
    condition: Arc<dyn RetryCondition>,
    backoff: Arc<dyn BackoffStrategy>,
    max_error_retry: u32,
    retry_forever: bool,
}

impl RetryPolicy {
    /// Creates a policy allowing up to `max_error_retry` retries.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `max_error_retry` is negative or does not fit in `u32`.
    pub fn new(
        condition: impl RetryCondition + 'static,
        backoff: impl BackoffStrategy + 'static,
        max_error_retry: i64,
    ) -> Result<Self> {
        let max_error_retry = u32::try_from(max_error_retry).map_err(|_| {
            Error::ConfigurationError(format!(
                "max_error_retry must be between 0 and {}, got {}",
                u32::MAX,
                max_error_retry
            ))
        })?;
        Ok(Self::from_parts(
            Arc::new(condition),
            Arc::new(backoff),
            max_error_retry,
        ))
    }

    /// Creates a policy from shared condition and backoff implementations.
    pub fn from_parts(
        condition: Arc<dyn RetryCondition>,
        backoff: Arc<dyn BackoffStrategy>,
        max_error_retry: u32,
    ) -> Self {
        Self {
            condition,
            backoff,
            max_error_retry,
            retry_forever: false,
        }
    }

    /// Keeps retrying for as long as the condition asks, ignoring the retry budget.
    pub fn retry_forever(mut self) -> Self {
        self.retry_forever = true;
        self
    }

    /// Returns the retry budget.
    pub fn max_error_retry(&self) -> u32 {
        self.max_error_retry
    }

    /// Returns `true` if the retry budget is ignored.
    pub fn is_retry_forever(&self) -> bool {
        self.retry_forever
    }

    /// Returns the retry condition.
    pub fn condition(&self) -> &dyn RetryCondition {
        self.condition.as_ref()
    }

    /// Returns the backoff strategy.
    pub fn backoff(&self) -> &dyn BackoffStrategy {
        self.backoff.as_ref()
    }

    /// Decides what happens after `record`.
    ///
    /// A retry needs both the condition and the budget (or retry-forever).
    /// Otherwise the call ends, and it ends as exhausted whenever the retries
    /// used equal the budget, whatever the condition said about the last
    /// attempt. Delays are clamped to [`MAX_BACKOFF`].
    pub fn decide(&self, record: &AttemptRecord) -> RetryDecision {
        let retries_attempted = record.retries_attempted();
        let within_budget = self.retry_forever || self.max_error_retry > retries_attempted;

        if within_budget && self.condition.should_retry(record, retries_attempted) {
            let delay = self
                .backoff
                .delay_before_next_retry(record, retries_attempted)
                .min(MAX_BACKOFF);
            RetryDecision::Retry(delay)
        } else if retries_attempted == self.max_error_retry {
            RetryDecision::Exhausted
        } else {
            RetryDecision::Complete
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_error_retry", &self.max_error_retry)
            .field("retry_forever", &self.retry_forever)
            .finish_non_exhaustive()
    }
}

/// The reference policy: retry outages up to 5 times with [`DefaultBackoffStrategy`].
#[derive(Debug, Clone, Copy)]
pub struct DefaultRetryPolicy;

impl DefaultRetryPolicy {
    /// Maximum retries of the reference policy.
    pub const MAX_ERROR_RETRY: u32 = 5;

    /// Returns a new reference policy.
    pub fn get() -> RetryPolicy {
        RetryPolicy::from_parts(
            Arc::new(DefaultRetryCondition),
            Arc::new(DefaultBackoffStrategy),
            Self::MAX_ERROR_RETRY,
        )
    }
}
