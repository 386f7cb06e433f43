//! Terminal callbacks for a call.

use crate::response::{AttemptRecord, HttpResponse};

/// Receives the final attempt of a call.
///
/// Exactly one of the two methods is invoked per call. Ordinary network and
/// server failures arrive here as data: the record's response is absent when
/// the last attempt never got one, and [`AttemptRecord::error`] says why.
///
/// # Examples
///
/// ```
/// use redial::{AttemptRecord, ResponseHandler};
///
/// struct StatusOnly;
///
/// impl ResponseHandler<Result<u16, String>> for StatusOnly {
///     fn on_response(&mut self, record: AttemptRecord) -> Result<u16, String> {
///         record.status_code().ok_or_else(|| "no response".to_string())
///     }
///
///     fn on_max_retry_attempted(&mut self, record: AttemptRecord) -> Result<u16, String> {
///         Err(format!("gave up after {} retries", record.retries_attempted()))
///     }
/// }
/// ```
pub trait ResponseHandler<R> {
    /// Called when the call completed, on the first or any later attempt.
    fn on_response(&mut self, record: AttemptRecord) -> R;

    /// Called instead of [`on_response`](Self::on_response) when the retry
    /// condition still wanted another attempt but the retry budget was spent.
    fn on_max_retry_attempted(&mut self, record: AttemptRecord) -> R;
}

/// How a call ended, as reported by [`OutcomeHandler`].
#[derive(Debug)]
pub enum Outcome {
    /// The call completed normally.
    Completed(AttemptRecord),
    /// Retries were exhausted; this is the last attempt.
    Exhausted(AttemptRecord),
}

impl Outcome {
    /// Returns `true` if retries were exhausted.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Outcome::Exhausted(_))
    }

    /// Returns the final attempt.
    pub fn record(&self) -> &AttemptRecord {
        match self {
            Outcome::Completed(record) | Outcome::Exhausted(record) => record,
        }
    }

    /// Returns the final response, if the last attempt received one.
    pub fn response(&self) -> Option<&HttpResponse> {
        self.record().response()
    }

    /// Consumes the outcome and returns the final attempt.
    pub fn into_record(self) -> AttemptRecord {
        match self {
            Outcome::Completed(record) | Outcome::Exhausted(record) => record,
        }
    }
}

/// A handler that returns the final attempt wrapped in an [`Outcome`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OutcomeHandler;

impl ResponseHandler<Outcome> for OutcomeHandler {
    fn on_response(&mut self, record: AttemptRecord) -> Outcome {
        Outcome::Completed(record)
    }

    fn on_max_retry_attempted(&mut self, record: AttemptRecord) -> Outcome {
        Outcome::Exhausted(record)
    }
}
