//! Retry decisions and backoff.
//!
//! [`RetryPolicy`] is stateless: it reads an [`InterceptorOptions`] and answers,
//! for a given attempt and outcome, whether to try again and how long to wait.

use std::time::Duration;

use bytes::Bytes;

use crate::{Error, InterceptorOptions, Response};

/// Outcome of a single attempt.
pub type RetryOutcome<'a> = std::result::Result<&'a Response<Bytes>, &'a Error>;

/// What the retry loop should do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then send a fresh copy of the request.
    Retry {
        /// Pause before the next attempt.
        delay: Duration,
    },
    /// Stop; the outcome of this attempt is final.
    Done,
}

/// Retry policy driven by [`InterceptorOptions`].
///
/// Attempt indexes are 0-based: attempt 0 is the original send.
///
/// # Example
///
/// ```ignore
/// use courier::{InterceptorOptions, RetryPolicy};
///
/// let options = InterceptorOptions::default();
/// let policy = RetryPolicy::new(&options);
/// assert_eq!(policy.delay_for(2), Duration::from_secs(4));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy<'a> {
    options: &'a InterceptorOptions,
}

impl<'a> RetryPolicy<'a> {
    /// Create a policy reading `options`.
    #[must_use]
    pub const fn new(options: &'a InterceptorOptions) -> Self {
        Self { options }
    }

    /// Returns `true` if another attempt should follow attempt `attempt`.
    ///
    /// Cancellations are never retried.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, outcome: RetryOutcome<'_>) -> bool {
        if attempt.saturating_add(1) >= self.options.max_retry_attempts {
            return false;
        }

        match outcome {
            Ok(response) => self.is_retryable_status(response.status()),
            Err(error) => self.is_retryable_error(error),
        }
    }

    /// Returns `true` if `status` is configured to trigger a retry.
    #[must_use]
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.options.retry_on_status_codes.contains(&status)
    }

    /// Returns `true` if `error` is a transport failure and those are retried.
    #[must_use]
    pub const fn is_retryable_error(&self, error: &Error) -> bool {
        self.options.retry_on_timeout && error.is_transport()
    }

    /// Delay to wait after attempt `attempt` before sending attempt `attempt + 1`.
    ///
    /// `retry_delay × 2^attempt` with exponential backoff, `retry_delay` otherwise.
    /// Saturates at [`Duration::MAX`].
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.options.retry_delay;
        if !self.options.use_exponential_backoff {
            return base;
        }

        1_u32
            .checked_shl(attempt)
            .map_or(Duration::MAX, |factor| base.saturating_mul(factor))
    }

    /// Combine [`Self::should_retry`] and [`Self::delay_for`].
    #[must_use]
    pub fn decide(&self, attempt: u32, outcome: RetryOutcome<'_>) -> RetryDecision {
        if self.should_retry(attempt, outcome) {
            RetryDecision::Retry {
                delay: self.delay_for(attempt),
            }
        } else {
            RetryDecision::Done
        }
    }

    /// Run the configured `on_retry` callback for the retry following `attempt`.
    ///
    /// The callback sees the 1-based retry number and completes before the caller
    /// starts waiting.
    pub async fn notify(&self, attempt: u32, error: Option<&Error>, delay: Duration) {
        if let Some(on_retry) = &self.options.on_retry {
            on_retry(attempt.saturating_add(1), error, delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::CancelReason;

    fn response(status: u16) -> Response<Bytes> {
        Response::new(status, HashMap::new(), Bytes::new())
    }

    fn options(attempts: u32, exponential: bool) -> InterceptorOptions {
        InterceptorOptions::builder()
            .max_retry_attempts(attempts)
            .retry_delay(Duration::from_millis(100))
            .use_exponential_backoff(exponential)
            .build()
    }

    #[test]
    fn retries_configured_statuses_only() {
        let options = options(3, true);
        let policy = RetryPolicy::new(&options);

        for status in [500, 502, 503, 504, 408] {
            assert!(policy.should_retry(0, Ok(&response(status))), "{status}");
        }
        for status in [200, 301, 400, 404, 429, 501] {
            assert!(!policy.should_retry(0, Ok(&response(status))), "{status}");
        }
    }

    #[test]
    fn stops_on_last_attempt() {
        let options = options(3, true);
        let policy = RetryPolicy::new(&options);
        let unavailable = response(503);

        assert!(policy.should_retry(0, Ok(&unavailable)));
        assert!(policy.should_retry(1, Ok(&unavailable)));
        assert!(!policy.should_retry(2, Ok(&unavailable)));
    }

    #[test]
    fn single_attempt_never_retries() {
        let options = options(1, true);
        let policy = RetryPolicy::new(&options);

        assert!(!policy.should_retry(0, Ok(&response(503))));
        assert!(!policy.should_retry(0, Err(&Error::Timeout)));
    }

    #[test]
    fn transport_errors_follow_retry_on_timeout() {
        let enabled = options(3, true);
        let policy = RetryPolicy::new(&enabled);
        assert!(policy.should_retry(0, Err(&Error::Timeout)));
        assert!(policy.should_retry(0, Err(&Error::connection("refused"))));
        assert!(policy.should_retry(0, Err(&Error::tls("handshake"))));

        let disabled = InterceptorOptions::builder().retry_on_timeout(false).build();
        let policy = RetryPolicy::new(&disabled);
        assert!(!policy.should_retry(0, Err(&Error::Timeout)));
        assert!(!policy.should_retry(0, Err(&Error::connection("refused"))));
    }

    #[test]
    fn cancellation_and_local_errors_are_never_retried() {
        let options = options(5, true);
        let policy = RetryPolicy::new(&options);

        assert!(!policy.should_retry(0, Err(&Error::Cancelled(CancelReason::Global))));
        assert!(!policy.should_retry(0, Err(&Error::Cancelled(CancelReason::Caller))));
        assert!(!policy.should_retry(0, Err(&Error::invalid_request("bad header"))));
    }

    #[test]
    fn exponential_delays_double() {
        let options = options(5, true);
        let policy = RetryPolicy::new(&options);

        let delays: Vec<_> = (0..4).map(|attempt| policy.delay_for(attempt)).collect();
        assert_eq!(
            delays,
            [100, 200, 400, 800].map(Duration::from_millis).to_vec()
        );
    }

    #[test]
    fn constant_delays() {
        let options = options(5, false);
        let policy = RetryPolicy::new(&options);

        for attempt in 0..4 {
            assert_eq!(policy.delay_for(attempt), Duration::from_millis(100));
        }
    }

    #[test]
    fn huge_attempt_saturates() {
        let options = options(u32::MAX, true);
        let policy = RetryPolicy::new(&options);

        assert_eq!(policy.delay_for(40), Duration::MAX);
    }

    #[test]
    fn decide_carries_delay() {
        let options = options(3, true);
        let policy = RetryPolicy::new(&options);

        assert_eq!(
            policy.decide(1, Ok(&response(502))),
            RetryDecision::Retry {
                delay: Duration::from_millis(200)
            }
        );
        assert_eq!(policy.decide(1, Ok(&response(200))), RetryDecision::Done);
        assert_eq!(policy.decide(2, Ok(&response(502))), RetryDecision::Done);
    }

    #[tokio::test]
    async fn notify_passes_one_based_attempt() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let options = InterceptorOptions::builder()
            .on_retry(move |attempt, error, delay| {
                sink.lock()
                    .expect("lock")
                    .push((attempt, error.map(ToString::to_string), delay));
                async {}
            })
            .build();
        let policy = RetryPolicy::new(&options);

        policy.notify(0, None, Duration::from_secs(1)).await;
        policy
            .notify(1, Some(&Error::Timeout), Duration::from_secs(2))
            .await;

        let seen = seen.lock().expect("lock").clone();
        assert_eq!(
            seen,
            vec![
                (1, None, Duration::from_secs(1)),
                (2, Some("request timeout".to_string()), Duration::from_secs(2)),
            ]
        );
    }

    #[tokio::test]
    async fn notify_without_callback_is_noop() {
        let options = InterceptorOptions::default();
        RetryPolicy::new(&options)
            .notify(0, Some(&Error::Timeout), Duration::ZERO)
            .await;
    }
}
