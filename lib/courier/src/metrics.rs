//! Request metrics aggregation.
//!
//! [`MetricsAggregator`] is shared by every interceptor of a session and updated
//! concurrently. Readers take a [`Metrics`] snapshot, which is consistent because
//! every update happens inside a single critical section.
//!
//! With the `metrics` feature, each update is also forwarded to the `metrics`
//! crate facade:
//! - `courier_requests_total` (counter): completed requests, labeled by outcome and status
//! - `courier_retry_attempts_total` (counter): retry attempts
//! - `courier_request_duration_seconds` (histogram): end-to-end duration of a request flow

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Response time samples kept for the average/min/max statistics.
pub const MAX_RESPONSE_TIME_SAMPLES: usize = 100;

#[cfg(feature = "metrics")]
const LABEL_OUTCOME: &str = "outcome";
#[cfg(feature = "metrics")]
const LABEL_STATUS: &str = "status";
#[cfg(feature = "metrics")]
const METRIC_REQUESTS_TOTAL: &str = "courier_requests_total";
#[cfg(feature = "metrics")]
const METRIC_RETRY_ATTEMPTS: &str = "courier_retry_attempts_total";
#[cfg(feature = "metrics")]
const METRIC_REQUEST_DURATION: &str = "courier_request_duration_seconds";

/// Point-in-time copy of the aggregated metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metrics {
    /// Completed request flows.
    pub total_requests: u64,
    /// Flows that ended with a 2xx or 3xx response.
    pub successful_requests: u64,
    /// Flows that ended with any other status, or with an error.
    pub failed_requests: u64,
    /// Flows that needed at least one retry.
    pub retried_requests: u64,
    /// Retries across all flows.
    pub total_retry_attempts: u64,
    /// Mean over the sample window.
    pub average_response_time: Duration,
    /// Maximum over the sample window.
    pub max_response_time: Duration,
    /// Minimum over the sample window, zero without samples.
    pub min_response_time: Duration,
    /// Completed flows per final status code.
    pub status_code_distribution: BTreeMap<u16, u64>,
    /// When the last flow completed.
    pub last_request_time: Option<DateTime<Utc>>,
}

impl Metrics {
    /// Percentage of successful flows, 0 without requests.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        percent(self.successful_requests, self.total_requests)
    }

    /// Percentage of failed flows, 0 without requests.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        percent(self.failed_requests, self.total_requests)
    }

    /// Percentage of flows that were retried, 0 without requests.
    #[must_use]
    pub fn retry_rate(&self) -> f64 {
        percent(self.retried_requests, self.total_requests)
    }

    /// Mean retries of the flows that were retried, 0 if none was.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_retries_per_retried_request(&self) -> f64 {
        if self.retried_requests == 0 {
            return 0.0;
        }
        self.total_retry_attempts as f64 / self.retried_requests as f64
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "courier metrics:")?;
        writeln!(f, "Total Requests: {}", self.total_requests)?;
        writeln!(f, "Success Rate: {:.2}%", self.success_rate())?;
        writeln!(f, "Failure Rate: {:.2}%", self.failure_rate())?;
        writeln!(f, "Retry Rate: {:.2}%", self.retry_rate())?;
        writeln!(
            f,
            "Avg Response Time: {:.2}ms",
            millis(self.average_response_time)
        )?;
        writeln!(f, "Max Response Time: {:.2}ms", millis(self.max_response_time))?;
        writeln!(f, "Min Response Time: {:.2}ms", millis(self.min_response_time))?;
        writeln!(f, "Total Retries: {}", self.total_retry_attempts)?;
        match self.last_request_time {
            Some(at) => write!(f, "Last Request: {}", at.format("%Y-%m-%d %H:%M:%S")),
            None => write!(f, "Last Request: N/A"),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    metrics: Metrics,
    samples: VecDeque<Duration>,
}

impl State {
    fn record(&mut self, status: u16, elapsed: Duration) {
        self.metrics.total_requests += 1;
        self.metrics.last_request_time = Some(Utc::now());
        *self
            .metrics
            .status_code_distribution
            .entry(status)
            .or_default() += 1;

        self.samples.push_back(elapsed);
        while self.samples.len() > MAX_RESPONSE_TIME_SAMPLES {
            self.samples.pop_front();
        }
        self.update_response_times();
    }

    fn update_response_times(&mut self) {
        let (Some(min), Some(max)) = (self.samples.iter().min(), self.samples.iter().max())
        else {
            return;
        };
        let total = self
            .samples
            .iter()
            .fold(Duration::ZERO, |acc, sample| acc.saturating_add(*sample));
        let count = u32::try_from(self.samples.len()).unwrap_or(u32::MAX);

        self.metrics.min_response_time = *min;
        self.metrics.max_response_time = *max;
        self.metrics.average_response_time = total / count;
    }
}

/// Thread-safe accumulator of request outcomes.
///
/// # Example
///
/// ```ignore
/// let aggregator = MetricsAggregator::new();
/// aggregator.record_success(200, Duration::from_millis(120));
/// aggregator.record_failure(503, Duration::from_millis(80));
///
/// let metrics = aggregator.snapshot();
/// assert_eq!(metrics.total_requests, 2);
/// assert_eq!(metrics.success_rate(), 50.0);
/// ```
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    state: Mutex<State>,
}

impl MetricsAggregator {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a flow that ended with a 2xx/3xx response.
    pub fn record_success(&self, status: u16, elapsed: Duration) {
        {
            let mut state = self.lock();
            state.metrics.successful_requests += 1;
            state.record(status, elapsed);
        }
        emit_request("success", status, elapsed);
    }

    /// Record a flow that ended with any other status, or with an error.
    pub fn record_failure(&self, status: u16, elapsed: Duration) {
        {
            let mut state = self.lock();
            state.metrics.failed_requests += 1;
            state.record(status, elapsed);
        }
        emit_request("failure", status, elapsed);
    }

    /// Record one retry; `is_first` marks the first retry of its flow.
    pub fn record_retry(&self, is_first: bool) {
        {
            let mut state = self.lock();
            state.metrics.total_retry_attempts += 1;
            if is_first {
                state.metrics.retried_requests += 1;
            }
        }

        #[cfg(feature = "metrics")]
        metrics::counter!(METRIC_RETRY_ATTEMPTS).increment(1);
    }

    /// Clear every counter, sample and timestamp.
    pub fn reset(&self) {
        *self.lock() = State::default();
    }

    /// Copy of the current metrics.
    #[must_use]
    pub fn snapshot(&self) -> Metrics {
        self.lock().metrics.clone()
    }

    /// Human-readable summary of the current metrics.
    #[must_use]
    pub fn summary(&self) -> String {
        self.snapshot().to_string()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(feature = "metrics")]
fn emit_request(outcome: &'static str, status: u16, elapsed: Duration) {
    metrics::counter!(
        METRIC_REQUESTS_TOTAL,
        LABEL_OUTCOME => outcome,
        LABEL_STATUS => status.to_string()
    )
    .increment(1);
    metrics::histogram!(METRIC_REQUEST_DURATION, LABEL_OUTCOME => outcome)
        .record(elapsed.as_secs_f64());
}

#[cfg(not(feature = "metrics"))]
#[allow(clippy::missing_const_for_fn)]
fn emit_request(_outcome: &'static str, _status: u16, _elapsed: Duration) {}
