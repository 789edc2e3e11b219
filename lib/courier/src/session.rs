//! Shared state of a logical session.

use std::sync::Arc;

use crate::{BusyIndicator, Metrics, MetricsAggregator};

/// Metrics and busy state shared by every interceptor of one session.
///
/// Cloning is cheap and yields a handle to the same state.
///
/// # Example
///
/// ```ignore
/// let session = Session::new();
/// let client = HyperClient::builder()
///     .with_interceptor(InterceptorOptions::default(), session.clone())
///     .build();
///
/// client.get("https://api.example.com/health").await?;
/// println!("{}", session.metrics_summary());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Session {
    metrics: Arc<MetricsAggregator>,
    busy: Arc<BusyIndicator>,
}

impl Session {
    /// Create a session with fresh metrics and an idle busy indicator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The metrics aggregator.
    #[must_use]
    pub fn aggregator(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    /// The busy indicator.
    #[must_use]
    pub fn busy(&self) -> &Arc<BusyIndicator> {
        &self.busy
    }

    /// Snapshot of the current metrics.
    #[must_use]
    pub fn metrics(&self) -> Metrics {
        self.metrics.snapshot()
    }

    /// Human-readable metrics summary.
    #[must_use]
    pub fn metrics_summary(&self) -> String {
        self.metrics.summary()
    }

    /// Clear the metrics.
    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    /// Cancel every in-flight request of the session.
    pub fn cancel_all(&self) {
        self.busy.cancel_all();
    }
}
