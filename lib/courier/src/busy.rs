//! Shared busy state for in-flight requests.
//!
//! [`BusyIndicator`] keeps a reference count of intercepted requests currently in
//! flight and owns the session-wide cancellation token. Observers (a spinner, a
//! status bar) either poll [`BusyIndicator::is_busy`] or [`BusyIndicator::subscribe`]
//! to change notifications.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Buffered notifications per subscriber before the oldest are dropped.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[cfg(feature = "metrics")]
const METRIC_BUSY_REQUESTS: &str = "courier_busy_requests";

/// Busy state right after a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyChange {
    /// Reference count after the change.
    pub count: usize,
    /// `count > 0`.
    pub is_busy: bool,
}

impl BusyChange {
    const fn new(count: usize) -> Self {
        Self {
            count,
            is_busy: count > 0,
        }
    }
}

/// Reference-counted busy flag plus the global cancellation source.
///
/// One instance is shared (behind an [`Arc`]) by every request flow of a session.
///
/// # Example
///
/// ```ignore
/// let busy = Arc::new(BusyIndicator::new());
/// let mut changes = busy.subscribe();
///
/// let guard = busy.enter();
/// assert!(busy.is_busy());
/// drop(guard);
///
/// assert_eq!(changes.recv().await?.count, 1);
/// assert_eq!(changes.recv().await?.count, 0);
/// ```
#[derive(Debug)]
pub struct BusyIndicator {
    count: AtomicUsize,
    changes: broadcast::Sender<BusyChange>,
    global: Mutex<CancellationToken>,
}

impl Default for BusyIndicator {
    fn default() -> Self {
        Self::new()
    }
}

impl BusyIndicator {
    /// Create an idle indicator.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            count: AtomicUsize::new(0),
            changes,
            global: Mutex::new(CancellationToken::new()),
        }
    }

    /// Number of requests currently marked busy.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// `true` while at least one request is marked busy.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.count() > 0
    }

    /// Receive a [`BusyChange`] after every notifying operation.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BusyChange> {
        self.changes.subscribe()
    }

    /// Add one to the count. Always notifies.
    pub fn increment(&self) {
        let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        self.notify(count);
    }

    /// Remove one from the count if it is positive.
    ///
    /// A decrement at zero leaves the count at zero and does not notify.
    pub fn decrement(&self) {
        let decremented =
            self.count
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                    count.checked_sub(1)
                });

        match decremented {
            Ok(previous) => self.notify(previous - 1),
            Err(_) => debug!("busy indicator already idle, decrement ignored"),
        }
    }

    /// Force the count back to zero. Always notifies.
    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
        self.notify(0);
    }

    /// Alias for [`Self::increment`].
    pub fn show(&self) {
        self.increment();
    }

    /// Alias for [`Self::decrement`].
    pub fn close(&self) {
        self.decrement();
    }

    /// Increment now and decrement when the returned guard is dropped.
    #[must_use = "the indicator is released as soon as the guard is dropped"]
    pub fn enter(self: &Arc<Self>) -> BusyGuard {
        self.increment();
        BusyGuard {
            indicator: Arc::clone(self),
        }
    }

    /// The current global cancellation token.
    ///
    /// Requests merge it with their own token; [`Self::cancel_all`] fires it.
    #[must_use]
    pub fn global_token(&self) -> CancellationToken {
        self.global
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cancel every request holding the current global token.
    ///
    /// A fresh token replaces the cancelled one, so requests issued afterwards
    /// proceed normally.
    pub fn cancel_all(&self) {
        let previous = {
            let mut global = self.global.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *global, CancellationToken::new())
        };
        previous.cancel();
        info!(in_flight = self.count(), "cancelled all in-flight requests");
    }

    fn notify(&self, count: usize) {
        #[cfg(feature = "metrics")]
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(METRIC_BUSY_REQUESTS).set(count as f64);

        // No subscriber is not an error.
        let _ = self.changes.send(BusyChange::new(count));
    }
}

/// Marks one request busy for as long as it lives.
#[derive(Debug)]
pub struct BusyGuard {
    indicator: Arc<BusyIndicator>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.indicator.decrement();
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;

    fn drain(changes: &mut broadcast::Receiver<BusyChange>) -> Vec<usize> {
        let mut counts = Vec::new();
        while let Ok(change) = changes.try_recv() {
            counts.push(change.count);
        }
        counts
    }

    #[test]
    fn starts_idle() {
        let busy = BusyIndicator::new();
        assert_eq!(busy.count(), 0);
        assert!(!busy.is_busy());
    }

    #[test]
    fn reference_counting() {
        let busy = BusyIndicator::new();

        busy.increment();
        busy.increment();
        assert_eq!(busy.count(), 2);
        assert!(busy.is_busy());

        busy.decrement();
        assert!(busy.is_busy());
        busy.decrement();
        assert!(!busy.is_busy());
    }

    #[test]
    fn increment_always_notifies() {
        let busy = BusyIndicator::new();
        let mut changes = busy.subscribe();

        busy.increment();
        busy.increment();

        assert_eq!(drain(&mut changes), vec![1, 2]);
    }

    #[test]
    fn decrement_at_zero_is_silent() {
        let busy = BusyIndicator::new();
        let mut changes = busy.subscribe();

        busy.decrement();

        assert_eq!(busy.count(), 0);
        assert_eq!(changes.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn decrement_notifies_when_it_happens() {
        let busy = BusyIndicator::new();
        busy.increment();
        let mut changes = busy.subscribe();

        busy.decrement();
        busy.decrement();

        assert_eq!(drain(&mut changes), vec![0]);
    }

    #[test]
    fn reset_always_notifies() {
        let busy = BusyIndicator::new();
        busy.increment();
        busy.increment();
        let mut changes = busy.subscribe();

        busy.reset();
        busy.reset();

        assert_eq!(busy.count(), 0);
        let received: Vec<_> = std::iter::from_fn(|| changes.try_recv().ok()).collect();
        assert_eq!(
            received,
            vec![BusyChange::new(0), BusyChange::new(0)],
        );
        assert!(!received.iter().any(|change| change.is_busy));
    }

    #[test]
    fn show_and_close_aliases() {
        let busy = BusyIndicator::new();

        busy.show();
        assert!(busy.is_busy());
        busy.close();
        assert!(!busy.is_busy());
    }

    #[test]
    fn guard_releases_on_drop() {
        let busy = Arc::new(BusyIndicator::new());
        let mut changes = busy.subscribe();

        {
            let _first = busy.enter();
            let _second = busy.enter();
            assert_eq!(busy.count(), 2);
        }

        assert!(!busy.is_busy());
        assert_eq!(drain(&mut changes), vec![1, 2, 1, 0]);
    }

    #[test]
    fn guard_after_reset_does_not_underflow() {
        let busy = Arc::new(BusyIndicator::new());
        let guard = busy.enter();

        busy.reset();
        drop(guard);

        assert_eq!(busy.count(), 0);
    }

    #[test]
    fn cancel_all_fires_current_token_only() {
        let busy = BusyIndicator::new();
        let before = busy.global_token();

        busy.cancel_all();
        let after = busy.global_token();

        assert!(before.is_cancelled());
        assert!(!after.is_cancelled());
    }

    #[tokio::test]
    async fn concurrent_guards_balance() {
        let busy = Arc::new(BusyIndicator::new());

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let busy = Arc::clone(&busy);
                tokio::spawn(async move {
                    let _guard = busy.enter();
                    tokio::task::yield_now().await;
                })
            })
            .collect();
        for task in tasks {
            task.await.expect("task");
        }

        assert_eq!(busy.count(), 0);
    }
}
