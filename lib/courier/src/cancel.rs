//! Cancellation linking.
//!
//! Every intercepted request observes two sources: the caller's token and the
//! session-wide token of the [`BusyIndicator`](crate::BusyIndicator). Firing either
//! one ends the request, and the reason records which one fired.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::{CancelReason, Error, Result};

/// Caller token merged with the global token.
#[derive(Debug, Clone)]
pub struct LinkedCancellation {
    caller: CancellationToken,
    global: CancellationToken,
}

impl LinkedCancellation {
    /// Link a caller token with the current global token.
    #[must_use]
    pub const fn new(caller: CancellationToken, global: CancellationToken) -> Self {
        Self { caller, global }
    }

    /// The reason if either source has already fired.
    ///
    /// Global cancellation takes precedence when both fired.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        if self.global.is_cancelled() {
            Some(CancelReason::Global)
        } else if self.caller.is_cancelled() {
            Some(CancelReason::Caller)
        } else {
            None
        }
    }

    /// Resolve once either source fires.
    pub async fn cancelled(&self) -> CancelReason {
        tokio::select! {
            biased;
            () = self.global.cancelled() => CancelReason::Global,
            () = self.caller.cancelled() => CancelReason::Caller,
        }
    }

    /// Run `future` unless cancelled first.
    ///
    /// The future is dropped, and thus aborted, on cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if a source fires before `future` completes.
    pub async fn run<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            reason = self.cancelled() => Err(Error::Cancelled(reason)),
            value = future => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn no_reason_while_live() {
        let linked = LinkedCancellation::new(CancellationToken::new(), CancellationToken::new());
        assert_eq!(linked.reason(), None);
    }

    #[test]
    fn reason_names_the_source() {
        let caller = CancellationToken::new();
        let global = CancellationToken::new();
        let linked = LinkedCancellation::new(caller.clone(), global.clone());

        caller.cancel();
        assert_eq!(linked.reason(), Some(CancelReason::Caller));

        global.cancel();
        assert_eq!(linked.reason(), Some(CancelReason::Global));
    }

    #[tokio::test]
    async fn run_completes_when_live() {
        let linked = LinkedCancellation::new(CancellationToken::new(), CancellationToken::new());

        let value = linked.run(async { 42 }).await;

        assert!(matches!(value, Ok(42)));
    }

    #[tokio::test(start_paused = true)]
    async fn run_aborts_on_global_cancel() {
        let global = CancellationToken::new();
        let linked = LinkedCancellation::new(CancellationToken::new(), global.clone());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            global.cancel();
        });
        let result = linked
            .run(tokio::time::sleep(Duration::from_secs(60)))
            .await;

        assert!(matches!(
            result,
            Err(Error::Cancelled(CancelReason::Global))
        ));
    }

    #[tokio::test]
    async fn already_cancelled_caller_wins_over_ready_future() {
        let caller = CancellationToken::new();
        caller.cancel();
        let linked = LinkedCancellation::new(caller, CancellationToken::new());

        let result = linked.run(async { "done" }).await;

        assert!(matches!(
            result,
            Err(Error::Cancelled(CancelReason::Caller))
        ));
    }
}
