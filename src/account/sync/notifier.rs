//! Completion notifier for synchronization runs.
//!
//! [`crate::account::AccountSynchronizer::synchronize_account`] returns a
//! [`ProgressNotifier`]: a cloneable handle that resolves once the in-flight run finishes.
//! Callers joining an already-running synchronization of the same account receive a handle
//! to the same underlying run.

use crate::account::SyncError;
use std::sync::Arc;
use tokio::sync::watch;

/// Terminal state of a synchronization run.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// The run is still in flight.
    Pending,
    /// The run completed successfully.
    Success,
    /// The run failed.
    Failure(Arc<SyncError>),
}

/// Resolving side of a notifier, held by the synchronizer.
pub(crate) struct NotifierHandle {
    tx: watch::Sender<SyncOutcome>,
}

impl NotifierHandle {
    /// Resolve the notifier; all current and future subscribers observe the outcome.
    pub(crate) fn resolve(self, result: Result<(), SyncError>) {
        let outcome = match result {
            Ok(()) => SyncOutcome::Success,
            Err(err) => SyncOutcome::Failure(Arc::new(err)),
        };
        // Subscribers may all have gone away; resolution is still well-defined.
        let _ = self.tx.send(outcome);
    }
}

/// Subscriber side of a run's completion.
#[derive(Debug, Clone)]
pub struct ProgressNotifier {
    rx: watch::Receiver<SyncOutcome>,
}

impl ProgressNotifier {
    /// The run's current outcome without waiting.
    pub fn outcome(&self) -> SyncOutcome {
        self.rx.borrow().clone()
    }

    /// Wait until the run resolves.
    pub async fn wait(&self) -> Result<(), Arc<SyncError>> {
        let mut rx = self.rx.clone();
        loop {
            match rx.borrow_and_update().clone() {
                SyncOutcome::Success => return Ok(()),
                SyncOutcome::Failure(err) => return Err(err),
                SyncOutcome::Pending => {}
            }
            if rx.changed().await.is_err() {
                return Err(Arc::new(SyncError::Aborted));
            }
        }
    }
}

/// Create a connected notifier pair.
pub(crate) fn channel() -> (NotifierHandle, ProgressNotifier) {
    let (tx, rx) = watch::channel(SyncOutcome::Pending);
    (NotifierHandle { tx }, ProgressNotifier { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_success_to_all_clones() {
        let (handle, notifier) = channel();
        let late = notifier.clone();

        handle.resolve(Ok(()));

        assert!(notifier.wait().await.is_ok());
        assert!(late.wait().await.is_ok());
        assert!(matches!(late.outcome(), SyncOutcome::Success));
    }

    #[tokio::test]
    async fn resolves_failure_with_shared_error() {
        let (handle, notifier) = channel();
        handle.resolve(Err(SyncError::SynchronizerBusy));

        let err = notifier.wait().await.unwrap_err();
        assert!(matches!(*err, SyncError::SynchronizerBusy));
    }

    #[tokio::test]
    async fn dropped_handle_reports_aborted() {
        let (handle, notifier) = channel();
        drop(handle);

        let err = notifier.wait().await.unwrap_err();
        assert!(matches!(*err, SyncError::Aborted));
    }
}
