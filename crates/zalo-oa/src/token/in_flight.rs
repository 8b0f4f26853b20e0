//! Shared result slot for a refresh in progress.
//!
//! The first caller that finds the token near expiry creates the slot; every
//! caller arriving before it completes waits on the same slot and observes the
//! same outcome.

use tokio::sync::{Notify, OnceCell};

use super::manager::RefreshOutcome;

pub(super) struct InFlightRefresh {
    result: OnceCell<RefreshOutcome>,
    notify: Notify,
}

impl InFlightRefresh {
    pub(super) fn new() -> Self {
        Self {
            result: OnceCell::new(),
            notify: Notify::new(),
        }
    }

    /// Publish the outcome. Only the first call has any effect.
    pub(super) fn complete(&self, outcome: RefreshOutcome) {
        let _ = self.result.set(outcome);
        self.notify.notify_waiters();
    }

    pub(super) fn is_complete(&self) -> bool {
        self.result.initialized()
    }

    pub(super) async fn wait(&self) -> RefreshOutcome {
        loop {
            if let Some(result) = self.result.get() {
                return result.clone();
            }

            // Register before the second check so a completion in between is not missed.
            let notified = self.notify.notified();
            if let Some(result) = self.result.get() {
                return result.clone();
            }

            notified.await;
        }
    }
}
