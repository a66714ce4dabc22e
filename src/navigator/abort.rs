//! Cooperative cancellation scoped to an owner
//!
//! Long-running collaborator work (a training loop, a sensor scan) takes an
//! [`AbortSignal`] and checks it at its own suspension points. The owning
//! [`AbortController`] aborts when dropped, so closing the screen that
//! started the work stops it.

use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Default)]
struct AbortState {
    aborted: AtomicBool,
    notify: Notify,
}

pub struct AbortController {
    state: Arc<AbortState>,
}

impl AbortController {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AbortState::default()),
        }
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            state: self.state.clone(),
        }
    }

    /// Returns false if already aborted
    pub fn abort(&self) -> bool {
        if self.state.aborted.swap(true, Ordering::AcqRel) {
            return false;
        }
        debug!("Abort signal raised");
        self.state.notify.notify_waiters();
        true
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AbortController {
    fn drop(&mut self) {
        self.abort();
    }
}

#[derive(Clone)]
pub struct AbortSignal {
    state: Arc<AbortState>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::Acquire)
    }

    /// Error out if aborted; meant for `?` between steps of a loop
    pub fn check(&self) -> anyhow::Result<()> {
        if self.is_aborted() {
            anyhow::bail!("operation aborted");
        }
        Ok(())
    }

    /// Completes once the signal is aborted
    pub async fn aborted(&self) {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so an abort in between is not lost
            notified.as_mut().enable();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_check_fails_after_abort() {
        let controller = AbortController::new();
        let signal = controller.signal();
        assert!(signal.check().is_ok());

        assert!(controller.abort());
        assert!(!controller.abort());
        assert!(signal.is_aborted());
        assert!(signal.check().is_err());
    }

    #[test]
    fn test_dropping_controller_aborts() {
        let signal = AbortController::new().signal();
        assert!(signal.is_aborted());
    }

    #[tokio::test]
    async fn test_training_loop_stops_when_owner_drops() {
        let controller = AbortController::new();
        let signal = controller.signal();

        let training = tokio::spawn(async move {
            let mut epochs = 0u32;
            loop {
                if signal.check().is_err() {
                    return epochs;
                }
                epochs += 1;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(controller);

        let epochs = timeout(Duration::from_secs(1), training)
            .await
            .expect("loop must observe the abort")
            .unwrap();
        assert!(epochs > 0);
    }

    #[tokio::test]
    async fn test_aborted_future_wakes_waiters() {
        let controller = AbortController::new();
        let signal = controller.signal();
        let waiter = tokio::spawn(async move { signal.aborted().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        controller.abort();

        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter must wake")
            .unwrap();
    }
}
