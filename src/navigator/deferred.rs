//! Settle-once result handles
//!
//! A [`Deferred`] is the resolving half, handed to whatever code will learn
//! the outcome (usually a button callback). [`Settled`] is the awaitable half
//! returned to the caller. Only the first `resolve`/`reject` counts; later
//! calls are no-ops. If every `Deferred` clone is dropped unsettled, the
//! awaiting side observes [`DeferredError::Abandoned`] instead of hanging.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeferredError {
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("dropped without being settled")]
    Abandoned,
}

type Slot<T> = Arc<Mutex<Option<oneshot::Sender<Result<T, DeferredError>>>>>;

/// Resolving half. Clones share the same settle-once slot.
pub struct Deferred<T> {
    slot: Slot<T>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T: Send + 'static> Deferred<T> {
    pub fn new() -> (Deferred<T>, Settled<T>) {
        let (sender, receiver) = oneshot::channel();
        let deferred = Deferred {
            slot: Arc::new(Mutex::new(Some(sender))),
        };
        (deferred, Settled { receiver })
    }

    fn settle(&self, outcome: Result<T, DeferredError>) -> bool {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match sender {
            // A dropped receiver still counts as settled: nobody is waiting.
            Some(sender) => {
                let _ = sender.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Settle with a value. Returns false if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with a rejection. Returns false if already settled.
    pub fn reject(&self, reason: impl Into<String>) -> bool {
        self.settle(Err(DeferredError::Rejected(reason.into())))
    }

    pub fn is_settled(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// Awaitable half of a [`Deferred`]
#[must_use = "futures do nothing unless awaited"]
pub struct Settled<T> {
    receiver: oneshot::Receiver<Result<T, DeferredError>>,
}

impl<T> Settled<T> {
    /// An already rejected result, for callers that cannot even start
    pub fn rejected(reason: impl Into<String>) -> Self {
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(Err(DeferredError::Rejected(reason.into())));
        Self { receiver }
    }
}

impl<T> Future for Settled<T> {
    type Output = Result<T, DeferredError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(DeferredError::Abandoned)))
    }
}
