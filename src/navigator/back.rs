//! Routes the hardware/software back signal to the topmost window

use futures::FutureExt;
use log::{debug, error, info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::navigator::bus::panic_message;
use crate::navigator::manager::WindowManager;
use crate::navigator::window::{KillSelf, WindowKey};

/// One back press from the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    Handling,
}

/// What happened to a back signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackOutcome {
    /// Topmost window had no handler and was popped
    Popped(WindowKey),

    /// Topmost window's handler ran to completion
    Handled(WindowKey),

    /// Handler returned an error or panicked; the window stays
    Failed(WindowKey),

    /// A previous signal is still being handled
    Ignored,

    /// No windows; handed to the platform fallback
    Unhandled,
}

type Fallback = Arc<dyn Fn() + Send + Sync>;

/// Idle/Handling state machine in front of the window stack.
///
/// Only the window on top when the signal arrives is consulted, and only
/// one signal is handled at a time; signals arriving meanwhile are dropped.
#[derive(Clone)]
pub struct BackDispatcher {
    windows: WindowManager,
    handling: Arc<AtomicBool>,
    fallback: Option<Fallback>,
}

/// Puts the dispatcher back to Idle however the handling ends
struct HandlingGuard(Arc<AtomicBool>);

impl Drop for HandlingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl BackDispatcher {
    pub fn new(windows: WindowManager) -> Self {
        Self {
            windows,
            handling: Arc::new(AtomicBool::new(false)),
            fallback: None,
        }
    }

    /// Called when a back signal arrives and the stack is empty
    pub fn on_unhandled<F>(mut self, fallback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    pub fn state(&self) -> DispatcherState {
        if self.handling.load(Ordering::Acquire) {
            DispatcherState::Handling
        } else {
            DispatcherState::Idle
        }
    }

    /// Handle one back signal.
    ///
    /// The Idle -> Handling transition happens on the first poll, so two
    /// dispatches polled back to back result in a single handler invocation.
    pub async fn dispatch(&self) -> BackOutcome {
        if self
            .handling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Back signal dropped: previous signal still being handled");
            return BackOutcome::Ignored;
        }
        let _guard = HandlingGuard(self.handling.clone());

        let Some(top) = self.windows.top() else {
            info!("Back signal with empty window stack, using platform fallback");
            if let Some(fallback) = &self.fallback {
                if let Err(cause) = panic::catch_unwind(AssertUnwindSafe(|| fallback())) {
                    error!("Back signal fallback panicked: {}", panic_message(cause.as_ref()));
                }
            }
            return BackOutcome::Unhandled;
        };
        let key = top.key();

        let Some(handler) = top.back_handler.current() else {
            debug!("No back handler on {}, popping", key);
            self.windows.remove_window(key);
            return BackOutcome::Popped(key);
        };

        debug!("Invoking back handler of {}", key);
        let kill = KillSelf::new(key, self.windows.downgrade());
        let future = match panic::catch_unwind(AssertUnwindSafe(|| handler.invoke(kill))) {
            Ok(future) => future,
            Err(cause) => {
                error!("Back handler of {} panicked: {}", key, panic_message(cause.as_ref()));
                return BackOutcome::Failed(key);
            }
        };

        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(())) => BackOutcome::Handled(key),
            Ok(Err(e)) => {
                error!("Back handler of {} failed: {:#}", key, e);
                BackOutcome::Failed(key)
            }
            Err(cause) => {
                error!("Back handler of {} panicked: {}", key, panic_message(cause.as_ref()));
                BackOutcome::Failed(key)
            }
        }
    }

    /// Consume back signals from a channel until every sender is dropped.
    ///
    /// Each signal is dispatched on its own task so that the listener keeps
    /// draining (and dropping) presses while an async handler is waiting.
    pub fn listen(&self) -> (mpsc::UnboundedSender<BackSignal>, JoinHandle<()>) {
        let (sender, mut signals) = mpsc::unbounded_channel::<BackSignal>();
        let dispatcher = self.clone();

        let task = tokio::spawn(async move {
            while signals.recv().await.is_some() {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    let outcome = dispatcher.dispatch().await;
                    if let BackOutcome::Failed(key) = outcome {
                        warn!("Back signal left {} open after handler failure", key);
                    }
                });
            }
            debug!("Back signal source closed");
        });

        (sender, task)
    }
}

impl std::fmt::Debug for BackDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackDispatcher")
            .field("state", &self.state())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::bus::EventBus;
    use crate::navigator::deferred::Deferred;
    use crate::navigator::manager::WindowHandle;
    use crate::navigator::window::{BackButtonHandler, Component, WindowManifest};
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    /// Screen whose mount hook installs a preconfigured handler
    struct Screen {
        name: &'static str,
        handler: Option<BackButtonHandler>,
    }

    impl Component for Screen {
        fn mount(&self, window: &WindowHandle) {
            if let Some(handler) = &self.handler {
                window.set_back_handler(handler.clone());
            }
        }

        fn describe(&self) -> String {
            self.name.to_string()
        }
    }

    fn manifest() -> WindowManifest<(&'static str, Option<BackButtonHandler>)> {
        WindowManifest::new("Screen", |(name, handler): (&'static str, Option<BackButtonHandler>)| {
            Box::new(Screen { name, handler }) as Box<dyn Component>
        })
    }

    fn explode() -> anyhow::Result<()> {
        panic!("handler blew up")
    }

    fn counting_handler(count: Arc<AtomicUsize>) -> BackButtonHandler {
        BackButtonHandler::sync(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_routes_to_top_only() {
        let windows = WindowManager::new(EventBus::new());
        let a_calls = Arc::new(AtomicUsize::new(0));
        let c_calls = Arc::new(AtomicUsize::new(0));

        let a = windows.create_window(&manifest(), ("A", Some(counting_handler(a_calls.clone()))));
        let b = windows.create_window(&manifest(), ("B", None));
        let c = windows.create_window(&manifest(), ("C", Some(counting_handler(c_calls.clone()))));

        let dispatcher = BackDispatcher::new(windows.clone());
        assert_eq!(dispatcher.dispatch().await, BackOutcome::Handled(c));

        assert_eq!(c_calls.load(Ordering::SeqCst), 1);
        assert_eq!(a_calls.load(Ordering::SeqCst), 0);
        let remaining: Vec<_> = windows.windows().iter().map(|w| w.key()).collect();
        assert_eq!(remaining, vec![a, b, c], "handler did not kill, nothing pops");
    }

    #[tokio::test]
    async fn test_default_policy_pops() {
        let windows = WindowManager::new(EventBus::new());
        let a = windows.create_window(&manifest(), ("A", None));
        let b = windows.create_window(&manifest(), ("B", None));

        let dispatcher = BackDispatcher::new(windows.clone());
        assert_eq!(dispatcher.dispatch().await, BackOutcome::Popped(b));
        assert_eq!(dispatcher.dispatch().await, BackOutcome::Popped(a));
        assert!(windows.is_empty());
    }

    #[tokio::test]
    async fn test_empty_stack_uses_fallback() {
        let windows = WindowManager::new(EventBus::new());
        let exits = Arc::new(AtomicUsize::new(0));
        let counter = exits.clone();
        let dispatcher = BackDispatcher::new(windows).on_unhandled(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(dispatcher.dispatch().await, BackOutcome::Unhandled);
        assert_eq!(exits.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.state(), DispatcherState::Idle);
    }

    #[tokio::test]
    async fn test_reentrant_signal_is_dropped() {
        let windows = WindowManager::new(EventBus::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let pending: Arc<Mutex<Option<Deferred<()>>>> = Arc::default();

        let handler = {
            let calls = calls.clone();
            let pending = pending.clone();
            BackButtonHandler::new(move |kill| {
                calls.fetch_add(1, Ordering::SeqCst);
                let (deferred, settled) = Deferred::new();
                *pending.lock().unwrap() = Some(deferred);
                async move {
                    settled.await?;
                    kill.kill();
                    Ok(())
                }
            })
        };
        let key = windows.create_window(&manifest(), ("Busy", Some(handler)));

        let dispatcher = BackDispatcher::new(windows.clone());
        let mut first = Box::pin(dispatcher.dispatch());
        assert!(futures::poll!(&mut first).is_pending());
        assert_eq!(dispatcher.state(), DispatcherState::Handling);

        assert_eq!(dispatcher.dispatch().await, BackOutcome::Ignored);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        pending.lock().unwrap().take().unwrap().resolve(());
        assert_eq!(first.await, BackOutcome::Handled(key));
        assert_eq!(dispatcher.state(), DispatcherState::Idle);
        assert!(windows.is_empty());
    }

    #[tokio::test]
    async fn test_failing_handler_keeps_window_and_unwedges() {
        let windows = WindowManager::new(EventBus::new());
        let failing = BackButtonHandler::sync(|_| anyhow::bail!("cannot leave"));
        let key = windows.create_window(&manifest(), ("Stubborn", Some(failing)));

        let dispatcher = BackDispatcher::new(windows.clone());
        assert_eq!(dispatcher.dispatch().await, BackOutcome::Failed(key));
        assert_eq!(dispatcher.state(), DispatcherState::Idle);
        assert!(windows.contains(key));

        windows
            .handle(key)
            .set_back_handler(BackButtonHandler::new(|_| async { explode() }));
        assert_eq!(dispatcher.dispatch().await, BackOutcome::Failed(key));
        assert_eq!(dispatcher.state(), DispatcherState::Idle);
        assert!(windows.contains(key));

        windows.handle(key).clear_back_handler();
        assert_eq!(dispatcher.dispatch().await, BackOutcome::Popped(key));
    }

    struct BrittleUnmount;

    impl Component for BrittleUnmount {
        fn unmount(&self) {
            panic!("unmount blew up");
        }

        fn describe(&self) -> String {
            "brittle".to_string()
        }
    }

    #[tokio::test]
    async fn test_default_pop_survives_panicking_unmount() {
        let windows = WindowManager::new(EventBus::new());
        let manifest = WindowManifest::new("Brittle", |_: ()| Box::new(BrittleUnmount) as Box<dyn Component>);
        let key = windows.create_window(&manifest, ());

        let dispatcher = BackDispatcher::new(windows.clone());
        let task = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.dispatch().await }
        });

        assert_eq!(task.await.unwrap(), BackOutcome::Popped(key));
        assert!(windows.is_empty());
        assert_eq!(dispatcher.state(), DispatcherState::Idle);
    }

    #[tokio::test]
    async fn test_panicking_fallback_is_contained() {
        let dispatcher = BackDispatcher::new(WindowManager::new(EventBus::new()))
            .on_unhandled(|| panic!("platform exit failed"));

        let task = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.dispatch().await }
        });

        assert_eq!(task.await.unwrap(), BackOutcome::Unhandled);
        assert_eq!(dispatcher.state(), DispatcherState::Idle);
    }

    #[tokio::test]
    async fn test_handler_bound_to_original_top() {
        let windows = WindowManager::new(EventBus::new());
        let pending: Arc<Mutex<Option<Deferred<()>>>> = Arc::default();
        let handler = {
            let pending = pending.clone();
            BackButtonHandler::new(move |kill| {
                let (deferred, settled) = Deferred::new();
                *pending.lock().unwrap() = Some(deferred);
                async move {
                    settled.await?;
                    kill.kill();
                    Ok(())
                }
            })
        };
        let editor = windows.create_window(&manifest(), ("Editor", Some(handler)));

        let dispatcher = BackDispatcher::new(windows.clone());
        let mut handling = Box::pin(dispatcher.dispatch());
        assert!(futures::poll!(&mut handling).is_pending());

        // Stack changes while the handler is waiting
        let overlay = windows.create_window(&manifest(), ("Overlay", None));

        pending.lock().unwrap().take().unwrap().resolve(());
        assert_eq!(handling.await, BackOutcome::Handled(editor));

        let remaining: Vec<_> = windows.windows().iter().map(|w| w.key()).collect();
        assert_eq!(remaining, vec![overlay]);
    }

    #[tokio::test]
    async fn test_cancelled_dispatch_returns_to_idle() {
        let windows = WindowManager::new(EventBus::new());
        let never = BackButtonHandler::new(|_| futures::future::pending::<anyhow::Result<()>>());
        windows.create_window(&manifest(), ("Hanging", Some(never)));

        let dispatcher = BackDispatcher::new(windows);
        let mut handling = Box::pin(dispatcher.dispatch());
        assert!(futures::poll!(&mut handling).is_pending());
        assert_eq!(dispatcher.state(), DispatcherState::Handling);

        drop(handling);
        assert_eq!(dispatcher.state(), DispatcherState::Idle);
    }

    #[tokio::test]
    async fn test_listener_dispatches_signals() {
        let windows = WindowManager::new(EventBus::new());
        windows.create_window(&manifest(), ("A", None));
        windows.create_window(&manifest(), ("B", None));

        let dispatcher = BackDispatcher::new(windows.clone());
        let (signals, task) = dispatcher.listen();
        signals.send(BackSignal).unwrap();

        for _ in 0..100 {
            if windows.len() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(windows.len(), 1);

        drop(signals);
        task.await.unwrap();
    }
}
