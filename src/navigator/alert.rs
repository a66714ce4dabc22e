//! Alert/confirm dialogs as windows that settle a future
//!
//! [`AlertHost`] is the owning call site: it keeps every dialog it opened
//! together with the pending result. Dropping (or tearing down) the host
//! rejects every result still pending and closes every dialog still open,
//! so nothing awaiting an answer is left hanging.

use log::{debug, info};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::navigator::deferred::{Deferred, Settled};
use crate::navigator::manager::{WeakWindowManager, WindowHandle, WindowManager};
use crate::navigator::window::{BackButtonHandler, Component, Manifest, WindowKey};

/// Identifier of a dialog button
pub trait AlertAction: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
}

impl AlertAction for String {
    fn id(&self) -> &str {
        self
    }
}

impl AlertAction for &'static str {
    fn id(&self) -> &str {
        self
    }
}

/// What to show in an alert
#[derive(Debug, Clone)]
pub struct AlertConfig<A> {
    title: String,
    content: String,
    buttons: Vec<(A, String)>,
}

impl<A: AlertAction> AlertConfig<A> {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: String::new(),
            buttons: Vec::new(),
        }
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Add a button; buttons render in insertion order
    pub fn button(mut self, action: A, label: impl Into<String>) -> Self {
        self.buttons.push((action, label.into()));
        self
    }
}

pub struct AlertDialogProps<A> {
    pub title: String,
    pub content: String,
    pub buttons: Vec<(A, String)>,
    pub on_button: Arc<dyn Fn(&A) + Send + Sync>,
    pub on_dismiss: Arc<dyn Fn() + Send + Sync>,
}

/// Dialog window. Swallows back presses; only a button answers it.
pub struct AlertDialog<A> {
    props: AlertDialogProps<A>,
}

impl<A: AlertAction> Component for AlertDialog<A> {
    fn mount(&self, window: &WindowHandle) {
        window.set_back_handler(BackButtonHandler::ignore());
    }

    fn unmount(&self) {
        (self.props.on_dismiss)();
    }

    fn interact(&self, _window: &WindowHandle, element_id: &str) -> bool {
        match self.props.buttons.iter().find(|(action, _)| action.id() == element_id) {
            Some((action, _)) => {
                (self.props.on_button)(action);
                true
            }
            None => false,
        }
    }

    fn describe(&self) -> String {
        let labels: Vec<String> = self
            .props
            .buttons
            .iter()
            .map(|(_, label)| format!("[{}]", label))
            .collect();
        if self.props.content.is_empty() {
            format!("{} {}", self.props.title, labels.join(" "))
        } else {
            format!("{}: {} {}", self.props.title, self.props.content, labels.join(" "))
        }
    }
}

/// Manifest for [`AlertDialog`] windows
pub struct AlertDialogWindow<A>(PhantomData<fn() -> A>);

impl<A> AlertDialogWindow<A> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<A> Default for AlertDialogWindow<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: AlertAction> Manifest for AlertDialogWindow<A> {
    type Props = AlertDialogProps<A>;

    fn name(&self) -> &'static str {
        "AlertDialog"
    }

    fn initial_title(&self, props: &Self::Props) -> Option<String> {
        Some(props.title.clone())
    }

    fn instantiate(&self, props: Self::Props) -> Box<dyn Component> {
        Box::new(AlertDialog { props })
    }
}

struct PendingAlert {
    key: WindowKey,
    reject: Box<dyn Fn(&str) + Send + Sync>,
}

struct AlertRegistry {
    windows: WeakWindowManager,
    open: Mutex<Vec<PendingAlert>>,
    closed: AtomicBool,
}

impl AlertRegistry {
    fn open(&self) -> MutexGuard<'_, Vec<PendingAlert>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn forget(&self, key: WindowKey) {
        self.open().retain(|pending| pending.key != key);
    }

    fn show<A: AlertAction>(self: &Arc<Self>, config: AlertConfig<A>) -> Settled<A> {
        if self.closed.load(Ordering::Acquire) {
            return Settled::rejected("alert host was torn down");
        }
        let Some(windows) = self.windows.upgrade() else {
            return Settled::rejected("window manager is gone");
        };

        let (deferred, settled) = Deferred::new();
        let registry: Weak<AlertRegistry> = Arc::downgrade(self);
        let stack = self.windows.clone();

        let answered = deferred.clone();
        let dismissed = deferred.clone();
        let dismissed_registry = registry.clone();

        let key = windows.create_window_with(&AlertDialogWindow::<A>::new(), move |key| {
            AlertDialogProps {
                title: config.title,
                content: config.content,
                buttons: config.buttons,
                on_button: Arc::new(move |action: &A| {
                    debug!("Alert {} answered with '{}'", key, action.id());
                    answered.resolve(action.clone());
                    if let Some(registry) = registry.upgrade() {
                        registry.forget(key);
                    }
                    if let Some(windows) = stack.upgrade() {
                        windows.remove_window(key);
                    }
                }),
                on_dismiss: Arc::new(move || {
                    if dismissed.reject("alert window closed without an answer") {
                        debug!("Alert {} closed without an answer", key);
                    }
                    if let Some(registry) = dismissed_registry.upgrade() {
                        registry.forget(key);
                    }
                }),
            }
        });

        // `closed` is only flipped under the `open` lock, so checking it here
        // sees any teardown that ran while the window was being created.
        let mut open = self.open();
        if self.closed.load(Ordering::Acquire) {
            drop(open);
            debug!("Alert host torn down while {} was opening", key);
            deferred.reject("Unmounting...");
            windows.remove_window(key);
            return settled;
        }
        open.push(PendingAlert {
            key,
            reject: Box::new(move |reason| {
                deferred.reject(reason);
            }),
        });
        drop(open);

        settled
    }

    fn teardown(&self) -> usize {
        let pending: Vec<PendingAlert> = {
            let mut open = self.open();
            if self.closed.swap(true, Ordering::AcqRel) {
                return 0;
            }
            std::mem::take(&mut *open)
        };
        let windows = self.windows.upgrade();
        for alert in &pending {
            (alert.reject)("Unmounting...");
            if let Some(windows) = &windows {
                windows.remove_window(alert.key);
            }
        }

        if !pending.is_empty() {
            info!("Alert host torn down with {} open dialog(s)", pending.len());
        }
        pending.len()
    }
}

/// Owning call site for alerts; tears down on drop
pub struct AlertHost {
    registry: Arc<AlertRegistry>,
}

impl AlertHost {
    pub fn new(windows: &WindowManager) -> Self {
        Self {
            registry: Arc::new(AlertRegistry {
                windows: windows.downgrade(),
                open: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Open a dialog and return the future of the clicked action
    pub fn show<A: AlertAction>(&self, config: AlertConfig<A>) -> Settled<A> {
        self.registry.show(config)
    }

    /// Cloneable handle for use inside back handlers and callbacks
    pub fn handle(&self) -> AlertHandle {
        AlertHandle {
            registry: self.registry.clone(),
        }
    }

    pub fn open_count(&self) -> usize {
        self.registry.open().len()
    }

    /// Reject every pending result and close every open dialog.
    /// Returns how many dialogs were still open.
    pub fn teardown(&self) -> usize {
        self.registry.teardown()
    }
}

impl Drop for AlertHost {
    fn drop(&mut self) {
        self.registry.teardown();
    }
}

/// Non-owning access to an [`AlertHost`]; rejects immediately once the host is gone
#[derive(Clone)]
pub struct AlertHandle {
    registry: Arc<AlertRegistry>,
}

impl AlertHandle {
    pub fn show<A: AlertAction>(&self, config: AlertConfig<A>) -> Settled<A> {
        self.registry.show(config)
    }

    pub fn open_count(&self) -> usize {
        self.registry.open().len()
    }

    pub fn is_closed(&self) -> bool {
        self.registry.closed.load(Ordering::Acquire)
    }
}
