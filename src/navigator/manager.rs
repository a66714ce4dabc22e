use log::{debug, error, info, trace};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use crate::navigator::bus::{panic_message, EventBus};
use crate::navigator::channels::{WindowsChanged, WindowsChangedPayload};
use crate::navigator::sequence::{SequenceGenerator, WindowTag};
use crate::navigator::window::{
    BackButtonHandler, HandlerCell, Manifest, Window, WindowKey, WindowPatch, WindowSnapshot,
};

/// Default time an animated window keeps playing its exit transition
pub const DEFAULT_EXIT_TRANSITION: Duration = Duration::from_millis(200);

#[derive(Default)]
struct StackState {
    /// Insertion order is z-order; the last entry is topmost
    windows: Vec<Window>,

    /// Animated windows already removed from `windows`, still on screen
    exiting: Vec<(Window, Instant)>,
}

struct ManagerShared {
    stack: Mutex<StackState>,
    keys: SequenceGenerator<WindowTag>,
    bus: EventBus,
    exit_transition: Duration,
}

/// Owns the ordered stack of windows.
///
/// There is one per running application; clones share the same stack.
#[derive(Clone)]
pub struct WindowManager {
    shared: Arc<ManagerShared>,
}

impl WindowManager {
    pub fn new(bus: EventBus) -> Self {
        Self::with_exit_transition(bus, DEFAULT_EXIT_TRANSITION)
    }

    pub fn with_exit_transition(bus: EventBus, exit_transition: Duration) -> Self {
        Self {
            shared: Arc::new(ManagerShared {
                stack: Mutex::new(StackState::default()),
                keys: SequenceGenerator::new(),
                bus,
                exit_transition,
            }),
        }
    }

    fn stack(&self) -> MutexGuard<'_, StackState> {
        self.shared
            .stack
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn bus(&self) -> &EventBus {
        &self.shared.bus
    }

    pub fn downgrade(&self) -> WeakWindowManager {
        WeakWindowManager {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Push a new window built from `manifest` and return its key
    pub fn create_window<M: Manifest>(&self, manifest: &M, props: M::Props) -> WindowKey {
        self.create_window_with(manifest, |_| props)
    }

    /// Like [`create_window`](Self::create_window), but the props are built
    /// from the freshly allocated key (e.g. a dialog callback that closes its
    /// own window).
    pub fn create_window_with<M, F>(&self, manifest: &M, props: F) -> WindowKey
    where
        M: Manifest,
        F: FnOnce(WindowKey) -> M::Props,
    {
        let key = self.shared.keys.next();
        let props = props(key);

        let window = Window {
            key,
            manifest: manifest.name(),
            title: manifest.initial_title(&props),
            has_animation: manifest.has_animation(&props),
            back_handler: HandlerCell::default(),
            component: Arc::from(manifest.instantiate(props)),
        };
        let component = window.component.clone();

        self.stack().windows.push(window);
        debug!("Created window {} ({})", key, manifest.name());

        let handle = self.handle(key);
        if let Err(cause) = panic::catch_unwind(AssertUnwindSafe(|| component.mount(&handle))) {
            error!("Window {} panicked while mounting: {}", key, panic_message(cause.as_ref()));
        }
        self.announce();
        key
    }

    /// Remove the window with `key`, wherever it sits in the stack.
    ///
    /// Unknown keys are ignored. Returns whether a window was removed.
    pub fn remove_window(&self, key: WindowKey) -> bool {
        let removed = {
            let mut stack = self.stack();
            let Some(position) = stack.windows.iter().position(|w| w.key == key) else {
                trace!("remove_window: {} is not on the stack", key);
                return false;
            };

            let window = stack.windows.remove(position);
            if window.has_animation {
                stack.exiting.push((window.clone(), Instant::now()));
            }
            self.prune_exiting(&mut stack);
            window
        };

        debug!("Removed window {} ({})", key, removed.manifest);
        if let Err(cause) = panic::catch_unwind(AssertUnwindSafe(|| removed.component.unmount())) {
            error!("Window {} panicked while unmounting: {}", key, panic_message(cause.as_ref()));
        }
        self.announce();
        true
    }

    /// Merge `patch` into the window with `key`. Unknown keys are ignored.
    pub fn update_window(&self, key: WindowKey, patch: WindowPatch) -> bool {
        if patch.is_empty() {
            return self.contains(key);
        }

        let title_changed = {
            let mut stack = self.stack();
            let Some(window) = stack.windows.iter_mut().find(|w| w.key == key) else {
                trace!("update_window: {} is not on the stack", key);
                return false;
            };

            if let Some(handler) = patch.back_handler {
                window.back_handler.replace(handler);
            }

            match patch.title {
                Some(title) if title != window.title => {
                    window.title = title;
                    true
                }
                _ => false,
            }
        };

        if title_changed {
            self.announce();
        }
        true
    }

    /// Current stack, bottom first
    pub fn windows(&self) -> Vec<Window> {
        self.stack().windows.clone()
    }

    pub fn snapshots(&self) -> Vec<WindowSnapshot> {
        self.windows().iter().map(Window::snapshot).collect()
    }

    pub fn top(&self) -> Option<Window> {
        self.stack().windows.last().cloned()
    }

    pub fn get(&self, key: WindowKey) -> Option<Window> {
        self.stack().windows.iter().find(|w| w.key == key).cloned()
    }

    pub fn contains(&self, key: WindowKey) -> bool {
        self.stack().windows.iter().any(|w| w.key == key)
    }

    pub fn len(&self) -> usize {
        self.stack().windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack().windows.is_empty()
    }

    /// Animated windows that were removed but are still playing their exit transition
    pub fn exiting(&self) -> Vec<Window> {
        let mut stack = self.stack();
        self.prune_exiting(&mut stack);
        stack.exiting.iter().map(|(w, _)| w.clone()).collect()
    }

    /// Route a UI interaction to the window with `key`
    pub fn interact(&self, key: WindowKey, element_id: &str) -> bool {
        let Some(window) = self.get(key) else {
            debug!("Interaction '{}' targeted missing window {}", element_id, key);
            return false;
        };
        window.component.interact(&self.handle(key), element_id)
    }

    /// Per-screen handle for the window with `key`
    pub fn handle(&self, key: WindowKey) -> WindowHandle {
        WindowHandle {
            key,
            windows: self.downgrade(),
        }
    }

    /// Remove every window, topmost first
    pub fn clear(&self) {
        let keys: Vec<WindowKey> = self.stack().windows.iter().rev().map(|w| w.key).collect();
        for key in keys {
            self.remove_window(key);
        }
        info!("Window stack cleared");
    }

    fn prune_exiting(&self, stack: &mut StackState) {
        let transition = self.shared.exit_transition;
        stack
            .exiting
            .retain(|(_, removed_at)| removed_at.elapsed() < transition);
    }

    fn announce(&self) {
        let payload = {
            let stack = self.stack();
            WindowsChangedPayload {
                depth: stack.windows.len(),
                top: stack.windows.last().map(|w| w.key),
            }
        };
        self.shared.bus.publish::<WindowsChanged>(payload);
    }
}

impl std::fmt::Debug for WindowManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowManager")
            .field("windows", &self.windows())
            .finish()
    }
}

/// Non-owning reference to a [`WindowManager`], held by handles and
/// callbacks that live inside the stack itself.
#[derive(Clone, Default)]
pub struct WeakWindowManager {
    shared: Weak<ManagerShared>,
}

impl WeakWindowManager {
    pub fn upgrade(&self) -> Option<WindowManager> {
        self.shared.upgrade().map(|shared| WindowManager { shared })
    }
}

/// What a mounted screen uses to talk to its own stack entry
#[derive(Clone)]
pub struct WindowHandle {
    key: WindowKey,
    windows: WeakWindowManager,
}

impl WindowHandle {
    pub fn key(&self) -> WindowKey {
        self.key
    }

    fn update(&self, patch: WindowPatch) -> bool {
        match self.windows.upgrade() {
            Some(windows) => windows.update_window(self.key, patch),
            None => false,
        }
    }

    pub fn set_title(&self, title: impl Into<String>) -> bool {
        self.update(WindowPatch::new().title(title))
    }

    pub fn set_back_handler(&self, handler: BackButtonHandler) -> bool {
        self.update(WindowPatch::new().back_handler(handler))
    }

    pub fn clear_back_handler(&self) -> bool {
        self.update(WindowPatch::new().clear_back_handler())
    }

    /// Remove this window from the stack
    pub fn close(&self) -> bool {
        match self.windows.upgrade() {
            Some(windows) => windows.remove_window(self.key),
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.windows
            .upgrade()
            .is_some_and(|windows| windows.contains(self.key))
    }

    /// Whether this window currently receives back signals
    pub fn is_top(&self) -> bool {
        self.windows
            .upgrade()
            .and_then(|windows| windows.top())
            .is_some_and(|top| top.key == self.key)
    }

    pub fn snapshot(&self) -> Option<WindowSnapshot> {
        self.windows
            .upgrade()
            .and_then(|windows| windows.get(self.key))
            .map(|w| w.snapshot())
    }
}

impl std::fmt::Debug for WindowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowHandle").field("key", &self.key).finish()
    }
}
