//! Window model: manifests, components, back handlers

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use crate::navigator::manager::{WeakWindowManager, WindowHandle};
use crate::navigator::sequence::{Sequence, WindowTag};

pub type WindowKey = Sequence<WindowTag>;

/// Future returned by a back-button handler
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Removes the window a back handler was bound to.
///
/// The key is captured when the back signal is dispatched, so calling this
/// later always targets the original window even if the stack changed.
#[derive(Clone)]
pub struct KillSelf {
    key: WindowKey,
    windows: WeakWindowManager,
}

impl KillSelf {
    pub(crate) fn new(key: WindowKey, windows: WeakWindowManager) -> Self {
        Self { key, windows }
    }

    pub fn key(&self) -> WindowKey {
        self.key
    }

    /// Returns false if the window was already gone
    pub fn kill(&self) -> bool {
        match self.windows.upgrade() {
            Some(windows) => windows.remove_window(self.key),
            None => false,
        }
    }
}

impl fmt::Debug for KillSelf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KillSelf").field("key", &self.key).finish()
    }
}

/// Decides what a back press does to the window that registered it.
///
/// Leaving the window open (the old "Ignore" answer) is simply returning
/// without calling [`KillSelf::kill`].
#[derive(Clone)]
pub struct BackButtonHandler {
    handler: Arc<dyn Fn(KillSelf) -> HandlerFuture + Send + Sync>,
}

impl BackButtonHandler {
    /// Asynchronous handler, e.g. one that waits for a confirmation dialog
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(KillSelf) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |kill| handler(kill).boxed()),
        }
    }

    /// Synchronous handler; runs to completion when invoked
    pub fn sync<F>(handler: F) -> Self
    where
        F: Fn(KillSelf) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(move |kill| futures::future::ready(handler(kill)).boxed()),
        }
    }

    /// Swallow back presses
    pub fn ignore() -> Self {
        Self::sync(|_| Ok(()))
    }

    /// Close the window on back, same as having no handler
    pub fn pop() -> Self {
        Self::sync(|kill| {
            kill.kill();
            Ok(())
        })
    }

    pub(crate) fn invoke(&self, kill: KillSelf) -> HandlerFuture {
        (self.handler)(kill)
    }
}

impl fmt::Debug for BackButtonHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BackButtonHandler")
    }
}

/// Indirection cell for the current back handler.
///
/// Owned by the stack entry, written by the mounted window, read by the
/// dispatcher. The contents are swapped; the cell itself never moves.
#[derive(Clone, Default)]
pub struct HandlerCell {
    current: Arc<Mutex<Option<BackButtonHandler>>>,
}

impl HandlerCell {
    pub fn replace(&self, handler: Option<BackButtonHandler>) -> Option<BackButtonHandler> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, handler)
    }

    pub fn current(&self) -> Option<BackButtonHandler> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_set(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// A mounted screen. Owns its props.
pub trait Component: Send + Sync + 'static {
    /// Called right after the window is pushed; register title/back handler here
    fn mount(&self, _window: &WindowHandle) {}

    /// Called after the window left the stack
    fn unmount(&self) {}

    /// Route a UI interaction (button press, list tap...) to this window.
    /// Returns true if the element id was recognised.
    fn interact(&self, _window: &WindowHandle, _element_id: &str) -> bool {
        false
    }

    /// Plain-text summary for headless outlets and logs
    fn describe(&self) -> String;
}

/// Declarative template for instantiating a window from props
pub trait Manifest: Send + Sync + 'static {
    type Props: Send + 'static;

    fn name(&self) -> &'static str;

    fn initial_title(&self, props: &Self::Props) -> Option<String>;

    fn has_animation(&self, _props: &Self::Props) -> bool {
        false
    }

    fn instantiate(&self, props: Self::Props) -> Box<dyn Component>;
}

type Build<P> = Arc<dyn Fn(P) -> Box<dyn Component> + Send + Sync>;
type PropsFn<P, T> = Arc<dyn Fn(&P) -> T + Send + Sync>;

enum Animation<P> {
    Fixed(bool),
    FromProps(PropsFn<P, bool>),
}

/// Closure-based [`Manifest`]
///
/// ```ignore
/// let settings = WindowManifest::new("Settings", |props: SettingsProps| Box::new(SettingsScreen::new(props)))
///     .title_from(|_| "Settings".to_string())
///     .animated(true);
/// ```
pub struct WindowManifest<P> {
    name: &'static str,
    build: Build<P>,
    initial_title: Option<PropsFn<P, String>>,
    animation: Animation<P>,
}

impl<P: Send + 'static> WindowManifest<P> {
    pub fn new<F>(name: &'static str, build: F) -> Self
    where
        F: Fn(P) -> Box<dyn Component> + Send + Sync + 'static,
    {
        Self {
            name,
            build: Arc::new(build),
            initial_title: None,
            animation: Animation::Fixed(false),
        }
    }

    pub fn title_from<F>(mut self, title: F) -> Self
    where
        F: Fn(&P) -> String + Send + Sync + 'static,
    {
        self.initial_title = Some(Arc::new(title));
        self
    }

    pub fn animated(mut self, animated: bool) -> Self {
        self.animation = Animation::Fixed(animated);
        self
    }

    pub fn animated_from<F>(mut self, animated: F) -> Self
    where
        F: Fn(&P) -> bool + Send + Sync + 'static,
    {
        self.animation = Animation::FromProps(Arc::new(animated));
        self
    }
}

impl<P: Send + 'static> Manifest for WindowManifest<P> {
    type Props = P;

    fn name(&self) -> &'static str {
        self.name
    }

    fn initial_title(&self, props: &P) -> Option<String> {
        self.initial_title.as_ref().map(|title| title(props))
    }

    fn has_animation(&self, props: &P) -> bool {
        match &self.animation {
            Animation::Fixed(animated) => *animated,
            Animation::FromProps(animated) => animated(props),
        }
    }

    fn instantiate(&self, props: P) -> Box<dyn Component> {
        (self.build)(props)
    }
}

/// One entry of the window stack
#[derive(Clone)]
pub struct Window {
    pub(crate) key: WindowKey,
    pub(crate) manifest: &'static str,
    pub(crate) component: Arc<dyn Component>,
    pub(crate) title: Option<String>,
    pub(crate) back_handler: HandlerCell,
    pub(crate) has_animation: bool,
}

impl Window {
    pub fn key(&self) -> WindowKey {
        self.key
    }

    pub fn manifest(&self) -> &'static str {
        self.manifest
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn has_animation(&self) -> bool {
        self.has_animation
    }

    pub fn has_back_handler(&self) -> bool {
        self.back_handler.is_set()
    }

    pub fn component(&self) -> &Arc<dyn Component> {
        &self.component
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            key: self.key,
            manifest: self.manifest,
            title: self.title.clone(),
            has_animation: self.has_animation,
            has_back_handler: self.has_back_handler(),
            summary: self.component.describe(),
        }
    }
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("key", &self.key)
            .field("manifest", &self.manifest)
            .field("title", &self.title)
            .field("has_animation", &self.has_animation)
            .field("has_back_handler", &self.has_back_handler())
            .finish()
    }
}

/// Serializable view of a stack entry
#[derive(Debug, Clone, Serialize)]
pub struct WindowSnapshot {
    pub key: WindowKey,
    pub manifest: &'static str,
    pub title: Option<String>,
    pub has_animation: bool,
    pub has_back_handler: bool,
    pub summary: String,
}

/// Partial update applied in place by [`WindowManager::update_window`](crate::navigator::WindowManager::update_window)
#[derive(Debug, Clone, Default)]
pub struct WindowPatch {
    pub(crate) title: Option<Option<String>>,
    pub(crate) back_handler: Option<Option<BackButtonHandler>>,
}

impl WindowPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(Some(title.into()));
        self
    }

    pub fn clear_title(mut self) -> Self {
        self.title = Some(None);
        self
    }

    pub fn back_handler(mut self, handler: BackButtonHandler) -> Self {
        self.back_handler = Some(Some(handler));
        self
    }

    pub fn clear_back_handler(mut self) -> Self {
        self.back_handler = Some(None);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.back_handler.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Label(String);

    impl Component for Label {
        fn describe(&self) -> String {
            self.0.clone()
        }
    }

    #[test]
    fn test_manifest_resolves_title_and_animation_from_props() {
        let manifest = WindowManifest::new("Label", |text: String| Box::new(Label(text)) as Box<dyn Component>)
            .title_from(|text| format!("Title: {}", text))
            .animated_from(|text| text.len() > 3);

        let long = "long text".to_string();
        assert_eq!(manifest.initial_title(&long).as_deref(), Some("Title: long text"));
        assert!(manifest.has_animation(&long));
        assert!(!manifest.has_animation(&"abc".to_string()));
        assert_eq!(manifest.instantiate(long).describe(), "long text");
    }

    #[test]
    fn test_manifest_defaults() {
        let manifest = WindowManifest::new("Label", |text: String| Box::new(Label(text)) as Box<dyn Component>);
        assert_eq!(manifest.name(), "Label");
        assert_eq!(manifest.initial_title(&String::new()), None);
        assert!(!manifest.has_animation(&String::new()));
    }

    #[test]
    fn test_handler_cell_swaps_contents() {
        let cell = HandlerCell::default();
        let reader = cell.clone();
        assert!(!reader.is_set());

        assert!(cell.replace(Some(BackButtonHandler::ignore())).is_none());
        assert!(reader.is_set());

        assert!(cell.replace(None).is_some());
        assert!(!reader.is_set());
    }

    #[test]
    fn test_patch_builder() {
        assert!(WindowPatch::new().is_empty());
        let patch = WindowPatch::new().title("Home").clear_back_handler();
        assert_eq!(patch.title, Some(Some("Home".to_string())));
        assert!(matches!(patch.back_handler, Some(None)));
    }
}
