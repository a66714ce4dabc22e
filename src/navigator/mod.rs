pub mod sequence;
pub mod bus;
pub mod channels;
pub mod deferred;
pub mod window;
pub mod manager;
pub mod back;
pub mod alert;
pub mod imperative;
pub mod toast;
pub mod abort;
pub mod shell;

pub use sequence::{make_sequence, MutationTag, Sequence, SequenceGenerator, SequenceTag, ToastTag, WindowTag};
pub use bus::{BusSubscription, Channel, EventBus, SubscriptionId};
pub use deferred::{Deferred, DeferredError, Settled};
pub use window::{
    BackButtonHandler, Component, HandlerCell, KillSelf, Manifest, Window, WindowKey, WindowManifest,
    WindowPatch, WindowSnapshot,
};
pub use manager::{WeakWindowManager, WindowHandle, WindowManager};
pub use back::{BackDispatcher, BackOutcome, BackSignal, DispatcherState};
pub use alert::{AlertAction, AlertConfig, AlertHandle, AlertHost};
pub use imperative::{ImperativeBridge, ImperativeObject, MutationVersion, ObjectSubscription, ObjectUuid, UpdateTarget};
pub use toast::{Toast, ToastDuration, ToastKey, ToastManager};
pub use abort::{AbortController, AbortSignal};
pub use shell::AppShell;
