//! Transient notifications that expire on their own

use log::{debug, warn};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::ToastSettings;
use crate::navigator::bus::EventBus;
use crate::navigator::channels::ToastsChanged;
use crate::navigator::sequence::{Sequence, SequenceGenerator, ToastTag};

pub type ToastKey = Sequence<ToastTag>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastDuration {
    Shortest,
    #[default]
    Short,
    Medium,
    Long,
}

#[derive(Debug, Clone, Serialize)]
pub struct Toast {
    pub key: ToastKey,
    pub content: String,
    pub duration: ToastDuration,
}

struct ToastShared {
    toasts: Mutex<Vec<Toast>>,
    keys: SequenceGenerator<ToastTag>,
    settings: ToastSettings,
    bus: EventBus,
}

/// Ordered list of visible toasts. Clones share the list.
#[derive(Clone)]
pub struct ToastManager {
    shared: Arc<ToastShared>,
}

impl ToastManager {
    pub fn new(bus: EventBus, settings: ToastSettings) -> Self {
        Self {
            shared: Arc::new(ToastShared {
                toasts: Mutex::new(Vec::new()),
                keys: SequenceGenerator::new(),
                settings,
                bus,
            }),
        }
    }

    fn toasts_mut(&self) -> MutexGuard<'_, Vec<Toast>> {
        self.shared
            .toasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lifetime(&self, duration: ToastDuration) -> Duration {
        let settings = &self.shared.settings;
        Duration::from_millis(match duration {
            ToastDuration::Shortest => settings.shortest_ms,
            ToastDuration::Short => settings.short_ms,
            ToastDuration::Medium => settings.medium_ms,
            ToastDuration::Long => settings.long_ms,
        })
    }

    /// Show a toast; it is dismissed automatically once its lifetime elapses.
    ///
    /// Expiry needs a tokio runtime. Without one the toast stays until
    /// [`dismiss`](Self::dismiss) is called.
    pub fn show(&self, content: impl Into<String>, duration: ToastDuration) -> ToastKey {
        let key = self.shared.keys.next();
        let content = content.into();
        debug!("Showing toast {} ({:?}): {}", key, duration, content);

        let count = {
            let mut toasts = self.toasts_mut();
            toasts.push(Toast {
                key,
                content,
                duration,
            });
            toasts.len()
        };
        self.shared.bus.publish::<ToastsChanged>(count);

        let lifetime = self.lifetime(duration);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let shared = Arc::downgrade(&self.shared);
                runtime.spawn(async move {
                    tokio::time::sleep(lifetime).await;
                    if let Some(shared) = shared.upgrade() {
                        ToastManager { shared }.dismiss(key);
                    }
                });
            }
            Err(_) => warn!("No async runtime; toast {} will not expire on its own", key),
        }

        key
    }

    /// Remove a toast early. Unknown or expired keys are ignored.
    pub fn dismiss(&self, key: ToastKey) -> bool {
        let count = {
            let mut toasts = self.toasts_mut();
            let before = toasts.len();
            toasts.retain(|toast| toast.key != key);
            if toasts.len() == before {
                return false;
            }
            toasts.len()
        };

        debug!("Dismissed toast {}", key);
        self.shared.bus.publish::<ToastsChanged>(count);
        true
    }

    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts_mut().clone()
    }

    pub fn len(&self) -> usize {
        self.toasts_mut().len()
    }

    pub fn is_empty(&self) -> bool {
        self.toasts_mut().is_empty()
    }
}
