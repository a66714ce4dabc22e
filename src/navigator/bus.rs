//! In-process publish/subscribe registry
//!
//! Channels are named, and each channel carries exactly one payload type.
//! Delivery is synchronous, in subscription order, over a snapshot of the
//! subscribers taken when `publish` is called. A subscriber that panics is
//! logged and skipped; the remaining subscribers still run.

use log::{error, trace, warn};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A named stream on the bus with a fixed payload shape
pub trait Channel: 'static {
    const NAME: &'static str;
    type Payload: Send + Sync + 'static;
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Callback<P> = Arc<dyn Fn(&P) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    /// Holds a `Callback<C::Payload>` for the channel it is registered on
    callback: Box<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct Registry {
    channels: HashMap<&'static str, Vec<Subscriber>>,
    handles: HashMap<SubscriptionId, &'static str>,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    registry: Mutex<Registry>,
}

/// Shared channel registry. Cloning is cheap and clones share subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `callback` on channel `C`
    pub fn subscribe<C, F>(&self, callback: F) -> SubscriptionId
    where
        C: Channel,
        F: Fn(&C::Payload) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let callback: Callback<C::Payload> = Arc::new(callback);

        let mut registry = self.registry();
        registry.channels.entry(C::NAME).or_default().push(Subscriber {
            id,
            callback: Box::new(callback),
        });
        registry.handles.insert(id, C::NAME);

        trace!("Subscribed {:?} to channel '{}'", id, C::NAME);
        id
    }

    /// Same as [`subscribe`](Self::subscribe), but unsubscribes when the guard is dropped
    pub fn subscribe_scoped<C, F>(&self, callback: F) -> BusSubscription
    where
        C: Channel,
        F: Fn(&C::Payload) + Send + Sync + 'static,
    {
        let id = self.subscribe::<C, F>(callback);
        BusSubscription {
            bus: self.clone(),
            id,
        }
    }

    /// Remove a subscription. Unknown or already removed handles are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry();
        let Some(channel) = registry.handles.remove(&id) else {
            return false;
        };

        if let Some(subscribers) = registry.channels.get_mut(channel) {
            subscribers.retain(|s| s.id != id);
            if subscribers.is_empty() {
                registry.channels.remove(channel);
            }
        }

        trace!("Unsubscribed {:?} from channel '{}'", id, channel);
        true
    }

    /// Deliver `payload` to every current subscriber of `C`.
    ///
    /// Returns how many callbacks completed without panicking. Publishing to
    /// a channel without subscribers drops the payload.
    pub fn publish<C: Channel>(&self, payload: C::Payload) -> usize {
        let snapshot: Vec<Callback<C::Payload>> = {
            let registry = self.registry();
            match registry.channels.get(C::NAME) {
                Some(subscribers) => subscribers
                    .iter()
                    .filter_map(|s| match s.callback.downcast_ref::<Callback<C::Payload>>() {
                        Some(callback) => Some(callback.clone()),
                        None => {
                            warn!(
                                "Subscriber {:?} on channel '{}' expects a different payload type",
                                s.id,
                                C::NAME
                            );
                            None
                        }
                    })
                    .collect(),
                None => Vec::new(),
            }
        };

        if snapshot.is_empty() {
            trace!("Dropped publish on channel '{}' (no subscribers)", C::NAME);
            return 0;
        }

        let mut delivered = 0;
        for callback in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(&payload))) {
                Ok(()) => delivered += 1,
                Err(cause) => {
                    error!(
                        "Subscriber on channel '{}' panicked: {}",
                        C::NAME,
                        panic_message(cause.as_ref())
                    );
                }
            }
        }
        delivered
    }

    /// Number of callbacks currently registered on `C`
    pub fn subscriber_count<C: Channel>(&self) -> usize {
        self.registry()
            .channels
            .get(C::NAME)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry();
        f.debug_struct("EventBus")
            .field("channels", &registry.channels.len())
            .field("subscriptions", &registry.handles.len())
            .finish()
    }
}

/// Subscription that is removed when dropped
#[must_use = "the subscription is removed as soon as the guard is dropped"]
pub struct BusSubscription {
    bus: EventBus,
    id: SubscriptionId,
}

impl BusSubscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

/// Best-effort text for a caught panic payload
pub(crate) fn panic_message(cause: &(dyn Any + Send)) -> String {
    if let Some(message) = cause.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = cause.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Numbers;

    impl Channel for Numbers {
        const NAME: &'static str = "numbers";
        type Payload = u32;
    }

    struct Words;

    impl Channel for Words {
        const NAME: &'static str = "words";
        type Payload = String;
    }

    #[test]
    fn test_fan_out_in_subscription_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = seen.clone();
        bus.subscribe::<Numbers, _>(move |n| first.lock().unwrap().push(("first", *n)));
        let second = seen.clone();
        bus.subscribe::<Numbers, _>(move |n| second.lock().unwrap().push(("second", *n)));

        assert_eq!(bus.publish::<Numbers>(7), 2);
        assert_eq!(*seen.lock().unwrap(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn test_channels_are_isolated() {
        let bus = EventBus::new();
        let words = Arc::new(Mutex::new(Vec::new()));

        let sink = words.clone();
        bus.subscribe::<Words, _>(move |w| sink.lock().unwrap().push(w.clone()));

        assert_eq!(bus.publish::<Numbers>(1), 0);
        assert_eq!(bus.publish::<Words>("hello".to_string()), 1);
        assert_eq!(*words.lock().unwrap(), vec!["hello".to_string()]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = EventBus::new();
        let id = bus.subscribe::<Numbers, _>(|_| {});

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count::<Numbers>(), 0);
        assert_eq!(bus.publish::<Numbers>(3), 0);
    }

    #[test]
    fn test_panicking_subscriber_does_not_stop_delivery() {
        let bus = EventBus::new();
        let reached = Arc::new(Mutex::new(false));

        bus.subscribe::<Numbers, _>(|_| panic!("subscriber failure"));
        let flag = reached.clone();
        bus.subscribe::<Numbers, _>(move |_| *flag.lock().unwrap() = true);

        assert_eq!(bus.publish::<Numbers>(1), 1);
        assert!(*reached.lock().unwrap());
    }

    #[test]
    fn test_scoped_subscription_unsubscribes_on_drop() {
        let bus = EventBus::new();
        let guard = bus.subscribe_scoped::<Numbers, _>(|_| {});
        assert_eq!(bus.subscriber_count::<Numbers>(), 1);

        drop(guard);
        assert_eq!(bus.subscriber_count::<Numbers>(), 0);
    }
}
