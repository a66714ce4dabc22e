//! Re-render requests from objects mutated outside the render cycle
//!
//! An imperative object (a Bluetooth connection, a training job...) owns a
//! stable [`ObjectUuid`]. After each visible mutation it calls
//! [`ImperativeBridge::notify_update`]; consumers that subscribed to that
//! identity get a fresh mutation version and re-render.

use log::{debug, trace};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::navigator::bus::{BusSubscription, EventBus};
use crate::navigator::channels::{ImperativeUpdate, ImperativeUpdatePayload};
use crate::navigator::sequence::{MutationTag, Sequence, SequenceGenerator};

pub type MutationVersion = Sequence<MutationTag>;

/// Identity of an imperative object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ObjectUuid(Uuid);

impl ObjectUuid {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ObjectUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

pub trait ImperativeObject: Send + Sync {
    fn uuid(&self) -> ObjectUuid;

    /// Release resources; called once by [`ImperativeBridge::teardown`]
    fn on_unmount(&self) {}
}

/// Anything that names an imperative object
pub trait UpdateTarget {
    fn object_uuid(&self) -> ObjectUuid;
}

impl UpdateTarget for ObjectUuid {
    fn object_uuid(&self) -> ObjectUuid {
        *self
    }
}

impl<T: ImperativeObject + ?Sized> UpdateTarget for T {
    fn object_uuid(&self) -> ObjectUuid {
        self.uuid()
    }
}

#[derive(Clone)]
pub struct ImperativeBridge {
    bus: EventBus,
    /// Identities already torn down. Only ever grows: uuids are never reused,
    /// and a retired identity must stay silent for the life of the bridge.
    retired: Arc<Mutex<HashSet<ObjectUuid>>>,
    versions: Arc<SequenceGenerator<MutationTag>>,
}

impl ImperativeBridge {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            retired: Arc::new(Mutex::new(HashSet::new())),
            versions: Arc::new(SequenceGenerator::new()),
        }
    }

    fn retired(&self) -> MutexGuard<'_, HashSet<ObjectUuid>> {
        self.retired.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Announce that `target` changed. Returns false if it was torn down.
    pub fn notify_update<T: UpdateTarget + ?Sized>(&self, target: &T) -> bool {
        let object_uuid = target.object_uuid();
        if self.retired().contains(&object_uuid) {
            trace!("Dropped update from retired object {}", object_uuid);
            return false;
        }
        self.bus
            .publish::<ImperativeUpdate>(ImperativeUpdatePayload { object_uuid });
        true
    }

    /// Call `on_update` with a new version every time `target` notifies
    pub fn subscribe<T, F>(&self, target: &T, on_update: F) -> ObjectSubscription
    where
        T: UpdateTarget + ?Sized,
        F: Fn(MutationVersion) + Send + Sync + 'static,
    {
        let object = target.object_uuid();
        let version = Arc::new(Mutex::new(None));

        let latest = version.clone();
        let versions = self.versions.clone();
        let subscription = self.bus.subscribe_scoped::<ImperativeUpdate, _>(move |payload| {
            if payload.object_uuid != object {
                return;
            }
            let next = versions.next();
            *latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(next);
            on_update(next);
        });

        ObjectSubscription {
            _subscription: subscription,
            object,
            version,
        }
    }

    /// Run the object's teardown and stop delivering its notifications.
    /// Returns false if it was already torn down.
    pub fn teardown<O: ImperativeObject + ?Sized>(&self, object: &O) -> bool {
        let uuid = object.uuid();
        if !self.retired().insert(uuid) {
            return false;
        }
        object.on_unmount();
        debug!("Imperative object {} torn down", uuid);
        true
    }

    pub fn is_retired<T: UpdateTarget + ?Sized>(&self, target: &T) -> bool {
        self.retired().contains(&target.object_uuid())
    }
}

/// Live interest in one object; unsubscribes when dropped
#[must_use = "the subscription is removed as soon as it is dropped"]
pub struct ObjectSubscription {
    _subscription: BusSubscription,
    object: ObjectUuid,
    version: Arc<Mutex<Option<MutationVersion>>>,
}

impl ObjectSubscription {
    pub fn object(&self) -> ObjectUuid {
        self.object
    }

    /// Version of the last delivered notification, if any
    pub fn version(&self) -> Option<MutationVersion> {
        *self.version.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
