//! Notifications from the hierarchy to the rest of the application.
//!
//! The hierarchy never resyncs view layers, evaluates dependencies or touches
//! physics itself. It reports through [`SceneSync`]; what happens next is up to
//! the implementor. Structure notifications can be expensive downstream, so
//! edits emit at most one per public call.

use log::trace;

use super::event_bus::{EventBus, EventEmitter};
use crate::entities::{CollectionId, IdRef, ObjectId, Recalc, SceneId};

pub trait SceneSync: Send + Sync {
    /// The set of objects reachable from some scene root may have changed.
    fn notify_structure_changed(&self);

    /// Dependency graph tag for one data-block.
    fn notify_geometry_changed(&self, id: IdRef, recalc: Recalc);

    /// An object was linked into a collection (rigid body worlds may pick it up).
    fn rigid_body_object_added(&self, _collection: CollectionId, _object: ObjectId) {}

    /// An object is being unlinked from a whole scene.
    fn rigid_body_object_removed(&self, _scene: SceneId, _object: ObjectId) {}
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSync;

impl SceneSync for NullSync {
    fn notify_structure_changed(&self) {}
    fn notify_geometry_changed(&self, _id: IdRef, _recalc: Recalc) {}
}

// ========== Events ==========

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructureChangedEvent;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeometryChangedEvent {
    pub id: IdRef,
    pub recalc: Recalc,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RigidBodyObjectAddedEvent {
    pub collection: CollectionId,
    pub object: ObjectId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RigidBodyObjectRemovedEvent {
    pub scene: SceneId,
    pub object: ObjectId,
}

/// Publishes notifications on an [`EventBus`]. `dummy()` drops them.
#[derive(Clone, Debug, Default)]
pub struct SyncEmitter {
    inner: Option<EventEmitter>,
}

impl SyncEmitter {
    pub fn dummy() -> Self {
        Self { inner: None }
    }

    pub fn from_bus(bus: &EventBus) -> Self {
        Self { inner: Some(bus.emitter()) }
    }

    fn emit<E: super::event_bus::Event>(&self, event: E) {
        if let Some(emitter) = &self.inner {
            emitter.emit(event);
        }
    }
}

impl SceneSync for SyncEmitter {
    fn notify_structure_changed(&self) {
        trace!("sync: structure changed");
        self.emit(StructureChangedEvent);
    }

    fn notify_geometry_changed(&self, id: IdRef, recalc: Recalc) {
        trace!("sync: tag {:?} {:?}", id, recalc);
        self.emit(GeometryChangedEvent { id, recalc });
    }

    fn rigid_body_object_added(&self, collection: CollectionId, object: ObjectId) {
        self.emit(RigidBodyObjectAddedEvent { collection, object });
    }

    fn rigid_body_object_removed(&self, scene: SceneId, object: ObjectId) {
        self.emit(RigidBodyObjectRemovedEvent { scene, object });
    }
}
