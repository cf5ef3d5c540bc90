//! Infrastructure shared by the hierarchy: build locks and notifications.

pub mod cache_lock;
pub mod event_bus;
pub mod sync;

pub use cache_lock::{BuildLock, CacheGuards, MutexLock, NoopLock};
pub use event_bus::{downcast_event, BoxedEvent, Event, EventBus, EventEmitter};
pub use sync::{
    GeometryChangedEvent, NullSync, RigidBodyObjectAddedEvent, RigidBodyObjectRemovedEvent, SceneSync,
    StructureChangedEvent, SyncEmitter,
};
