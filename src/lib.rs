//! collgraph - collection hierarchy with object-membership caches
//!
//! Scenes own a root collection; collections nest (a DAG) and link objects.
//! Object lists are flattened lazily and cached per collection.

// Core services (cache locks, change notification, event bus)
pub mod core;

// Data model and hierarchy operations
pub mod entities;
pub mod hierarchy;
pub mod persist;

// App modules
pub mod cli;
pub mod config;

pub use core::cache_lock::{BuildLock, CacheGuards, MutexLock, NoopLock};
pub use core::event_bus::{downcast_event, EventBus, EventEmitter};
pub use core::sync::{NullSync, SceneSync, SyncEmitter};
pub use entities::{Collection, CollectionId, Main, Object, ObjectId, ObjectKind, Scene, SceneId};
pub use hierarchy::FreePolicy;
