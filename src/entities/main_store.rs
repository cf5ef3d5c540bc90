//! Main database: every scene, collection and object, keyed by handle.
//!
//! Maps are insertion ordered (`IndexMap`), which stands in for list order
//! wherever iteration order is observable (scene iteration, object lookup).
//! Scene roots live in `collections` too, flagged `IS_MASTER`.
//!
//! Structural edits take `&mut Main` (single writer). Object caches can be
//! built through `&Main` from many threads; see `hierarchy::object_cache`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::collection::Collection;
use super::ids::{CollectionId, ObjectId, SceneId};
use super::object::Object;
use super::scene::Scene;
use crate::core::cache_lock::CacheGuards;
use crate::core::sync::{NullSync, SceneSync};

#[derive(Serialize, Deserialize)]
pub struct Main {
    #[serde(default)]
    pub(crate) scenes: IndexMap<SceneId, Scene>,
    #[serde(default)]
    pub(crate) collections: IndexMap<CollectionId, Collection>,
    #[serde(default)]
    pub(crate) objects: IndexMap<ObjectId, Object>,
    #[serde(skip, default = "CacheGuards::global")]
    pub(crate) guards: Arc<CacheGuards>,
    #[serde(skip, default = "Main::default_sync")]
    pub(crate) sync: Arc<dyn SceneSync>,
}

impl Default for Main {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Main {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Main")
            .field("scenes", &self.scenes.len())
            .field("collections", &self.collections.len())
            .field("objects", &self.objects.len())
            .finish()
    }
}

impl Main {
    /// Empty database using the process-wide cache build locks.
    pub fn new() -> Self {
        Self {
            scenes: IndexMap::new(),
            collections: IndexMap::new(),
            objects: IndexMap::new(),
            guards: CacheGuards::global(),
            sync: Self::default_sync(),
        }
    }

    fn default_sync() -> Arc<dyn SceneSync> {
        Arc::new(NullSync)
    }

    pub fn with_sync(mut self, sync: Arc<dyn SceneSync>) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_cache_guards(mut self, guards: Arc<CacheGuards>) -> Self {
        self.guards = guards;
        self
    }

    pub fn set_sync(&mut self, sync: Arc<dyn SceneSync>) {
        self.sync = sync;
    }

    pub fn sync(&self) -> &dyn SceneSync {
        self.sync.as_ref()
    }

    // ========== Lookup ==========

    pub fn scene(&self, id: SceneId) -> Option<&Scene> {
        self.scenes.get(&id)
    }

    pub fn scenes(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.values()
    }

    pub fn collection(&self, id: CollectionId) -> Option<&Collection> {
        self.collections.get(&id)
    }

    /// Mutable access for name and flags. Links go through the hierarchy API.
    pub fn collection_mut(&mut self, id: CollectionId) -> Option<&mut Collection> {
        self.collections.get_mut(&id)
    }

    /// Free-standing collections (scene roots excluded), in database order.
    pub fn collections(&self) -> impl Iterator<Item = &Collection> {
        self.collections.values().filter(|c| !c.is_master())
    }

    pub fn collection_ids(&self) -> Vec<CollectionId> {
        self.collections().map(|c| c.id).collect()
    }

    /// Scene roots first, then free-standing collections.
    pub(crate) fn all_collection_ids(&self) -> Vec<CollectionId> {
        let mut ids: Vec<CollectionId> = self.scenes.values().map(|s| s.master_collection).collect();
        ids.extend(self.collections().map(|c| c.id));
        ids
    }

    pub fn object(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.objects.get_mut(&id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.values()
    }

    pub fn find_collection_by_name(&self, name: &str) -> Option<CollectionId> {
        self.collections.values().find(|c| c.name == name).map(|c| c.id)
    }

    pub fn find_object_by_name(&self, name: &str) -> Option<ObjectId> {
        self.objects.values().find(|o| o.name == name).map(|o| o.id)
    }

    pub fn master_collection(&self, scene: SceneId) -> Option<CollectionId> {
        self.scenes.get(&scene).map(|s| s.master_collection)
    }

    pub fn is_master(&self, id: CollectionId) -> bool {
        self.collections.get(&id).is_some_and(|c| c.is_master())
    }

    /// Collection name, or a placeholder for dangling handles in logs.
    pub(crate) fn collection_name(&self, id: CollectionId) -> &str {
        self.collections.get(&id).map(|c| c.name.as_str()).unwrap_or("<missing>")
    }

    pub(crate) fn object_name(&self, id: ObjectId) -> &str {
        self.objects.get(&id).map(|o| o.name.as_str()).unwrap_or("<missing>")
    }
}
