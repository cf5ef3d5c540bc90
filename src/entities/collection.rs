//! Collection data-block: ordered children, ordered object members, runtime caches.
//!
//! Persistent state is `children` and `members` (plus name and flags). Everything
//! under [`CollectionRuntime`] is derived and rebuilt lazily:
//! - `parents` - reverse of every parent's `children`, rebuilt after load
//! - membership index - object -> member entry, mirrors `members`
//! - two object caches (direct and instance-expanded)
//!
//! `exporters` is persistent too: named file-export presets, in UI order.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use super::flags::{BaseFlags, CollectionFlags, ExportFlags, IdTags, MemberFlags};
use super::ids::{CollectionId, EntryId, ObjectId, SceneId};

/// Forward edge to a child collection. `None` only transiently after a remap to null.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionChild {
    pub collection: Option<CollectionId>,
}

/// Member entry linking an object into a collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionObject {
    #[serde(skip)]
    pub entry: EntryId,
    pub object: Option<ObjectId>,
    #[serde(skip)]
    pub flags: MemberFlags,
}

/// File-export preset stored on a collection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionExport {
    /// Unique within the owning collection.
    pub name: String,
    /// File handler id, e.g. `IO_FH_alembic`.
    pub format: String,
    #[serde(default)]
    pub flags: ExportFlags,
    /// Target file. Cleared on copy.
    #[serde(default)]
    pub filepath: String,
}

/// One object in a flattened cache, with visibility aggregated over all paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Base {
    pub object: ObjectId,
    pub flags: BaseFlags,
}

/// Consistency of the membership index with `members`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MembershipState {
    #[default]
    Clean,
    /// A remap left null or duplicate entries behind.
    Dirty,
    /// `ensure_and_repair` is rewriting `members`.
    Repairing,
}

/// Which flattened object list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Direct,
    Instanced,
}

/// Lazily built object list with a validity flag.
///
/// Readers check `valid` without locking; builders hold the per-kind build
/// lock, re-check, store the list and only then publish `valid`.
#[derive(Debug, Default)]
pub struct CacheSlot {
    valid: AtomicBool,
    bases: RwLock<Option<Arc<[Base]>>>,
}

impl CacheSlot {
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub(crate) fn store(&self, bases: Vec<Base>) {
        *self.bases.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::from(bases));
        self.valid.store(true, Ordering::Release);
    }

    pub(crate) fn load(&self) -> Arc<[Base]> {
        self.bases
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    pub(crate) fn clear(&mut self) {
        *self.valid.get_mut() = false;
        *self.bases.get_mut().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// Derived, never persisted state of a collection.
#[derive(Debug, Default)]
pub struct CollectionRuntime {
    pub(crate) parents: Vec<CollectionId>,
    pub(crate) membership_index: Option<HashMap<ObjectId, EntryId>>,
    pub(crate) membership_state: MembershipState,
    pub(crate) object_cache: CacheSlot,
    pub(crate) object_cache_instanced: CacheSlot,
    pub(crate) next_entry: u64,
}

impl CollectionRuntime {
    pub(crate) fn cache(&self, kind: CacheKind) -> &CacheSlot {
        match kind {
            CacheKind::Direct => &self.object_cache,
            CacheKind::Instanced => &self.object_cache_instanced,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub name: String,
    #[serde(default)]
    pub flags: CollectionFlags,
    #[serde(default)]
    pub tags: IdTags,
    /// Owning scene, set for scene roots only.
    #[serde(default)]
    pub owner: Option<SceneId>,
    #[serde(default)]
    pub users: u32,
    #[serde(default)]
    pub(crate) children: Vec<CollectionChild>,
    #[serde(default)]
    pub(crate) members: Vec<CollectionObject>,
    #[serde(default)]
    pub(crate) exporters: Vec<CollectionExport>,
    #[serde(default)]
    pub active_exporter: usize,
    #[serde(skip)]
    pub(crate) runtime: CollectionRuntime,
}

/// Copies persistent data only; the copy starts with empty parents, no index and no caches.
impl Clone for Collection {
    fn clone(&self) -> Self {
        let mut copy = Self {
            id: self.id,
            name: self.name.clone(),
            flags: self.flags,
            tags: self.tags,
            owner: self.owner,
            users: self.users,
            children: self.children.clone(),
            members: self.members.clone(),
            exporters: self.exporters.clone(),
            active_exporter: self.active_exporter,
            runtime: CollectionRuntime::default(),
        };
        copy.renumber_entries();
        copy
    }
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: CollectionId::new(),
            name: name.into(),
            flags: CollectionFlags::empty(),
            tags: IdTags::empty(),
            owner: None,
            users: 0,
            children: Vec::new(),
            members: Vec::new(),
            exporters: Vec::new(),
            active_exporter: 0,
            runtime: CollectionRuntime::default(),
        }
    }

    /// Scene root collection.
    pub fn new_master(scene: SceneId) -> Self {
        let mut master = Self::new("Scene Collection");
        master.flags |= CollectionFlags::IS_MASTER;
        master.owner = Some(scene);
        master
    }

    pub fn is_master(&self) -> bool {
        self.flags.contains(CollectionFlags::IS_MASTER)
    }

    pub fn is_editable(&self) -> bool {
        self.tags.is_editable()
    }

    pub fn children(&self) -> &[CollectionChild] {
        &self.children
    }

    /// Non-null children in order.
    pub fn child_ids(&self) -> impl Iterator<Item = CollectionId> + '_ {
        self.children.iter().filter_map(|c| c.collection)
    }

    pub fn members(&self) -> &[CollectionObject] {
        &self.members
    }

    /// Non-null member objects in order.
    pub fn objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.members.iter().filter_map(|m| m.object)
    }

    pub fn exporters(&self) -> &[CollectionExport] {
        &self.exporters
    }

    pub fn parents(&self) -> &[CollectionId] {
        &self.runtime.parents
    }

    pub fn membership_state(&self) -> MembershipState {
        self.runtime.membership_state
    }

    pub fn has_membership_index(&self) -> bool {
        self.runtime.membership_index.is_some()
    }

    pub fn is_cache_valid(&self, kind: CacheKind) -> bool {
        self.runtime.cache(kind).is_valid()
    }

    /// Direct membership test. Uses the index when built, else scans.
    pub fn has_object(&self, object: ObjectId) -> bool {
        match &self.runtime.membership_index {
            Some(index) => index.contains_key(&object),
            None => self.members.iter().any(|m| m.object == Some(object)),
        }
    }

    pub fn has_child(&self, child: CollectionId) -> bool {
        self.children.iter().any(|c| c.collection == Some(child))
    }

    pub fn member(&self, object: ObjectId) -> Option<&CollectionObject> {
        self.members.iter().find(|m| m.object == Some(object))
    }

    pub(crate) fn alloc_entry(&mut self) -> EntryId {
        self.runtime.next_entry += 1;
        EntryId(self.runtime.next_entry)
    }

    pub(crate) fn entry_position(&self, entry: EntryId) -> Option<usize> {
        self.members.iter().position(|m| m.entry == entry)
    }

    /// Give every member a fresh entry id (after read or copy).
    pub(crate) fn renumber_entries(&mut self) {
        self.runtime.next_entry = 0;
        for i in 0..self.members.len() {
            let entry = self.alloc_entry();
            self.members[i].entry = entry;
        }
    }

    /// Drop index and both caches.
    pub(crate) fn clear_caches(&mut self) {
        self.runtime.membership_index = None;
        self.runtime.object_cache.clear();
        self.runtime.object_cache_instanced.clear();
    }

    /// Forget all derived state, as after load.
    pub(crate) fn reset_runtime(&mut self) {
        self.runtime = CollectionRuntime::default();
        self.renumber_entries();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_resets_runtime() {
        let mut c = Collection::new("A");
        let ob = ObjectId::new();
        let entry = c.alloc_entry();
        c.members.push(CollectionObject { entry, object: Some(ob), flags: MemberFlags::SELECTED });
        c.runtime.parents.push(CollectionId::new());
        c.runtime.membership_index = Some(HashMap::from([(ob, entry)]));
        c.runtime.object_cache.store(vec![Base { object: ob, flags: BaseFlags::all() }]);

        let copy = c.clone();
        assert_eq!(copy.members().len(), 1);
        assert_eq!(copy.members()[0].object, Some(ob));
        assert!(copy.parents().is_empty(), "parents are never copied");
        assert!(!copy.has_membership_index());
        assert!(!copy.is_cache_valid(CacheKind::Direct));
    }

    #[test]
    fn test_cache_slot_store_and_clear() {
        let mut slot = CacheSlot::default();
        assert!(!slot.is_valid());
        assert!(slot.load().is_empty());

        let ob = ObjectId::new();
        slot.store(vec![Base { object: ob, flags: BaseFlags::ENABLED_RENDER }]);
        assert!(slot.is_valid());
        assert_eq!(slot.load()[0].object, ob);

        slot.clear();
        assert!(!slot.is_valid());
        assert!(slot.load().is_empty());
    }

    #[test]
    fn test_has_object_without_index() {
        let mut c = Collection::new("A");
        let ob = ObjectId::new();
        let entry = c.alloc_entry();
        c.members.push(CollectionObject { entry, object: Some(ob), flags: MemberFlags::empty() });
        assert!(c.has_object(ob));
        assert!(!c.has_object(ObjectId::new()));
    }
}
