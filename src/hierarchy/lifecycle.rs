//! Data-block lifecycle: scenes, collections and objects.
//!
//! - creation with generated, unique names
//! - copy (one collection) and duplicate (a whole hierarchy)
//! - delete (unlink or relink contents) and free
//! - object user counting
//!
//! An object holds one user per member entry and per collection it instances
//! through. A collection holds one user per parent edge and per instancer.

use log::{debug, error, trace, warn};
use std::collections::{HashMap, HashSet};

use super::objects::FreePolicy;
use crate::entities::{
    Collection, CollectionId, DuplicateFlags, IdCreateFlags, IdTags, Main, Object, ObjectId, ObjectKind, Recalc,
    Scene, SceneId,
};

/// Longest generated collection name, in characters.
pub(crate) const MAX_NAME: usize = 63;

/// `base`, or `base.001`, `base.002`... whichever is free first.
/// A numeric suffix already on `base` is replaced, not extended.
pub(crate) fn unique_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    let stem = match base.rsplit_once('.') {
        Some((stem, digits)) if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) => stem,
        _ => base,
    };
    (1u32..)
        .map(|n| format!("{stem}.{n:03}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Old -> new handles while duplicating one hierarchy.
#[derive(Default)]
struct DuplicateMap {
    collections: HashMap<CollectionId, CollectionId>,
    objects: HashMap<ObjectId, ObjectId>,
}

impl Main {
    // ========== Scenes ==========

    /// New scene with its root collection.
    pub fn scene_add(&mut self, name: &str) -> SceneId {
        let id = SceneId::new();
        let master = self.master_add(id);
        self.scenes.insert(id, Scene { id, name: name.to_string(), master_collection: master });
        debug!("Added scene '{}'", name);
        id
    }

    fn master_add(&mut self, scene: SceneId) -> CollectionId {
        let master = Collection::new_master(scene);
        let id = master.id;
        self.collections.insert(id, master);
        id
    }

    // ========== Naming ==========

    /// Name for a collection about to be created under `parent`.
    pub fn new_collection_name(&self, parent: Option<CollectionId>) -> String {
        let Some(parent) = parent.and_then(|id| self.collections.get(&id)) else {
            return "Collection".to_string();
        };
        let number = parent.children().len() + 1;
        if parent.is_master() {
            return format!("Collection {number}");
        }
        let digits = number.to_string().len();
        let stem: String = parent.name.chars().take(MAX_NAME.saturating_sub(1 + digits)).collect();
        format!("{stem} {number}")
    }

    /// Display name; scene roots have no name of their own.
    pub fn ui_name(&self, collection: CollectionId) -> &str {
        match self.collections.get(&collection) {
            Some(c) if c.is_master() => "Scene Collection",
            Some(c) => c.name.as_str(),
            None => "",
        }
    }

    pub fn collection_unique_name(&self, base: &str) -> String {
        unique_name(base, |name| self.collections().any(|c| c.name == name))
    }

    pub fn object_unique_name(&self, base: &str) -> String {
        unique_name(base, |name| self.objects.values().any(|o| o.name == name))
    }

    // ========== Collections ==========

    /// New collection, linked under `parent` when given.
    pub fn collection_add(&mut self, parent: Option<CollectionId>, name: Option<&str>) -> CollectionId {
        let name = match name {
            Some(name) => name.to_string(),
            None => self.new_collection_name(parent),
        };
        let coll = Collection::new(self.collection_unique_name(&name));
        let id = coll.id;
        debug!("Added collection '{}'", coll.name);
        self.collections.insert(id, coll);

        if let Some(parent) = parent {
            self.collection_child_add_no_sync(parent, id);
        }
        self.sync.notify_structure_changed();
        id
    }

    /// Link `dst` under every editable scene collection holding `ob_src`,
    /// or under the scene root if none does.
    pub fn collection_add_from_object(&mut self, scene: SceneId, ob_src: ObjectId, dst: CollectionId) {
        let holders: Vec<CollectionId> = self
            .scene_collections(scene)
            .filter(|id| {
                self.collections
                    .get(id)
                    .is_some_and(|c| c.is_editable() && c.has_object(ob_src))
            })
            .collect();
        self.collection_link_next_to(scene, holders, dst);
    }

    /// Link `dst` under every editable scene collection that has `src` as a
    /// child, or under the scene root if none does.
    pub fn collection_add_from_collection(&mut self, scene: SceneId, src: CollectionId, dst: CollectionId) {
        let holders: Vec<CollectionId> = self
            .scene_collections(scene)
            .filter(|id| self.collections.get(id).is_some_and(|c| c.is_editable() && c.has_child(src)))
            .collect();
        self.collection_link_next_to(scene, holders, dst);
    }

    fn collection_link_next_to(&mut self, scene: SceneId, holders: Vec<CollectionId>, dst: CollectionId) {
        let instantiated = !holders.is_empty();
        for parent in holders {
            let flags = self.create_flags_of(parent);
            self.child_add_ex(parent, dst, flags, true);
        }
        if !instantiated {
            if let Some(root) = self.master_collection(scene) {
                let flags = self.create_flags_of(root);
                self.child_add_ex(root, dst, flags, true);
            }
        }
        self.sync.notify_structure_changed();
    }

    /// Copy one collection: same children and members, fresh runtime state.
    /// The copy has no parent. Scene roots can't be copied.
    pub fn collection_copy(&mut self, collection: CollectionId) -> Option<CollectionId> {
        let src = self.collections.get(&collection)?;
        if src.is_master() {
            error!("Scene root collection can't be copied");
            return None;
        }
        let mut copy = src.clone();
        copy.id = CollectionId::new();
        copy.name = self.collection_unique_name(&src.name);
        copy.tags.remove(IdTags::LINKED | IdTags::OVERRIDE_LIBRARY);
        copy.users = 0;
        copy.owner = None;
        for exporter in &mut copy.exporters {
            exporter.filepath.clear();
        }
        let children: Vec<CollectionId> = std::mem::take(&mut copy.children)
            .into_iter()
            .filter_map(|c| c.collection)
            .collect();
        let objects: Vec<ObjectId> = std::mem::take(&mut copy.members)
            .into_iter()
            .filter_map(|m| m.object)
            .collect();

        let copy_id = copy.id;
        let flags = IdCreateFlags::from_tags(copy.tags);
        trace!("Copied collection '{}' as '{}'", src.name, copy.name);
        self.collections.insert(copy_id, copy);

        for child in children {
            self.child_add_ex(copy_id, child, flags, true);
        }
        for object in objects {
            self.object_add_ex(copy_id, object, flags, true);
        }
        Some(copy_id)
    }

    /// Deep copy of `collection` and everything below it, placed right after
    /// the original under `parent`.
    ///
    /// With [`DuplicateFlags::OBJECTS`] member objects are duplicated too.
    /// Objects instancing a duplicated collection are pointed at its copy.
    pub fn collection_duplicate(
        &mut self,
        parent: Option<CollectionId>,
        collection: CollectionId,
        flags: DuplicateFlags,
    ) -> Option<CollectionId> {
        if self.is_master(collection) {
            error!("Scene root collection can't be duplicated");
            return None;
        }
        let mut map = DuplicateMap::default();
        let new = self.collection_duplicate_recursive(parent, collection, flags, &mut map)?;

        let relinks: Vec<(ObjectId, CollectionId)> = map
            .objects
            .values()
            .filter_map(|ob| {
                let instanced = self.objects.get(ob)?.instance_collection?;
                map.collections.get(&instanced).map(|copy| (*ob, *copy))
            })
            .collect();
        for (ob, copy) in relinks {
            self.object_set_instance_collection(ob, Some(copy));
        }

        debug!(
            "Duplicated '{}' ({} collections, {} objects)",
            self.collection_name(collection),
            map.collections.len(),
            map.objects.len()
        );
        self.sync.notify_structure_changed();
        Some(new)
    }

    fn collection_duplicate_recursive(
        &mut self,
        parent: Option<CollectionId>,
        old: CollectionId,
        flags: DuplicateFlags,
        map: &mut DuplicateMap,
    ) -> Option<CollectionId> {
        let (new, first_visit) = match map.collections.get(&old) {
            Some(new) => (*new, false),
            None => {
                let new = self.collection_copy(old)?;
                map.collections.insert(old, new);
                (new, true)
            }
        };

        if let Some(parent) = parent {
            let parent_flags = self.create_flags_of(parent);
            if self.child_add_ex(parent, new, parent_flags, true) {
                if let Some(p) = self.collections.get_mut(&parent) {
                    let old_pos = p.children.iter().position(|c| c.collection == Some(old));
                    let new_pos = p.children.iter().rposition(|c| c.collection == Some(new));
                    if let (Some(old_pos), Some(new_pos)) = (old_pos, new_pos) {
                        let entry = p.children.remove(new_pos);
                        p.children.insert(old_pos + 1, entry);
                    }
                }
            }
        }
        if !first_visit {
            return Some(new);
        }

        let new_flags = self.create_flags_of(new);
        if flags.contains(DuplicateFlags::OBJECTS) {
            let objects: Vec<ObjectId> = self.collections.get(&old)?.objects().collect();
            for ob in objects {
                let ob_new = match map.objects.get(&ob) {
                    Some(ob_new) => *ob_new,
                    None => {
                        let Some(ob_new) = self.object_duplicate(ob) else {
                            continue;
                        };
                        map.objects.insert(ob, ob_new);
                        ob_new
                    }
                };
                self.object_add_ex(new, ob_new, new_flags, true);
                self.object_remove_ex(new, ob, new_flags, FreePolicy::DecrementUser);
            }
        }

        let children: Vec<CollectionId> = self.collections.get(&old)?.child_ids().collect();
        for child in children {
            let Some(child_new) = self.collection_duplicate_recursive(Some(new), child, flags, map) else {
                continue;
            };
            if child_new != child {
                self.child_remove_ex(new, child, new_flags, true);
            }
        }
        Some(new)
    }

    /// Delete `collection`.
    ///
    /// With `hierarchy`, members are unlinked (and freed when unused) and
    /// children are deleted recursively. Without it, children and members are
    /// relinked into every parent first. Scene roots are rejected.
    pub fn collection_delete(&mut self, collection: CollectionId, hierarchy: bool) -> bool {
        if !self.collections.contains_key(&collection) {
            return false;
        }
        if self.is_master(collection) {
            error!("Scene root collection can't be deleted");
            return false;
        }
        let mut visited = HashSet::new();
        self.collection_delete_recursive(collection, hierarchy, &mut visited);
        self.sync.notify_structure_changed();
        true
    }

    fn collection_delete_recursive(
        &mut self,
        collection: CollectionId,
        hierarchy: bool,
        visited: &mut HashSet<CollectionId>,
    ) {
        if !visited.insert(collection) {
            return;
        }
        let Some(coll) = self.collections.get(&collection) else {
            return;
        };
        let objects: Vec<ObjectId> = coll.objects().collect();
        let children: Vec<CollectionId> = coll.child_ids().collect();
        let flags = IdCreateFlags::from_tags(coll.tags);

        if hierarchy {
            for ob in objects {
                self.object_remove_ex(collection, ob, flags, FreePolicy::FreeIfUnused);
            }
            for child in children {
                self.collection_delete_recursive(child, true, visited);
            }
        } else {
            let parents = self.parents_of(collection).to_vec();
            for child in &children {
                for parent in &parents {
                    let parent_flags = self.create_flags_of(*parent);
                    self.child_add_ex(*parent, *child, parent_flags, true);
                }
            }
            for ob in objects {
                for parent in &parents {
                    let parent_flags = self.create_flags_of(*parent);
                    self.object_add_ex(*parent, ob, parent_flags, true);
                }
                self.object_remove_ex(collection, ob, flags, FreePolicy::FreeIfUnused);
            }
        }
        self.collection_free(collection);
    }

    /// Unlink `collection` from everything referencing it and drop it.
    ///
    /// Parents lose the edge, children lose a user and their back-link,
    /// instancers stop instancing it. Scene roots are freed with their scene.
    pub fn collection_free(&mut self, collection: CollectionId) -> bool {
        let Some(coll) = self.collections.get(&collection) else {
            return false;
        };
        if coll.is_master() {
            error!("Scene root collection can't be freed on its own");
            return false;
        }
        let flags = IdCreateFlags::from_tags(coll.tags);
        let children: Vec<CollectionId> = coll.child_ids().collect();
        let objects: Vec<ObjectId> = coll.objects().collect();
        let parents: Vec<CollectionId> = self
            .collections
            .values()
            .filter(|c| c.has_child(collection))
            .map(|c| c.id)
            .collect();
        let instancers: Vec<ObjectId> = self
            .objects
            .values()
            .filter(|o| o.instance_collection == Some(collection))
            .map(|o| o.id)
            .collect();

        for parent in parents {
            let parent_flags = self.create_flags_of(parent);
            self.child_remove_ex(parent, collection, parent_flags, false);
        }
        for child in children {
            self.child_remove_ex(collection, child, flags, true);
        }
        for ob in objects {
            self.object_remove_ex(collection, ob, flags, FreePolicy::DecrementUser);
        }
        for ob in instancers {
            self.object_set_instance_collection(ob, None);
        }

        if let Some(coll) = self.collections.shift_remove(&collection) {
            debug!("Freed collection '{}'", coll.name);
        }
        true
    }

    // ========== Objects ==========

    pub fn object_new(&mut self, name: &str, kind: ObjectKind) -> ObjectId {
        let object = Object::new(self.object_unique_name(name), kind);
        let id = object.id;
        trace!("Added object '{}'", object.name);
        self.objects.insert(id, object);
        id
    }

    /// Copy of `object` with no users. It instances the same collection.
    pub fn object_duplicate(&mut self, object: ObjectId) -> Option<ObjectId> {
        let src = self.objects.get(&object)?;
        let mut copy = src.clone();
        copy.id = ObjectId::new();
        copy.name = self.object_unique_name(&src.name);
        copy.tags.remove(IdTags::LINKED | IdTags::OVERRIDE_LIBRARY);
        copy.users = 0;

        let id = copy.id;
        let instanced = copy.instance_collection;
        self.objects.insert(id, copy);
        if let Some(instanced) = instanced.and_then(|c| self.collections.get_mut(&c)) {
            instanced.users += 1;
        }
        Some(id)
    }

    /// Point `object` at the collection it instances, moving one collection
    /// user along. No cycle check here; [`Main::fix_cycles`] repairs loops.
    pub fn object_set_instance_collection(&mut self, object: ObjectId, instanced: Option<CollectionId>) -> bool {
        if instanced.is_some_and(|c| !self.collections.contains_key(&c)) {
            return false;
        }
        let Some(ob) = self.objects.get_mut(&object) else {
            return false;
        };
        if ob.instance_collection == instanced {
            return true;
        }
        let old = std::mem::replace(&mut ob.instance_collection, instanced);
        if let Some(old) = old.and_then(|c| self.collections.get_mut(&c)) {
            old.users = old.users.saturating_sub(1);
        }
        if let Some(new) = instanced.and_then(|c| self.collections.get_mut(&c)) {
            new.users += 1;
        }

        let holders: Vec<CollectionId> = self
            .collections
            .values()
            .filter(|c| c.has_object(object))
            .map(|c| c.id)
            .collect();
        for holder in holders {
            let flags = self.create_flags_of(holder);
            self.object_cache_free(holder, flags, Recalc::HIERARCHY);
        }
        true
    }

    pub fn id_us_plus_object(&mut self, object: ObjectId) {
        if let Some(ob) = self.objects.get_mut(&object) {
            ob.users += 1;
        }
    }

    pub fn id_us_min_object(&mut self, object: ObjectId) {
        if let Some(ob) = self.objects.get_mut(&object) {
            if ob.users == 0 {
                warn!("Object '{}' user count would go below zero", ob.name);
            }
            ob.users = ob.users.saturating_sub(1);
        }
    }

    /// Drop one user and free the object when none are left.
    pub fn id_free_us_object(&mut self, object: ObjectId) {
        self.id_us_min_object(object);
        if self.objects.get(&object).is_some_and(|ob| ob.users == 0) {
            self.object_free(object);
        }
    }

    /// Remove `object` from the database and from every collection still linking it.
    pub fn object_free(&mut self, object: ObjectId) -> bool {
        let Some(ob) = self.objects.shift_remove(&object) else {
            return false;
        };
        if let Some(instanced) = ob.instance_collection.and_then(|c| self.collections.get_mut(&c)) {
            instanced.users = instanced.users.saturating_sub(1);
        }
        let holders: Vec<CollectionId> = self
            .collections
            .values()
            .filter(|c| c.has_object(object))
            .map(|c| c.id)
            .collect();
        for holder in holders {
            let flags = self.create_flags_of(holder);
            self.object_remove_ex(holder, object, flags, FreePolicy::DecrementUser);
        }
        debug!("Freed object '{}'", ob.name);
        true
    }
}
