//! Linking objects into collections.
//!
//! Every add and remove keeps the membership index in step and invalidates the
//! object caches of the collection and its ancestors. Each member entry holds
//! one user of its object.

use log::{debug, trace, warn};

use crate::entities::{
    CollectionId, CollectionObject, IdCreateFlags, Main, MemberFlags, ObjectId, Recalc, SceneId,
};

/// What happens to an object's user count when it is unlinked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FreePolicy {
    /// Drop one user, keep the object even at zero users.
    #[default]
    DecrementUser,
    /// Drop one user and delete the object once nothing uses it.
    FreeIfUnused,
}

impl Main {
    pub(crate) fn object_add_ex(
        &mut self,
        collection: CollectionId,
        object: ObjectId,
        flags: IdCreateFlags,
        add_us: bool,
    ) -> bool {
        if !self.objects.contains_key(&object) || !self.collections.contains_key(&collection) {
            return false;
        }
        if self.creates_instancing_cycle(object, collection) {
            debug!(
                "Rejected '{}' in '{}': instancing cycle",
                self.object_name(object),
                self.collection_name(collection)
            );
            return false;
        }

        let Some(coll) = self.collections.get_mut(&collection) else {
            return false;
        };
        coll.membership_ensure();
        if coll.membership_lookup(object).is_some() {
            return false;
        }
        let entry = coll.alloc_entry();
        coll.members.push(CollectionObject { entry, object: Some(object), flags: MemberFlags::empty() });
        if let Some(index) = coll.runtime.membership_index.as_mut() {
            index.insert(object, entry);
        }

        self.object_cache_free(collection, flags, Recalc::HIERARCHY | Recalc::GEOMETRY);
        if add_us && !flags.contains(IdCreateFlags::NO_USER_REFCOUNT) {
            self.id_us_plus_object(object);
        }
        if !flags.contains(IdCreateFlags::NO_MAIN) {
            self.sync.rigid_body_object_added(collection, object);
        }
        trace!("Linked object '{}' in '{}'", self.object_name(object), self.collection_name(collection));
        true
    }

    pub(crate) fn object_remove_ex(
        &mut self,
        collection: CollectionId,
        object: ObjectId,
        flags: IdCreateFlags,
        policy: FreePolicy,
    ) -> bool {
        let Some(coll) = self.collections.get_mut(&collection) else {
            return false;
        };
        coll.membership_ensure();
        let Some(entry) = coll.runtime.membership_index.as_mut().and_then(|index| index.remove(&object)) else {
            return false;
        };
        match coll.entry_position(entry) {
            Some(pos) => {
                coll.members.remove(pos);
            }
            None => {
                warn!("Collection '{}': index points at a missing member entry", coll.name);
                debug_assert!(false, "membership index out of sync");
                coll.tag_membership_dirty();
            }
        }

        self.object_cache_free(collection, flags, Recalc::HIERARCHY | Recalc::GEOMETRY);
        match policy {
            FreePolicy::DecrementUser => self.id_us_min_object(object),
            FreePolicy::FreeIfUnused => self.id_free_us_object(object),
        }
        trace!("Unlinked object '{}' from '{}'", self.object_name(object), self.collection_name(collection));
        true
    }

    /// Link `object` into `collection` as is. Fails on duplicates and instancing cycles.
    pub fn object_add_notest(&mut self, collection: CollectionId, object: ObjectId) -> bool {
        let flags = self.create_flags_of(collection);
        if !self.object_add_ex(collection, object, flags, true) {
            return false;
        }
        if self.is_in_scene(collection) {
            self.sync.notify_structure_changed();
        }
        true
    }

    /// Link `object` into `collection`, or into its nearest editable ancestor
    /// when `collection` is linked or overridden.
    pub fn object_add(&mut self, collection: CollectionId, object: ObjectId) -> bool {
        let Some(target) = self.parent_editable_find_recursive(collection) else {
            return false;
        };
        self.object_add_notest(target, object)
    }

    /// Unlink `object` from `collection`. False when it wasn't linked there.
    pub fn object_remove(&mut self, collection: CollectionId, object: ObjectId, policy: FreePolicy) -> bool {
        let flags = self.create_flags_of(collection);
        if !self.object_remove_ex(collection, object, flags, policy) {
            return false;
        }
        if self.is_in_scene(collection) {
            self.sync.notify_structure_changed();
        }
        true
    }

    /// Point the member entry of `old` at `new`. When `new` is already a member,
    /// the entry of `old` is dropped instead.
    pub fn object_replace(&mut self, collection: CollectionId, old: ObjectId, new: ObjectId) -> bool {
        if !self.objects.contains_key(&new) {
            return false;
        }
        let flags = self.create_flags_of(collection);
        let Some(coll) = self.collections.get_mut(&collection) else {
            return false;
        };
        coll.membership_ensure();
        let Some(index) = coll.runtime.membership_index.as_mut() else {
            return false;
        };
        let Some(entry) = index.remove(&old) else {
            return false;
        };

        if !index.contains_key(&new) {
            index.insert(new, entry);
            if let Some(pos) = coll.entry_position(entry) {
                coll.members[pos].object = Some(new);
            }
            self.id_us_min_object(old);
            self.id_us_plus_object(new);
        } else {
            if let Some(pos) = coll.entry_position(entry) {
                coll.members.remove(pos);
            }
            self.id_us_min_object(old);
        }

        self.object_cache_free(collection, flags, Recalc::HIERARCHY | Recalc::GEOMETRY);
        if self.is_in_scene(collection) {
            self.sync.notify_structure_changed();
        }
        true
    }

    /// Move `object` into `dst`, adding first so selection state carries over.
    ///
    /// With `src`, the object leaves `src` only if the add succeeded. Without it,
    /// the object leaves every other editable collection of `scene`.
    pub fn object_move(&mut self, scene: SceneId, dst: CollectionId, src: Option<CollectionId>, object: ObjectId) {
        let carried = self.member_flags_in_scene(scene, src, object);
        match src {
            Some(src) => {
                if self.object_add(dst, object) {
                    self.carry_member_flags(dst, object, carried);
                    self.object_remove(src, object, FreePolicy::DecrementUser);
                }
            }
            None => {
                // Already in dst is fine, the other links still go
                if self.object_add(dst, object) {
                    self.carry_member_flags(dst, object, carried);
                }
                self.scene_collections_object_remove(scene, object, FreePolicy::DecrementUser, Some(dst));
            }
        }
    }

    fn member_flags_in_scene(&self, scene: SceneId, src: Option<CollectionId>, object: ObjectId) -> MemberFlags {
        let candidates = match src {
            Some(src) => vec![src],
            None => self.scene_collections(scene).collect(),
        };
        candidates
            .into_iter()
            .filter_map(|id| self.collections.get(&id)?.member(object).map(|m| m.flags))
            .fold(MemberFlags::empty(), |acc, f| acc | f)
    }

    fn carry_member_flags(&mut self, collection: CollectionId, object: ObjectId, flags: MemberFlags) {
        if flags.is_empty() {
            return;
        }
        if let Some(coll) = self.collections.get_mut(&collection) {
            if let Some(member) = coll.members.iter_mut().find(|m| m.object == Some(object)) {
                member.flags |= flags;
            }
        }
    }

    /// Unlink `object` from every editable collection of `scene` except `skip`.
    pub(crate) fn scene_collections_object_remove(
        &mut self,
        scene: SceneId,
        object: ObjectId,
        policy: FreePolicy,
        skip: Option<CollectionId>,
    ) -> bool {
        if skip.is_none() {
            self.sync.rigid_body_object_removed(scene, object);
        }
        let mut removed = false;
        let collections: Vec<CollectionId> = self.scene_collections(scene).collect();
        for collection in collections {
            if Some(collection) == skip {
                continue;
            }
            if !self.collections.get(&collection).is_some_and(|c| c.is_editable()) {
                continue;
            }
            let flags = self.create_flags_of(collection);
            removed |= self.object_remove_ex(collection, object, flags, policy);
        }
        self.sync.notify_structure_changed();
        removed
    }

    /// Unlink `object` from the whole scene.
    pub fn scene_objects_remove(&mut self, scene: SceneId, object: ObjectId, policy: FreePolicy) -> bool {
        self.scene_collections_object_remove(scene, object, policy, None)
    }

    /// Link `dst` into every editable scene collection holding `src`, or into
    /// the scene root when there is none.
    pub fn object_add_from(&mut self, scene: SceneId, src: ObjectId, dst: ObjectId) {
        let mut instantiated = false;
        let collections: Vec<CollectionId> = self.scene_collections(scene).collect();
        for collection in collections {
            let holds = self
                .collections
                .get(&collection)
                .is_some_and(|c| c.is_editable() && c.has_object(src));
            if holds {
                let flags = self.create_flags_of(collection);
                self.object_add_ex(collection, dst, flags, true);
                instantiated = true;
            }
        }
        if !instantiated {
            if let Some(root) = self.master_collection(scene) {
                self.object_add_ex(root, dst, IdCreateFlags::empty(), true);
            }
        }
        self.sync.notify_structure_changed();
    }

    /// Converge every collection after remapping: drop null and duplicate members.
    pub fn remove_invalid_entries(&mut self) -> bool {
        let mut changed = false;
        for collection in self.all_collection_ids() {
            changed |= self.membership_ensure_and_repair(collection);
        }
        if changed {
            debug!("Removed invalid member entries");
        }
        changed
    }

    /// First collection after `after` holding `object`.
    ///
    /// Order: the scene root (when a scene is given), then every free-standing
    /// collection in database order.
    pub fn collection_object_find(
        &self,
        scene: Option<SceneId>,
        after: Option<CollectionId>,
        object: ObjectId,
    ) -> Option<CollectionId> {
        let mut order: Vec<CollectionId> = scene.and_then(|s| self.master_collection(s)).into_iter().collect();
        order.extend(self.collections().map(|c| c.id));

        let start = match after {
            Some(after) => order.iter().position(|id| *id == after)? + 1,
            None => 0,
        };
        order[start..]
            .iter()
            .copied()
            .find(|id| self.collections.get(id).is_some_and(|c| c.has_object(object)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_bus::{downcast_event, EventBus};
    use crate::core::sync::{RigidBodyObjectAddedEvent, StructureChangedEvent, SyncEmitter};
    use crate::entities::{CacheKind, IdTags};
    use crate::hierarchy::fixtures::*;
    use std::sync::Arc;

    #[test]
    fn test_add_twice_keeps_one_entry() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        let ob = add_object(&mut main, "O");

        assert!(main.object_add(a, ob));
        assert!(!main.object_add(a, ob), "second add is rejected");
        let coll = main.collection(a).unwrap();
        assert_eq!(coll.objects().filter(|o| *o == ob).count(), 1);
        assert!(coll.membership_is_consistent());
        assert_eq!(main.object(ob).unwrap().users, 1);
    }

    #[test]
    fn test_add_instancing_self_rejected() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        let ob = add_object(&mut main, "O");
        main.object_mut(ob).unwrap().instance_collection = Some(a);
        assert!(!main.object_add(a, ob));
        assert!(main.collection(a).unwrap().members().is_empty());
    }

    #[test]
    fn test_add_notifies() {
        let bus = EventBus::new();
        let (main, scene) = new_main();
        let mut main = main.with_sync(Arc::new(SyncEmitter::from_bus(&bus)));
        let a = add_collection(&mut main, scene, "A");
        bus.poll();

        let ob = add_object(&mut main, "O");
        assert!(main.object_add(a, ob));
        let events = bus.poll();
        assert!(events.iter().any(|e| downcast_event::<RigidBodyObjectAddedEvent>(e).is_some()));
        assert!(events.iter().any(|e| downcast_event::<StructureChangedEvent>(e).is_some()));

        // Free-standing collection: no structure notification
        let loose = main.collection_add(None, Some("Loose"));
        bus.poll();
        assert!(main.object_add(loose, ob));
        assert!(!bus.poll().iter().any(|e| downcast_event::<StructureChangedEvent>(e).is_some()));
    }

    #[test]
    fn test_remove_notifies_only_in_scene() {
        let bus = EventBus::new();
        let (main, scene) = new_main();
        let mut main = main.with_sync(Arc::new(SyncEmitter::from_bus(&bus)));
        let a = add_collection(&mut main, scene, "A");
        let loose = main.collection_add(None, Some("Loose"));
        let ob = add_object(&mut main, "O");
        assert!(main.object_add(a, ob));
        assert!(main.object_add(loose, ob));
        bus.poll();

        assert!(main.object_remove(loose, ob, FreePolicy::DecrementUser));
        assert!(!bus.poll().iter().any(|e| downcast_event::<StructureChangedEvent>(e).is_some()));
        assert!(!main.collection(loose).unwrap().has_object(ob));

        assert!(main.object_remove(a, ob, FreePolicy::DecrementUser));
        assert!(bus.poll().iter().any(|e| downcast_event::<StructureChangedEvent>(e).is_some()));
    }

    #[test]
    fn test_add_into_linked_goes_to_editable_parent() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        let linked = add_child(&mut main, a, "Linked");
        main.collection_mut(linked).unwrap().tags |= IdTags::LINKED;

        let ob = add_object(&mut main, "O");
        assert!(main.object_add(linked, ob));
        assert!(main.collection(a).unwrap().has_object(ob));
        assert!(!main.collection(linked).unwrap().has_object(ob));
    }

    #[test]
    fn test_remove_policies() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        let b = add_collection(&mut main, scene, "B");
        let kept = add_object(&mut main, "kept");
        let freed = add_object(&mut main, "freed");
        assert!(main.object_add(a, kept));
        assert!(main.object_add(a, freed));
        assert!(main.object_add(b, freed));
        main.object_cache(a);

        assert!(main.object_remove(a, kept, FreePolicy::DecrementUser));
        assert!(!main.object_remove(a, kept, FreePolicy::DecrementUser), "already gone");
        assert!(main.object(kept).is_some());
        assert_eq!(main.object(kept).unwrap().users, 0);
        assert!(!main.collection(a).unwrap().is_cache_valid(CacheKind::Direct));

        assert!(main.object_remove(a, freed, FreePolicy::FreeIfUnused));
        assert!(main.object(freed).is_some(), "B still uses it");
        assert!(main.object_remove(b, freed, FreePolicy::FreeIfUnused));
        assert!(main.object(freed).is_none(), "last user gone");
    }

    #[test]
    fn test_replace() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        let x = add_object(&mut main, "x");
        let y = add_object(&mut main, "y");
        let z = add_object(&mut main, "z");
        assert!(main.object_add(a, x));
        assert!(main.object_add(a, z));
        let entry = main.collection(a).unwrap().members()[0].entry;
        main.object_cache(a);

        assert!(main.object_replace(a, x, y));
        let coll = main.collection(a).unwrap();
        assert_eq!(coll.objects().collect::<Vec<_>>(), vec![y, z], "repointed in place");
        assert_eq!(coll.members()[0].entry, entry);
        assert!(coll.membership_is_consistent());
        assert!(!coll.is_cache_valid(CacheKind::Direct));
        assert_eq!(main.object(x).unwrap().users, 0);
        assert_eq!(main.object(y).unwrap().users, 1);

        // z already present: y's entry goes away
        assert!(main.object_replace(a, y, z));
        assert_eq!(main.collection(a).unwrap().objects().collect::<Vec<_>>(), vec![z]);
        assert!(!main.object_replace(a, x, y), "x isn't a member");
    }

    #[test]
    fn test_move_between_collections() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        let b = add_collection(&mut main, scene, "B");
        let c = add_collection(&mut main, scene, "C");
        let ob = add_object(&mut main, "O");
        assert!(main.object_add(a, ob));
        assert!(main.object_add(c, ob));
        main.collections.get_mut(&a).unwrap().members[0].flags = MemberFlags::SELECTED;

        main.object_move(scene, b, Some(a), ob);
        assert!(!main.collection(a).unwrap().has_object(ob));
        assert!(main.collection(b).unwrap().has_object(ob));
        assert!(main.collection(c).unwrap().has_object(ob), "other links untouched");
        assert_eq!(main.collection(b).unwrap().member(ob).unwrap().flags, MemberFlags::SELECTED);

        // Scene-wide move: only dst keeps it
        main.object_move(scene, c, None, ob);
        assert!(!main.collection(b).unwrap().has_object(ob));
        assert!(main.collection(c).unwrap().has_object(ob));
        assert_eq!(main.object(ob).unwrap().users, 1);
    }

    #[test]
    fn test_scene_remove_skips_linked() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        let lib = add_collection(&mut main, scene, "Lib");
        let ob = add_object(&mut main, "O");
        assert!(main.object_add(a, ob));
        assert!(main.object_add(lib, ob));
        main.collection_mut(lib).unwrap().tags |= IdTags::LINKED;

        assert!(main.scene_objects_remove(scene, ob, FreePolicy::DecrementUser));
        assert!(!main.collection(a).unwrap().has_object(ob));
        assert!(main.collection(lib).unwrap().has_object(ob), "linked data is read-only");
    }

    #[test]
    fn test_object_add_from() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        let b = add_collection(&mut main, scene, "B");
        let src = add_object(&mut main, "src");
        let dst = add_object(&mut main, "dst");
        let lonely = add_object(&mut main, "lonely");
        assert!(main.object_add(a, src));
        assert!(main.object_add(b, src));

        main.object_add_from(scene, src, dst);
        assert!(main.collection(a).unwrap().has_object(dst));
        assert!(main.collection(b).unwrap().has_object(dst));

        let free = add_object(&mut main, "free");
        main.object_add_from(scene, lonely, free);
        let root = main.master_collection(scene).unwrap();
        assert!(main.collection(root).unwrap().has_object(free), "falls back to the root");
    }

    #[test]
    fn test_collection_object_find_order() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        let b = add_collection(&mut main, scene, "B");
        let ob = add_object(&mut main, "O");
        assert!(main.object_add(a, ob));
        assert!(main.object_add(b, ob));

        assert_eq!(main.collection_object_find(Some(scene), None, ob), Some(a));
        assert_eq!(main.collection_object_find(Some(scene), Some(a), ob), Some(b));
        assert_eq!(main.collection_object_find(Some(scene), Some(b), ob), None);
    }

    #[test]
    fn test_remove_invalid_entries_after_remap() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        let x = add_object(&mut main, "x");
        let y = add_object(&mut main, "y");
        assert!(main.object_add(a, x));
        assert!(main.object_add(a, y));

        main.remap_object(x, Some(y));
        assert_eq!(main.collection(a).unwrap().members().len(), 2, "remap leaves the duplicate");
        assert!(main.remove_invalid_entries());
        let coll = main.collection(a).unwrap();
        assert_eq!(coll.objects().collect::<Vec<_>>(), vec![y]);
        assert!(coll.membership_is_consistent());
        assert!(!main.remove_invalid_entries(), "converged");
    }
}
