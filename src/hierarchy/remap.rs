//! Reference walking and handle remapping.
//!
//! Remapping rewrites references in place and moves user counts along.
//! It does not repair: remapping objects can leave null or duplicate member
//! entries (collections get flagged dirty, see
//! [`Main::remove_invalid_entries`]); remapping collections is followed by a
//! parent relation rebuild, which drops repeated and looping children.

use log::debug;

use crate::entities::{Collection, CollectionId, Main, ObjectId, Recalc};

impl Collection {
    /// Visit the object reference of every member entry. Whatever `f` changes
    /// is fed into the membership index.
    pub fn foreach_object_reference(&mut self, mut f: impl FnMut(&mut Option<ObjectId>)) {
        for i in 0..self.members.len() {
            let old = self.members[i].object;
            f(&mut self.members[i].object);
            let new = self.members[i].object;
            if old != new {
                let entry = self.members[i].entry;
                self.update_on_object_replace(old, new, entry);
            }
        }
    }
}

impl Main {
    /// Point every member reference to `old` at `new` (or null). Returns the
    /// number of rewritten references.
    pub fn remap_object(&mut self, old: ObjectId, new: Option<ObjectId>) -> usize {
        if Some(old) == new {
            return 0;
        }
        let mut count = 0;
        let mut touched = Vec::new();
        for coll in self.collections.values_mut() {
            let mut hits = 0;
            coll.foreach_object_reference(|slot: &mut Option<ObjectId>| {
                if *slot == Some(old) {
                    *slot = new;
                    hits += 1;
                }
            });
            if hits > 0 {
                touched.push(coll.id);
                count += hits;
            }
        }
        if count == 0 {
            return 0;
        }

        let users = u32::try_from(count).unwrap_or(u32::MAX);
        if let Some(ob) = self.objects.get_mut(&old) {
            ob.users = ob.users.saturating_sub(users);
        }
        if let Some(ob) = new.and_then(|id| self.objects.get_mut(&id)) {
            ob.users = ob.users.saturating_add(users);
        }
        for id in touched {
            let flags = self.create_flags_of(id);
            self.object_cache_free(id, flags, Recalc::HIERARCHY | Recalc::GEOMETRY);
        }
        debug!("Remapped {} references to object '{}'", count, self.object_name(old));
        self.sync.notify_structure_changed();
        count
    }

    /// Point every child entry and instancer referencing `old` at `new` (or
    /// null), then clean null children and rebuild parent relations.
    pub fn remap_collection(&mut self, old: CollectionId, new: Option<CollectionId>) -> usize {
        if Some(old) == new || self.is_master(old) {
            return 0;
        }
        let mut count = 0;
        for coll in self.collections.values_mut() {
            for child in coll.children.iter_mut().filter(|c| c.collection == Some(old)) {
                child.collection = new;
                count += 1;
            }
        }
        for ob in self.objects.values_mut().filter(|o| o.instance_collection == Some(old)) {
            ob.instance_collection = new;
            count += 1;
        }
        if count == 0 {
            return 0;
        }

        let users = u32::try_from(count).unwrap_or(u32::MAX);
        if let Some(coll) = self.collections.get_mut(&old) {
            coll.users = coll.users.saturating_sub(users);
        }
        if let Some(coll) = new.and_then(|id| self.collections.get_mut(&id)) {
            coll.users = coll.users.saturating_add(users);
        }

        self.collection_child_remove_nulls(None, None);
        self.rebuild_all_parent_relations();
        self.object_cache_invalidate_all();
        debug!("Remapped {} references to collection '{}'", count, self.collection_name(old));
        self.sync.notify_structure_changed();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{CacheKind, MembershipState};
    use crate::hierarchy::fixtures::*;

    fn objects(main: &Main, id: CollectionId) -> Vec<ObjectId> {
        main.collection(id).unwrap().objects().collect()
    }

    #[test]
    fn test_foreach_object_reference_tracks_index() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        let x = add_object(&mut main, "x");
        let y = add_object(&mut main, "y");
        assert!(main.object_add(a, x));
        assert!(main.object_add(a, y));

        let coll = main.collection_mut(a).unwrap();
        let mut seen = 0;
        coll.foreach_object_reference(|_| seen += 1);
        assert_eq!(seen, 2);
        assert_eq!(coll.membership_state(), MembershipState::Clean, "untouched references");

        let z = ObjectId::new();
        coll.foreach_object_reference(|slot| {
            if *slot == Some(x) {
                *slot = Some(z);
            }
        });
        assert_eq!(coll.membership_state(), MembershipState::Clean);
        assert!(coll.has_object(z));
        assert!(!coll.has_object(x));

        coll.foreach_object_reference(|slot| {
            if *slot == Some(z) {
                *slot = Some(y);
            }
        });
        assert_eq!(coll.membership_state(), MembershipState::Dirty, "duplicate member");
    }

    #[test]
    fn test_remap_object() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        let b = add_collection(&mut main, scene, "B");
        let x = add_object(&mut main, "x");
        let y = add_object(&mut main, "y");
        assert!(main.object_add(a, x));
        assert!(main.object_add(b, x));
        assert!(main.object_add(b, y));
        let _ = main.object_cache(b);

        assert_eq!(main.remap_object(x, Some(y)), 2);
        assert_eq!(main.object(x).unwrap().users, 0);
        assert_eq!(main.object(y).unwrap().users, 3);
        assert_eq!(objects(&main, a), vec![y]);
        assert_eq!(main.collection(a).unwrap().membership_state(), MembershipState::Clean);
        assert_eq!(main.collection(b).unwrap().membership_state(), MembershipState::Dirty);
        assert!(!main.collection(b).unwrap().is_cache_valid(CacheKind::Direct));

        assert!(main.remove_invalid_entries());
        assert_eq!(objects(&main, b), vec![y]);
        assert_eq!(main.remap_object(x, Some(y)), 0, "nothing left to remap");
    }

    #[test]
    fn test_remap_object_to_null() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        let x = add_object(&mut main, "x");
        assert!(main.object_add(a, x));

        assert_eq!(main.remap_object(x, None), 1);
        assert_eq!(main.collection(a).unwrap().members().len(), 1);
        assert!(main.remove_invalid_entries());
        assert!(main.collection(a).unwrap().members().is_empty());
    }

    #[test]
    fn test_remap_collection() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        let b = add_child(&mut main, a, "B");
        let c = main.collection_add(None, Some("C"));
        let inst = add_object(&mut main, "inst");
        assert!(main.object_add(a, inst));
        assert!(main.object_set_instance_collection(inst, Some(b)));
        let unrelated = main.collection_add(None, Some("Unrelated"));
        for id in [a, c, unrelated] {
            main.object_cache(id);
            main.object_cache_instanced(id);
        }

        assert_eq!(main.remap_collection(b, Some(c)), 2);
        for id in [a, c, unrelated] {
            let coll = main.collection(id).unwrap();
            assert!(!coll.is_cache_valid(CacheKind::Direct), "{} direct", coll.name);
            assert!(!coll.is_cache_valid(CacheKind::Instanced), "{} instanced", coll.name);
        }
        assert!(main.collection(a).unwrap().has_child(c));
        assert_eq!(main.collection(c).unwrap().parents(), &[a]);
        assert!(main.collection(b).unwrap().parents().is_empty());
        assert_eq!(main.object(inst).unwrap().instance_collection, Some(c));
        assert_eq!(main.collection(b).unwrap().users, 0);
        assert_eq!(main.collection(c).unwrap().users, 2);

        assert_eq!(main.remap_collection(c, None), 2);
        assert!(main.collection(a).unwrap().children().is_empty(), "null children are removed");
        assert_eq!(main.object(inst).unwrap().instance_collection, None);
    }

    #[test]
    fn test_remap_collection_merges_duplicates() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        let b = add_child(&mut main, a, "B");
        let c = add_child(&mut main, a, "C");

        assert_eq!(main.remap_collection(b, Some(c)), 1);
        let children: Vec<_> = main.collection(a).unwrap().child_ids().collect();
        assert_eq!(children, vec![c]);
        assert_eq!(main.collection(c).unwrap().users, 1);
        assert!(main.collection_validate(a));
    }
}
