//! Membership index: O(1) object -> member entry lookup backed by `members`.
//!
//! The index is built lazily and kept in step by every add/remove. External
//! remaps may leave `members` with null or duplicate objects for a while; they
//! report through [`Collection::update_on_object_replace`], which flags the
//! collection dirty instead of failing. The next
//! [`Main::membership_ensure_and_repair`] converges.

use log::{debug, warn};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::entities::{Collection, CollectionId, EntryId, IdCreateFlags, Main, MembershipState, ObjectId, Recalc};

impl Collection {
    /// Build the index from `members` if absent. Null and repeated objects are
    /// left out (first entry wins) and the collection stays flagged dirty.
    pub fn membership_ensure(&mut self) {
        if self.runtime.membership_index.is_some() {
            return;
        }
        let mut index = HashMap::with_capacity(self.members.len());
        let mut skipped = 0usize;
        for member in &self.members {
            match member.object {
                Some(object) => match index.entry(object) {
                    Entry::Vacant(slot) => {
                        slot.insert(member.entry);
                    }
                    Entry::Occupied(_) => skipped += 1,
                },
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            if self.runtime.membership_state == MembershipState::Clean {
                warn!("Collection '{}': {} invalid member entries on a clean collection", self.name, skipped);
            }
            self.runtime.membership_state = MembershipState::Dirty;
        }
        self.runtime.membership_index = Some(index);
    }

    /// Member entry of `object`, if linked.
    pub fn membership_lookup(&self, object: ObjectId) -> Option<EntryId> {
        self.runtime.membership_index.as_ref()?.get(&object).copied()
    }

    pub fn tag_membership_dirty(&mut self) {
        self.runtime.membership_state = MembershipState::Dirty;
    }

    /// Keep the index in step with one entry whose object changed from `old`
    /// to `new`. Any inconsistency flags the collection dirty.
    pub fn update_on_object_replace(&mut self, old: Option<ObjectId>, new: Option<ObjectId>, entry: EntryId) {
        if old == new {
            if new.is_none() {
                self.tag_membership_dirty();
            }
            return;
        }
        let Some(index) = self.runtime.membership_index.as_mut() else {
            // Without an index duplicates can't be detected here
            self.tag_membership_dirty();
            return;
        };

        let mut dirty = false;
        if let Some(old) = old {
            match index.get(&old) {
                Some(mapped) if *mapped == entry => {
                    index.remove(&old);
                }
                _ => dirty = true,
            }
        }
        match new {
            Some(new) => match index.entry(new) {
                Entry::Vacant(slot) => {
                    slot.insert(entry);
                }
                Entry::Occupied(_) => dirty = true,
            },
            None => dirty = true,
        }
        if dirty {
            self.tag_membership_dirty();
        }
    }

    /// Rebuild the index, physically dropping null and duplicate members.
    ///
    /// No-op on a clean collection that already has an index. Returns whether
    /// any member was removed.
    pub(crate) fn membership_repair(&mut self) -> bool {
        if self.runtime.membership_state == MembershipState::Clean && self.runtime.membership_index.is_some() {
            return false;
        }
        self.runtime.membership_state = MembershipState::Repairing;

        let before = self.members.len();
        let mut index = HashMap::with_capacity(before);
        self.members.retain(|member| match member.object {
            Some(object) => match index.entry(object) {
                Entry::Vacant(slot) => {
                    slot.insert(member.entry);
                    true
                }
                Entry::Occupied(_) => false,
            },
            None => false,
        });

        self.runtime.membership_index = Some(index);
        self.runtime.membership_state = MembershipState::Clean;
        let removed = before - self.members.len();
        if removed > 0 {
            debug!("Collection '{}': dropped {} invalid member entries", self.name, removed);
        }
        removed > 0
    }

    /// Every index key maps to the one member entry holding that object,
    /// and every non-null member is indexed.
    pub fn membership_is_consistent(&self) -> bool {
        let Some(index) = &self.runtime.membership_index else {
            return true;
        };
        let indexed = index.iter().all(|(object, entry)| {
            let mut holders = self.members.iter().filter(|m| m.object == Some(*object));
            matches!((holders.next(), holders.next()), (Some(m), None) if m.entry == *entry)
        });
        indexed && self.members.iter().all(|m| m.object.is_some_and(|o| index.contains_key(&o)))
    }
}

impl Main {
    /// Build the membership index of a collection if absent.
    pub fn membership_ensure(&mut self, collection: CollectionId) {
        if let Some(coll) = self.collections.get_mut(&collection) {
            coll.membership_ensure();
        }
    }

    /// Converge a dirty collection: drop null and duplicate members, rebuild the
    /// index, and invalidate the object caches if anything was removed.
    pub fn membership_ensure_and_repair(&mut self, collection: CollectionId) -> bool {
        let Some(coll) = self.collections.get_mut(&collection) else {
            return false;
        };
        let removed = coll.membership_repair();
        if removed {
            self.object_cache_free(collection, IdCreateFlags::empty(), Recalc::HIERARCHY | Recalc::GEOMETRY);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{CacheKind, CollectionObject, MemberFlags};
    use crate::hierarchy::fixtures::*;

    fn push_member(coll: &mut Collection, object: Option<ObjectId>) -> EntryId {
        let entry = coll.alloc_entry();
        coll.members.push(CollectionObject { entry, object, flags: MemberFlags::empty() });
        entry
    }

    #[test]
    fn test_ensure_first_entry_wins() {
        let mut c = Collection::new("A");
        let ob = ObjectId::new();
        let first = push_member(&mut c, Some(ob));
        push_member(&mut c, Some(ob));
        push_member(&mut c, None);
        c.tag_membership_dirty();

        c.membership_ensure();
        assert_eq!(c.membership_lookup(ob), Some(first), "first occurrence is indexed");
        assert_eq!(c.membership_state(), MembershipState::Dirty);
        assert_eq!(c.members().len(), 3, "ensure never touches members");
    }

    #[test]
    fn test_repair_drops_nulls_and_duplicates() {
        let mut c = Collection::new("A");
        let a = ObjectId::new();
        let b = ObjectId::new();
        push_member(&mut c, Some(a));
        push_member(&mut c, None);
        push_member(&mut c, Some(b));
        push_member(&mut c, Some(a));
        c.tag_membership_dirty();

        assert!(c.membership_repair());
        let objects: Vec<_> = c.objects().collect();
        assert_eq!(objects, vec![a, b], "order kept, first occurrence kept");
        assert_eq!(c.membership_state(), MembershipState::Clean);
        assert!(c.membership_is_consistent());
        assert!(!c.membership_repair(), "second repair is a no-op");
    }

    #[test]
    fn test_update_on_object_replace() {
        let mut c = Collection::new("A");
        let a = ObjectId::new();
        let b = ObjectId::new();
        let ea = push_member(&mut c, Some(a));
        let eb = push_member(&mut c, Some(b));
        c.membership_ensure();
        assert_eq!(c.membership_state(), MembershipState::Clean);

        // Clean repoint a -> fresh object
        let fresh = ObjectId::new();
        c.members[0].object = Some(fresh);
        c.update_on_object_replace(Some(a), Some(fresh), ea);
        assert_eq!(c.membership_lookup(fresh), Some(ea));
        assert_eq!(c.membership_lookup(a), None);
        assert_eq!(c.membership_state(), MembershipState::Clean);

        // Collision: b -> fresh creates a duplicate
        c.members[1].object = Some(fresh);
        c.update_on_object_replace(Some(b), Some(fresh), eb);
        assert_eq!(c.membership_state(), MembershipState::Dirty);
        assert_eq!(c.membership_lookup(fresh), Some(ea), "existing mapping untouched");
    }

    #[test]
    fn test_update_to_null_and_without_index() {
        let mut c = Collection::new("A");
        let a = ObjectId::new();
        let ea = push_member(&mut c, Some(a));
        c.membership_ensure();
        c.members[0].object = None;
        c.update_on_object_replace(Some(a), None, ea);
        assert_eq!(c.membership_state(), MembershipState::Dirty);
        assert_eq!(c.membership_lookup(a), None);

        let mut plain = Collection::new("B");
        let e = push_member(&mut plain, Some(a));
        plain.update_on_object_replace(Some(a), Some(ObjectId::new()), e);
        assert_eq!(plain.membership_state(), MembershipState::Dirty, "no index: any change is suspect");

        let mut same = Collection::new("C");
        let e = push_member(&mut same, Some(a));
        same.update_on_object_replace(Some(a), Some(a), e);
        assert_eq!(same.membership_state(), MembershipState::Clean, "no-op when unchanged");
    }

    #[test]
    fn test_main_repair_invalidates_cache() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        let ob = add_object(&mut main, "O");
        assert!(main.object_add(a, ob));
        assert_eq!(main.object_cache(a).len(), 1);
        assert!(main.collection(a).unwrap().is_cache_valid(CacheKind::Direct));

        // Simulated remap: second entry pointing at the same object
        let coll = main.collection_mut(a).unwrap();
        let entry = coll.alloc_entry();
        coll.members.push(CollectionObject { entry, object: None, flags: MemberFlags::empty() });
        coll.members[1].object = Some(ob);
        coll.update_on_object_replace(None, Some(ob), entry);

        assert!(main.membership_ensure_and_repair(a));
        let coll = main.collection(a).unwrap();
        assert_eq!(coll.members().len(), 1);
        assert!(!coll.is_cache_valid(CacheKind::Direct), "repair must invalidate the cache");
    }
}
