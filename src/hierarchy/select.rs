//! Selection of member objects, per member entry.

use std::collections::HashSet;

use crate::entities::{CollectionFlags, CollectionId, IdRef, Main, MemberFlags, ObjectId, ObjectVisibility, Recalc};

impl Main {
    /// Select (or deselect) every member of `collection` and of its children.
    ///
    /// Collections flagged `HIDE_SELECT` are skipped along with everything
    /// below them, and so are objects flagged `HIDE_SELECT`. Returns whether
    /// any flag changed.
    pub fn objects_select(&mut self, collection: CollectionId, deselect: bool) -> bool {
        let mut visited = HashSet::new();
        let changed = self.objects_select_recursive(collection, deselect, &mut visited);
        if changed {
            self.sync.notify_geometry_changed(IdRef::Collection(collection), Recalc::SELECT);
        }
        changed
    }

    fn objects_select_recursive(
        &mut self,
        collection: CollectionId,
        deselect: bool,
        visited: &mut HashSet<CollectionId>,
    ) -> bool {
        if !visited.insert(collection) {
            return false;
        }
        let Some(coll) = self.collections.get_mut(&collection) else {
            return false;
        };
        if coll.flags.contains(CollectionFlags::HIDE_SELECT) {
            return false;
        }

        let mut changed = false;
        for member in coll.members.iter_mut() {
            let Some(object) = member.object.and_then(|id| self.objects.get(&id)) else {
                continue;
            };
            if deselect {
                if member.flags.contains(MemberFlags::SELECTED) {
                    member.flags.remove(MemberFlags::SELECTED);
                    changed = true;
                }
            } else if !object.visibility.contains(ObjectVisibility::HIDE_SELECT)
                && !member.flags.contains(MemberFlags::SELECTED)
            {
                member.flags.insert(MemberFlags::SELECTED);
                changed = true;
            }
        }

        let children: Vec<CollectionId> = coll.child_ids().collect();
        for child in children {
            changed |= self.objects_select_recursive(child, deselect, visited);
        }
        changed
    }

    /// Make `object` the active member of `collection`, clearing it elsewhere in that collection.
    pub fn member_set_active(&mut self, collection: CollectionId, object: ObjectId) -> bool {
        let Some(coll) = self.collections.get_mut(&collection) else {
            return false;
        };
        if !coll.has_object(object) {
            return false;
        }
        for member in coll.members.iter_mut() {
            member.flags.set(MemberFlags::ACTIVE, member.object == Some(object));
        }
        true
    }
}
