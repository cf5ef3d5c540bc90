//! Cycle guards for nesting (child links) and instancing (`instance_collection`).
//!
//! Both are checked before committing a structural edit. Traversals walk the
//! live graph, never the object caches, since the graph is being edited. Each
//! walk carries its own visited set.

use log::{debug, info};
use std::collections::HashSet;

use crate::entities::{CollectionId, IdCreateFlags, Main, ObjectId};

impl Main {
    pub(crate) fn parents_of(&self, collection: CollectionId) -> &[CollectionId] {
        self.collections.get(&collection).map(|c| c.parents()).unwrap_or(&[])
    }

    /// `collection` is a direct child of `parent`.
    pub fn child_find(&self, parent: CollectionId, collection: CollectionId) -> bool {
        self.collections.get(&parent).is_some_and(|p| p.has_child(collection))
    }

    /// `collection` is a descendant of `parent`.
    pub fn has_collection(&self, parent: CollectionId, collection: CollectionId) -> bool {
        let mut stack = vec![parent];
        let mut visited = HashSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(coll) = self.collections.get(&current) else {
                continue;
            };
            for child in coll.child_ids() {
                if child == collection {
                    return true;
                }
                stack.push(child);
            }
        }
        false
    }

    /// Would making `collection` a descendant of `new_ancestor` close a loop?
    ///
    /// `None` checks `new_ancestor` against itself. Also catches the mixed case
    /// where an object under `collection` instances one of the ancestors.
    pub fn creates_nesting_cycle(&self, new_ancestor: CollectionId, collection: Option<CollectionId>) -> bool {
        if collection == Some(new_ancestor) {
            return true;
        }
        let collection = collection.unwrap_or(new_ancestor);
        if self.instance_find_recursive(collection, new_ancestor) {
            return true;
        }

        let mut stack = self.parents_of(new_ancestor).to_vec();
        let mut visited = HashSet::new();
        while let Some(ancestor) = stack.pop() {
            if ancestor == collection {
                return true;
            }
            if !visited.insert(ancestor) {
                continue;
            }
            if self.instance_find_recursive(collection, ancestor) {
                return true;
            }
            stack.extend_from_slice(self.parents_of(ancestor));
        }
        false
    }

    /// Some object under `collection` instances `instance_collection`, or the
    /// very collection it is linked in.
    fn instance_find_recursive(&self, collection: CollectionId, instance_collection: CollectionId) -> bool {
        let mut stack = vec![collection];
        let mut visited = HashSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(coll) = self.collections.get(&current) else {
                continue;
            };
            let hit = coll.objects().any(|ob| {
                self.objects
                    .get(&ob)
                    .and_then(|o| o.instance_collection)
                    .is_some_and(|inst| inst == instance_collection || inst == current)
            });
            if hit {
                return true;
            }
            stack.extend(coll.child_ids());
        }
        false
    }

    /// Would linking `object` into `target` make `target` instance itself?
    pub fn creates_instancing_cycle(&self, object: ObjectId, target: CollectionId) -> bool {
        let mut path = HashSet::new();
        self.instancing_reaches(object, target, &mut path)
    }

    fn instancing_reaches(&self, object: ObjectId, target: CollectionId, path: &mut HashSet<CollectionId>) -> bool {
        let Some(instanced) = self.objects.get(&object).and_then(|o| o.instance_collection) else {
            return false;
        };
        if instanced == target || self.has_collection(instanced, target) {
            return true;
        }
        // Reached again on the current path: a cycle already exists
        if !path.insert(instanced) {
            return true;
        }
        let found = self
            .objects_recursive(instanced)
            .into_iter()
            .any(|ob| self.instancing_reaches(ob, target, path));
        // Parallel reuse of the same collection is fine, only back-references are not
        path.remove(&instanced);
        found
    }

    /// Objects in `collection` and all descendants, once each, in pre-order.
    pub(crate) fn objects_recursive(&self, collection: CollectionId) -> Vec<ObjectId> {
        let mut objects = Vec::new();
        let mut seen_objects = HashSet::new();
        let mut visited = HashSet::new();
        self.objects_recursive_into(collection, &mut objects, &mut seen_objects, &mut visited);
        objects
    }

    fn objects_recursive_into(
        &self,
        collection: CollectionId,
        objects: &mut Vec<ObjectId>,
        seen_objects: &mut HashSet<ObjectId>,
        visited: &mut HashSet<CollectionId>,
    ) {
        if !visited.insert(collection) {
            return;
        }
        let Some(coll) = self.collections.get(&collection) else {
            return;
        };
        objects.extend(coll.objects().filter(|ob| seen_objects.insert(*ob)));
        for child in coll.child_ids() {
            self.objects_recursive_into(child, objects, seen_objects, visited);
        }
    }

    /// Break every cycle running through `collection`.
    ///
    /// Removes each ancestor edge that closes a nesting loop, and clears
    /// `instance_collection` on objects under `collection` that instance it.
    /// Returns whether anything changed.
    pub fn fix_cycles(&mut self, collection: CollectionId) -> bool {
        // Self-instancing first, so the nesting pass only sees real loops
        let instancing = self.instance_fix_recursive(collection, collection, &mut HashSet::new());
        let nesting = self.cycle_fix_recursive(collection, collection, &mut HashSet::new());
        if nesting || instancing {
            info!(
                "Fixed cycles through '{}' (nesting: {}, instancing: {})",
                self.collection_name(collection),
                nesting,
                instancing
            );
            self.sync.notify_structure_changed();
        }
        nesting || instancing
    }

    fn cycle_fix_recursive(
        &mut self,
        parent_collection: CollectionId,
        collection: CollectionId,
        visited: &mut HashSet<CollectionId>,
    ) -> bool {
        if !visited.insert(parent_collection) {
            return false;
        }
        let mut fixed = false;
        for parent in self.parents_of(parent_collection).to_vec() {
            if self.creates_nesting_cycle(parent, Some(collection)) {
                debug!(
                    "Cycle: unlinking '{}' from '{}'",
                    self.collection_name(parent_collection),
                    self.collection_name(parent)
                );
                self.child_remove_ex(parent, parent_collection, IdCreateFlags::empty(), true);
                fixed = true;
            } else if self.cycle_fix_recursive(parent, collection, visited) {
                fixed = true;
            }
        }
        fixed
    }

    fn instance_fix_recursive(
        &mut self,
        parent_collection: CollectionId,
        collection: CollectionId,
        visited: &mut HashSet<CollectionId>,
    ) -> bool {
        if !visited.insert(parent_collection) {
            return false;
        }
        let Some(coll) = self.collections.get(&parent_collection) else {
            return false;
        };
        let objects: Vec<ObjectId> = coll.objects().collect();
        let children: Vec<CollectionId> = coll.child_ids().collect();

        let mut fixed = false;
        for ob in objects {
            let instancing = self.objects.get(&ob).is_some_and(|o| o.instance_collection == Some(collection));
            if instancing {
                debug!("Cycle: '{}' no longer instances '{}'", self.object_name(ob), self.collection_name(collection));
                self.object_set_instance_collection(ob, None);
                fixed = true;
            }
        }
        for child in children {
            fixed |= self.instance_fix_recursive(child, collection, visited);
        }
        fixed
    }
}
