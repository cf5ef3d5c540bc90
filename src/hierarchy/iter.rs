//! Scene traversal and read-only queries.

use std::collections::HashSet;

use crate::entities::{Collection, CollectionId, Main, ObjectId, SceneId};

/// Pre-order walk over the collections of a scene, root first. A collection
/// reachable along several paths is yielded once.
pub struct SceneCollections<'a> {
    main: &'a Main,
    stack: Vec<CollectionId>,
    visited: HashSet<CollectionId>,
}

impl Iterator for SceneCollections<'_> {
    type Item = CollectionId;

    fn next(&mut self) -> Option<CollectionId> {
        while let Some(id) = self.stack.pop() {
            if !self.visited.insert(id) {
                continue;
            }
            let Some(coll) = self.main.collections.get(&id) else {
                continue;
            };
            let children: Vec<CollectionId> = coll.child_ids().collect();
            self.stack.extend(children.into_iter().rev());
            return Some(id);
        }
        None
    }
}

/// Every object linked anywhere in a scene, once, in first-encounter order.
pub struct SceneObjects<'a> {
    collections: SceneCollections<'a>,
    pending: Vec<ObjectId>,
    seen: HashSet<ObjectId>,
}

impl Iterator for SceneObjects<'_> {
    type Item = ObjectId;

    fn next(&mut self) -> Option<ObjectId> {
        loop {
            while let Some(object) = self.pending.pop() {
                if self.seen.insert(object) {
                    return Some(object);
                }
            }
            let next = self.collections.next()?;
            if let Some(coll) = self.collections.main.collections.get(&next) {
                self.pending = coll.objects().collect();
                self.pending.reverse();
            }
        }
    }
}

impl Main {
    pub fn scene_collections(&self, scene: SceneId) -> SceneCollections<'_> {
        SceneCollections {
            main: self,
            stack: self.master_collection(scene).into_iter().collect(),
            visited: HashSet::new(),
        }
    }

    pub fn scene_objects(&self, scene: SceneId) -> SceneObjects<'_> {
        SceneObjects {
            collections: self.scene_collections(scene),
            pending: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn scene_objects_as_set(&self, scene: SceneId) -> HashSet<ObjectId> {
        self.scene_objects(scene).collect()
    }

    /// `collection` as reached from `scene`, if it is part of it.
    pub fn find_in_scene(&self, scene: SceneId, collection: CollectionId) -> Option<&Collection> {
        self.scene_collections(scene)
            .find(|id| *id == collection)
            .and_then(|id| self.collections.get(&id))
    }

    /// Reachable from some scene root through `parents`.
    pub fn is_in_scene(&self, collection: CollectionId) -> bool {
        let mut stack = vec![collection];
        let mut visited = HashSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(coll) = self.collections.get(&current) else {
                continue;
            };
            if coll.is_master() {
                return true;
            }
            stack.extend_from_slice(coll.parents());
        }
        false
    }

    pub fn is_empty(&self, collection: CollectionId) -> bool {
        self.collections
            .get(&collection)
            .is_none_or(|c| c.members().is_empty() && c.children().is_empty())
    }

    /// Some object of a geometry type lives in `collection` or below.
    pub fn contains_geometry_recursive(&self, collection: CollectionId) -> bool {
        self.objects_recursive(collection)
            .into_iter()
            .any(|ob| self.objects.get(&ob).is_some_and(|o| o.kind.is_geometry()))
    }

    /// `collection` itself when editable, else the closest editable ancestor.
    /// Scene roots stop the search.
    pub fn parent_editable_find_recursive(&self, collection: CollectionId) -> Option<CollectionId> {
        let coll = self.collections.get(&collection)?;
        if coll.is_editable() {
            return Some(collection);
        }
        let mut visited = HashSet::new();
        self.editable_parent_of(coll, &mut visited)
    }

    fn editable_parent_of(&self, coll: &Collection, visited: &mut HashSet<CollectionId>) -> Option<CollectionId> {
        if coll.is_master() || !visited.insert(coll.id) {
            return None;
        }
        for parent_id in coll.parents() {
            let Some(parent) = self.collections.get(parent_id) else {
                continue;
            };
            if parent.is_editable() {
                return Some(*parent_id);
            }
            if let Some(found) = self.editable_parent_of(parent, visited) {
                return Some(found);
            }
        }
        None
    }
}
