//! Parent/child links between collections.
//!
//! `children` is the persistent side; `parents` is derived and rebuilt by
//! [`Main::rebuild_all_parent_relations`]. Edits on transient (no-main)
//! collections only touch `children`.

use log::{debug, trace, warn};
use std::collections::HashSet;

use crate::entities::{CollectionChild, CollectionId, IdCreateFlags, Main, Recalc};

impl Main {
    pub(crate) fn create_flags_of(&self, collection: CollectionId) -> IdCreateFlags {
        self.collections
            .get(&collection)
            .map(|c| IdCreateFlags::from_tags(c.tags))
            .unwrap_or_default()
    }

    /// Append `child` under `parent` unless the edge exists or would loop.
    pub(crate) fn child_add_ex(
        &mut self,
        parent: CollectionId,
        child: CollectionId,
        flags: IdCreateFlags,
        add_us: bool,
    ) -> bool {
        if !self.collections.contains_key(&parent) || !self.collections.contains_key(&child) {
            return false;
        }
        if self.is_master(child) {
            warn!("Scene root '{}' can't be linked as a child", self.collection_name(child));
            return false;
        }
        if self.child_find(parent, child) {
            return false;
        }
        if self.creates_nesting_cycle(parent, Some(child)) {
            debug!(
                "Rejected '{}' -> '{}': nesting cycle",
                self.collection_name(parent),
                self.collection_name(child)
            );
            return false;
        }

        if let Some(p) = self.collections.get_mut(&parent) {
            p.children.push(CollectionChild { collection: Some(child) });
        }
        if let Some(c) = self.collections.get_mut(&child) {
            if !flags.contains(IdCreateFlags::NO_MAIN) {
                c.runtime.parents.push(parent);
            }
            if add_us {
                c.users += 1;
            }
        }
        self.object_cache_free(parent, flags, Recalc::HIERARCHY | Recalc::GEOMETRY);
        trace!("Linked '{}' -> '{}'", self.collection_name(parent), self.collection_name(child));
        true
    }

    /// Remove the `parent -> child` edge and its back-link.
    pub(crate) fn child_remove_ex(
        &mut self,
        parent: CollectionId,
        child: CollectionId,
        flags: IdCreateFlags,
        remove_us: bool,
    ) -> bool {
        let Some(p) = self.collections.get_mut(&parent) else {
            return false;
        };
        let Some(pos) = p.children.iter().position(|c| c.collection == Some(child)) else {
            return false;
        };
        p.children.remove(pos);

        if let Some(c) = self.collections.get_mut(&child) {
            if let Some(i) = c.runtime.parents.iter().position(|id| *id == parent) {
                c.runtime.parents.remove(i);
            }
            if remove_us {
                c.users = c.users.saturating_sub(1);
            }
        }
        self.object_cache_free(parent, flags, Recalc::HIERARCHY | Recalc::GEOMETRY);
        trace!("Unlinked '{}' -> '{}'", self.collection_name(parent), self.collection_name(child));
        true
    }

    /// Link `child` under `parent`. False if already linked or if it would loop.
    pub fn collection_child_add(&mut self, parent: CollectionId, child: CollectionId) -> bool {
        if !self.collection_child_add_no_sync(parent, child) {
            return false;
        }
        self.sync.notify_structure_changed();
        true
    }

    /// Same as [`collection_child_add`](Self::collection_child_add) without the
    /// structure notification, for batched edits.
    pub fn collection_child_add_no_sync(&mut self, parent: CollectionId, child: CollectionId) -> bool {
        let flags = self.create_flags_of(parent);
        self.child_add_ex(parent, child, flags, true)
    }

    pub fn collection_child_remove(&mut self, parent: CollectionId, child: CollectionId) -> bool {
        let flags = self.create_flags_of(parent);
        if !self.child_remove_ex(parent, child, flags, true) {
            return false;
        }
        self.sync.notify_structure_changed();
        true
    }

    /// Move `collection` from `from_parent` (if any) to `to_parent`.
    ///
    /// With `relative`, the entry is placed right before or after that sibling.
    /// Without it, the entry ends up last, even when moving within one parent.
    pub fn collection_move(
        &mut self,
        to_parent: CollectionId,
        from_parent: Option<CollectionId>,
        relative: Option<CollectionId>,
        relative_after: bool,
        collection: CollectionId,
    ) -> bool {
        if self.is_master(collection) {
            return false;
        }
        if !self.collections.contains_key(&to_parent) || !self.collections.contains_key(&collection) {
            return false;
        }
        if self.creates_nesting_cycle(to_parent, Some(collection)) {
            return false;
        }

        let flags = self.create_flags_of(to_parent);
        if let Some(from) = from_parent {
            let from_flags = self.create_flags_of(from);
            self.child_remove_ex(from, collection, from_flags, true);
        }
        self.child_add_ex(to_parent, collection, flags, true);

        if let Some(relative) = relative {
            if let Some(p) = self.collections.get_mut(&to_parent) {
                let current = p.children.iter().position(|c| c.collection == Some(collection));
                let has_relative = p.children.iter().any(|c| c.collection == Some(relative));
                if let (Some(current), true) = (current, has_relative) {
                    let entry = p.children.remove(current);
                    if let Some(rel) = p.children.iter().position(|c| c.collection == Some(relative)) {
                        let at = if relative_after { rel + 1 } else { rel };
                        p.children.insert(at, entry);
                    }
                }
            }
            self.object_cache_free(to_parent, flags, Recalc::HIERARCHY | Recalc::GEOMETRY);
        }

        self.sync.notify_structure_changed();
        true
    }

    /// Rebuild `parents` of the children of one collection from its `children`.
    ///
    /// Drops null, dangling, repeated and loop-closing child entries on the way.
    /// Transient children keep their edge but get no back-link.
    pub fn collection_parent_relations_rebuild(&mut self, collection: CollectionId) {
        let Some(coll) = self.collections.get(&collection) else {
            return;
        };
        let entries: Vec<Option<CollectionId>> = coll.children.iter().map(|c| c.collection).collect();

        let mut kept = Vec::with_capacity(entries.len());
        let mut seen = HashSet::new();
        for child in entries {
            let Some(child) = child else {
                debug!("'{}': dropping null child entry", self.collection_name(collection));
                continue;
            };
            let valid = seen.insert(child)
                && self.collections.contains_key(&child)
                && !self.creates_nesting_cycle(collection, Some(child));
            if !valid {
                debug!(
                    "'{}': dropping invalid child '{}'",
                    self.collection_name(collection),
                    self.collection_name(child)
                );
                if let Some(c) = self.collections.get_mut(&child) {
                    c.users = c.users.saturating_sub(1);
                }
                continue;
            }
            kept.push(CollectionChild { collection: Some(child) });

            if let Some(c) = self.collections.get_mut(&child) {
                if c.tags.is_transient() {
                    continue;
                }
                if !c.runtime.parents.contains(&collection) {
                    c.runtime.parents.push(collection);
                }
            }
        }

        if let Some(coll) = self.collections.get_mut(&collection) {
            coll.children = kept;
        }
    }

    /// Derive every `parents` list from `children` alone.
    ///
    /// Walks from each scene root first, then covers collections no scene
    /// reaches. Each collection is processed once.
    pub fn rebuild_all_parent_relations(&mut self) {
        for coll in self.collections.values_mut() {
            coll.runtime.parents.clear();
        }
        let mut pending: HashSet<CollectionId> = self.collections.keys().copied().collect();

        let roots: Vec<CollectionId> = self.scenes.values().map(|s| s.master_collection).collect();
        for root in roots {
            self.parent_relations_rebuild_recursive(root, &mut pending);
        }
        let orphans: Vec<CollectionId> = self.collections.keys().filter(|id| pending.contains(id)).copied().collect();
        for id in orphans {
            self.parent_relations_rebuild_recursive(id, &mut pending);
        }
        debug!("Rebuilt parent relations for {} collections", self.collections.len());
    }

    fn parent_relations_rebuild_recursive(&mut self, collection: CollectionId, pending: &mut HashSet<CollectionId>) {
        if !pending.remove(&collection) {
            return;
        }
        self.collection_parent_relations_rebuild(collection);

        let children: Vec<CollectionId> = self
            .collections
            .get(&collection)
            .map(|c| c.child_ids().collect())
            .unwrap_or_default();
        for child in children {
            if self.collections.get(&child).is_some_and(|c| c.tags.is_transient()) {
                continue;
            }
            self.parent_relations_rebuild_recursive(child, pending);
        }
    }

    /// Structural self-check: no repeated children or parents, no loop through itself.
    pub fn collection_validate(&self, collection: CollectionId) -> bool {
        let Some(coll) = self.collections.get(&collection) else {
            return false;
        };
        let mut seen = HashSet::new();
        if !coll.child_ids().all(|c| seen.insert(c)) {
            return false;
        }
        let mut seen = HashSet::new();
        if !coll.parents().iter().all(|p| seen.insert(*p)) {
            return false;
        }
        !self.creates_nesting_cycle(collection, None)
    }

    fn null_children_remove(&mut self, collection: CollectionId) {
        let Some(coll) = self.collections.get_mut(&collection) else {
            return;
        };
        let before = coll.children.len();
        coll.children.retain(|c| c.collection.is_some());
        if coll.children.len() != before {
            self.object_cache_free(collection, IdCreateFlags::empty(), Recalc::HIERARCHY);
        }
    }

    /// Drop back-links whose parent no longer lists `collection` as a child.
    fn missing_parents_remove(&mut self, collection: CollectionId) {
        let parents = self.parents_of(collection).to_vec();
        let stale: Vec<CollectionId> = parents.into_iter().filter(|p| !self.child_find(*p, collection)).collect();
        if let Some(coll) = self.collections.get_mut(&collection) {
            coll.runtime.parents.retain(|p| !stale.contains(p));
        }
    }

    /// Clean up after references were remapped to null.
    ///
    /// - `child` given: clean every parent of `child` and drop stale back-links
    /// - only `parent` given: clean that collection
    /// - neither: clean everything
    pub fn collection_child_remove_nulls(&mut self, parent: Option<CollectionId>, child: Option<CollectionId>) {
        match (parent, child) {
            (_, Some(child)) => {
                for p in self.parents_of(child).to_vec() {
                    self.null_children_remove(p);
                }
                self.missing_parents_remove(child);
            }
            (Some(parent), None) => self.null_children_remove(parent),
            (None, None) => {
                for id in self.all_collection_ids() {
                    self.null_children_remove(id);
                    self.missing_parents_remove(id);
                }
            }
        }
    }
}
