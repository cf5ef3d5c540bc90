//! Flattened object lists per collection.
//!
//! Two kinds per collection:
//! - direct: every object under the collection (members plus all descendants), once
//! - instanced: same, and also the contents of collections instanced by those objects
//!
//! Visibility accumulates down the tree: an object hidden along one path but
//! visible along another ends up enabled.

use log::{trace, warn};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::entities::{
    Base, BaseFlags, CacheKind, CollectionFlags, CollectionId, IdCreateFlags, IdRef, Main, ObjectId, Recalc,
};

#[derive(Default)]
struct CacheFill {
    bases: Vec<Base>,
    lookup: HashMap<ObjectId, usize>,
    path: Vec<CollectionId>,
}

impl Main {
    /// Direct object cache, built on first access.
    pub fn object_cache(&self, collection: CollectionId) -> Arc<[Base]> {
        self.object_cache_get(collection, CacheKind::Direct)
    }

    /// Instance-expanded object cache, built on first access.
    pub fn object_cache_instanced(&self, collection: CollectionId) -> Arc<[Base]> {
        self.object_cache_get(collection, CacheKind::Instanced)
    }

    /// Safe to call from many threads at once: builds serialize on the
    /// per-kind lock and each cache is built once.
    pub fn object_cache_get(&self, collection: CollectionId, kind: CacheKind) -> Arc<[Base]> {
        let Some(coll) = self.collections.get(&collection) else {
            return Arc::from(Vec::new());
        };
        let slot = coll.runtime.cache(kind);
        if !slot.is_valid() {
            self.guards.lock(kind).with_lock(&mut || {
                if !slot.is_valid() {
                    let bases = self.object_cache_fill(collection, kind == CacheKind::Instanced);
                    trace!("Built {:?} cache for '{}': {} objects", kind, coll.name, bases.len());
                    slot.store(bases);
                }
            });
        }
        slot.load()
    }

    fn object_cache_fill(&self, root: CollectionId, with_instances: bool) -> Vec<Base> {
        let mut fill = CacheFill::default();
        self.object_cache_fill_recursive(&mut fill, root, CollectionFlags::empty(), with_instances);
        fill.bases
    }

    fn object_cache_fill_recursive(
        &self,
        fill: &mut CacheFill,
        collection: CollectionId,
        parent_restrict: CollectionFlags,
        with_instances: bool,
    ) {
        let Some(coll) = self.collections.get(&collection) else {
            return;
        };
        if fill.path.contains(&collection) {
            warn!("Collection '{}' reached through itself, skipping", coll.name);
            return;
        }
        fill.path.push(collection);

        let restrict = parent_restrict | (coll.flags & CollectionFlags::RESTRICT);
        let mut enabled = BaseFlags::empty();
        if !restrict.contains(CollectionFlags::HIDE_VIEWPORT) {
            enabled |= BaseFlags::ENABLED_VIEWPORT;
        }
        if !restrict.contains(CollectionFlags::HIDE_RENDER) {
            enabled |= BaseFlags::ENABLED_RENDER;
        }

        for object in coll.objects() {
            if let Some(&i) = fill.lookup.get(&object) {
                fill.bases[i].flags |= enabled;
                continue;
            }
            fill.lookup.insert(object, fill.bases.len());
            fill.bases.push(Base { object, flags: enabled });

            if with_instances {
                if let Some(instanced) = self.objects.get(&object).and_then(|o| o.instance_collection) {
                    self.object_cache_fill_recursive(fill, instanced, restrict, true);
                }
            }
        }

        for child in coll.child_ids() {
            self.object_cache_fill_recursive(fill, child, restrict, with_instances);
        }
        fill.path.pop();
    }

    /// Drop both caches of `collection` and of every ancestor, tagging each for
    /// dependency update with `recalc` unless the edit opts out.
    pub fn object_cache_free(&mut self, collection: CollectionId, create_flags: IdCreateFlags, recalc: Recalc) {
        let tag = !recalc.is_empty() && !create_flags.intersects(IdCreateFlags::NO_MAIN | IdCreateFlags::NO_DEG_TAG);
        let mut visited = HashSet::new();
        let mut stack = vec![collection];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(coll) = self.collections.get_mut(&current) else {
                continue;
            };
            coll.runtime.object_cache.clear();
            coll.runtime.object_cache_instanced.clear();
            if tag {
                self.sync.notify_geometry_changed(IdRef::Collection(current), recalc);
            }
            stack.extend(coll.runtime.parents.iter().copied());
        }
    }

    /// Invalidate one collection's caches and its ancestors'.
    pub fn object_cache_invalidate(&mut self, collection: CollectionId) {
        self.object_cache_free(collection, IdCreateFlags::empty(), Recalc::HIERARCHY | Recalc::GEOMETRY);
    }

    /// Drop the caches of every scene root and every free-standing collection.
    pub fn object_cache_invalidate_all(&mut self) {
        for coll in self.collections.values_mut() {
            coll.runtime.object_cache.clear();
            coll.runtime.object_cache_instanced.clear();
        }
    }

    /// Build every direct cache up front, in parallel.
    pub fn warm_object_caches(&self) {
        let ids = self.all_collection_ids();
        ids.par_iter().for_each(|id| {
            self.object_cache(*id);
        });
        trace!("Warmed {} object caches", ids.len());
    }

    /// `object` is linked in `collection` or any descendant.
    pub fn has_object_recursive(&self, collection: CollectionId, object: ObjectId) -> bool {
        self.object_cache(collection).iter().any(|b| b.object == object)
    }

    /// Like [`has_object_recursive`](Self::has_object_recursive), also looking through instancers.
    pub fn has_object_recursive_instanced(&self, collection: CollectionId, object: ObjectId) -> bool {
        self.object_cache_instanced(collection).iter().any(|b| b.object == object)
    }
}
