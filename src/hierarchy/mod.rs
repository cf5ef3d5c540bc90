//! Collection hierarchy operations on [`Main`](crate::entities::Main).
//!
//! Each submodule adds one group of methods to `Main`:
//! - `membership` - object -> entry index per collection, dirty tracking and repair
//! - `object_cache` - flattened object lists (direct / through instancers)
//! - `cycles` - nesting and instancing cycle detection and repair
//! - `children` - parent/child links, moves, parent relation rebuild
//! - `objects` - linking objects into collections
//! - `lifecycle` - add, copy, duplicate, delete, free
//! - `exporters` - per-collection export presets
//! - `remap` - reference walking and handle remapping
//! - `iter` - scene iterators and read-only queries
//! - `select` - per-member selection
//!
//! Structural edits take `&mut Main` and report rejection as `false`.

pub mod children;
pub mod cycles;
pub mod exporters;
pub mod iter;
pub mod lifecycle;
pub mod membership;
pub mod object_cache;
pub mod objects;
pub mod remap;
pub mod select;

pub use iter::{SceneCollections, SceneObjects};
pub use objects::FreePolicy;

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::core::cache_lock::CacheGuards;
    use crate::entities::{CollectionId, Main, ObjectId, ObjectKind, SceneId};

    /// Empty main with one scene and no-op cache locks.
    pub fn new_main() -> (Main, SceneId) {
        let mut main = Main::new().with_cache_guards(CacheGuards::unguarded());
        let scene = main.scene_add("Scene");
        (main, scene)
    }

    /// Collection linked under the scene root.
    pub fn add_collection(main: &mut Main, scene: SceneId, name: &str) -> CollectionId {
        let root = main.master_collection(scene).expect("scene root");
        main.collection_add(Some(root), Some(name))
    }

    pub fn add_child(main: &mut Main, parent: CollectionId, name: &str) -> CollectionId {
        main.collection_add(Some(parent), Some(name))
    }

    pub fn add_object(main: &mut Main, name: &str) -> ObjectId {
        main.object_new(name, ObjectKind::Mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use crate::entities::MembershipState;

    #[test]
    fn test_scenario_nesting_cycle_leaves_graph_unchanged() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        let b = add_child(&mut main, a, "B");
        let c = add_child(&mut main, b, "C");

        assert!(!main.collection_child_add(c, a));
        assert!(main.collection(c).unwrap().children().is_empty());
        assert_eq!(main.collection(a).unwrap().parents().len(), 1);
        assert_eq!(main.collection(a).unwrap().users, 1);
    }

    #[test]
    fn test_scenario_object_added_once() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        let o = add_object(&mut main, "O");

        assert!(main.object_add(a, o));
        assert!(!main.object_add(a, o));
        let entries = main.collection(a).unwrap().members().iter().filter(|m| m.object == Some(o)).count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_scenario_self_instancing_rejected() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        let o = add_object(&mut main, "O");
        assert!(main.object_set_instance_collection(o, Some(a)));

        assert!(!main.object_add(a, o));
        assert!(main.collection(a).unwrap().members().is_empty());
    }

    #[test]
    fn test_scenario_direct_cache_unique() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        let b = add_child(&mut main, a, "B");
        let c = add_child(&mut main, a, "C");
        let x = add_object(&mut main, "x");
        let shared = add_object(&mut main, "shared");
        let y = add_object(&mut main, "y");
        assert!(main.object_add(b, x));
        assert!(main.object_add(b, shared));
        assert!(main.object_add(c, shared));
        assert!(main.object_add(c, y));

        let objects: Vec<_> = main.object_cache(a).iter().map(|base| base.object).collect();
        assert_eq!(objects, vec![x, shared, y]);
    }

    #[test]
    fn test_scenario_repair_after_duplicate_remap() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        let x = add_object(&mut main, "x");
        let y = add_object(&mut main, "y");
        assert!(main.object_add(a, x));
        assert!(main.object_add(a, y));
        let _ = main.object_cache(a);
        assert!(main.collection(a).unwrap().is_cache_valid(crate::entities::CacheKind::Direct));

        let coll = main.collection_mut(a).unwrap();
        coll.foreach_object_reference(|slot| {
            if *slot == Some(y) {
                *slot = Some(x);
            }
        });
        assert_eq!(coll.membership_state(), MembershipState::Dirty);

        assert!(main.membership_ensure_and_repair(a));
        let coll = main.collection(a).unwrap();
        assert_eq!(coll.objects().collect::<Vec<_>>(), vec![x]);
        assert_eq!(coll.membership_state(), MembershipState::Clean);
        assert!(!coll.is_cache_valid(crate::entities::CacheKind::Direct));
    }

    #[test]
    fn test_scenario_delete_moves_contents_up() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        let b = add_child(&mut main, a, "B");
        let c = add_child(&mut main, b, "C");
        let o = add_object(&mut main, "O");
        assert!(main.object_add(b, o));

        assert!(main.collection_delete(b, false));
        assert!(main.collection(b).is_none());
        let coll_a = main.collection(a).unwrap();
        assert!(coll_a.has_child(c));
        assert!(coll_a.has_object(o));
        assert!(main.collections().all(|coll| !coll.has_child(b)));
        assert!(main.object_cache(a).iter().any(|base| base.object == o));
    }
}
