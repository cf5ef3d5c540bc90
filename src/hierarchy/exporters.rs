//! Export presets stored on collections.
//!
//! Names are unique per collection (`.001` suffixes). `active_exporter` tracks
//! the preset shown in the UI and stays in range after removals.

use log::{debug, trace};

use super::lifecycle::{unique_name, MAX_NAME};
use crate::entities::{Collection, CollectionExport, CollectionId, ExportFlags, Main};

/// `name` cut to the stored length and made unique among the other presets.
fn exporter_unique_name(coll: &Collection, skip: Option<usize>, name: &str) -> String {
    let base: String = name.chars().take(MAX_NAME).collect();
    unique_name(&base, |candidate| {
        coll.exporters
            .iter()
            .enumerate()
            .any(|(i, e)| Some(i) != skip && e.name == candidate)
    })
}

impl Main {
    /// Append a preset for file handler `format` and make it active.
    /// Returns its index, `None` if the collection doesn't exist.
    pub fn collection_exporter_add(&mut self, collection: CollectionId, format: &str, label: &str) -> Option<usize> {
        let coll = self.collections.get_mut(&collection)?;
        let name = if label.is_empty() { String::new() } else { exporter_unique_name(coll, None, label) };
        coll.exporters.push(CollectionExport {
            name,
            format: format.to_string(),
            flags: ExportFlags::PANEL_OPEN,
            filepath: String::new(),
        });
        coll.active_exporter = coll.exporters.len() - 1;
        debug!("'{}': added exporter '{}' ({})", coll.name, label, format);
        Some(coll.active_exporter)
    }

    pub fn collection_exporter_remove(&mut self, collection: CollectionId, index: usize) -> bool {
        let Some(coll) = self.collections.get_mut(&collection) else {
            return false;
        };
        if index >= coll.exporters.len() {
            return false;
        }
        let removed = coll.exporters.remove(index);
        coll.active_exporter = coll.active_exporter.min(coll.exporters.len().saturating_sub(1));
        trace!("'{}': removed exporter '{}'", coll.name, removed.name);
        true
    }

    /// Move the preset at `from` to position `to`. False when either is out of
    /// range or they are equal.
    pub fn collection_exporter_move(&mut self, collection: CollectionId, from: usize, to: usize) -> bool {
        let Some(coll) = self.collections.get_mut(&collection) else {
            return false;
        };
        let len = coll.exporters.len();
        if from == to || from >= len || to >= len {
            return false;
        }
        let exporter = coll.exporters.remove(from);
        coll.exporters.insert(to, exporter);
        true
    }

    /// Rename a preset. An empty name is ignored.
    pub fn collection_exporter_name_set(&mut self, collection: CollectionId, index: usize, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let Some(coll) = self.collections.get_mut(&collection) else {
            return false;
        };
        if index >= coll.exporters.len() {
            return false;
        }
        let unique = exporter_unique_name(coll, Some(index), name);
        coll.exporters[index].name = unique;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::DuplicateFlags;
    use crate::hierarchy::fixtures::*;
    use crate::persist::{read_collection, write_collection};

    fn names(main: &Main, id: CollectionId) -> Vec<String> {
        main.collection(id).unwrap().exporters().iter().map(|e| e.name.clone()).collect()
    }

    #[test]
    fn test_add_makes_unique_names() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");

        assert_eq!(main.collection_exporter_add(a, "IO_FH_alembic", "Alembic"), Some(0));
        assert_eq!(main.collection_exporter_add(a, "IO_FH_alembic", "Alembic"), Some(1));
        assert_eq!(main.collection_exporter_add(a, "IO_FH_obj", "Alembic.001"), Some(2));
        assert_eq!(names(&main, a), vec!["Alembic", "Alembic.001", "Alembic.002"]);

        let coll = main.collection(a).unwrap();
        assert_eq!(coll.active_exporter, 2, "newest is active");
        assert!(coll.exporters()[0].flags.contains(ExportFlags::PANEL_OPEN));
        assert_eq!(coll.exporters()[2].format, "IO_FH_obj");
        assert_eq!(main.collection_exporter_add(CollectionId::new(), "IO_FH_obj", "x"), None);
    }

    #[test]
    fn test_name_set() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        main.collection_exporter_add(a, "IO_FH_obj", "OBJ");
        main.collection_exporter_add(a, "IO_FH_usd", "USD");

        assert!(main.collection_exporter_name_set(a, 1, "OBJ"));
        assert_eq!(names(&main, a), vec!["OBJ", "OBJ.001"]);
        assert!(main.collection_exporter_name_set(a, 0, "OBJ"), "own name is not a clash");
        assert_eq!(names(&main, a)[0], "OBJ");

        assert!(!main.collection_exporter_name_set(a, 0, ""), "empty name ignored");
        assert!(!main.collection_exporter_name_set(a, 5, "X"));
        assert_eq!(names(&main, a), vec!["OBJ", "OBJ.001"]);

        let long = "e".repeat(100);
        assert!(main.collection_exporter_name_set(a, 1, &long));
        assert_eq!(names(&main, a)[1].chars().count(), MAX_NAME);
    }

    #[test]
    fn test_move_bounds() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        for label in ["one", "two", "three"] {
            main.collection_exporter_add(a, "IO_FH_obj", label);
        }

        assert!(main.collection_exporter_move(a, 0, 2));
        assert_eq!(names(&main, a), vec!["two", "three", "one"]);
        assert!(main.collection_exporter_move(a, 2, 0));
        assert_eq!(names(&main, a), vec!["one", "two", "three"]);

        assert!(!main.collection_exporter_move(a, 1, 1), "same index");
        assert!(!main.collection_exporter_move(a, 3, 0), "from out of range");
        assert!(!main.collection_exporter_move(a, 0, 3), "to out of range");
        assert_eq!(names(&main, a), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_remove_clamps_active() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        main.collection_exporter_add(a, "IO_FH_obj", "one");
        main.collection_exporter_add(a, "IO_FH_obj", "two");
        assert_eq!(main.collection(a).unwrap().active_exporter, 1);

        assert!(main.collection_exporter_remove(a, 1));
        assert_eq!(main.collection(a).unwrap().active_exporter, 0);
        assert!(!main.collection_exporter_remove(a, 1));
        assert!(main.collection_exporter_remove(a, 0));
        let coll = main.collection(a).unwrap();
        assert!(coll.exporters().is_empty());
        assert_eq!(coll.active_exporter, 0);
    }

    #[test]
    fn test_copy_and_duplicate_clear_filepath() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        main.collection_exporter_add(a, "IO_FH_alembic", "Alembic");
        main.collection_mut(a).unwrap().exporters[0].filepath = "/tmp/a.abc".to_string();

        let copy = main.collection_copy(a).unwrap();
        let exported = &main.collection(copy).unwrap().exporters()[0];
        assert_eq!(exported.name, "Alembic");
        assert_eq!(exported.format, "IO_FH_alembic");
        assert!(exported.flags.contains(ExportFlags::PANEL_OPEN));
        assert!(exported.filepath.is_empty());
        assert_eq!(main.collection(a).unwrap().exporters()[0].filepath, "/tmp/a.abc", "source untouched");

        let root = main.master_collection(scene).unwrap();
        let dup = main.collection_duplicate(Some(root), a, DuplicateFlags::empty()).unwrap();
        assert_eq!(names(&main, dup), vec!["Alembic"]);
        assert!(main.collection(dup).unwrap().exporters()[0].filepath.is_empty());
    }

    #[test]
    fn test_exporters_persist() {
        let (mut main, scene) = new_main();
        let a = add_collection(&mut main, scene, "A");
        main.collection_exporter_add(a, "IO_FH_obj", "OBJ");
        main.collection_exporter_add(a, "IO_FH_usd", "USD");
        main.collection_mut(a).unwrap().exporters[1].filepath = "//out.usd".to_string();

        let read = read_collection(&write_collection(main.collection(a).unwrap()).unwrap()).unwrap();
        assert_eq!(read.exporters(), main.collection(a).unwrap().exporters());
        assert_eq!(read.active_exporter, 1);

        let legacy = r#"{ "id": "6f1c1c8e-8f0e-4d37-9a1c-1f4b4a0e2c11", "name": "Old" }"#;
        let old = read_collection(legacy).unwrap();
        assert!(old.exporters().is_empty());
    }
}
