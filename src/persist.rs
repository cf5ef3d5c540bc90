//! JSON persistence for collections and whole databases.
//!
//! Only persistent state is written: names, flags, `children` and `members`.
//! Runtime state (parents, membership index, object caches, per-member flags,
//! entry ids) is skipped by serde and rebuilt after reading.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::entities::{Collection, Main};

/// Serialize one collection. Runtime state is never emitted.
pub fn write_collection(collection: &Collection) -> Result<String> {
    serde_json::to_string_pretty(collection)
        .with_context(|| format!("Serialize collection '{}'", collection.name))
}

/// Deserialize one collection with fresh runtime state and renumbered entries.
///
/// Parent links are not known from a single collection; they come back with
/// [`Main::rebuild_all_parent_relations`].
pub fn read_collection(json: &str) -> Result<Collection> {
    let mut collection: Collection = serde_json::from_str(json).context("Parse collection")?;
    collection.reset_runtime();
    Ok(collection)
}

impl Main {
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Serialize main")
    }

    /// Parse a database and rebuild runtime state (see [`Main::after_lib_link`]).
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut main: Main = serde_json::from_str(json).context("Parse main")?;
        main.check_scene_roots()?;
        main.after_lib_link();
        Ok(main)
    }

    /// Write to `path`, adding a `.json` extension when missing.
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        let json = self.to_json_string()?;
        let path = path.as_ref();
        let path = if path.extension().and_then(|s| s.to_str()) != Some("json") {
            path.with_extension("json")
        } else {
            path.to_path_buf()
        };
        fs::write(&path, json).with_context(|| format!("Write {}", path.display()))?;
        log::info!("Saved {}", path.display());
        Ok(path)
    }

    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).with_context(|| format!("Read {}", path.display()))?;
        let main = Self::from_json_str(&json).with_context(|| format!("Load {}", path.display()))?;
        log::info!(
            "Loaded {}: {} scenes, {} collections, {} objects",
            path.display(),
            main.scenes.len(),
            main.collections.len(),
            main.objects.len()
        );
        Ok(main)
    }

    /// Every scene must point at an existing collection, which becomes its root.
    fn check_scene_roots(&mut self) -> Result<()> {
        for scene in self.scenes.values() {
            let Some(root) = self.collections.get_mut(&scene.master_collection) else {
                bail!("Scene '{}' has no root collection", scene.name);
            };
            if !root.is_master() || root.owner != Some(scene.id) {
                log::warn!("Scene '{}': fixing root collection flags", scene.name);
                root.flags |= crate::entities::CollectionFlags::IS_MASTER;
                root.owner = Some(scene.id);
            }
        }
        Ok(())
    }

    /// Rebuild runtime state after reading: fresh runtimes, dangling and null
    /// references dropped, parent relations derived from `children`.
    pub fn after_lib_link(&mut self) {
        let objects = &self.objects;
        let mut dropped = 0;
        for coll in self.collections.values_mut() {
            coll.reset_runtime();
            let before = coll.members.len();
            coll.members.retain(|m| m.object.is_some_and(|ob| objects.contains_key(&ob)));
            dropped += before - coll.members.len();
        }
        if dropped > 0 {
            log::warn!("Dropped {} null or dangling member entries", dropped);
        }
        for ob in self.objects.values_mut() {
            if ob.instance_collection.is_some_and(|c| !self.collections.contains_key(&c)) {
                log::warn!("Object '{}': dropping dangling instanced collection", ob.name);
                ob.instance_collection = None;
            }
        }
        self.rebuild_all_parent_relations();
        self.sync.notify_structure_changed();
    }
}
