//! Bit flags for collections, objects, cache bases and edits.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Persistent collection flags. The `HIDE_*` bits are restrict flags:
    /// they accumulate from ancestors while the object cache is filled.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct CollectionFlags: u32 {
        const HIDE_SELECT   = 1 << 0;
        const HIDE_VIEWPORT = 1 << 1;
        const HIDE_RENDER   = 1 << 2;
        /// Scene root collection, owned by its scene.
        const IS_MASTER     = 1 << 3;
    }
}

impl CollectionFlags {
    /// Bits inherited by descendants during cache fill.
    pub const RESTRICT: Self = Self::HIDE_VIEWPORT.union(Self::HIDE_RENDER);
}

bitflags! {
    /// Data-block tags shared by collections and objects.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct IdTags: u32 {
        /// Lives outside the main database (evaluation or temp copy). Never keeps `parents`.
        const NO_MAIN          = 1 << 0;
        /// Copy-on-evaluation data-block.
        const COPIED_ON_EVAL   = 1 << 1;
        /// Linked from another library, read-only.
        const LINKED           = 1 << 2;
        /// Library override, only editable through override rules.
        const OVERRIDE_LIBRARY = 1 << 3;
    }
}

impl IdTags {
    /// True when local edits (linking objects or children) are allowed.
    pub fn is_editable(self) -> bool {
        !self.intersects(Self::LINKED | Self::OVERRIDE_LIBRARY)
    }

    /// Transient data-blocks are skipped by parent relation rebuilds.
    pub fn is_transient(self) -> bool {
        self.intersects(Self::NO_MAIN | Self::COPIED_ON_EVAL)
    }
}

bitflags! {
    /// Options passed down by a structural edit.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct IdCreateFlags: u32 {
        const NO_MAIN          = 1 << 0;
        const NO_USER_REFCOUNT = 1 << 1;
        const NO_DEG_TAG       = 1 << 2;
    }
}

impl IdCreateFlags {
    /// Edit flags implied by the tags of the data-block being edited.
    pub fn from_tags(tags: IdTags) -> Self {
        if tags.contains(IdTags::NO_MAIN) {
            Self::NO_MAIN
        } else {
            Self::empty()
        }
    }
}

bitflags! {
    /// Dependency graph recalc bits.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Recalc: u32 {
        const HIERARCHY = 1 << 0;
        const GEOMETRY  = 1 << 1;
        const SELECT    = 1 << 2;
    }
}

bitflags! {
    /// Visibility of an object through at least one inclusion path.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BaseFlags: u32 {
        const ENABLED_VIEWPORT = 1 << 0;
        const ENABLED_RENDER   = 1 << 1;
    }
}

bitflags! {
    /// Transient UI state of a member entry.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MemberFlags: u32 {
        const SELECTED = 1 << 0;
        const ACTIVE   = 1 << 1;
    }
}

bitflags! {
    /// Per-object visibility flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ObjectVisibility: u32 {
        const HIDE_VIEWPORT = 1 << 0;
        const HIDE_RENDER   = 1 << 1;
        const HIDE_SELECT   = 1 << 2;
    }
}

bitflags! {
    /// What `collection_duplicate` copies besides the collections themselves.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DuplicateFlags: u32 {
        const OBJECTS = 1 << 0;
    }
}

bitflags! {
    /// Per-exporter UI state.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ExportFlags: u32 {
        const PANEL_OPEN = 1 << 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restrict_mask() {
        assert!(CollectionFlags::RESTRICT.contains(CollectionFlags::HIDE_RENDER));
        assert!(!CollectionFlags::RESTRICT.contains(CollectionFlags::HIDE_SELECT));
    }

    #[test]
    fn test_tags_editable() {
        assert!(IdTags::empty().is_editable());
        assert!(!IdTags::LINKED.is_editable());
        assert!(!IdTags::OVERRIDE_LIBRARY.is_editable());
        assert!(IdTags::COPIED_ON_EVAL.is_transient());
        assert_eq!(IdCreateFlags::from_tags(IdTags::NO_MAIN | IdTags::LINKED), IdCreateFlags::NO_MAIN);
    }
}
