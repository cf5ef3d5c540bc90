//! Stable handles for data-blocks.
//!
//! Collections, objects and scenes are addressed by Uuid newtypes instead of
//! references, so back-links (`parents`, membership index keys) never own
//! anything and survive moves of the underlying storage.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Short form keeps log lines readable
                write!(f, "{}({})", stringify!($name), &self.0.simple().to_string()[..8])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

define_id!(
    /// Handle of a collection (scene roots included).
    CollectionId
);
define_id!(
    /// Handle of an object.
    ObjectId
);
define_id!(
    /// Handle of a scene.
    SceneId
);

/// Member entry handle, unique within one collection.
///
/// Not persisted: entries are renumbered when a collection is read back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub u64);

/// Any data-block the dependency graph can be tagged on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdRef {
    Collection(CollectionId),
    Object(ObjectId),
    Scene(SceneId),
}

impl From<CollectionId> for IdRef {
    fn from(id: CollectionId) -> Self {
        IdRef::Collection(id)
    }
}

impl From<ObjectId> for IdRef {
    fn from(id: ObjectId) -> Self {
        IdRef::Object(id)
    }
}

impl From<SceneId> for IdRef {
    fn from(id: SceneId) -> Self {
        IdRef::Scene(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_unique_and_json_transparent() {
        let a = CollectionId::new();
        let b = CollectionId::new();
        assert_ne!(a, b, "fresh ids must differ");

        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, format!("\"{}\"", a.0), "id should serialize as a bare uuid");
        let back: CollectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(a, back);
    }

    #[test]
    fn test_debug_is_short() {
        let id = ObjectId::new();
        let dbg = format!("{:?}", id);
        assert!(dbg.starts_with("ObjectId("));
        assert_eq!(dbg.len(), "ObjectId(".len() + 8 + 1);
    }
}
