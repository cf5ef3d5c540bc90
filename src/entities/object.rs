//! Object data-block as seen by collections.
//!
//! Collections reference objects; they never own them. An object counts one
//! user per member entry that links it.

use serde::{Deserialize, Serialize};

use super::flags::{IdTags, ObjectVisibility};
use super::ids::{CollectionId, ObjectId};

/// Object type, only as far as collections care about it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    #[default]
    Empty,
    Mesh,
    Curve,
    Curves,
    PointCloud,
    Volume,
    GreasePencil,
    Light,
    Camera,
}

impl ObjectKind {
    /// Object types that produce renderable geometry.
    pub fn is_geometry(self) -> bool {
        matches!(
            self,
            ObjectKind::Mesh
                | ObjectKind::Curve
                | ObjectKind::Curves
                | ObjectKind::PointCloud
                | ObjectKind::Volume
                | ObjectKind::GreasePencil
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Object {
    pub id: ObjectId,
    pub name: String,
    #[serde(default)]
    pub kind: ObjectKind,
    #[serde(default)]
    pub visibility: ObjectVisibility,
    /// Collection instanced by this object (an empty acting as instancer).
    #[serde(default)]
    pub instance_collection: Option<CollectionId>,
    #[serde(default)]
    pub tags: IdTags,
    #[serde(default)]
    pub users: u32,
}

impl Object {
    pub fn new(name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            id: ObjectId::new(),
            name: name.into(),
            kind,
            visibility: ObjectVisibility::empty(),
            instance_collection: None,
            tags: IdTags::empty(),
            users: 0,
        }
    }

    pub fn is_editable(&self) -> bool {
        self.tags.is_editable()
    }
}
