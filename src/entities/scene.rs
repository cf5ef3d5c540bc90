use serde::{Deserialize, Serialize};

use super::ids::{CollectionId, SceneId};

/// A scene owns exactly one root ("master") collection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scene {
    pub id: SceneId,
    pub name: String,
    pub master_collection: CollectionId,
}
