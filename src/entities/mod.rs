//! Data model: handles, flags and the data-blocks held by [`Main`].

pub mod collection;
pub mod flags;
pub mod ids;
pub mod main_store;
pub mod object;
pub mod scene;

pub use collection::{
    Base, CacheKind, CacheSlot, Collection, CollectionChild, CollectionExport, CollectionObject, MembershipState,
};
pub use flags::{
    BaseFlags, CollectionFlags, DuplicateFlags, ExportFlags, IdCreateFlags, IdTags, MemberFlags, ObjectVisibility, Recalc,
};
pub use ids::{CollectionId, EntryId, IdRef, ObjectId, SceneId};
pub use main_store::Main;
pub use object::{Object, ObjectKind};
pub use scene::Scene;
