//! Entity model: identities, typed keys, descriptors and instances.

mod descriptor;
mod id;
mod instance;
mod key;
mod state;
mod status;

pub use descriptor::{
    CollectionBuilder, EntityDescriptor, EntityType, ModelBuilder, PropertyBuilder,
    SlotDescriptor, SlotKind, ValueFactory,
};
pub use id::EntityId;
pub use instance::{Entity, EntityRef};
pub use key::{
    AssociationKey, CollectionKey, ElementTemplate, ManyAssociationKey, PropertyKey,
    PropertyValue, SlotTemplate, ValueTemplate,
};
pub(crate) use state::EntityState;
pub use status::EntityStatus;
