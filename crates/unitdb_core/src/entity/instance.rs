//! Entity instances.

use super::descriptor::{EntityDescriptor, EntityType, SlotKind};
use super::id::EntityId;
use super::key::{AssociationKey, CollectionKey, ManyAssociationKey, PropertyKey, PropertyValue};
use super::state::EntityState;
use super::status::EntityStatus;
use crate::concern::{
    collection_chain, property_chain, BaseCollectionSlot, BasePropertySlot, CollectionSlot,
    PropertySlot, SlotContext,
};
use crate::error::{CoreError, CoreResult};
use crate::property::{Association, CollectionProperty, ManyAssociation, Property};
use crate::types::UnitOfWorkId;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use unitdb_codec::Record;

/// Shared handle to an entity.
pub type EntityRef = Arc<Entity>;

enum Slot {
    Single(Box<dyn PropertySlot>),
    Multi(Box<dyn CollectionSlot>),
}

/// An entity resident in a unit of work.
///
/// Entities are created and loaded through a
/// [`UnitOfWork`](crate::UnitOfWork), which owns them; the identity map
/// guarantees at most one instance per identity and unit of work. All slot
/// access runs through the concern chains assembled from the type's
/// descriptor.
pub struct Entity {
    id: EntityId,
    owner: UnitOfWorkId,
    descriptor: Arc<EntityDescriptor>,
    state: Arc<Mutex<EntityState>>,
    slots: Vec<Slot>,
}

impl Entity {
    pub(crate) fn new(
        id: EntityId,
        owner: UnitOfWorkId,
        descriptor: Arc<EntityDescriptor>,
        state: EntityState,
    ) -> Self {
        let state = Arc::new(Mutex::new(state));
        let slots = descriptor
            .slots()
            .iter()
            .map(|slot| {
                let ctx = SlotContext::new(
                    descriptor.type_name(),
                    id.clone(),
                    slot.name(),
                    Arc::clone(&state),
                );
                match slot.kind() {
                    SlotKind::Property | SlotKind::Association { .. } => {
                        let base = BasePropertySlot::new(
                            ctx,
                            slot.is_mandatory(),
                            slot.default_factory(),
                        );
                        Slot::Single(property_chain(Box::new(base), slot.property_concerns()))
                    }
                    SlotKind::Collection { unique } => {
                        let base =
                            BaseCollectionSlot::new(ctx, unique, slot.element_default_factory());
                        Slot::Multi(collection_chain(Box::new(base), slot.collection_concerns()))
                    }
                    SlotKind::ManyAssociation { .. } => {
                        let base = BaseCollectionSlot::new(ctx, true, None);
                        Slot::Multi(collection_chain(Box::new(base), slot.collection_concerns()))
                    }
                }
            })
            .collect();

        Self {
            id,
            owner,
            descriptor,
            state,
            slots,
        }
    }

    /// Returns the identity.
    #[must_use]
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// Returns the entity type name.
    #[must_use]
    pub fn entity_type(&self) -> &'static str {
        self.descriptor.type_name()
    }

    /// Returns the descriptor of the entity type.
    #[must_use]
    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    /// Returns the unit of work that owns this entity.
    #[must_use]
    pub fn owner(&self) -> UnitOfWorkId {
        self.owner
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub fn status(&self) -> EntityStatus {
        self.state.lock().status
    }

    /// Returns the store version the entity was loaded at.
    #[must_use]
    pub fn version(&self) -> Option<u64> {
        self.state.lock().version
    }

    /// Returns `true` while property values may be read.
    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.state.lock().readable
    }

    /// Returns `true` if `T` is the type of this entity.
    #[must_use]
    pub fn is<T: EntityType>(&self) -> bool {
        self.entity_type() == T::TYPE_NAME
    }

    /// Handle to a single-valued property.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownProperty`] if the type declares no such
    /// property.
    pub fn property<T: PropertyValue>(&self, key: PropertyKey<T>) -> CoreResult<Property<'_, T>> {
        let slot = self.single_slot(key.name(), false)?;
        Ok(Property::new(slot))
    }

    /// Reads a property; `None` if unset without default.
    pub fn get<T: PropertyValue>(&self, key: PropertyKey<T>) -> CoreResult<Option<T>> {
        self.property(key)?.get()
    }

    /// Writes a property.
    pub fn set<T: PropertyValue>(&self, key: PropertyKey<T>, value: impl Into<T>) -> CoreResult<()> {
        self.property(key)?.set(value.into())
    }

    /// Handle to a collection property.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownProperty`] if the type declares no such
    /// collection.
    pub fn collection<T: PropertyValue + Clone>(
        &self,
        key: CollectionKey<T>,
    ) -> CoreResult<CollectionProperty<'_, T>> {
        let slot = self.multi_slot(key.name(), false)?;
        Ok(CollectionProperty::new(slot))
    }

    /// Handle to an association.
    pub fn association<E: EntityType>(
        &self,
        key: AssociationKey<E>,
    ) -> CoreResult<Association<'_, E>> {
        let slot = self.single_slot(key.name(), true)?;
        Ok(Association::new(slot))
    }

    /// Handle to a many-association.
    pub fn many_association<E: EntityType>(
        &self,
        key: ManyAssociationKey<E>,
    ) -> CoreResult<ManyAssociation<'_, E>> {
        let slot = self.multi_slot(key.name(), true)?;
        Ok(ManyAssociation::new(slot))
    }

    /// Current property values; unset properties are absent and defaults are
    /// not resolved.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] once the entity is unreadable.
    pub fn record(&self) -> CoreResult<Record> {
        let state = self.state.lock();
        if !state.readable {
            return Err(CoreError::illegal_state(format!(
                "{} {} is no longer readable",
                self.entity_type(),
                self.id
            )));
        }
        Ok(state.values.clone())
    }

    fn slot_at(&self, name: &str, association: bool) -> CoreResult<&Slot> {
        let unknown = || CoreError::UnknownProperty {
            entity_type: self.entity_type().to_string(),
            property: name.to_string(),
        };
        let index = self.descriptor.slot_index(name).ok_or_else(unknown)?;
        let kind = self.descriptor.slots()[index].kind();
        let is_association = matches!(
            kind,
            SlotKind::Association { .. } | SlotKind::ManyAssociation { .. }
        );
        if is_association != association {
            return Err(unknown());
        }
        Ok(&self.slots[index])
    }

    fn single_slot(&self, name: &str, association: bool) -> CoreResult<&dyn PropertySlot> {
        match self.slot_at(name, association)? {
            Slot::Single(chain) => Ok(chain.as_ref()),
            Slot::Multi(_) => Err(CoreError::UnknownProperty {
                entity_type: self.entity_type().to_string(),
                property: name.to_string(),
            }),
        }
    }

    fn multi_slot(&self, name: &str, association: bool) -> CoreResult<&dyn CollectionSlot> {
        match self.slot_at(name, association)? {
            Slot::Multi(chain) => Ok(chain.as_ref()),
            Slot::Single(_) => Err(CoreError::UnknownProperty {
                entity_type: self.entity_type().to_string(),
                property: name.to_string(),
            }),
        }
    }

    /// Chain of the single-valued slot at `index`, for commit-time defaults.
    pub(crate) fn single_slot_at(&self, index: usize) -> Option<&dyn PropertySlot> {
        match self.slots.get(index)? {
            Slot::Single(chain) => Some(chain.as_ref()),
            Slot::Multi(_) => None,
        }
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut EntityState) -> R) -> R {
        f(&mut self.state.lock())
    }

    /// Values queries evaluate this entity against.
    ///
    /// Until the entity is first yielded by a result set this is its current
    /// state with defaults resolved; afterwards it stays frozen at the state
    /// of that first yield.
    pub(crate) fn query_view(&self) -> Record {
        let state = self.state.lock();
        if let Some(view) = &state.frozen_view {
            return view.clone();
        }
        self.resolved(&state.values)
    }

    /// Freezes the query view; later calls keep the first view.
    pub(crate) fn freeze_view(&self) {
        let mut state = self.state.lock();
        if state.frozen_view.is_none() {
            let view = self.resolved(&state.values);
            state.frozen_view = Some(view);
        }
    }

    fn resolved(&self, values: &Record) -> Record {
        let mut view = values.clone();
        for slot in self.descriptor.slots() {
            if view.contains(slot.name()) {
                continue;
            }
            if let Some(default) = slot.default_factory() {
                view.set(slot.name(), default());
            }
        }
        view
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("type", &self.entity_type())
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
