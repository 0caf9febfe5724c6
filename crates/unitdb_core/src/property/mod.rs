//! Typed handles over slot chains.
//!
//! Handles borrow an [`Entity`](crate::Entity) and convert between Rust
//! values and stored [`Value`]s at the boundary of the chain; everything
//! below works on untyped values.

use crate::concern::{CollectionSlot, PropertySlot, SlotContext};
use crate::entity::{Entity, EntityId, EntityType, PropertyValue};
use crate::error::{CoreError, CoreResult};
use std::marker::PhantomData;
use unitdb_codec::Value;

fn convert<T: PropertyValue>(ctx: &SlotContext, value: &Value) -> CoreResult<T> {
    T::from_value(value).ok_or_else(|| CoreError::TypeMismatch {
        entity_type: ctx.entity_type().to_string(),
        property: ctx.property().to_string(),
        expected: T::type_name(),
        found: value.type_name(),
    })
}

fn convert_all<T: PropertyValue>(ctx: &SlotContext, values: &[Value]) -> CoreResult<Vec<T>> {
    values.iter().map(|v| convert(ctx, v)).collect()
}

/// Handle to a single-valued property.
pub struct Property<'e, T> {
    slot: &'e dyn PropertySlot,
    _marker: PhantomData<fn() -> T>,
}

impl<'e, T: PropertyValue> Property<'e, T> {
    pub(crate) fn new(slot: &'e dyn PropertySlot) -> Self {
        Self {
            slot,
            _marker: PhantomData,
        }
    }

    /// Property name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.slot.context().property()
    }

    /// Reads the value, falling back to the default; `None` if neither is
    /// present.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Configuration`] for a mandatory property that is unset
    ///   and has no default
    /// - [`CoreError::TypeMismatch`] if the stored value is not a `T`
    /// - [`CoreError::IllegalState`] once the entity is unreadable
    pub fn get(&self) -> CoreResult<Option<T>> {
        self.slot
            .get()?
            .map(|v| convert(self.slot.context(), &v))
            .transpose()
    }

    /// Reads a value that must be present.
    pub fn value(&self) -> CoreResult<T> {
        self.get()?.ok_or_else(|| {
            let ctx = self.slot.context();
            CoreError::configuration(ctx.entity_type(), ctx.property(), "property is unset")
        })
    }

    /// Writes the value.
    pub fn set(&self, value: T) -> CoreResult<()> {
        self.slot.set(Some(value.into_value()))
    }

    /// Unsets the value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConstraintViolation`] for mandatory properties.
    pub fn unset(&self) -> CoreResult<()> {
        self.slot.set(None)
    }

    /// Produces an initial value without storing it.
    pub fn create_value(&self, initial: Option<T>) -> CoreResult<Option<T>> {
        self.slot
            .create_value(initial.map(PropertyValue::into_value))?
            .map(|v| convert(self.slot.context(), &v))
            .transpose()
    }
}

/// Handle to a multi-valued property.
pub struct CollectionProperty<'e, T> {
    slot: &'e dyn CollectionSlot,
    _marker: PhantomData<fn() -> T>,
}

impl<'e, T: PropertyValue + Clone> CollectionProperty<'e, T> {
    pub(crate) fn new(slot: &'e dyn CollectionSlot) -> Self {
        Self {
            slot,
            _marker: PhantomData,
        }
    }

    /// Property name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.slot.context().property()
    }

    /// Reads all elements.
    pub fn get(&self) -> CoreResult<Vec<T>> {
        convert_all(self.slot.context(), &self.slot.get()?)
    }

    /// Number of elements.
    pub fn len(&self) -> CoreResult<usize> {
        Ok(self.slot.get()?.len())
    }

    /// Returns `true` if the collection holds no element.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.slot.get()?.is_empty())
    }

    /// Returns `true` if an equal element is present.
    pub fn contains(&self, element: &T) -> CoreResult<bool> {
        Ok(self.slot.get()?.contains(&element.clone().into_value()))
    }

    /// Adds an element; `false` if a set already held it.
    pub fn add(&self, element: T) -> CoreResult<bool> {
        self.slot.add(element.into_value())
    }

    /// Removes the first equal element.
    pub fn remove(&self, element: &T) -> CoreResult<bool> {
        self.slot.remove(&element.clone().into_value())
    }

    /// Adds every element.
    pub fn add_all(&self, elements: impl IntoIterator<Item = T>) -> CoreResult<bool> {
        self.slot
            .add_all(elements.into_iter().map(PropertyValue::into_value).collect())
    }

    /// Removes every occurrence of the given elements.
    pub fn remove_all(&self, elements: &[T]) -> CoreResult<bool> {
        self.slot.remove_all(&to_values(elements))
    }

    /// Keeps only the given elements.
    pub fn retain_all(&self, elements: &[T]) -> CoreResult<bool> {
        self.slot.retain_all(&to_values(elements))
    }

    /// Removes every element.
    pub fn clear(&self) -> CoreResult<()> {
        self.slot.clear()
    }

    /// Produces an element without adding it.
    pub fn create_element(&self, initial: Option<T>) -> CoreResult<T> {
        let element = self
            .slot
            .create_element(initial.map(PropertyValue::into_value))?;
        convert(self.slot.context(), &element)
    }
}

fn to_values<T: PropertyValue + Clone>(elements: &[T]) -> Vec<Value> {
    elements.iter().cloned().map(PropertyValue::into_value).collect()
}

fn check_target<E: EntityType>(ctx: &SlotContext, target: &Entity) -> CoreResult<()> {
    if target.is::<E>() {
        Ok(())
    } else {
        Err(CoreError::TypeMismatch {
            entity_type: ctx.entity_type().to_string(),
            property: ctx.property().to_string(),
            expected: E::TYPE_NAME,
            found: target.entity_type(),
        })
    }
}

/// Handle to a reference to one entity of type `E`.
///
/// The reference is stored as the target's identity; the target is loaded
/// with [`UnitOfWork::entity`](crate::UnitOfWork::entity).
pub struct Association<'e, E> {
    slot: &'e dyn PropertySlot,
    _marker: PhantomData<fn() -> E>,
}

impl<'e, E: EntityType> Association<'e, E> {
    pub(crate) fn new(slot: &'e dyn PropertySlot) -> Self {
        Self {
            slot,
            _marker: PhantomData,
        }
    }

    /// Identity of the referenced entity.
    pub fn get(&self) -> CoreResult<Option<EntityId>> {
        self.slot
            .get()?
            .map(|v| convert(self.slot.context(), &v))
            .transpose()
    }

    /// References `target`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeMismatch`] if `target` is not an `E`.
    pub fn set(&self, target: &Entity) -> CoreResult<()> {
        check_target::<E>(self.slot.context(), target)?;
        self.set_id(target.id().clone())
    }

    /// References the entity with identity `id`.
    pub fn set_id(&self, id: impl Into<EntityId>) -> CoreResult<()> {
        self.slot.set(Some(id.into().into_value()))
    }

    /// Removes the reference.
    pub fn clear(&self) -> CoreResult<()> {
        self.slot.set(None)
    }
}

/// Handle to a set of references to entities of type `E`.
pub struct ManyAssociation<'e, E> {
    slot: &'e dyn CollectionSlot,
    _marker: PhantomData<fn() -> E>,
}

impl<'e, E: EntityType> ManyAssociation<'e, E> {
    pub(crate) fn new(slot: &'e dyn CollectionSlot) -> Self {
        Self {
            slot,
            _marker: PhantomData,
        }
    }

    /// Identities of the referenced entities, in insertion order.
    pub fn ids(&self) -> CoreResult<Vec<EntityId>> {
        convert_all(self.slot.context(), &self.slot.get()?)
    }

    /// Returns `true` if `id` is referenced.
    pub fn contains(&self, id: &EntityId) -> CoreResult<bool> {
        Ok(self.slot.get()?.contains(&id.clone().into_value()))
    }

    /// Adds a reference to `target`; `false` if already present.
    pub fn add(&self, target: &Entity) -> CoreResult<bool> {
        check_target::<E>(self.slot.context(), target)?;
        self.add_id(target.id().clone())
    }

    /// Adds a reference by identity.
    pub fn add_id(&self, id: impl Into<EntityId>) -> CoreResult<bool> {
        self.slot.add(id.into().into_value())
    }

    /// Removes the reference to `id`.
    pub fn remove(&self, id: &EntityId) -> CoreResult<bool> {
        self.slot.remove(&id.clone().into_value())
    }

    /// Removes every reference.
    pub fn clear(&self) -> CoreResult<()> {
        self.slot.clear()
    }

    /// Number of references.
    pub fn len(&self) -> CoreResult<usize> {
        Ok(self.slot.get()?.len())
    }

    /// Returns `true` if nothing is referenced.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.slot.get()?.is_empty())
    }
}
