//! Entity type descriptions.
//!
//! An entity type describes its slots once through a [`ModelBuilder`]; the
//! repository turns that description into an [`EntityDescriptor`] at
//! registration and every entity of the type is assembled from it.

use super::id::EntityId;
use super::key::{AssociationKey, CollectionKey, ManyAssociationKey, PropertyKey, PropertyValue};
use crate::concern::{
    ChangeNotificationConcern, CollectionConcern, ConstraintConcern, ElementConstraintConcern,
    PropertyConcern,
};
use crate::error::{CoreError, CoreResult};
use crate::event::EventPublisher;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use unitdb_codec::Value;

/// Produces a fresh value for defaults.
pub type ValueFactory = Arc<dyn Fn() -> Value + Send + Sync>;

/// A persistent entity type.
///
/// ```rust
/// use unitdb_core::{EntityType, ModelBuilder, PropertyKey};
///
/// struct Person;
///
/// impl Person {
///     const NAME: PropertyKey<String> = PropertyKey::new("name");
///     const AGE: PropertyKey<i64> = PropertyKey::new("age");
/// }
///
/// impl EntityType for Person {
///     const TYPE_NAME: &'static str = "Person";
///
///     fn describe(model: &mut ModelBuilder) {
///         model.property(Self::NAME).mandatory();
///         model
///             .property(Self::AGE)
///             .default_value(|| 18)
///             .constraint("non-negative", |age: &i64| *age >= 0);
///     }
/// }
/// ```
pub trait EntityType: Send + Sync + 'static {
    /// Name under which records of this type are stored.
    const TYPE_NAME: &'static str;

    /// Declares the slots of the type.
    fn describe(model: &mut ModelBuilder);
}

/// What a slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// A single value.
    Property,
    /// Multiple values; `unique` collections ignore duplicates.
    Collection {
        /// Whether duplicates are ignored.
        unique: bool,
    },
    /// Identity of one entity of `target`.
    Association {
        /// Target entity type.
        target: &'static str,
    },
    /// Identities of entities of `target`.
    ManyAssociation {
        /// Target entity type.
        target: &'static str,
    },
}

impl SlotKind {
    /// Returns `true` for slots served by a single-valued chain.
    #[must_use]
    pub const fn is_single(self) -> bool {
        matches!(self, Self::Property | Self::Association { .. })
    }

    const fn target(self) -> Option<&'static str> {
        match self {
            Self::Association { target } | Self::ManyAssociation { target } => Some(target),
            Self::Property | Self::Collection { .. } => None,
        }
    }
}

/// Description of one slot.
#[derive(Clone)]
pub struct SlotDescriptor {
    name: &'static str,
    kind: SlotKind,
    mandatory: bool,
    default: Option<ValueFactory>,
    element_default: Option<ValueFactory>,
    property_concerns: Vec<Arc<dyn PropertyConcern>>,
    collection_concerns: Vec<Arc<dyn CollectionConcern>>,
    notify: bool,
}

impl SlotDescriptor {
    fn new(name: &'static str, kind: SlotKind) -> Self {
        Self {
            name,
            kind,
            mandatory: false,
            default: None,
            element_default: None,
            property_concerns: Vec::new(),
            collection_concerns: Vec::new(),
            notify: false,
        }
    }

    /// Slot name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// What the slot holds.
    #[must_use]
    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    /// Whether the slot must be set on commit.
    #[must_use]
    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    /// Whether the slot has a default value.
    #[must_use]
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Whether changes are published.
    #[must_use]
    pub fn notifies_changes(&self) -> bool {
        self.notify
    }

    /// Number of concerns in front of the base slot.
    #[must_use]
    pub fn concern_count(&self) -> usize {
        self.property_concerns.len() + self.collection_concerns.len()
    }

    pub(crate) fn default_factory(&self) -> Option<ValueFactory> {
        self.default.clone()
    }

    pub(crate) fn element_default_factory(&self) -> Option<ValueFactory> {
        self.element_default.clone()
    }

    pub(crate) fn property_concerns(&self) -> &[Arc<dyn PropertyConcern>] {
        &self.property_concerns
    }

    pub(crate) fn collection_concerns(&self) -> &[Arc<dyn CollectionConcern>] {
        &self.collection_concerns
    }
}

impl fmt::Debug for SlotDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("mandatory", &self.mandatory)
            .field("default", &self.default.is_some())
            .field("concerns", &self.concern_count())
            .field("notify", &self.notify)
            .finish()
    }
}

/// Collects slot declarations for one entity type.
pub struct ModelBuilder {
    type_name: &'static str,
    slots: Vec<SlotDescriptor>,
    error: Option<CoreError>,
}

impl ModelBuilder {
    fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            slots: Vec::new(),
            error: None,
        }
    }

    /// Entity type being described.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn add(&mut self, name: &'static str, kind: SlotKind) -> &mut SlotDescriptor {
        if self.error.is_none() && self.slots.iter().any(|s| s.name == name) {
            self.error = Some(CoreError::invalid_model(
                self.type_name,
                format!("slot `{name}` is declared twice"),
            ));
        }
        self.slots.push(SlotDescriptor::new(name, kind));
        let last = self.slots.len() - 1;
        &mut self.slots[last]
    }

    /// Declares a single-valued property.
    pub fn property<T: PropertyValue>(&mut self, key: PropertyKey<T>) -> PropertyBuilder<'_, T> {
        PropertyBuilder::new(self.add(key.name(), SlotKind::Property))
    }

    /// Declares a collection that keeps duplicates.
    pub fn collection<T: PropertyValue>(
        &mut self,
        key: CollectionKey<T>,
    ) -> CollectionBuilder<'_, T> {
        CollectionBuilder::new(self.add(key.name(), SlotKind::Collection { unique: false }))
    }

    /// Declares a collection that ignores duplicates.
    pub fn set<T: PropertyValue>(&mut self, key: CollectionKey<T>) -> CollectionBuilder<'_, T> {
        CollectionBuilder::new(self.add(key.name(), SlotKind::Collection { unique: true }))
    }

    /// Declares a reference to an entity of type `E`.
    pub fn association<E: EntityType>(
        &mut self,
        key: AssociationKey<E>,
    ) -> PropertyBuilder<'_, EntityId> {
        PropertyBuilder::new(self.add(
            key.name(),
            SlotKind::Association {
                target: E::TYPE_NAME,
            },
        ))
    }

    /// Declares a set of references to entities of type `E`.
    pub fn many_association<E: EntityType>(
        &mut self,
        key: ManyAssociationKey<E>,
    ) -> CollectionBuilder<'_, EntityId> {
        CollectionBuilder::new(self.add(
            key.name(),
            SlotKind::ManyAssociation {
                target: E::TYPE_NAME,
            },
        ))
    }
}

/// Options of a single-valued slot.
pub struct PropertyBuilder<'m, T> {
    slot: &'m mut SlotDescriptor,
    _marker: PhantomData<fn() -> T>,
}

impl<'m, T: PropertyValue> PropertyBuilder<'m, T> {
    fn new(slot: &'m mut SlotDescriptor) -> Self {
        Self {
            slot,
            _marker: PhantomData,
        }
    }

    /// Requires the property to be set (or defaulted) on commit, and
    /// forbids unsetting it.
    pub fn mandatory(self) -> Self {
        self.slot.mandatory = true;
        self
    }

    /// Value used while the property is unset; resolved into the stored
    /// record on insert.
    pub fn default_value(self, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.slot.default = Some(Arc::new(move || factory().into_value()));
        self
    }

    /// Appends a concern; concerns added first run first.
    pub fn concern(self, concern: impl PropertyConcern + 'static) -> Self {
        self.slot.property_concerns.push(Arc::new(concern));
        self
    }

    /// Appends a [`ConstraintConcern`].
    pub fn constraint(
        self,
        name: impl Into<String>,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.concern(ConstraintConcern::new(name, predicate))
    }

    /// Publishes changes to the repository's event publisher.
    pub fn notify_changes(self) -> Self {
        self.slot.notify = true;
        self
    }
}

/// Options of a multi-valued slot.
pub struct CollectionBuilder<'m, T> {
    slot: &'m mut SlotDescriptor,
    _marker: PhantomData<fn() -> T>,
}

impl<'m, T: PropertyValue> CollectionBuilder<'m, T> {
    fn new(slot: &'m mut SlotDescriptor) -> Self {
        Self {
            slot,
            _marker: PhantomData,
        }
    }

    /// Element produced by `create_element` without an initial value.
    pub fn element_default(self, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.slot.element_default = Some(Arc::new(move || factory().into_value()));
        self
    }

    /// Appends a concern; concerns added first run first.
    pub fn concern(self, concern: impl CollectionConcern + 'static) -> Self {
        self.slot.collection_concerns.push(Arc::new(concern));
        self
    }

    /// Appends an [`ElementConstraintConcern`].
    pub fn element_constraint(
        self,
        name: impl Into<String>,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.concern(ElementConstraintConcern::new(name, predicate))
    }

    /// Publishes changes to the repository's event publisher.
    pub fn notify_changes(self) -> Self {
        self.slot.notify = true;
        self
    }
}

/// Registered description of an entity type.
#[derive(Debug)]
pub struct EntityDescriptor {
    type_name: &'static str,
    slots: Vec<SlotDescriptor>,
    index: HashMap<&'static str, usize>,
}

impl EntityDescriptor {
    /// Runs `T::describe` and binds notification concerns to `publisher`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidModel`] if a slot name is declared twice.
    pub(crate) fn describe<T: EntityType>(
        publisher: Option<&Arc<dyn EventPublisher>>,
    ) -> CoreResult<Self> {
        let mut model = ModelBuilder::new(T::TYPE_NAME);
        T::describe(&mut model);
        if let Some(err) = model.error {
            return Err(err);
        }

        let mut slots = model.slots;
        if let Some(publisher) = publisher {
            let notify = ChangeNotificationConcern::new(Arc::clone(publisher));
            for slot in slots.iter_mut().filter(|s| s.notify) {
                // Outermost, so it only sees mutations every other link accepted.
                if slot.kind.is_single() {
                    slot.property_concerns.insert(0, Arc::new(notify.clone()));
                } else {
                    slot.collection_concerns.insert(0, Arc::new(notify.clone()));
                }
            }
        }

        let index = slots
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name, i))
            .collect();
        Ok(Self {
            type_name: T::TYPE_NAME,
            slots,
            index,
        })
    }

    /// Entity type name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Slots in declaration order.
    #[must_use]
    pub fn slots(&self) -> &[SlotDescriptor] {
        &self.slots
    }

    /// Looks up a slot by name.
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<&SlotDescriptor> {
        self.index.get(name).map(|&i| &self.slots[i])
    }

    pub(crate) fn slot_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Entity types referenced by associations.
    pub(crate) fn targets(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.slots.iter().filter_map(|s| s.kind.target())
    }
}
