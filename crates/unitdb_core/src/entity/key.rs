//! Typed slot keys and value conversions.
//!
//! Keys are declared once per entity type, usually as associated constants,
//! and serve both as accessors and as query templates:
//!
//! ```rust
//! use unitdb_core::{CollectionKey, PropertyKey};
//!
//! struct Person;
//! impl Person {
//!     const NAME: PropertyKey<String> = PropertyKey::new("name");
//!     const TAGS: CollectionKey<String> = CollectionKey::new("tags");
//! }
//! assert_eq!(Person::NAME.name(), "name");
//! ```

use super::descriptor::EntityType;
use super::id::EntityId;
use std::fmt;
use std::marker::PhantomData;
use unitdb_codec::Value;

/// Conversion between a Rust type and a stored [`Value`].
pub trait PropertyValue: Sized + Send + Sync + 'static {
    /// Converts into a stored value.
    fn into_value(self) -> Value;

    /// Converts from a stored value, or `None` on a type mismatch.
    fn from_value(value: &Value) -> Option<Self>;

    /// Type name used in mismatch errors.
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl PropertyValue for String {
    fn into_value(self) -> Value {
        Value::Text(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_text().map(str::to_string)
    }
}

impl PropertyValue for i64 {
    fn into_value(self) -> Value {
        Value::Integer(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_integer()
    }
}

impl PropertyValue for i32 {
    fn into_value(self) -> Value {
        Value::from(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_integer().and_then(|n| i32::try_from(n).ok())
    }
}

impl PropertyValue for u32 {
    fn into_value(self) -> Value {
        Value::from(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_integer().and_then(|n| u32::try_from(n).ok())
    }
}

impl PropertyValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl PropertyValue for Vec<u8> {
    fn into_value(self) -> Value {
        Value::Bytes(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bytes().map(<[u8]>::to_vec)
    }
}

impl PropertyValue for EntityId {
    fn into_value(self) -> Value {
        Value::Text(self.into_string())
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_text().map(EntityId::from)
    }
}

impl PropertyValue for Value {
    fn into_value(self) -> Value {
        self
    }

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

/// Anything naming a slot of an entity type.
pub trait SlotTemplate {
    /// Name of the slot.
    fn slot_name(&self) -> &'static str;
}

/// A single-valued slot usable in comparisons.
pub trait ValueTemplate: SlotTemplate {
    /// Type of the slot's value.
    type Value: PropertyValue;
}

/// A multi-valued slot usable in membership tests.
pub trait ElementTemplate: SlotTemplate {
    /// Type of the slot's elements.
    type Element: PropertyValue;
}

macro_rules! slot_key {
    ($(#[$meta:meta])* $name:ident<$param:ident $(: $bound:path)?>) => {
        $(#[$meta])*
        pub struct $name<$param $(: $bound)?> {
            name: &'static str,
            _marker: PhantomData<fn() -> $param>,
        }

        impl<$param $(: $bound)?> $name<$param> {
            /// Declares a key for the slot called `name`.
            #[must_use]
            pub const fn new(name: &'static str) -> Self {
                Self {
                    name,
                    _marker: PhantomData,
                }
            }

            /// Returns the slot name.
            #[must_use]
            pub const fn name(&self) -> &'static str {
                self.name
            }
        }

        impl<$param $(: $bound)?> Clone for $name<$param> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<$param $(: $bound)?> Copy for $name<$param> {}

        impl<$param $(: $bound)?> fmt::Debug for $name<$param> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.name)
            }
        }

        impl<$param $(: $bound)?> SlotTemplate for $name<$param> {
            fn slot_name(&self) -> &'static str {
                self.name
            }
        }
    };
}

slot_key!(
    /// Key of a single-valued property.
    PropertyKey<T>
);
slot_key!(
    /// Key of a multi-valued property.
    CollectionKey<T>
);
slot_key!(
    /// Key of a reference to another entity, stored as its identity.
    AssociationKey<E: EntityType>
);
slot_key!(
    /// Key of a set of references to other entities.
    ManyAssociationKey<E: EntityType>
);

impl<T: PropertyValue> ValueTemplate for PropertyKey<T> {
    type Value = T;
}

impl<E: EntityType> ValueTemplate for AssociationKey<E> {
    type Value = EntityId;
}

impl<T: PropertyValue> ElementTemplate for CollectionKey<T> {
    type Element = T;
}

impl<E: EntityType> ElementTemplate for ManyAssociationKey<E> {
    type Element = EntityId;
}
