//! Typed filter expressions.

use crate::entity::{
    AssociationKey, ElementTemplate, Entity, EntityType, PropertyKey, PropertyValue, SlotTemplate,
    ValueTemplate,
};
use std::fmt;
use unitdb_codec::Value;
use unitdb_store::{CompareOp, Predicate, STARTS_WITH};

/// A boolean filter over the properties of one entity type.
///
/// Expressions are built from slot keys, so operands are checked against
/// the slot's type at compile time:
///
/// ```rust
/// use unitdb_core::{Expression, PropertyKey};
///
/// const NAME: PropertyKey<String> = PropertyKey::new("name");
/// const AGE: PropertyKey<i64> = PropertyKey::new("age");
///
/// let adults_named_ulli = Expression::eq(NAME, "Ulli").and(Expression::ge(AGE, 18));
/// assert_eq!(adults_named_ulli.to_string(), "(name == \"Ulli\" AND age >= 18)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Expression(Predicate);

impl Expression {
    /// Matches every entity.
    pub const TRUE: Expression = Expression(Predicate::True);

    fn compare<K: ValueTemplate>(key: K, op: CompareOp, value: impl Into<K::Value>) -> Self {
        Self(Predicate::compare(key.slot_name(), op, value.into().into_value()))
    }

    /// The slot equals `value`.
    pub fn eq<K: ValueTemplate>(key: K, value: impl Into<K::Value>) -> Self {
        Self::compare(key, CompareOp::Eq, value)
    }

    /// The slot differs from `value`; an unset slot differs from any value.
    pub fn ne<K: ValueTemplate>(key: K, value: impl Into<K::Value>) -> Self {
        Self::compare(key, CompareOp::Ne, value)
    }

    /// The slot is less than `value`.
    pub fn lt<K: ValueTemplate>(key: K, value: impl Into<K::Value>) -> Self {
        Self::compare(key, CompareOp::Lt, value)
    }

    /// The slot is less than or equal to `value`.
    pub fn le<K: ValueTemplate>(key: K, value: impl Into<K::Value>) -> Self {
        Self::compare(key, CompareOp::Le, value)
    }

    /// The slot is greater than `value`.
    pub fn gt<K: ValueTemplate>(key: K, value: impl Into<K::Value>) -> Self {
        Self::compare(key, CompareOp::Gt, value)
    }

    /// The slot is greater than or equal to `value`.
    pub fn ge<K: ValueTemplate>(key: K, value: impl Into<K::Value>) -> Self {
        Self::compare(key, CompareOp::Ge, value)
    }

    /// The slot holds a value.
    pub fn is_set(key: impl SlotTemplate) -> Self {
        Self(Predicate::IsSet(key.slot_name().to_string()))
    }

    /// The slot holds no value.
    pub fn is_not_set(key: impl SlotTemplate) -> Self {
        Self(Predicate::IsNotSet(key.slot_name().to_string()))
    }

    /// The collection or many-association holds `element`.
    pub fn contains<K: ElementTemplate>(key: K, element: impl Into<K::Element>) -> Self {
        Self(Predicate::Contains {
            field: key.slot_name().to_string(),
            value: element.into().into_value(),
        })
    }

    /// The association references `target`.
    ///
    /// This is the inverse side of a relation: all entities pointing at
    /// `target`.
    pub fn association_eq<E: EntityType>(key: AssociationKey<E>, target: &Entity) -> Self {
        Self::eq(key, target.id().clone())
    }

    /// The text property starts with `prefix`.
    pub fn starts_with(key: PropertyKey<String>, prefix: impl Into<String>) -> Self {
        Self::custom(STARTS_WITH, key, prefix.into())
    }

    /// A store-specific operator.
    ///
    /// Only stores that declare support evaluate it; the core evaluates
    /// `starts_with` itself and rejects any other operator it has to
    /// evaluate in memory.
    pub fn custom(op: impl Into<String>, key: impl SlotTemplate, value: impl Into<Value>) -> Self {
        Self(Predicate::Custom {
            op: op.into(),
            field: key.slot_name().to_string(),
            value: value.into(),
        })
    }

    /// Both expressions hold.
    #[must_use]
    pub fn and(self, other: Expression) -> Self {
        Self(Predicate::and(self.0, other.0))
    }

    /// Either expression holds.
    #[must_use]
    pub fn or(self, other: Expression) -> Self {
        Self(Predicate::or(self.0, other.0))
    }

    /// The expression does not hold.
    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(self) -> Self {
        Self(Predicate::not(self.0))
    }

    /// Returns the underlying predicate.
    #[must_use]
    pub fn predicate(&self) -> &Predicate {
        &self.0
    }

    /// Consumes the expression, returning the predicate.
    #[must_use]
    pub fn into_predicate(self) -> Predicate {
        self.0
    }
}

impl From<Predicate> for Expression {
    fn from(predicate: Predicate) -> Self {
        Self(predicate)
    }
}

impl From<Expression> for Predicate {
    fn from(expression: Expression) -> Self {
        expression.0
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
