//! Concerns shipped with the core.

use super::{CollectionConcern, CollectionSlot, PropertyConcern, PropertySlot, SlotContext};
use crate::error::{CoreError, CoreResult};
use crate::event::{ChangeEvent, EventPublisher};
use crate::entity::PropertyValue;
use std::fmt;
use std::sync::Arc;
use unitdb_codec::Value;

type Check = Arc<dyn Fn(&Value) -> Option<bool> + Send + Sync>;

/// Named predicate over a stored value.
///
/// The check returns `None` when the value has the wrong type.
#[derive(Clone)]
struct Rule {
    name: String,
    expected: &'static str,
    check: Check,
}

impl Rule {
    fn typed<T: PropertyValue>(
        name: impl Into<String>,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            expected: T::type_name(),
            check: Arc::new(move |value| T::from_value(value).map(|v| predicate(&v))),
        }
    }

    fn verify(&self, ctx: &SlotContext, value: &Value) -> CoreResult<()> {
        match (self.check)(value) {
            Some(true) => Ok(()),
            Some(false) => Err(ctx.violation(self.name.clone())),
            None => Err(CoreError::TypeMismatch {
                entity_type: ctx.entity_type().to_string(),
                property: ctx.property().to_string(),
                expected: self.expected,
                found: value.type_name(),
            }),
        }
    }
}

/// Vetoes values of a single-valued slot that fail a predicate.
///
/// Unsetting is never vetoed here; mandatory properties are guarded by the
/// base slot.
#[derive(Clone)]
pub struct ConstraintConcern {
    rule: Rule,
}

impl ConstraintConcern {
    /// Creates a constraint named `name` over values of type `T`.
    pub fn new<T: PropertyValue>(
        name: impl Into<String>,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            rule: Rule::typed(name, predicate),
        }
    }

    /// Name of the constraint.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.rule.name
    }
}

impl fmt::Debug for ConstraintConcern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstraintConcern")
            .field("name", &self.rule.name)
            .finish_non_exhaustive()
    }
}

impl PropertyConcern for ConstraintConcern {
    fn set(&self, next: &dyn PropertySlot, value: Option<Value>) -> CoreResult<()> {
        if let Some(v) = value.as_ref().filter(|v| !v.is_null()) {
            self.rule.verify(next.context(), v)?;
        }
        next.set(value)
    }

    fn create_value(
        &self,
        next: &dyn PropertySlot,
        initial: Option<Value>,
    ) -> CoreResult<Option<Value>> {
        let created = next.create_value(initial)?;
        if let Some(v) = &created {
            self.rule.verify(next.context(), v)?;
        }
        Ok(created)
    }
}

/// Vetoes elements of a multi-valued slot that fail a predicate.
#[derive(Clone)]
pub struct ElementConstraintConcern {
    rule: Rule,
}

impl ElementConstraintConcern {
    /// Creates a constraint named `name` over elements of type `T`.
    pub fn new<T: PropertyValue>(
        name: impl Into<String>,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            rule: Rule::typed(name, predicate),
        }
    }
}

impl fmt::Debug for ElementConstraintConcern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementConstraintConcern")
            .field("name", &self.rule.name)
            .finish_non_exhaustive()
    }
}

impl CollectionConcern for ElementConstraintConcern {
    fn add(&self, next: &dyn CollectionSlot, element: Value) -> CoreResult<bool> {
        self.rule.verify(next.context(), &element)?;
        next.add(element)
    }

    fn add_all(&self, next: &dyn CollectionSlot, elements: Vec<Value>) -> CoreResult<bool> {
        // All or nothing: verify before the first element lands.
        for element in &elements {
            self.rule.verify(next.context(), element)?;
        }
        next.add_all(elements)
    }

    fn create_element(&self, next: &dyn CollectionSlot, initial: Option<Value>) -> CoreResult<Value> {
        let element = next.create_element(initial)?;
        self.rule.verify(next.context(), &element)?;
        Ok(element)
    }
}

/// Publishes a [`ChangeEvent`] after a successful mutation that changed the
/// stored value.
#[derive(Clone)]
pub struct ChangeNotificationConcern {
    publisher: Arc<dyn EventPublisher>,
}

impl ChangeNotificationConcern {
    /// Creates a concern publishing to `publisher`.
    #[must_use]
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }

    fn observe<R>(
        &self,
        ctx: &SlotContext,
        mutation: impl FnOnce() -> CoreResult<R>,
    ) -> CoreResult<R> {
        let old = ctx.stored();
        let result = mutation()?;
        let new = ctx.stored();
        if old != new {
            tracing::trace!(
                entity_type = ctx.entity_type(),
                property = ctx.property(),
                "publishing change event"
            );
            self.publisher.publish(ChangeEvent {
                entity_type: ctx.entity_type(),
                entity_id: ctx.entity_id().clone(),
                property: ctx.property().to_string(),
                old,
                new,
            });
        }
        Ok(result)
    }
}

impl fmt::Debug for ChangeNotificationConcern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotificationConcern").finish_non_exhaustive()
    }
}

impl PropertyConcern for ChangeNotificationConcern {
    fn set(&self, next: &dyn PropertySlot, value: Option<Value>) -> CoreResult<()> {
        self.observe(next.context(), || next.set(value))
    }
}

impl CollectionConcern for ChangeNotificationConcern {
    fn add(&self, next: &dyn CollectionSlot, element: Value) -> CoreResult<bool> {
        self.observe(next.context(), || next.add(element))
    }

    fn remove(&self, next: &dyn CollectionSlot, element: &Value) -> CoreResult<bool> {
        self.observe(next.context(), || next.remove(element))
    }

    fn add_all(&self, next: &dyn CollectionSlot, elements: Vec<Value>) -> CoreResult<bool> {
        self.observe(next.context(), || next.add_all(elements))
    }

    fn remove_all(&self, next: &dyn CollectionSlot, elements: &[Value]) -> CoreResult<bool> {
        self.observe(next.context(), || next.remove_all(elements))
    }

    fn retain_all(&self, next: &dyn CollectionSlot, elements: &[Value]) -> CoreResult<bool> {
        self.observe(next.context(), || next.retain_all(elements))
    }

    fn clear(&self, next: &dyn CollectionSlot) -> CoreResult<()> {
        self.observe(next.context(), || next.clear())
    }
}
