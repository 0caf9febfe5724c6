//! Concern chains.
//!
//! Every slot of an entity is served by a chain: zero or more concerns
//! followed by the base slot that reads and writes the entity state. A
//! concern sees each operation before the next link, and may delegate,
//! transform the arguments or veto by returning an error.
//!
//! Chains are assembled once when the entity is materialized, from the
//! concern list of the slot descriptor (outermost first), and are never
//! mutated afterwards.
//!
//! ```rust
//! use unitdb_codec::Value;
//! use unitdb_core::{CoreResult, PropertyConcern, PropertySlot};
//!
//! /// Trims text before it is stored.
//! struct Trim;
//!
//! impl PropertyConcern for Trim {
//!     fn set(&self, next: &dyn PropertySlot, value: Option<Value>) -> CoreResult<()> {
//!         let value = value.map(|v| match v {
//!             Value::Text(text) => Value::Text(text.trim().to_string()),
//!             other => other,
//!         });
//!         next.set(value)
//!     }
//! }
//! ```

mod base;
mod builtin;

pub(crate) use base::{BaseCollectionSlot, BasePropertySlot};
pub use builtin::{ChangeNotificationConcern, ConstraintConcern, ElementConstraintConcern};

use crate::entity::{EntityId, EntityState};
use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use std::sync::Arc;
use unitdb_codec::Value;

/// Identifies the slot a chain serves and gives concerns a raw view of it.
pub struct SlotContext {
    entity_type: &'static str,
    entity_id: EntityId,
    property: &'static str,
    state: Arc<Mutex<EntityState>>,
}

impl SlotContext {
    pub(crate) fn new(
        entity_type: &'static str,
        entity_id: EntityId,
        property: &'static str,
        state: Arc<Mutex<EntityState>>,
    ) -> Self {
        Self {
            entity_type,
            entity_id,
            property,
            state,
        }
    }

    /// Entity type name.
    #[must_use]
    pub fn entity_type(&self) -> &'static str {
        self.entity_type
    }

    /// Identity of the entity.
    #[must_use]
    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// Slot name.
    #[must_use]
    pub fn property(&self) -> &'static str {
        self.property
    }

    /// The stored value, bypassing defaults and lifecycle checks.
    #[must_use]
    pub fn stored(&self) -> Option<Value> {
        self.state.lock().values.get(self.property).cloned()
    }

    /// Runs `f` on the state if the entity is readable.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&EntityState) -> R) -> CoreResult<R> {
        let state = self.state.lock();
        if !state.readable {
            return Err(CoreError::illegal_state(format!(
                "{} {} is no longer readable",
                self.entity_type, self.entity_id
            )));
        }
        Ok(f(&state))
    }

    /// Runs `f` on the state if the entity is mutable.
    pub(crate) fn mutate<R>(&self, f: impl FnOnce(&mut EntityState) -> R) -> CoreResult<R> {
        let mut state = self.state.lock();
        if !state.readable || !state.status.is_mutable() {
            return Err(CoreError::illegal_state(format!(
                "{} {} is {} and cannot be modified",
                self.entity_type, self.entity_id, state.status
            )));
        }
        Ok(f(&mut state))
    }

    /// Builds a constraint violation error for this slot.
    #[must_use]
    pub fn violation(&self, constraint: impl Into<String>) -> CoreError {
        CoreError::constraint_violation(self.entity_type, self.property, constraint)
    }
}

/// One link of a single-valued slot chain.
pub trait PropertySlot: Send + Sync {
    /// The slot this chain serves.
    fn context(&self) -> &SlotContext;

    /// Reads the value; `None` is unset.
    fn get(&self) -> CoreResult<Option<Value>>;

    /// Writes the value; `None` unsets it.
    fn set(&self, value: Option<Value>) -> CoreResult<()>;

    /// Produces an initial value from `initial` or the declared default.
    fn create_value(&self, initial: Option<Value>) -> CoreResult<Option<Value>>;
}

/// One link of a multi-valued slot chain.
pub trait CollectionSlot: Send + Sync {
    /// The slot this chain serves.
    fn context(&self) -> &SlotContext;

    /// Reads the elements in insertion order.
    fn get(&self) -> CoreResult<Vec<Value>>;

    /// Adds an element; returns `true` if the collection changed.
    fn add(&self, element: Value) -> CoreResult<bool>;

    /// Removes the first equal element; returns `true` if one was found.
    fn remove(&self, element: &Value) -> CoreResult<bool>;

    /// Adds every element; returns `true` if the collection changed.
    fn add_all(&self, elements: Vec<Value>) -> CoreResult<bool>;

    /// Removes every occurrence of the given elements.
    fn remove_all(&self, elements: &[Value]) -> CoreResult<bool>;

    /// Keeps only elements equal to one of the given elements.
    fn retain_all(&self, elements: &[Value]) -> CoreResult<bool>;

    /// Removes all elements.
    fn clear(&self) -> CoreResult<()>;

    /// Produces a new element from `initial` or the declared element default.
    fn create_element(&self, initial: Option<Value>) -> CoreResult<Value>;
}

/// Interceptor for single-valued slots.
///
/// Every method receives the next link and delegates to it by default, so an
/// implementation overrides only what it intercepts.
pub trait PropertyConcern: Send + Sync {
    /// Intercepts a read.
    fn get(&self, next: &dyn PropertySlot) -> CoreResult<Option<Value>> {
        next.get()
    }

    /// Intercepts a write.
    fn set(&self, next: &dyn PropertySlot, value: Option<Value>) -> CoreResult<()> {
        next.set(value)
    }

    /// Intercepts initial value creation.
    fn create_value(
        &self,
        next: &dyn PropertySlot,
        initial: Option<Value>,
    ) -> CoreResult<Option<Value>> {
        next.create_value(initial)
    }
}

/// Interceptor for multi-valued slots.
pub trait CollectionConcern: Send + Sync {
    /// Intercepts a read.
    fn get(&self, next: &dyn CollectionSlot) -> CoreResult<Vec<Value>> {
        next.get()
    }

    /// Intercepts `add`.
    fn add(&self, next: &dyn CollectionSlot, element: Value) -> CoreResult<bool> {
        next.add(element)
    }

    /// Intercepts `remove`.
    fn remove(&self, next: &dyn CollectionSlot, element: &Value) -> CoreResult<bool> {
        next.remove(element)
    }

    /// Intercepts `add_all`.
    fn add_all(&self, next: &dyn CollectionSlot, elements: Vec<Value>) -> CoreResult<bool> {
        next.add_all(elements)
    }

    /// Intercepts `remove_all`.
    fn remove_all(&self, next: &dyn CollectionSlot, elements: &[Value]) -> CoreResult<bool> {
        next.remove_all(elements)
    }

    /// Intercepts `retain_all`.
    fn retain_all(&self, next: &dyn CollectionSlot, elements: &[Value]) -> CoreResult<bool> {
        next.retain_all(elements)
    }

    /// Intercepts `clear`.
    fn clear(&self, next: &dyn CollectionSlot) -> CoreResult<()> {
        next.clear()
    }

    /// Intercepts element creation.
    fn create_element(&self, next: &dyn CollectionSlot, initial: Option<Value>) -> CoreResult<Value> {
        next.create_element(initial)
    }
}

/// A concern bound to the rest of its chain.
pub struct ConcernLink {
    concern: Arc<dyn PropertyConcern>,
    next: Box<dyn PropertySlot>,
}

impl ConcernLink {
    /// Places `concern` in front of `next`.
    #[must_use]
    pub fn new(concern: Arc<dyn PropertyConcern>, next: Box<dyn PropertySlot>) -> Self {
        Self { concern, next }
    }
}

impl PropertySlot for ConcernLink {
    fn context(&self) -> &SlotContext {
        self.next.context()
    }

    fn get(&self) -> CoreResult<Option<Value>> {
        self.concern.get(self.next.as_ref())
    }

    fn set(&self, value: Option<Value>) -> CoreResult<()> {
        self.concern.set(self.next.as_ref(), value)
    }

    fn create_value(&self, initial: Option<Value>) -> CoreResult<Option<Value>> {
        self.concern.create_value(self.next.as_ref(), initial)
    }
}

/// A collection concern bound to the rest of its chain.
pub struct CollectionConcernLink {
    concern: Arc<dyn CollectionConcern>,
    next: Box<dyn CollectionSlot>,
}

impl CollectionConcernLink {
    /// Places `concern` in front of `next`.
    #[must_use]
    pub fn new(concern: Arc<dyn CollectionConcern>, next: Box<dyn CollectionSlot>) -> Self {
        Self { concern, next }
    }
}

impl CollectionSlot for CollectionConcernLink {
    fn context(&self) -> &SlotContext {
        self.next.context()
    }

    fn get(&self) -> CoreResult<Vec<Value>> {
        self.concern.get(self.next.as_ref())
    }

    fn add(&self, element: Value) -> CoreResult<bool> {
        self.concern.add(self.next.as_ref(), element)
    }

    fn remove(&self, element: &Value) -> CoreResult<bool> {
        self.concern.remove(self.next.as_ref(), element)
    }

    fn add_all(&self, elements: Vec<Value>) -> CoreResult<bool> {
        self.concern.add_all(self.next.as_ref(), elements)
    }

    fn remove_all(&self, elements: &[Value]) -> CoreResult<bool> {
        self.concern.remove_all(self.next.as_ref(), elements)
    }

    fn retain_all(&self, elements: &[Value]) -> CoreResult<bool> {
        self.concern.retain_all(self.next.as_ref(), elements)
    }

    fn clear(&self) -> CoreResult<()> {
        self.concern.clear(self.next.as_ref())
    }

    fn create_element(&self, initial: Option<Value>) -> CoreResult<Value> {
        self.concern.create_element(self.next.as_ref(), initial)
    }
}

/// Wraps `base` in `concerns`, the first concern ending up outermost.
pub(crate) fn property_chain(
    base: Box<dyn PropertySlot>,
    concerns: &[Arc<dyn PropertyConcern>],
) -> Box<dyn PropertySlot> {
    concerns
        .iter()
        .rev()
        .fold(base, |next, concern| -> Box<dyn PropertySlot> {
            Box::new(ConcernLink::new(Arc::clone(concern), next))
        })
}

/// Wraps `base` in `concerns`, the first concern ending up outermost.
pub(crate) fn collection_chain(
    base: Box<dyn CollectionSlot>,
    concerns: &[Arc<dyn CollectionConcern>],
) -> Box<dyn CollectionSlot> {
    concerns
        .iter()
        .rev()
        .fold(base, |next, concern| -> Box<dyn CollectionSlot> {
            Box::new(CollectionConcernLink::new(Arc::clone(concern), next))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use unitdb_codec::Record;

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl PropertyConcern for Recorder {
        fn set(&self, next: &dyn PropertySlot, value: Option<Value>) -> CoreResult<()> {
            self.log.lock().push(format!("{} before", self.label));
            next.set(value)?;
            self.log.lock().push(format!("{} after", self.label));
            Ok(())
        }
    }

    struct Veto;

    impl PropertyConcern for Veto {
        fn set(&self, next: &dyn PropertySlot, value: Option<Value>) -> CoreResult<()> {
            if value == Some(Value::from("forbidden")) {
                return Err(next.context().violation("veto"));
            }
            next.set(value)
        }
    }

    fn base(state: &Arc<Mutex<EntityState>>) -> Box<dyn PropertySlot> {
        let ctx = SlotContext::new("Person", EntityId::from("p-1"), "name", Arc::clone(state));
        Box::new(BasePropertySlot::new(ctx, false, None))
    }

    #[test]
    fn outermost_concern_runs_first() {
        let state = Arc::new(Mutex::new(EntityState::created(Record::new())));
        let log = Arc::new(Mutex::new(Vec::new()));
        let concerns: Vec<Arc<dyn PropertyConcern>> = vec![
            Arc::new(Recorder {
                label: "outer",
                log: Arc::clone(&log),
            }),
            Arc::new(Recorder {
                label: "inner",
                log: Arc::clone(&log),
            }),
        ];
        let chain = property_chain(base(&state), &concerns);

        chain.set(Some(Value::from("Ulli"))).unwrap();

        assert_eq!(
            *log.lock(),
            vec!["outer before", "inner before", "inner after", "outer after"]
        );
        assert_eq!(chain.get().unwrap(), Some(Value::from("Ulli")));
        assert_eq!(chain.context().property(), "name");
    }

    #[test]
    fn veto_leaves_state_untouched() {
        let state = Arc::new(Mutex::new(EntityState::created(Record::new())));
        let concerns: Vec<Arc<dyn PropertyConcern>> = vec![Arc::new(Veto)];
        let chain = property_chain(base(&state), &concerns);

        chain.set(Some(Value::from("Ulli"))).unwrap();
        let err = chain.set(Some(Value::from("forbidden"))).unwrap_err();

        assert!(matches!(err, CoreError::ConstraintViolation { .. }));
        assert_eq!(chain.get().unwrap(), Some(Value::from("Ulli")));
    }

    #[test]
    fn unreadable_state_rejects_access() {
        let state = Arc::new(Mutex::new(EntityState::created(Record::new())));
        let chain = base(&state);
        state.lock().submit(false);

        assert!(matches!(chain.get(), Err(CoreError::IllegalState { .. })));
        assert!(matches!(
            chain.set(Some(Value::from("x"))),
            Err(CoreError::IllegalState { .. })
        ));
    }
}
