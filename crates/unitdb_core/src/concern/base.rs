//! Innermost links: read and write the entity state.

use super::{CollectionSlot, PropertySlot, SlotContext};
use crate::entity::ValueFactory;
use crate::error::{CoreError, CoreResult};
use unitdb_codec::Value;

/// Base of a single-valued chain.
pub(crate) struct BasePropertySlot {
    ctx: SlotContext,
    mandatory: bool,
    default: Option<ValueFactory>,
}

impl BasePropertySlot {
    pub(crate) fn new(ctx: SlotContext, mandatory: bool, default: Option<ValueFactory>) -> Self {
        Self {
            ctx,
            mandatory,
            default,
        }
    }

    fn default_value(&self) -> Option<Value> {
        self.default.as_ref().map(|f| f())
    }
}

impl PropertySlot for BasePropertySlot {
    fn context(&self) -> &SlotContext {
        &self.ctx
    }

    fn get(&self) -> CoreResult<Option<Value>> {
        let stored = self
            .ctx
            .read(|state| state.values.get(self.ctx.property()).cloned())?;
        match stored.or_else(|| self.default_value()) {
            Some(value) => Ok(Some(value)),
            None if self.mandatory => Err(CoreError::configuration(
                self.ctx.entity_type(),
                self.ctx.property(),
                "mandatory property is unset and has no default",
            )),
            None => Ok(None),
        }
    }

    fn set(&self, value: Option<Value>) -> CoreResult<()> {
        let value = value.filter(|v| !v.is_null());
        if value.is_none() && self.mandatory {
            self.ctx.mutate(|_| ())?;
            return Err(self.ctx.violation("mandatory"));
        }
        self.ctx
            .mutate(|state| state.write(self.ctx.property(), value))
    }

    fn create_value(&self, initial: Option<Value>) -> CoreResult<Option<Value>> {
        Ok(initial
            .filter(|v| !v.is_null())
            .or_else(|| self.default_value()))
    }
}

/// Base of a multi-valued chain.
///
/// Elements are kept as an array value; an empty collection is stored as
/// unset.
pub(crate) struct BaseCollectionSlot {
    ctx: SlotContext,
    unique: bool,
    element_default: Option<ValueFactory>,
}

impl BaseCollectionSlot {
    pub(crate) fn new(
        ctx: SlotContext,
        unique: bool,
        element_default: Option<ValueFactory>,
    ) -> Self {
        Self {
            ctx,
            unique,
            element_default,
        }
    }

    fn elements(&self) -> CoreResult<Vec<Value>> {
        self.ctx.read(|state| {
            state
                .values
                .get(self.ctx.property())
                .and_then(Value::as_array)
                .map(<[Value]>::to_vec)
                .unwrap_or_default()
        })
    }

    /// Applies `f` to the elements and stores the result if it changed.
    fn update<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> CoreResult<R> {
        self.ctx.mutate(|state| {
            let name = self.ctx.property();
            let before: Vec<Value> = state
                .values
                .get(name)
                .and_then(Value::as_array)
                .map(<[Value]>::to_vec)
                .unwrap_or_default();
            let mut elements = before.clone();
            let result = f(&mut elements);
            if elements != before {
                let value = (!elements.is_empty()).then(|| Value::Array(elements));
                state.write(name, value);
            }
            result
        })
    }

    fn push(&self, elements: &mut Vec<Value>, element: Value) -> bool {
        if element.is_null() || (self.unique && elements.contains(&element)) {
            return false;
        }
        elements.push(element);
        true
    }
}

impl CollectionSlot for BaseCollectionSlot {
    fn context(&self) -> &SlotContext {
        &self.ctx
    }

    fn get(&self) -> CoreResult<Vec<Value>> {
        self.elements()
    }

    fn add(&self, element: Value) -> CoreResult<bool> {
        self.update(|elements| self.push(elements, element))
    }

    fn remove(&self, element: &Value) -> CoreResult<bool> {
        self.update(|elements| match elements.iter().position(|e| e == element) {
            Some(index) => {
                elements.remove(index);
                true
            }
            None => false,
        })
    }

    fn add_all(&self, new: Vec<Value>) -> CoreResult<bool> {
        self.update(|elements| {
            new.into_iter()
                .fold(false, |changed, e| self.push(elements, e) || changed)
        })
    }

    fn remove_all(&self, removed: &[Value]) -> CoreResult<bool> {
        self.update(|elements| {
            let before = elements.len();
            elements.retain(|e| !removed.contains(e));
            elements.len() != before
        })
    }

    fn retain_all(&self, kept: &[Value]) -> CoreResult<bool> {
        self.update(|elements| {
            let before = elements.len();
            elements.retain(|e| kept.contains(e));
            elements.len() != before
        })
    }

    fn clear(&self) -> CoreResult<()> {
        self.update(Vec::clear)
    }

    fn create_element(&self, initial: Option<Value>) -> CoreResult<Value> {
        initial
            .filter(|v| !v.is_null())
            .or_else(|| self.element_default.as_ref().map(|f| f()))
            .ok_or_else(|| {
                CoreError::configuration(
                    self.ctx.entity_type(),
                    self.ctx.property(),
                    "no initial element and no element default",
                )
            })
    }
}
