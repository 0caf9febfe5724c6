//! Mutable state shared by an entity and its slot chains.

use super::status::EntityStatus;
use unitdb_codec::{Record, Value};

/// Property values and lifecycle bookkeeping of one entity.
#[derive(Debug, Clone)]
pub(crate) struct EntityState {
    pub(crate) status: EntityStatus,
    /// Current values; an absent key is an unset property.
    pub(crate) values: Record,
    /// Values as loaded; compared against `values` to derive MODIFIED.
    pub(crate) snapshot: Record,
    /// Store version the entity was loaded at.
    pub(crate) version: Option<u64>,
    pub(crate) readable: bool,
    /// Values seen by queries after the entity was first yielded.
    pub(crate) frozen_view: Option<Record>,
}

impl EntityState {
    pub(crate) fn created(values: Record) -> Self {
        Self {
            status: EntityStatus::New,
            values,
            snapshot: Record::new(),
            version: None,
            readable: true,
            frozen_view: None,
        }
    }

    pub(crate) fn loaded(record: Record, version: u64) -> Self {
        Self {
            status: EntityStatus::Loaded,
            snapshot: record.clone(),
            values: record,
            version: Some(version),
            readable: true,
            frozen_view: None,
        }
    }

    /// Writes one property; `None` unsets it.
    pub(crate) fn write(&mut self, name: &str, value: Option<Value>) {
        match value {
            Some(value) => {
                self.values.set(name, value);
            }
            None => {
                self.values.remove(name);
            }
        }
        self.refresh_status();
    }

    /// Keeps MODIFIED equivalent to "differs from the load-time snapshot".
    pub(crate) fn refresh_status(&mut self) {
        match self.status {
            EntityStatus::Loaded if self.values != self.snapshot => {
                self.status = EntityStatus::Modified;
            }
            EntityStatus::Modified if self.values == self.snapshot => {
                self.status = EntityStatus::Loaded;
            }
            _ => {}
        }
    }

    /// Detaches the entity from its unit of work.
    pub(crate) fn submit(&mut self, readable: bool) {
        self.status = EntityStatus::Submitted;
        self.readable = readable;
        self.frozen_view = None;
    }
}
