//! Committing a unit of work.
//!
//! A commit turns the working set into one storage transaction:
//!
//! 1. Every NEW and MODIFIED entity is validated and its stored record is
//!    computed, with unset properties resolved through their defaults.
//! 2. A transaction is begun and the writes are staged, deletes first, then
//!    updates, then inserts.
//! 3. The transaction is committed and every entity becomes SUBMITTED.
//!
//! If any step fails the transaction is rolled back, the working set is left
//! exactly as it was and the unit of work stays open.

use super::{Phase, UnitOfWork, UowCore};
use crate::entity::{EntityRef, EntityStatus};
use crate::error::{CoreError, CoreResult};
use unitdb_codec::Record;
use unitdb_store::{Precondition, RecordKey, StoreTransaction};

/// A staged write.
#[derive(Debug)]
struct Write {
    key: RecordKey,
    record: Record,
    precondition: Precondition,
    entity: EntityRef,
}

/// Writes derived from the working set, grouped by kind.
#[derive(Debug, Default)]
struct ChangeSet {
    deletes: Vec<(RecordKey, Precondition)>,
    updates: Vec<Write>,
    inserts: Vec<Write>,
}

impl ChangeSet {
    fn collect(entities: &[EntityRef], validate: bool) -> CoreResult<Self> {
        let mut changes = Self::default();
        for entity in entities {
            let key = RecordKey::new(entity.entity_type(), entity.id().as_str());
            let (status, values, version) =
                entity.with_state(|state| (state.status, state.values.clone(), state.version));
            let expected = version.map_or(Precondition::None, Precondition::Version);

            match status {
                EntityStatus::Removed => changes.deletes.push((key, expected)),
                EntityStatus::Modified => changes.updates.push(Write {
                    key,
                    record: resolve(entity, values, validate)?,
                    precondition: expected,
                    entity: EntityRef::clone(entity),
                }),
                EntityStatus::New => changes.inserts.push(Write {
                    key,
                    record: resolve(entity, values, validate)?,
                    precondition: Precondition::Absent,
                    entity: EntityRef::clone(entity),
                }),
                EntityStatus::Loaded | EntityStatus::Submitted => {}
            }
        }
        Ok(changes)
    }

    fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.updates.is_empty() && self.inserts.is_empty()
    }
}

/// Fills unset single-valued slots from their chains' `create_value`.
fn resolve(entity: &EntityRef, mut values: Record, validate: bool) -> CoreResult<Record> {
    for (index, slot) in entity.descriptor().slots().iter().enumerate() {
        if !slot.kind().is_single() || values.contains(slot.name()) {
            continue;
        }
        let Some(chain) = entity.single_slot_at(index) else {
            continue;
        };
        match chain.create_value(None)? {
            Some(value) => {
                values.set(slot.name(), value);
            }
            None if validate && slot.is_mandatory() => {
                return Err(CoreError::configuration(
                    entity.entity_type(),
                    slot.name(),
                    "mandatory property is unset and has no default",
                ));
            }
            None => {}
        }
    }
    Ok(values)
}

/// Keeps the phase consistent if the commit future fails or is dropped.
struct CommitScope<'a> {
    core: &'a UowCore,
    done: bool,
}

impl Drop for CommitScope<'_> {
    fn drop(&mut self) {
        if !self.done {
            let mut working = self.core.working.lock();
            if working.phase == Phase::Committing {
                working.phase = Phase::Open;
            }
        }
    }
}

impl UnitOfWork {
    /// Writes the working set to the store in one storage transaction.
    ///
    /// On success every entity becomes SUBMITTED (and stays readable) and
    /// the unit of work is completed.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Configuration`] if a mandatory property is unset with
    ///   no default
    /// - [`CoreError::Commit`] if the store rejected the transaction; it was
    ///   rolled back and the unit of work is still open
    /// - [`CoreError::Cancelled`] if the unit of work was closed before the
    ///   storage commit step
    /// - [`CoreError::IllegalState`] if the unit of work is not open
    pub async fn commit(&self) -> CoreResult<()> {
        let mut scope = self.begin_commit()?;

        let entities: Vec<EntityRef> = {
            let working = self.core.working.lock();
            working
                .replaced
                .iter()
                .chain(working.entities.values())
                .cloned()
                .collect()
        };
        let changes = ChangeSet::collect(&entities, self.config().validate_on_commit)?;

        tracing::debug!(
            uow = %self.core.id,
            deletes = changes.deletes.len(),
            updates = changes.updates.len(),
            inserts = changes.inserts.len(),
            "committing unit of work"
        );

        if !changes.is_empty() {
            self.write(&changes).await?;
        }

        self.finish(&changes);
        scope.done = true;
        tracing::info!(
            uow = %self.core.id,
            written = changes.deletes.len() + changes.updates.len() + changes.inserts.len(),
            "committed unit of work"
        );
        Ok(())
    }

    fn begin_commit(&self) -> CoreResult<CommitScope<'_>> {
        self.check_open()?;
        let mut working = self.core.working.lock();
        if working.phase != Phase::Open {
            return Err(CoreError::illegal_state(format!(
                "{} is not open",
                self.core.id
            )));
        }
        working.phase = Phase::Committing;
        Ok(CommitScope {
            core: &self.core,
            done: false,
        })
    }

    async fn write(&self, changes: &ChangeSet) -> CoreResult<()> {
        let mut tx = self
            .guard(self.store().begin())
            .await
            .map_err(|e| self.commit_error(e))?;

        if let Err(err) = self.stage(tx.as_mut(), changes).await {
            self.abandon(tx).await;
            return Err(self.commit_error(err));
        }
        if self.core.is_closed() {
            self.abandon(tx).await;
            return Err(CoreError::Cancelled);
        }

        // Not abortable: once the store starts committing, it finishes.
        tx.commit().await.map_err(|source| {
            tracing::warn!(uow = %self.core.id, error = %source, "storage commit failed");
            CoreError::Commit {
                unit_of_work: self.core.id,
                source,
            }
        })
    }

    async fn stage(&self, tx: &mut dyn StoreTransaction, changes: &ChangeSet) -> CoreResult<()> {
        for (key, precondition) in &changes.deletes {
            self.guard(tx.delete(key.clone(), *precondition)).await?;
        }
        for write in changes.updates.iter().chain(&changes.inserts) {
            self.guard(tx.put(write.key.clone(), write.record.clone(), write.precondition))
                .await?;
        }
        Ok(())
    }

    async fn abandon(&self, tx: Box<dyn StoreTransaction>) {
        if let Err(err) = tx.rollback().await {
            tracing::warn!(uow = %self.core.id, error = %err, "rollback failed");
        }
    }

    fn commit_error(&self, err: CoreError) -> CoreError {
        match err {
            CoreError::Store(source) => {
                tracing::warn!(uow = %self.core.id, error = %source, "commit rolled back");
                CoreError::Commit {
                    unit_of_work: self.core.id,
                    source,
                }
            }
            other => other,
        }
    }

    fn finish(&self, changes: &ChangeSet) {
        let entities = {
            let mut working = self.core.working.lock();
            if working.phase == Phase::Discarded {
                // Closed while the storage commit ran; the data is written.
                return;
            }
            working.phase = Phase::Completed;
            working.take_all()
        };

        for write in changes.updates.iter().chain(&changes.inserts) {
            write.entity.with_state(|state| {
                state.values = write.record.clone();
                state.snapshot = write.record.clone();
            });
        }
        for entity in &entities {
            entity.with_state(|state| state.submit(true));
        }
    }
}
