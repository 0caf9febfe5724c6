//! Lazy query results.

use super::plan::Plan;
use crate::entity::{EntityDescriptor, EntityId, EntityRef, EntityStatus, EntityType};
use crate::error::{CoreError, CoreResult};
use crate::uow::UnitOfWork;
use futures::stream::{self, Stream};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use unitdb_store::{Predicate, StoreCursor, StoredRecord};

enum Candidate {
    Resident(EntityRef),
    Stored(StoredRecord),
}

/// The lazily evaluated result of one query execution.
///
/// Records are pulled from the store cursor one at a time and materialized
/// into the unit of work as they are yielded. Entities resident in the unit
/// of work when the result set reaches them take precedence over their
/// stored records, whether they were resident at execution or loaded
/// afterwards:
///
/// - a resident entity is matched against its current values, so
///   uncommitted changes move it into or out of the result;
/// - resident entities the store did not return (NEW entities, entities
///   modified into the filter) are matched in memory after the cursor is
///   exhausted, against the working set as it is at that point;
/// - REMOVED entities are never yielded.
///
/// [`size`](Self::size) applies the same rule to the working set as it is
/// when called, so it agrees with the entities a following iteration
/// yields. A window the store paged natively is fixed at execution: only
/// records on that page are yielded, entities that leave the filter
/// afterwards shrink it, and no resident entity is added to it.
///
/// Once yielded, an entity is matched against the values it had at that
/// moment for the rest of the result set's life, so later changes never
/// make it disappear from or reappear in a restarted iteration.
pub struct ResultSet<'u, T> {
    uow: &'u UnitOfWork,
    descriptor: Arc<EntityDescriptor>,
    filter: Predicate,
    plan: Plan,
    cursor: Box<dyn StoreCursor>,
    residents: Vec<EntityRef>,
    seen: HashSet<EntityId>,
    buffer: VecDeque<StoredRecord>,
    cursor_done: bool,
    next_resident: usize,
    skipped: usize,
    yielded: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<'u, T: EntityType> ResultSet<'u, T> {
    pub(crate) fn new(
        uow: &'u UnitOfWork,
        descriptor: Arc<EntityDescriptor>,
        filter: Predicate,
        plan: Plan,
        cursor: Box<dyn StoreCursor>,
    ) -> Self {
        Self {
            uow,
            descriptor,
            filter,
            plan,
            cursor,
            residents: Vec::new(),
            seen: HashSet::new(),
            buffer: VecDeque::new(),
            cursor_done: false,
            next_resident: 0,
            skipped: 0,
            yielded: 0,
            _marker: PhantomData,
        }
    }

    /// Advances to the next matching entity.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Cancelled`] if the unit of work is closed meanwhile
    /// - [`CoreError::Store`] if the cursor fails
    pub async fn next(&mut self) -> CoreResult<Option<EntityRef>> {
        loop {
            if self.plan.limit.is_some_and(|limit| self.yielded >= limit) {
                return Ok(None);
            }
            let Some(candidate) = self.next_candidate().await? else {
                return Ok(None);
            };
            if self.skipped < self.plan.offset {
                self.skipped += 1;
                continue;
            }

            let entity = match candidate {
                Candidate::Resident(entity) => entity,
                Candidate::Stored(stored) => self.uow.materialize(&self.descriptor, stored)?,
            };
            entity.freeze_view();
            self.yielded += 1;
            return Ok(Some(entity));
        }
    }

    /// Exact number of entities this result set yields from its start.
    ///
    /// Answered from the cursor when the store knows its size, no filtering
    /// happens in memory and no entity of the type is resident; otherwise
    /// the remaining records are buffered (not materialized) and counted.
    pub async fn size(&mut self) -> CoreResult<usize> {
        if self.plan.residual.is_none() && self.uow.residents_of(T::TYPE_NAME).is_empty() {
            if let Some(total) = self.cursor.exact_size() {
                return Ok(window(total, self.plan.offset, self.plan.limit));
            }
        }

        let uow = self.uow;
        while !self.cursor_done {
            match uow.guard(self.cursor.next()).await? {
                Some(record) => self.buffer.push_back(record),
                None => self.cursor_done = true,
            }
        }

        let mut remaining = 0;
        let mut pending = HashSet::new();
        for stored in &self.buffer {
            pending.insert(EntityId::from(stored.key.id.as_str()));
            let admitted = match self.uow.resident(&stored.key) {
                Some(entity) => self.matches_resident(&entity)?,
                None => self.matches_stored(stored)?,
            };
            if admitted {
                remaining += 1;
            }
        }
        if self.plan.overlay && !self.plan.store_pages() {
            for entity in self.uow.residents_of(T::TYPE_NAME) {
                if !self.seen.contains(entity.id())
                    && !pending.contains(entity.id())
                    && self.matches_resident(&entity)?
                {
                    remaining += 1;
                }
            }
        }

        let matched = self.skipped + self.yielded + remaining;
        Ok(window(matched, self.plan.offset, self.plan.limit))
    }

    /// Rewinds to the first result.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] unless the store declares
    /// restartable cursors.
    pub async fn restart(&mut self) -> CoreResult<()> {
        if !self.uow.store().capabilities().restartable_cursors {
            return Err(CoreError::illegal_state(format!(
                "cursors of store `{}` cannot be restarted",
                self.uow.store().name()
            )));
        }
        let uow = self.uow;
        uow.guard(self.cursor.restart()).await?;

        self.seen.clear();
        self.buffer.clear();
        self.cursor_done = false;
        self.residents.clear();
        self.next_resident = 0;
        self.skipped = 0;
        self.yielded = 0;
        Ok(())
    }

    /// Drains the remaining results.
    pub async fn collect(mut self) -> CoreResult<Vec<EntityRef>> {
        let mut out = Vec::new();
        while let Some(entity) = self.next().await? {
            out.push(entity);
        }
        Ok(out)
    }

    /// Converts into a stream of the remaining results.
    pub fn into_stream(self) -> impl Stream<Item = CoreResult<EntityRef>> + 'u {
        stream::try_unfold(self, |mut results| async move {
            let next = results.next().await?;
            Ok::<_, CoreError>(next.map(|entity| (entity, results)))
        })
    }

    async fn next_candidate(&mut self) -> CoreResult<Option<Candidate>> {
        while let Some(stored) = self.next_record().await? {
            if let Some(candidate) = self.admit(stored)? {
                return Ok(Some(candidate));
            }
        }

        if !self.plan.overlay || self.plan.store_pages() {
            return Ok(None);
        }

        // Rescan the working set once per call, so entities loaded or
        // changed since the last pass are matched too.
        let mut rescanned = false;
        loop {
            while let Some(entity) = self.residents.get(self.next_resident).cloned() {
                self.next_resident += 1;
                if !self.seen.contains(entity.id()) && self.matches_resident(&entity)? {
                    self.seen.insert(entity.id().clone());
                    return Ok(Some(Candidate::Resident(entity)));
                }
            }
            if rescanned {
                return Ok(None);
            }
            self.residents = self.uow.residents_of(T::TYPE_NAME);
            self.next_resident = 0;
            rescanned = true;
        }
    }

    async fn next_record(&mut self) -> CoreResult<Option<StoredRecord>> {
        if let Some(record) = self.buffer.pop_front() {
            return Ok(Some(record));
        }
        if self.cursor_done {
            return Ok(None);
        }
        let uow = self.uow;
        let record = uow.guard(self.cursor.next()).await?;
        if record.is_none() {
            self.cursor_done = true;
        }
        Ok(record)
    }

    /// Only admitted records count as seen; a rejected one may still match
    /// in the resident pass if it is changed into the filter meanwhile.
    fn admit(&mut self, stored: StoredRecord) -> CoreResult<Option<Candidate>> {
        let id = EntityId::from(stored.key.id.as_str());
        let candidate = match self.uow.resident(&stored.key) {
            Some(entity) => self
                .matches_resident(&entity)?
                .then_some(Candidate::Resident(entity)),
            None => self
                .matches_stored(&stored)?
                .then_some(Candidate::Stored(stored)),
        };
        if candidate.is_some() {
            self.seen.insert(id);
        }
        Ok(candidate)
    }

    fn matches_resident(&self, entity: &EntityRef) -> CoreResult<bool> {
        if matches!(
            entity.status(),
            EntityStatus::Removed | EntityStatus::Submitted
        ) {
            return Ok(false);
        }
        if !self.plan.overlay {
            // Only the store can evaluate the filter; trust its verdict on
            // the stored record.
            return Ok(true);
        }
        Ok(self.filter.evaluate(&entity.query_view())?)
    }

    fn matches_stored(&self, stored: &StoredRecord) -> CoreResult<bool> {
        match &self.plan.residual {
            Some(residual) => Ok(residual.evaluate(&stored.record)?),
            None => Ok(true),
        }
    }
}

fn window(total: usize, offset: usize, limit: Option<usize>) -> usize {
    let after_offset = total.saturating_sub(offset);
    limit.map_or(after_offset, |limit| after_offset.min(limit))
}

impl<T: EntityType> fmt::Debug for ResultSet<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSet")
            .field("entity_type", &T::TYPE_NAME)
            .field("filter", &self.filter.to_string())
            .field("yielded", &self.yielded)
            .field("cursor_done", &self.cursor_done)
            .finish_non_exhaustive()
    }
}
