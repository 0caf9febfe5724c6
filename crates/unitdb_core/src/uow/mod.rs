//! Units of work.
//!
//! A [`UnitOfWork`] is the working set of one logical operation: an identity
//! map of the entities it created or loaded, committed to the store in one
//! storage transaction or discarded as a whole.
//!
//! ## Identity map
//!
//! Within a unit of work at most one [`Entity`] exists per identity. Loading
//! an identity that is already resident returns the resident instance, so
//! uncommitted changes are always visible to the unit of work that made
//! them.
//!
//! ## Cancellation
//!
//! [`UnitOfWork::close`] (or a [`CloseHandle`] from another task) aborts
//! every store call in flight; the interrupted operation fails with
//! [`CoreError::Cancelled`].

mod cancel;
mod commit;

pub use cancel::CloseHandle;

use crate::config::RepositoryConfig;
use crate::entity::{Entity, EntityDescriptor, EntityId, EntityRef, EntityState, EntityStatus, EntityType};
use crate::error::{CoreError, CoreResult};
use crate::query::Query;
use crate::repository::RepositoryInner;
use crate::types::UnitOfWorkId;
use futures::future::{AbortHandle, Abortable};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use unitdb_codec::Record;
use unitdb_store::{RecordKey, StoreAdapter, StoreResult, StoredRecord};

static NEXT_UNIT_OF_WORK: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Open,
    Committing,
    Completed,
    Discarded,
}

struct WorkingSet {
    entities: BTreeMap<RecordKey, EntityRef>,
    /// REMOVED entities whose identity was taken by a new entity; committed
    /// as deletes ahead of the insert.
    replaced: Vec<EntityRef>,
    phase: Phase,
}

impl WorkingSet {
    fn collision(&self, key: &RecordKey) -> Option<CoreError> {
        let resident = self.entities.get(key)?;
        (resident.status() != EntityStatus::Removed).then(|| CoreError::IdentityCollision {
            entity_type: key.entity_type.clone(),
            id: key.id.clone(),
        })
    }

    /// Every entity the working set holds, displaced ones first.
    fn take_all(&mut self) -> Vec<EntityRef> {
        let mut all = std::mem::take(&mut self.replaced);
        all.extend(std::mem::take(&mut self.entities).into_values());
        all
    }
}

/// State shared between a unit of work and its close handles.
pub(crate) struct UowCore {
    id: UnitOfWorkId,
    working: Mutex<WorkingSet>,
    closed: AtomicBool,
    in_flight: Mutex<HashMap<u64, AbortHandle>>,
    next_op: AtomicU64,
}

impl UowCore {
    fn new(id: UnitOfWorkId) -> Self {
        Self {
            id,
            working: Mutex::new(WorkingSet {
                entities: BTreeMap::new(),
                replaced: Vec::new(),
                phase: Phase::Open,
            }),
            closed: AtomicBool::new(false),
            in_flight: Mutex::new(HashMap::new()),
            next_op: AtomicU64::new(0),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn is_open(&self) -> bool {
        !self.is_closed()
            && matches!(
                self.working.lock().phase,
                Phase::Open | Phase::Committing
            )
    }

    /// Closes the unit of work: aborts in-flight store calls and detaches
    /// every resident entity. Entities of a completed commit stay readable.
    pub(crate) fn discard(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for (_, handle) in self.in_flight.lock().drain() {
            handle.abort();
        }

        let entities = {
            let mut working = self.working.lock();
            if working.phase == Phase::Completed {
                return;
            }
            working.phase = Phase::Discarded;
            working.take_all()
        };
        tracing::debug!(
            uow = %self.id,
            entities = entities.len(),
            "discarded unit of work"
        );
        for entity in &entities {
            entity.with_state(|state| state.submit(false));
        }
    }

    /// Runs a store call that [`discard`](Self::discard) can abort.
    async fn guard<T>(&self, call: impl Future<Output = StoreResult<T>>) -> CoreResult<T> {
        let (handle, registration) = AbortHandle::new_pair();
        let op = self.next_op.fetch_add(1, Ordering::Relaxed);
        self.in_flight.lock().insert(op, handle);
        let _in_flight = InFlight { core: self, op };

        // Registered before this check, so a concurrent close either sees
        // the handle or is seen here.
        if self.is_closed() {
            return Err(CoreError::Cancelled);
        }
        match Abortable::new(call, registration).await {
            Ok(result) => result.map_err(CoreError::from),
            Err(_aborted) => Err(CoreError::Cancelled),
        }
    }
}

struct InFlight<'a> {
    core: &'a UowCore,
    op: u64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.core.in_flight.lock().remove(&self.op);
    }
}

/// The working set of one logical operation.
///
/// All methods take `&self`; a unit of work is meant to be driven by one
/// task, while a [`CloseHandle`] may close it from anywhere. Dropping an
/// open unit of work discards it.
///
/// ```rust
/// # use std::sync::Arc;
/// # use unitdb_core::{EntityRepository, EntityType, ModelBuilder, PropertyKey, Expression};
/// # use unitdb_store::MemoryStore;
/// # struct Person;
/// # impl Person { const NAME: PropertyKey<String> = PropertyKey::new("name"); }
/// # impl EntityType for Person {
/// #     const TYPE_NAME: &'static str = "Person";
/// #     fn describe(model: &mut ModelBuilder) { model.property(Self::NAME).mandatory(); }
/// # }
/// # let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// # runtime.block_on(async {
/// let repository = EntityRepository::builder(MemoryStore::new())
///     .register::<Person>()
///     .build()
///     .await?;
///
/// let uow = repository.new_unit_of_work();
/// let ulli = uow.new_entity::<Person>(|p| p.set(Person::NAME, "Ulli"))?;
/// uow.commit().await?;
///
/// let uow = repository.new_unit_of_work();
/// let loaded = uow.entity::<Person>(ulli.id()).await?;
/// assert_eq!(loaded.get(Person::NAME)?.as_deref(), Some("Ulli"));
/// # Ok::<(), unitdb_core::CoreError>(())
/// # }).unwrap();
/// ```
pub struct UnitOfWork {
    core: Arc<UowCore>,
    repo: Arc<RepositoryInner>,
    name: Option<String>,
}

impl UnitOfWork {
    pub(crate) fn new(repo: Arc<RepositoryInner>, name: Option<String>) -> Self {
        let id = UnitOfWorkId::new(NEXT_UNIT_OF_WORK.fetch_add(1, Ordering::Relaxed));
        tracing::trace!(uow = %id, name = name.as_deref(), "opened unit of work");
        Self {
            core: Arc::new(UowCore::new(id)),
            repo,
            name,
        }
    }

    /// Returns the identifier.
    #[must_use]
    pub fn id(&self) -> UnitOfWorkId {
        self.core.id
    }

    /// Returns the name given at creation, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns `true` until the unit of work is committed, rolled back or
    /// closed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.core.is_open()
    }

    /// Number of entities in the identity map.
    #[must_use]
    pub fn resident_count(&self) -> usize {
        self.core.working.lock().entities.len()
    }

    /// Returns a handle that closes this unit of work from anywhere.
    #[must_use]
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle::new(Arc::clone(&self.core))
    }

    /// Creates an entity with the given identity.
    ///
    /// `init` runs before the entity joins the working set; if it fails the
    /// entity is dropped.
    ///
    /// An identity removed in this unit of work may be created again; the
    /// commit then deletes the stored record before inserting the new one.
    ///
    /// # Errors
    ///
    /// - [`CoreError::IdentityCollision`] if the identity is already
    ///   resident and not removed
    /// - [`CoreError::UnknownEntityType`] if `T` is not registered
    pub fn create_entity<T: EntityType>(
        &self,
        id: impl Into<EntityId>,
        init: impl FnOnce(&Entity) -> CoreResult<()>,
    ) -> CoreResult<EntityRef> {
        self.check_open()?;
        let descriptor = self.repo.descriptor_of(T::TYPE_NAME)?;
        let id = id.into();
        let key = RecordKey::new(T::TYPE_NAME, id.as_str());
        if let Some(err) = self.core.working.lock().collision(&key) {
            return Err(err);
        }

        let entity = Arc::new(Entity::new(
            id,
            self.core.id,
            descriptor,
            EntityState::created(Record::new()),
        ));
        init(&entity)?;

        let mut working = self.core.working.lock();
        if let Some(err) = working.collision(&key) {
            return Err(err);
        }
        if let Some(displaced) = working.entities.insert(key, Arc::clone(&entity)) {
            working.replaced.push(displaced);
        }
        Ok(entity)
    }

    /// Creates an entity with an identity minted by the repository.
    pub fn new_entity<T: EntityType>(
        &self,
        init: impl FnOnce(&Entity) -> CoreResult<()>,
    ) -> CoreResult<EntityRef> {
        self.create_entity::<T>(self.repo.next_identity(), init)
    }

    /// Looks up an entity, loading it from the store if not resident.
    ///
    /// Entities removed in this unit of work are not found.
    pub async fn find<T: EntityType>(&self, id: &EntityId) -> CoreResult<Option<EntityRef>> {
        self.check_open()?;
        let descriptor = self.repo.descriptor_of(T::TYPE_NAME)?;
        let key = RecordKey::new(T::TYPE_NAME, id.as_str());
        if let Some(resident) = self.resident(&key) {
            return Ok((resident.status() != EntityStatus::Removed).then_some(resident));
        }

        match self.guard(self.store().get(&key)).await? {
            Some(stored) => self.materialize(&descriptor, stored).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`find`](Self::find), failing if the entity does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EntityNotFound`] if there is no such entity.
    pub async fn entity<T: EntityType>(&self, id: &EntityId) -> CoreResult<EntityRef> {
        self.find::<T>(id)
            .await?
            .ok_or_else(|| CoreError::EntityNotFound {
                entity_type: T::TYPE_NAME.to_string(),
                id: id.to_string(),
            })
    }

    /// Marks an entity for deletion on commit.
    ///
    /// A NEW entity is simply dropped from the working set.
    ///
    /// # Errors
    ///
    /// - [`CoreError::ForeignEntity`] if another unit of work owns `entity`
    /// - [`CoreError::IllegalState`] if the entity is already submitted
    pub fn remove(&self, entity: &Entity) -> CoreResult<()> {
        self.check_open()?;
        if entity.owner() != self.core.id {
            return Err(CoreError::ForeignEntity {
                id: entity.id().to_string(),
                owner: entity.owner(),
            });
        }

        match entity.status() {
            EntityStatus::New => {
                let key = RecordKey::new(entity.entity_type(), entity.id().as_str());
                let mut working = self.core.working.lock();
                working.entities.remove(&key);
                // The removed entity it displaced takes its place again.
                if let Some(index) = working.replaced.iter().position(|replaced| {
                    replaced.id() == entity.id() && replaced.entity_type() == entity.entity_type()
                }) {
                    let displaced = working.replaced.swap_remove(index);
                    working.entities.insert(key, displaced);
                }
                drop(working);
                entity.with_state(|state| state.status = EntityStatus::Removed);
                Ok(())
            }
            EntityStatus::Loaded | EntityStatus::Modified => {
                entity.with_state(|state| state.status = EntityStatus::Removed);
                Ok(())
            }
            EntityStatus::Removed => Ok(()),
            EntityStatus::Submitted => Err(CoreError::illegal_state(format!(
                "{} {} is already submitted",
                entity.entity_type(),
                entity.id()
            ))),
        }
    }

    /// Starts a query over entities of type `T`.
    pub fn query<T: EntityType>(&self) -> CoreResult<Query<'_, T>> {
        self.check_open()?;
        let descriptor = self.repo.descriptor_of(T::TYPE_NAME)?;
        Ok(Query::new(self, descriptor))
    }

    /// Discards the working set; nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] if the unit of work is no longer
    /// open.
    pub fn rollback(&self) -> CoreResult<()> {
        self.check_open()?;
        tracing::debug!(uow = %self.core.id, "rolling back unit of work");
        self.core.discard();
        Ok(())
    }

    /// Closes the unit of work, discarding uncommitted changes.
    ///
    /// Idempotent; in-flight operations fail with [`CoreError::Cancelled`].
    pub fn close(&self) {
        self.core.discard();
    }

    pub(crate) fn check_open(&self) -> CoreResult<()> {
        if self.core.is_closed() {
            return Err(CoreError::illegal_state(format!(
                "{} is closed",
                self.core.id
            )));
        }
        match self.core.working.lock().phase {
            Phase::Open => Ok(()),
            Phase::Committing => Err(CoreError::illegal_state(format!(
                "{} is committing",
                self.core.id
            ))),
            Phase::Completed => Err(CoreError::illegal_state(format!(
                "{} is already committed",
                self.core.id
            ))),
            Phase::Discarded => Err(CoreError::illegal_state(format!(
                "{} is closed",
                self.core.id
            ))),
        }
    }

    pub(crate) fn store(&self) -> &dyn StoreAdapter {
        self.repo.store.as_ref()
    }

    pub(crate) fn config(&self) -> &RepositoryConfig {
        &self.repo.config
    }

    pub(crate) async fn guard<T>(
        &self,
        call: impl Future<Output = StoreResult<T>>,
    ) -> CoreResult<T> {
        self.core.guard(call).await
    }

    pub(crate) fn resident(&self, key: &RecordKey) -> Option<EntityRef> {
        self.core.working.lock().entities.get(key).cloned()
    }

    pub(crate) fn residents_of(&self, entity_type: &str) -> Vec<EntityRef> {
        self.core
            .working
            .lock()
            .entities
            .iter()
            .filter(|(key, _)| key.entity_type == entity_type)
            .map(|(_, entity)| Arc::clone(entity))
            .collect()
    }

    /// Returns the resident entity for `stored`, materializing it if needed.
    pub(crate) fn materialize(
        &self,
        descriptor: &Arc<EntityDescriptor>,
        stored: StoredRecord,
    ) -> CoreResult<EntityRef> {
        let mut working = self.core.working.lock();
        if self.core.is_closed() || working.phase != Phase::Open {
            return Err(CoreError::Cancelled);
        }
        if let Some(existing) = working.entities.get(&stored.key) {
            return Ok(Arc::clone(existing));
        }
        let entity = Arc::new(Entity::new(
            EntityId::from(stored.key.id.as_str()),
            self.core.id,
            Arc::clone(descriptor),
            EntityState::loaded(stored.record, stored.version),
        ));
        working.entities.insert(stored.key, Arc::clone(&entity));
        Ok(entity)
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.core.is_open() {
            tracing::debug!(uow = %self.core.id, "unit of work dropped while open");
            self.core.discard();
        }
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.core.id)
            .field("name", &self.name)
            .field("open", &self.is_open())
            .field("residents", &self.resident_count())
            .finish()
    }
}
