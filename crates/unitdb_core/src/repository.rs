//! Repository: registered entity types bound to one store.

use crate::config::{IdentityStrategy, RepositoryConfig};
use crate::entity::{EntityDescriptor, EntityId, EntityType};
use crate::error::{CoreError, CoreResult};
use crate::event::EventPublisher;
use crate::uow::UnitOfWork;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use unitdb_store::{NativeQuery, StoreAdapter};

type Describe = fn(Option<&Arc<dyn EventPublisher>>) -> CoreResult<EntityDescriptor>;

/// State shared by a repository and the units of work it opened.
pub(crate) struct RepositoryInner {
    pub(crate) store: Arc<dyn StoreAdapter>,
    pub(crate) config: RepositoryConfig,
    descriptors: HashMap<&'static str, Arc<EntityDescriptor>>,
    sequence: AtomicU64,
}

impl RepositoryInner {
    pub(crate) fn descriptor_of(&self, entity_type: &str) -> CoreResult<Arc<EntityDescriptor>> {
        self.descriptors
            .get(entity_type)
            .cloned()
            .ok_or_else(|| CoreError::UnknownEntityType {
                entity_type: entity_type.to_string(),
            })
    }

    pub(crate) fn next_identity(&self) -> EntityId {
        match &self.config.identity {
            IdentityStrategy::Uuid => EntityId::new(),
            IdentityStrategy::Sequential { prefix } => {
                let n = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
                EntityId::from(format!("{prefix}{n}"))
            }
        }
    }
}

/// Entry point: a set of entity types persisted in one store.
///
/// Cheap to clone; clones share the store and the model.
///
/// # Example
///
/// ```rust
/// use unitdb_core::{EntityRepository, EntityType, ModelBuilder, PropertyKey, RepositoryConfig};
/// use unitdb_store::MemoryStore;
///
/// struct Note;
///
/// impl Note {
///     const TEXT: PropertyKey<String> = PropertyKey::new("text");
/// }
///
/// impl EntityType for Note {
///     const TYPE_NAME: &'static str = "Note";
///
///     fn describe(model: &mut ModelBuilder) {
///         model.property(Self::TEXT).mandatory();
///     }
/// }
///
/// # let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// # runtime.block_on(async {
/// let repository = EntityRepository::builder(MemoryStore::new())
///     .config(RepositoryConfig::new().validate_on_commit(true))
///     .register::<Note>()
///     .build()
///     .await?;
/// assert_eq!(repository.descriptor::<Note>()?.slots().len(), 1);
/// # Ok::<(), unitdb_core::CoreError>(())
/// # }).unwrap();
/// ```
#[derive(Clone)]
pub struct EntityRepository {
    inner: Arc<RepositoryInner>,
}

impl EntityRepository {
    /// Starts building a repository over `store`.
    pub fn builder<S: StoreAdapter + 'static>(store: S) -> RepositoryBuilder {
        Self::builder_shared(Arc::new(store))
    }

    /// Starts building a repository over a store shared with other owners.
    pub fn builder_shared(store: Arc<dyn StoreAdapter>) -> RepositoryBuilder {
        RepositoryBuilder {
            store,
            config: RepositoryConfig::default(),
            publisher: None,
            types: Vec::new(),
        }
    }

    /// Opens an anonymous unit of work.
    #[must_use]
    pub fn new_unit_of_work(&self) -> UnitOfWork {
        UnitOfWork::new(Arc::clone(&self.inner), None)
    }

    /// Opens a unit of work with a name, shown in logs and `Debug` output.
    #[must_use]
    pub fn new_unit_of_work_named(&self, name: impl Into<String>) -> UnitOfWork {
        UnitOfWork::new(Arc::clone(&self.inner), Some(name.into()))
    }

    /// Returns the descriptor of a registered type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownEntityType`] if `T` was not registered.
    pub fn descriptor<T: EntityType>(&self) -> CoreResult<Arc<EntityDescriptor>> {
        self.inner.descriptor_of(T::TYPE_NAME)
    }

    /// Names of the registered entity types, sorted.
    #[must_use]
    pub fn entity_types(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.inner.descriptors.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn StoreAdapter> {
        &self.inner.store
    }

    /// The configuration in effect.
    #[must_use]
    pub fn config(&self) -> &RepositoryConfig {
        &self.inner.config
    }
}

impl fmt::Debug for EntityRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRepository")
            .field("store", &self.inner.store.name())
            .field("entity_types", &self.entity_types())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Builder for [`EntityRepository`].
pub struct RepositoryBuilder {
    store: Arc<dyn StoreAdapter>,
    config: RepositoryConfig,
    publisher: Option<Arc<dyn EventPublisher>>,
    types: Vec<(&'static str, Describe)>,
}

impl RepositoryBuilder {
    /// Replaces the configuration.
    #[must_use]
    pub fn config(mut self, config: RepositoryConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the sink for properties declared with `notify_changes()`.
    ///
    /// Without a publisher those declarations have no effect.
    #[must_use]
    pub fn publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Registers an entity type.
    #[must_use]
    pub fn register<T: EntityType>(mut self) -> Self {
        self.types
            .push((T::TYPE_NAME, EntityDescriptor::describe::<T> as Describe));
        self
    }

    /// Describes every registered type and builds the repository.
    ///
    /// With [`IdentityStrategy::Sequential`] the store is scanned once so
    /// that minting continues after the highest identity it already holds.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidModel`] if a type name is registered twice or
    ///   a type declares a slot twice
    /// - [`CoreError::UnknownEntityType`] if an association targets a type
    ///   that is not registered
    /// - [`CoreError::Store`] if the scan for sequential identities fails
    pub async fn build(self) -> CoreResult<EntityRepository> {
        let mut descriptors = HashMap::with_capacity(self.types.len());
        for (name, describe) in &self.types {
            let descriptor = describe(self.publisher.as_ref())?;
            if descriptors.insert(*name, Arc::new(descriptor)).is_some() {
                return Err(CoreError::invalid_model(
                    *name,
                    "entity type registered twice",
                ));
            }
        }

        for descriptor in descriptors.values() {
            if let Some(target) = descriptor
                .targets()
                .find(|target| !descriptors.contains_key(target))
            {
                return Err(CoreError::UnknownEntityType {
                    entity_type: target.to_string(),
                });
            }
        }

        let sequence = match &self.config.identity {
            IdentityStrategy::Sequential { prefix } => {
                highest_sequence(self.store.as_ref(), descriptors.keys().copied(), prefix).await?
            }
            IdentityStrategy::Uuid => 0,
        };

        tracing::info!(
            store = self.store.name(),
            entity_types = descriptors.len(),
            sequence,
            "built entity repository"
        );
        Ok(EntityRepository {
            inner: Arc::new(RepositoryInner {
                store: self.store,
                config: self.config,
                descriptors,
                sequence: AtomicU64::new(sequence),
            }),
        })
    }
}

/// Highest `n` among stored identities of the form `{prefix}{n}`.
async fn highest_sequence(
    store: &dyn StoreAdapter,
    entity_types: impl Iterator<Item = &'static str>,
    prefix: &str,
) -> CoreResult<u64> {
    let mut highest = 0;
    for entity_type in entity_types {
        let mut cursor = store.cursor(&NativeQuery::all(entity_type)).await?;
        while let Some(stored) = cursor.next().await? {
            if let Some(n) = stored
                .key
                .id
                .strip_prefix(prefix)
                .and_then(|suffix| suffix.parse::<u64>().ok())
            {
                highest = highest.max(n);
            }
        }
    }
    Ok(highest)
}

impl fmt::Debug for RepositoryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.types.iter().map(|(name, _)| *name).collect();
        f.debug_struct("RepositoryBuilder")
            .field("store", &self.store.name())
            .field("entity_types", &names)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{AssociationKey, ModelBuilder, PropertyKey};
    use unitdb_codec::Record;
    use unitdb_store::{MemoryStore, Precondition, RecordKey};

    struct Company;

    impl Company {
        const NAME: PropertyKey<String> = PropertyKey::new("name");
    }

    impl EntityType for Company {
        const TYPE_NAME: &'static str = "Company";

        fn describe(model: &mut ModelBuilder) {
            model.property(Self::NAME).mandatory();
        }
    }

    struct Employee;

    impl Employee {
        const EMPLOYER: AssociationKey<Company> = AssociationKey::new("employer");
    }

    impl EntityType for Employee {
        const TYPE_NAME: &'static str = "Employee";

        fn describe(model: &mut ModelBuilder) {
            model.association(Self::EMPLOYER);
        }
    }

    #[tokio::test]
    async fn registers_types() {
        let repository = EntityRepository::builder(MemoryStore::new())
            .register::<Company>()
            .register::<Employee>()
            .build()
            .await
            .unwrap();

        assert_eq!(repository.entity_types(), vec!["Company", "Employee"]);
        assert_eq!(repository.descriptor::<Company>().unwrap().type_name(), "Company");
        assert_eq!(repository.store().name(), "memory");
    }

    #[tokio::test]
    async fn unregistered_type_is_unknown() {
        let repository = EntityRepository::builder(MemoryStore::new())
            .register::<Company>()
            .build()
            .await
            .unwrap();
        let err = repository.descriptor::<Employee>().unwrap_err();
        assert!(matches!(err, CoreError::UnknownEntityType { .. }));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let err = EntityRepository::builder(MemoryStore::new())
            .register::<Company>()
            .register::<Company>()
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidModel { .. }));
    }

    #[tokio::test]
    async fn association_target_must_be_registered() {
        let err = EntityRepository::builder(MemoryStore::new())
            .register::<Employee>()
            .build()
            .await
            .unwrap_err();
        assert!(
            matches!(err, CoreError::UnknownEntityType { ref entity_type } if entity_type == "Company")
        );
    }

    #[tokio::test]
    async fn sequential_identities() {
        let repository = EntityRepository::builder(MemoryStore::new())
            .config(RepositoryConfig::new().identity(IdentityStrategy::Sequential {
                prefix: "c-".into(),
            }))
            .register::<Company>()
            .build()
            .await
            .unwrap();

        assert_eq!(repository.inner.next_identity().as_str(), "c-1");
        assert_eq!(repository.inner.next_identity().as_str(), "c-2");
    }

    #[tokio::test]
    async fn sequential_identities_continue_after_stored_ones() {
        let store = Arc::new(MemoryStore::new());
        let mut tx = store.begin().await.unwrap();
        for id in ["c-7", "c-12", "other-99", "c-x"] {
            tx.put(RecordKey::new("Company", id), Record::new(), Precondition::Absent)
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();

        let repository = EntityRepository::builder_shared(store)
            .config(RepositoryConfig::new().identity(IdentityStrategy::Sequential {
                prefix: "c-".into(),
            }))
            .register::<Company>()
            .build()
            .await
            .unwrap();
        assert_eq!(repository.inner.next_identity().as_str(), "c-13");
    }

    #[tokio::test]
    async fn named_unit_of_work() {
        let repository = EntityRepository::builder(MemoryStore::new())
            .register::<Company>()
            .build()
            .await
            .unwrap();
        let uow = repository.new_unit_of_work_named("import");
        assert_eq!(uow.name(), Some("import"));
        assert!(uow.is_open());

        let other = repository.new_unit_of_work();
        assert_ne!(uow.id(), other.id());
    }
}
