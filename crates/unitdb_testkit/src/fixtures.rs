//! Fixture entity types and repository helpers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use unitdb_core::{
    AssociationKey, CollectionKey, CoreResult, EntityRef, EntityRepository, EntityType,
    EventPublisher, ManyAssociationKey, ModelBuilder, PropertyKey, RepositoryConfig, UnitOfWork,
};
use unitdb_store::{FileLog, LogStore, LogStoreConfig, MemoryStore, StoreAdapter, StoreResult};

/// A person with a mandatory name, an optional nickname, a defaulted age
/// and a set of tags.
pub struct Person;

impl Person {
    /// Mandatory.
    pub const NAME: PropertyKey<String> = PropertyKey::new("name");
    /// Optional.
    pub const NICKNAME: PropertyKey<String> = PropertyKey::new("nickname");
    /// Defaults to 0; must not be negative.
    pub const AGE: PropertyKey<i64> = PropertyKey::new("age");
    /// Duplicates are ignored; tags must not be empty.
    pub const TAGS: CollectionKey<String> = CollectionKey::new("tags");
}

impl EntityType for Person {
    const TYPE_NAME: &'static str = "Person";

    fn describe(model: &mut ModelBuilder) {
        model.property(Self::NAME).mandatory().notify_changes();
        model.property(Self::NICKNAME);
        model
            .property(Self::AGE)
            .default_value(|| 0)
            .constraint("non_negative", |age| *age >= 0)
            .notify_changes();
        model
            .set(Self::TAGS)
            .element_constraint("non_empty", |tag: &String| !tag.is_empty())
            .notify_changes();
    }
}

/// A company; its employees are found by querying [`Employee::EMPLOYER`].
pub struct Company;

impl Company {
    /// Mandatory.
    pub const NAME: PropertyKey<String> = PropertyKey::new("name");
}

impl EntityType for Company {
    const TYPE_NAME: &'static str = "Company";

    fn describe(model: &mut ModelBuilder) {
        model.property(Self::NAME).mandatory();
    }
}

/// An employee referencing its employer and the companies it consults for.
pub struct Employee;

impl Employee {
    /// Mandatory.
    pub const NAME: PropertyKey<String> = PropertyKey::new("name");
    /// The employing company.
    pub const EMPLOYER: AssociationKey<Company> = AssociationKey::new("employer");
    /// Companies the employee consults for.
    pub const CLIENTS: ManyAssociationKey<Company> = ManyAssociationKey::new("clients");
}

impl EntityType for Employee {
    const TYPE_NAME: &'static str = "Employee";

    fn describe(model: &mut ModelBuilder) {
        model.property(Self::NAME).mandatory();
        model.association(Self::EMPLOYER);
        model.many_association(Self::CLIENTS);
    }
}

/// Repository over `store` with every fixture type registered.
pub async fn repository<S: StoreAdapter + 'static>(store: S) -> EntityRepository {
    repository_with(Arc::new(store), RepositoryConfig::default(), None).await
}

/// Repository over a fresh [`MemoryStore`].
pub async fn memory_repository() -> EntityRepository {
    repository(MemoryStore::new()).await
}

/// Repository over a shared store with the given configuration and
/// publisher.
pub async fn repository_with(
    store: Arc<dyn StoreAdapter>,
    config: RepositoryConfig,
    publisher: Option<Arc<dyn EventPublisher>>,
) -> EntityRepository {
    let mut builder = EntityRepository::builder_shared(store)
        .config(config)
        .register::<Person>()
        .register::<Company>()
        .register::<Employee>();
    if let Some(publisher) = publisher {
        builder = builder.publisher(publisher);
    }
    builder
        .build()
        .await
        .expect("fixture model is valid over a readable store")
}

/// Creates a person with a name and an age.
pub fn new_person(uow: &UnitOfWork, name: &str, age: i64) -> CoreResult<EntityRef> {
    uow.new_entity::<Person>(|p| {
        p.set(Person::NAME, name)?;
        p.set(Person::AGE, age)
    })
}

/// A log file in a temporary directory that can be opened repeatedly.
pub struct TestLog {
    path: PathBuf,
    _dir: TempDir,
}

impl TestLog {
    /// Creates a new temporary location; the file is created on first open.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        Self {
            path: dir.path().join("unitdb.log"),
            _dir: dir,
        }
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens a [`LogStore`] over the file, replaying what is already there.
    pub fn open(&self) -> StoreResult<LogStore<FileLog>> {
        self.open_with(LogStoreConfig::default())
    }

    /// Like [`open`](Self::open) with an explicit configuration.
    pub fn open_with(&self, config: LogStoreConfig) -> StoreResult<LogStore<FileLog>> {
        LogStore::open(FileLog::open(&self.path)?, config)
    }
}

impl Default for TestLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixture_model_registers() {
        let repository = memory_repository().await;
        assert_eq!(
            repository.entity_types(),
            vec!["Company", "Employee", "Person"]
        );
        let person = repository.descriptor::<Person>().unwrap();
        assert!(person.slot("name").unwrap().is_mandatory());
        assert!(person.slot("age").unwrap().has_default());
    }

    #[test]
    fn test_log_reopens() {
        let log = TestLog::new();
        let store = log.open().unwrap();
        assert_eq!(store.record_count(), 0);
        drop(store);
        assert!(log.path().exists());
        assert!(log.open().is_ok());
    }
}
