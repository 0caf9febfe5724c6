//! # UnitDB Core
//!
//! Object persistence over a pluggable [`StoreAdapter`](unitdb_store::StoreAdapter).
//!
//! This crate provides:
//! - Typed entity models declared once per type ([`EntityType`])
//! - Concern chains that intercept every property access
//! - Units of work with an identity map and all-or-nothing commit
//! - Lazy queries that combine stored records with uncommitted changes
//!
//! ## Lifecycle
//!
//! An [`EntityRepository`] binds registered entity types to one store. Work
//! happens in a [`UnitOfWork`]: entities are created, loaded, queried and
//! changed there, then written in one storage transaction by
//! [`UnitOfWork::commit`] or thrown away by [`UnitOfWork::rollback`].
//!
//! ```text
//!            set()            commit
//!   LOADED ─────────▶ MODIFIED ───────▶ SUBMITTED
//!      │   ◀─────────   │
//!      │  values equal  │ remove()
//!      └───────────────▶ REMOVED ───────▶ SUBMITTED
//!   NEW ──────────────────────────────▶ SUBMITTED
//! ```
//!
//! ## Example
//!
//! ```rust
//! use unitdb_core::{EntityRepository, EntityType, Expression, ModelBuilder, PropertyKey};
//! use unitdb_store::MemoryStore;
//!
//! struct Person;
//!
//! impl Person {
//!     const NAME: PropertyKey<String> = PropertyKey::new("name");
//!     const AGE: PropertyKey<i64> = PropertyKey::new("age");
//! }
//!
//! impl EntityType for Person {
//!     const TYPE_NAME: &'static str = "Person";
//!
//!     fn describe(model: &mut ModelBuilder) {
//!         model.property(Self::NAME).mandatory();
//!         model
//!             .property(Self::AGE)
//!             .default_value(|| 0)
//!             .constraint("non_negative", |age| *age >= 0);
//!     }
//! }
//!
//! # let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # runtime.block_on(async {
//! let repository = EntityRepository::builder(MemoryStore::new())
//!     .register::<Person>()
//!     .build()
//!     .await?;
//!
//! let uow = repository.new_unit_of_work();
//! uow.new_entity::<Person>(|p| {
//!     p.set(Person::NAME, "Ulli")?;
//!     p.set(Person::AGE, 40)
//! })?;
//! uow.commit().await?;
//!
//! let uow = repository.new_unit_of_work();
//! let mut query = uow.query::<Person>()?;
//! query.filter(Expression::eq(Person::NAME, "Ulli"));
//! let ulli = query.first().await?.expect("stored above");
//! assert_eq!(ulli.get(Person::AGE)?, Some(40));
//! # Ok::<(), unitdb_core::CoreError>(())
//! # }).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod concern;
mod config;
mod entity;
mod error;
mod event;
mod property;
mod query;
mod repository;
mod types;
mod uow;

pub use concern::{
    ChangeNotificationConcern, CollectionConcern, CollectionConcernLink, CollectionSlot,
    ConcernLink, ConstraintConcern, ElementConstraintConcern, PropertyConcern, PropertySlot,
    SlotContext,
};
pub use config::{IdentityStrategy, RepositoryConfig};
pub use entity::{
    AssociationKey, CollectionBuilder, CollectionKey, ElementTemplate, Entity, EntityDescriptor,
    EntityId, EntityRef, EntityStatus, EntityType, ManyAssociationKey, ModelBuilder,
    PropertyBuilder, PropertyKey, PropertyValue, SlotDescriptor, SlotKind, SlotTemplate,
    ValueFactory, ValueTemplate,
};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use event::{ChangeEvent, ChangeFeed, EventPublisher, SequencedEvent};
pub use property::{Association, CollectionProperty, ManyAssociation, Property};
pub use query::{Expression, Query, ResultSet};
pub use repository::{EntityRepository, RepositoryBuilder};
pub use types::UnitOfWorkId;
pub use uow::{CloseHandle, UnitOfWork};
