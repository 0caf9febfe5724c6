//! Queries over the entities of one type.
//!
//! A [`Query`] combines a filter [`Expression`] with an optional window.
//! Executing it splits the filter into the part the store evaluates
//! natively and a residual evaluated in memory, then returns a lazy
//! [`ResultSet`] that merges the store's records with the unit of work's
//! resident entities.
//!
//! # Example
//!
//! ```rust
//! # use unitdb_core::{EntityRepository, EntityType, Expression, ModelBuilder, PropertyKey};
//! # use unitdb_store::MemoryStore;
//! # struct Person;
//! # impl Person {
//! #     const NAME: PropertyKey<String> = PropertyKey::new("name");
//! #     const AGE: PropertyKey<i64> = PropertyKey::new("age");
//! # }
//! # impl EntityType for Person {
//! #     const TYPE_NAME: &'static str = "Person";
//! #     fn describe(model: &mut ModelBuilder) {
//! #         model.property(Self::NAME);
//! #         model.property(Self::AGE);
//! #     }
//! # }
//! # let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # runtime.block_on(async {
//! # let repository = EntityRepository::builder(MemoryStore::new()).register::<Person>().build().await?;
//! let uow = repository.new_unit_of_work();
//! for (name, age) in [("Ulli", 40), ("Philipp", 12)] {
//!     uow.new_entity::<Person>(|p| {
//!         p.set(Person::NAME, name)?;
//!         p.set(Person::AGE, age)
//!     })?;
//! }
//!
//! let mut query = uow.query::<Person>()?;
//! query
//!     .filter(Expression::ge(Person::AGE, 18))
//!     .max_results(10);
//! let adults = query.execute().await?.collect().await?;
//! assert_eq!(adults.len(), 1);
//! # Ok::<(), unitdb_core::CoreError>(())
//! # }).unwrap();
//! ```

mod expr;
mod plan;
mod result;

pub use expr::Expression;
pub use result::ResultSet;

use crate::entity::{EntityDescriptor, EntityRef, EntityType};
use crate::error::{CoreError, CoreResult};
use crate::uow::UnitOfWork;
use plan::Plan;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use unitdb_store::Predicate;

/// A reusable query over entities of type `T`.
///
/// Builder methods mutate the query in place; each
/// [`execute`](Self::execute) returns a fresh [`ResultSet`] and leaves the
/// query unchanged.
pub struct Query<'u, T> {
    uow: &'u UnitOfWork,
    descriptor: Arc<EntityDescriptor>,
    filter: Option<Predicate>,
    first_result: usize,
    max_results: Option<usize>,
    _marker: PhantomData<fn() -> T>,
}

impl<'u, T: EntityType> Query<'u, T> {
    pub(crate) fn new(uow: &'u UnitOfWork, descriptor: Arc<EntityDescriptor>) -> Self {
        Self {
            uow,
            descriptor,
            filter: None,
            first_result: 0,
            max_results: None,
            _marker: PhantomData,
        }
    }

    /// Replaces the filter.
    pub fn filter(&mut self, expression: Expression) -> &mut Self {
        self.filter = Some(expression.into_predicate());
        self
    }

    /// Narrows the filter with another conjunct.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] if no filter was set yet.
    pub fn and_filter(&mut self, expression: Expression) -> CoreResult<&mut Self> {
        let current = self.filter.take().ok_or_else(|| {
            CoreError::illegal_state("and_filter requires a filter to narrow")
        })?;
        self.filter = Some(Predicate::and(current, expression.into_predicate()));
        Ok(self)
    }

    /// Skips the first `n` matches.
    pub fn first_result(&mut self, n: usize) -> &mut Self {
        self.first_result = n;
        self
    }

    /// Returns at most `n` matches.
    pub fn max_results(&mut self, n: usize) -> &mut Self {
        self.max_results = Some(n);
        self
    }

    /// The current filter.
    #[must_use]
    pub fn expression(&self) -> Expression {
        self.filter.clone().unwrap_or_default().into()
    }

    /// Runs the query.
    ///
    /// # Errors
    ///
    /// - [`CoreError::UnknownProperty`] if the filter names a slot `T` does
    ///   not declare
    /// - [`CoreError::UnsupportedPredicate`] if part of the filter can be
    ///   evaluated neither by the store nor in memory
    /// - [`CoreError::Store`] if the store cannot open a cursor
    pub async fn execute(&self) -> CoreResult<ResultSet<'u, T>> {
        self.uow.check_open()?;
        let filter = self.filter.clone().unwrap_or_default();
        self.check_fields(&filter)?;

        let residents = self.uow.residents_of(T::TYPE_NAME);
        let limit = self
            .max_results
            .or(self.uow.config().default_max_results);
        let plan = Plan::new(
            self.uow.store(),
            T::TYPE_NAME,
            &filter,
            self.first_result,
            limit,
            !residents.is_empty(),
        )?;

        let cursor = self.uow.guard(self.uow.store().cursor(&plan.native)).await?;
        Ok(ResultSet::new(
            self.uow,
            Arc::clone(&self.descriptor),
            filter,
            plan,
            cursor,
        ))
    }

    /// Number of matches, honoring the window.
    pub async fn count(&self) -> CoreResult<usize> {
        self.execute().await?.size().await
    }

    /// First match, if any.
    pub async fn first(&self) -> CoreResult<Option<EntityRef>> {
        self.execute().await?.next().await
    }

    fn check_fields(&self, filter: &Predicate) -> CoreResult<()> {
        let mut fields = Vec::new();
        collect_fields(filter, &mut fields);
        match fields
            .into_iter()
            .find(|field| self.descriptor.slot(field).is_none())
        {
            Some(field) => Err(CoreError::UnknownProperty {
                entity_type: T::TYPE_NAME.to_string(),
                property: field.to_string(),
            }),
            None => Ok(()),
        }
    }
}

fn collect_fields<'p>(predicate: &'p Predicate, out: &mut Vec<&'p str>) {
    match predicate {
        Predicate::True => {}
        Predicate::And(l, r) | Predicate::Or(l, r) => {
            collect_fields(l, out);
            collect_fields(r, out);
        }
        Predicate::Not(inner) => collect_fields(inner, out),
        Predicate::Compare { field, .. }
        | Predicate::Contains { field, .. }
        | Predicate::Custom { field, .. }
        | Predicate::IsSet(field)
        | Predicate::IsNotSet(field) => out.push(field),
    }
}

impl<T: EntityType> fmt::Debug for Query<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("entity_type", &T::TYPE_NAME)
            .field("filter", &self.expression().to_string())
            .field("first_result", &self.first_result)
            .field("max_results", &self.max_results)
            .finish()
    }
}
