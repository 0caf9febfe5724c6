//! The store adapter contract.

use crate::error::StoreResult;
use crate::key::{Precondition, RecordKey, StoredRecord};
use crate::predicate::{NativeQuery, Predicate};
use async_trait::async_trait;
use unitdb_codec::Record;

/// Optional behaviour a store declares up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreCapabilities {
    /// Cursors can be rewound with [`StoreCursor::restart`].
    pub restartable_cursors: bool,
    /// Cursors report their size before iteration.
    pub exact_size: bool,
    /// The store applies `offset`/`limit` of a [`NativeQuery`] itself.
    pub native_paging: bool,
}

/// A persistence engine holding property records keyed by entity identity.
///
/// Every operation may suspend. A synchronous store simply completes each
/// future immediately; the query and unit-of-work layers never depend on
/// which kind of store they talk to.
///
/// # Isolation
///
/// A cursor observes a consistent snapshot of the committed state taken when
/// it was created. Writes only become visible through
/// [`StoreTransaction::commit`].
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Short name of the store, for diagnostics.
    fn name(&self) -> &str;

    /// Declared capabilities.
    fn capabilities(&self) -> StoreCapabilities;

    /// Returns `true` if the store evaluates `predicate` natively.
    ///
    /// Callers push down only supported predicates and evaluate the rest in
    /// memory.
    fn supports(&self, predicate: &Predicate) -> bool;

    /// Reads a single committed record.
    async fn get(&self, key: &RecordKey) -> StoreResult<Option<StoredRecord>>;

    /// Opens a cursor over the records matching `query`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::UnsupportedPredicate`] if the filter
    /// contains a predicate the store does not support.
    async fn cursor(&self, query: &NativeQuery) -> StoreResult<Box<dyn StoreCursor>>;

    /// Begins a storage transaction.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;
}

/// A storage-level transaction.
///
/// Writes are staged until [`commit`](Self::commit), which applies all of
/// them or none. Dropping a transaction without committing discards it.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Stages an insert or update.
    async fn put(
        &mut self,
        key: RecordKey,
        record: Record,
        precondition: Precondition,
    ) -> StoreResult<()>;

    /// Stages a delete.
    async fn delete(&mut self, key: RecordKey, precondition: Precondition) -> StoreResult<()>;

    /// Applies all staged writes atomically.
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discards all staged writes.
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Forward iteration over the records matching a [`NativeQuery`].
#[async_trait]
pub trait StoreCursor: Send {
    /// Advances to the next matching record.
    async fn next(&mut self) -> StoreResult<Option<StoredRecord>>;

    /// Total number of records this cursor yields from its start, if known.
    fn exact_size(&self) -> Option<usize>;

    /// Rewinds to the first record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::RestartUnsupported`] unless the store
    /// declares [`StoreCapabilities::restartable_cursors`].
    async fn restart(&mut self) -> StoreResult<()>;
}
