//! In-memory reference store.

use crate::adapter::{StoreAdapter, StoreCapabilities, StoreCursor, StoreTransaction};
use crate::error::{StoreError, StoreResult};
use crate::key::{ConflictPolicy, RecordKey, StoredRecord};
use crate::predicate::{NativeQuery, Predicate};
use crate::tables::{Engine, TableTransaction, Tables};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// A store keeping every record in memory.
///
/// This store is suitable for:
/// - Unit and integration tests
/// - Ephemeral repositories that don't need persistence
///
/// Cursors iterate the snapshot taken when they were opened, can be
/// restarted, know their size up front and apply paging natively. Every
/// standard predicate is supported, plus the [`crate::STARTS_WITH`] custom
/// operator.
///
/// # Example
///
/// ```rust
/// use unitdb_codec::{Record, Value};
/// use unitdb_store::{MemoryStore, Precondition, RecordKey, StoreAdapter};
///
/// # tokio_test_block_on(async {
/// let store = MemoryStore::new();
/// let mut tx = store.begin().await.unwrap();
/// let mut record = Record::new();
/// record.set("name", Value::from("Ulli"));
/// tx.put(RecordKey::new("Person", "p1"), record, Precondition::Absent).await.unwrap();
/// tx.commit().await.unwrap();
///
/// let stored = store.get(&RecordKey::new("Person", "p1")).await.unwrap();
/// assert!(stored.is_some());
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    engine: Arc<Engine>,
}

impl MemoryStore {
    /// Creates an empty store with last-write-wins conflict resolution.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(ConflictPolicy::default())
    }

    /// Creates an empty store with the given conflict policy.
    #[must_use]
    pub fn with_policy(policy: ConflictPolicy) -> Self {
        Self {
            engine: Arc::new(Engine::new(Tables::default(), policy, None)),
        }
    }

    /// Returns the conflict policy.
    #[must_use]
    pub fn policy(&self) -> ConflictPolicy {
        self.engine.policy()
    }

    /// Returns the number of committed records across all types.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.engine.snapshot().record_count()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("policy", &self.policy())
            .field("records", &self.record_count())
            .finish()
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            restartable_cursors: true,
            exact_size: true,
            native_paging: true,
        }
    }

    fn supports(&self, predicate: &Predicate) -> bool {
        predicate.is_evaluable()
    }

    async fn get(&self, key: &RecordKey) -> StoreResult<Option<StoredRecord>> {
        Ok(self.engine.snapshot().get(key))
    }

    async fn cursor(&self, query: &NativeQuery) -> StoreResult<Box<dyn StoreCursor>> {
        if !self.supports(&query.filter) {
            return Err(StoreError::unsupported_predicate(query.filter.to_string()));
        }
        Ok(Box::new(self.engine.cursor(query)?))
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        Ok(Box::new(TableTransaction::new(Arc::clone(&self.engine))))
    }
}
