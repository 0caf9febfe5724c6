//! Durable store over an append-only log.
//!
//! The committed state is kept in memory in the same versioned tables the
//! [`crate::MemoryStore`] uses. Every storage commit appends one frame and
//! flushes it before the new state is published; opening a store replays
//! the frames.
//!
//! Only index-style equality is evaluated natively (`True`, `==` and
//! conjunctions of those). Callers filter everything else in memory.

mod backend;
mod file;
mod frame;
mod memory;

pub use backend::LogBackend;
pub use file::FileLog;
pub use memory::MemoryLog;

use crate::adapter::{StoreAdapter, StoreCapabilities, StoreCursor, StoreTransaction};
use crate::error::{StoreError, StoreResult};
use crate::key::{ConflictPolicy, RecordKey, StoredRecord};
use crate::predicate::{CompareOp, NativeQuery, Predicate};
use crate::tables::{Engine, Journal, TableTransaction, Tables, Write};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Configuration of a [`LogStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogStoreConfig {
    /// Sync the log to durable storage on every commit.
    pub sync_on_commit: bool,
    /// Conflict resolution between concurrent commits.
    pub conflict_policy: ConflictPolicy,
}

impl Default for LogStoreConfig {
    fn default() -> Self {
        Self {
            sync_on_commit: true,
            conflict_policy: ConflictPolicy::LastWriteWins,
        }
    }
}

impl LogStoreConfig {
    /// Sets whether each commit syncs the log.
    #[must_use]
    pub const fn sync_on_commit(mut self, enabled: bool) -> Self {
        self.sync_on_commit = enabled;
        self
    }

    /// Sets the conflict policy.
    #[must_use]
    pub const fn conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }
}

struct LogJournal<B> {
    backend: Arc<B>,
    sync_on_commit: bool,
}

impl<B: LogBackend> LogJournal<B> {
    fn write_frame(&self, frame: &[u8]) -> StoreResult<()> {
        self.backend.append(frame)?;
        self.backend.flush()?;
        if self.sync_on_commit {
            self.backend.sync()?;
        }
        Ok(())
    }
}

impl<B: LogBackend> Journal for LogJournal<B> {
    fn persist(&self, writes: &[Write]) -> StoreResult<()> {
        let frame = frame::encode_frame(writes)?;
        let start = self.backend.len()?;
        if let Err(err) = self.write_frame(&frame) {
            // A frame that is not durable must not be replayed later.
            if let Err(undo) = self.backend.truncate(start) {
                tracing::error!(error = %undo, "failed to drop partially written frame");
            }
            return Err(err);
        }
        Ok(())
    }
}

/// A durable store over a [`LogBackend`].
///
/// # Example
///
/// ```rust
/// use unitdb_store::{LogStore, LogStoreConfig, MemoryLog, StoreAdapter};
///
/// let log = MemoryLog::new();
/// let store = LogStore::open(log.clone(), LogStoreConfig::default()).unwrap();
/// assert_eq!(store.name(), "log");
/// ```
pub struct LogStore<B: LogBackend + 'static> {
    engine: Arc<Engine>,
    backend: Arc<B>,
    config: LogStoreConfig,
}

impl<B: LogBackend + 'static> LogStore<B> {
    /// Opens a store, replaying every frame in the log.
    ///
    /// A torn tail left by a crash mid-commit is truncated.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupted`] if a frame other than the last one
    /// is damaged, or an I/O error from the backend.
    pub fn open(backend: B, config: LogStoreConfig) -> StoreResult<Self> {
        let backend = Arc::new(backend);
        let bytes = backend.read_all()?;
        let scan = frame::scan(&bytes)?;

        let mut tables = Tables::default();
        for batch in &scan.batches {
            tables = tables.replay(batch)?;
        }
        if scan.valid_len < bytes.len() {
            tracing::warn!(
                valid = scan.valid_len,
                total = bytes.len(),
                "truncating torn tail of store log"
            );
            backend.truncate(scan.valid_len as u64)?;
        }
        tracing::debug!(
            frames = scan.batches.len(),
            records = tables.record_count(),
            "log store recovered"
        );

        let journal = LogJournal {
            backend: Arc::clone(&backend),
            sync_on_commit: config.sync_on_commit,
        };
        Ok(Self {
            engine: Arc::new(Engine::new(
                tables,
                config.conflict_policy,
                Some(Box::new(journal)),
            )),
            backend,
            config,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> LogStoreConfig {
        self.config
    }

    /// Returns the underlying log.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the number of committed records across all types.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.engine.snapshot().record_count()
    }
}

impl<B: LogBackend + 'static> fmt::Debug for LogStore<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogStore")
            .field("config", &self.config)
            .field("records", &self.record_count())
            .finish_non_exhaustive()
    }
}

fn index_evaluable(predicate: &Predicate) -> bool {
    match predicate {
        Predicate::True => true,
        Predicate::Compare {
            op: CompareOp::Eq, ..
        } => true,
        Predicate::And(l, r) => index_evaluable(l) && index_evaluable(r),
        _ => false,
    }
}

#[async_trait]
impl<B: LogBackend + 'static> StoreAdapter for LogStore<B> {
    fn name(&self) -> &str {
        "log"
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            restartable_cursors: true,
            exact_size: true,
            native_paging: true,
        }
    }

    fn supports(&self, predicate: &Predicate) -> bool {
        index_evaluable(predicate)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Precondition;
    use tempfile::tempdir;
    use unitdb_codec::{Record, Value};

    fn named(name: &str) -> Record {
        let mut record = Record::new();
        record.set("name", Value::from(name));
        record
    }

    async fn put(store: &dyn StoreAdapter, id: &str, name: &str) {
        let mut tx = store.begin().await.unwrap();
        tx.put(RecordKey::new("Person", id), named(name), Precondition::None)
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn commits_survive_reopen() {
        let log = MemoryLog::new();
        {
            let store = LogStore::open(log.clone(), LogStoreConfig::default()).unwrap();
            put(&store, "a", "Ulli").await;
            put(&store, "b", "Philipp").await;
            let mut tx = store.begin().await.unwrap();
            tx.delete(RecordKey::new("Person", "a"), Precondition::None)
                .await
                .unwrap();
            tx.commit().await.unwrap();
        }
        let store = LogStore::open(log, LogStoreConfig::default()).unwrap();
        assert_eq!(store.record_count(), 1);
        let b = store.get(&RecordKey::new("Person", "b")).await.unwrap().unwrap();
        assert_eq!(b.record, named("Philipp"));
    }

    #[tokio::test]
    async fn versions_are_stable_across_reopen() {
        let log = MemoryLog::new();
        let before = {
            let store = LogStore::open(log.clone(), LogStoreConfig::default()).unwrap();
            put(&store, "a", "Ulli").await;
            put(&store, "a", "Ulrike").await;
            store.get(&RecordKey::new("Person", "a")).await.unwrap().unwrap().version
        };
        let store = LogStore::open(log, LogStoreConfig::default()).unwrap();
        let after = store.get(&RecordKey::new("Person", "a")).await.unwrap().unwrap().version;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn rollback_writes_nothing() {
        let log = MemoryLog::new();
        let store = LogStore::open(log.clone(), LogStoreConfig::default()).unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.put(RecordKey::new("Person", "a"), named("Ulli"), Precondition::None)
            .await
            .unwrap();
        tx.rollback().await.unwrap();
        assert!(log.bytes().is_empty());
    }

    #[tokio::test]
    async fn torn_tail_is_truncated_on_open() {
        let log = MemoryLog::new();
        {
            let store = LogStore::open(log.clone(), LogStoreConfig::default()).unwrap();
            put(&store, "a", "Ulli").await;
        }
        let intact = log.bytes().len();
        log.append(&frame::FRAME_MAGIC).unwrap();
        log.append(&[0xFF, 0x00]).unwrap();

        let store = LogStore::open(log.clone(), LogStoreConfig::default()).unwrap();
        assert_eq!(store.record_count(), 1);
        assert_eq!(log.bytes().len(), intact);
    }

    #[tokio::test]
    async fn only_equality_is_native() {
        let store = LogStore::open(MemoryLog::new(), LogStoreConfig::default()).unwrap();
        let eq = Predicate::compare("name", CompareOp::Eq, "Ulli");
        let gt = Predicate::compare("age", CompareOp::Gt, 3i64);
        assert!(store.supports(&eq));
        assert!(store.supports(&Predicate::and(eq.clone(), Predicate::True)));
        assert!(!store.supports(&gt));
        assert!(!store.supports(&Predicate::or(eq.clone(), eq)));

        let result = store
            .cursor(&NativeQuery::all("Person").with_filter(gt))
            .await;
        assert!(matches!(result, Err(StoreError::UnsupportedPredicate(_))));
    }

    #[tokio::test]
    async fn optimistic_conflicts_are_not_logged() {
        let log = MemoryLog::new();
        let config = LogStoreConfig::default().conflict_policy(ConflictPolicy::Optimistic);
        let store = LogStore::open(log.clone(), config).unwrap();
        put(&store, "a", "Ulli").await;
        let len = log.bytes().len();

        let mut tx = store.begin().await.unwrap();
        tx.put(RecordKey::new("Person", "a"), named("Other"), Precondition::Absent)
            .await
            .unwrap();
        assert!(matches!(
            tx.commit().await,
            Err(StoreError::Conflict { .. })
        ));
        assert_eq!(log.bytes().len(), len);
    }

    #[tokio::test]
    async fn file_backed_store_reopens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");
        {
            let store =
                LogStore::open(FileLog::open(&path).unwrap(), LogStoreConfig::default()).unwrap();
            put(&store, "a", "Ulli").await;
        }
        let store =
            LogStore::open(FileLog::open(&path).unwrap(), LogStoreConfig::default()).unwrap();
        let a = store.get(&RecordKey::new("Person", "a")).await.unwrap().unwrap();
        assert_eq!(a.record, named("Ulli"));
    }
}
