//! Store wrappers for exercising the core against misbehaving stores.
//!
//! - [`RecordingStore`] logs every call it forwards
//! - [`FailingStore`] fails the n-th transactional call
//! - [`SuspendingStore`] yields before every call, hides its cursor size,
//!   and can stall forever at a chosen point

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use unitdb_codec::Record;
use unitdb_core::{ChangeEvent, EventPublisher};
use unitdb_store::{
    NativeQuery, Precondition, Predicate, RecordKey, StoreAdapter, StoreCapabilities, StoreCursor,
    StoreError, StoreResult, StoreTransaction, StoredRecord,
};

/// A call observed by a [`RecordingStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// `get`
    Get(RecordKey),
    /// `cursor`
    Cursor(NativeQuery),
    /// `begin`
    Begin,
    /// Staged insert or update.
    Put(RecordKey, Precondition),
    /// Staged delete.
    Delete(RecordKey, Precondition),
    /// Transaction commit.
    Commit,
    /// Transaction rollback.
    Rollback,
}

/// Forwards to another store and records each call.
#[derive(Clone)]
pub struct RecordingStore {
    inner: Arc<dyn StoreAdapter>,
    log: Arc<Mutex<Vec<StoreOp>>>,
}

impl RecordingStore {
    /// Wraps `inner`.
    pub fn new(inner: impl StoreAdapter + 'static) -> Self {
        Self::shared(Arc::new(inner))
    }

    /// Wraps a store that is also used directly.
    pub fn shared(inner: Arc<dyn StoreAdapter>) -> Self {
        Self {
            inner,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Calls recorded so far.
    pub fn ops(&self) -> Vec<StoreOp> {
        self.log.lock().clone()
    }

    /// Forgets the recorded calls.
    pub fn clear(&self) {
        self.log.lock().clear();
    }

    fn record(&self, op: StoreOp) {
        self.log.lock().push(op);
    }
}

#[async_trait]
impl StoreAdapter for RecordingStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.inner.capabilities()
    }

    fn supports(&self, predicate: &Predicate) -> bool {
        self.inner.supports(predicate)
    }

    async fn get(&self, key: &RecordKey) -> StoreResult<Option<StoredRecord>> {
        self.record(StoreOp::Get(key.clone()));
        self.inner.get(key).await
    }

    async fn cursor(&self, query: &NativeQuery) -> StoreResult<Box<dyn StoreCursor>> {
        self.record(StoreOp::Cursor(query.clone()));
        self.inner.cursor(query).await
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        self.record(StoreOp::Begin);
        let inner = self.inner.begin().await?;
        Ok(Box::new(RecordingTransaction {
            inner,
            log: Arc::clone(&self.log),
        }))
    }
}

struct RecordingTransaction {
    inner: Box<dyn StoreTransaction>,
    log: Arc<Mutex<Vec<StoreOp>>>,
}

#[async_trait]
impl StoreTransaction for RecordingTransaction {
    async fn put(
        &mut self,
        key: RecordKey,
        record: Record,
        precondition: Precondition,
    ) -> StoreResult<()> {
        self.log.lock().push(StoreOp::Put(key.clone(), precondition));
        self.inner.put(key, record, precondition).await
    }

    async fn delete(&mut self, key: RecordKey, precondition: Precondition) -> StoreResult<()> {
        self.log
            .lock()
            .push(StoreOp::Delete(key.clone(), precondition));
        self.inner.delete(key, precondition).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.log.lock().push(StoreOp::Commit);
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.log.lock().push(StoreOp::Rollback);
        self.inner.rollback().await
    }
}

#[derive(Default)]
struct Faults {
    fail_at: Mutex<Option<usize>>,
    calls: AtomicUsize,
}

impl Faults {
    /// Counts one transactional call and decides whether it fails.
    fn check(&self, what: &str) -> StoreResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_at.lock() == Some(call) {
            return Err(StoreError::backend(format!(
                "injected failure at call {call} ({what})"
            )));
        }
        Ok(())
    }
}

/// Forwards to another store, failing one chosen transactional call.
///
/// Calls are counted across `begin`, `put`, `delete` and `commit`,
/// starting at 0.
#[derive(Clone)]
pub struct FailingStore {
    inner: Arc<dyn StoreAdapter>,
    faults: Arc<Faults>,
}

impl FailingStore {
    /// Wraps `inner` with no failure armed.
    pub fn new(inner: impl StoreAdapter + 'static) -> Self {
        Self::shared(Arc::new(inner))
    }

    /// Wraps a store that is also used directly.
    pub fn shared(inner: Arc<dyn StoreAdapter>) -> Self {
        Self {
            inner,
            faults: Arc::new(Faults::default()),
        }
    }

    /// Arms a failure at transactional call `n` and resets the counter.
    pub fn fail_at(&self, n: usize) {
        *self.faults.fail_at.lock() = Some(n);
        self.faults.calls.store(0, Ordering::SeqCst);
    }

    /// Disarms the failure and resets the counter.
    pub fn heal(&self) {
        *self.faults.fail_at.lock() = None;
        self.faults.calls.store(0, Ordering::SeqCst);
    }

    /// Transactional calls counted since the last reset.
    pub fn calls(&self) -> usize {
        self.faults.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreAdapter for FailingStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.inner.capabilities()
    }

    fn supports(&self, predicate: &Predicate) -> bool {
        self.inner.supports(predicate)
    }

    async fn get(&self, key: &RecordKey) -> StoreResult<Option<StoredRecord>> {
        self.inner.get(key).await
    }

    async fn cursor(&self, query: &NativeQuery) -> StoreResult<Box<dyn StoreCursor>> {
        self.inner.cursor(query).await
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        self.faults.check("begin")?;
        let inner = self.inner.begin().await?;
        Ok(Box::new(FailingTransaction {
            inner,
            faults: Arc::clone(&self.faults),
        }))
    }
}

struct FailingTransaction {
    inner: Box<dyn StoreTransaction>,
    faults: Arc<Faults>,
}

#[async_trait]
impl StoreTransaction for FailingTransaction {
    async fn put(
        &mut self,
        key: RecordKey,
        record: Record,
        precondition: Precondition,
    ) -> StoreResult<()> {
        self.faults.check("put")?;
        self.inner.put(key, record, precondition).await
    }

    async fn delete(&mut self, key: RecordKey, precondition: Precondition) -> StoreResult<()> {
        self.faults.check("delete")?;
        self.inner.delete(key, precondition).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        // The inner transaction is dropped uncommitted on failure.
        self.faults.check("commit")?;
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.inner.rollback().await
    }
}

/// Where a [`SuspendingStore`] stops making progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallPoint {
    /// The cursor advance after `n` records were returned.
    CursorNext(usize),
    /// Every staged `put`.
    Put,
}

struct Stall {
    point: Mutex<Option<StallPoint>>,
    reached: Notify,
}

/// Forwards to another store, suspending before every call.
///
/// Cursors report no size and cannot be restarted, and paging is left to
/// the caller, like a callback-driven backend. A [`StallPoint`] makes the
/// chosen call pend until the caller gives up on it.
#[derive(Clone)]
pub struct SuspendingStore {
    inner: Arc<dyn StoreAdapter>,
    stall: Arc<Stall>,
}

impl SuspendingStore {
    /// Wraps `inner`.
    pub fn new(inner: impl StoreAdapter + 'static) -> Self {
        Self::shared(Arc::new(inner))
    }

    /// Wraps a store that is also used directly.
    pub fn shared(inner: Arc<dyn StoreAdapter>) -> Self {
        Self {
            inner,
            stall: Arc::new(Stall {
                point: Mutex::new(None),
                reached: Notify::new(),
            }),
        }
    }

    /// Makes calls at `point` pend forever.
    pub fn stall_at(&self, point: StallPoint) {
        *self.stall.point.lock() = Some(point);
    }

    /// Resolves once a call reached the stall point.
    pub async fn stalled(&self) {
        self.stall.reached.notified().await;
    }
}

impl Stall {
    async fn at(&self, point: StallPoint) {
        let armed = *self.point.lock() == Some(point);
        if armed {
            self.reached.notify_one();
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl StoreAdapter for SuspendingStore {
    fn name(&self) -> &str {
        "suspending"
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            restartable_cursors: false,
            exact_size: false,
            native_paging: false,
        }
    }

    fn supports(&self, predicate: &Predicate) -> bool {
        self.inner.supports(predicate)
    }

    async fn get(&self, key: &RecordKey) -> StoreResult<Option<StoredRecord>> {
        tokio::task::yield_now().await;
        self.inner.get(key).await
    }

    async fn cursor(&self, query: &NativeQuery) -> StoreResult<Box<dyn StoreCursor>> {
        tokio::task::yield_now().await;
        let inner = self.inner.cursor(query).await?;
        Ok(Box::new(SuspendingCursor {
            inner,
            returned: 0,
            stall: Arc::clone(&self.stall),
        }))
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        tokio::task::yield_now().await;
        let inner = self.inner.begin().await?;
        Ok(Box::new(SuspendingTransaction {
            inner,
            stall: Arc::clone(&self.stall),
        }))
    }
}

struct SuspendingCursor {
    inner: Box<dyn StoreCursor>,
    returned: usize,
    stall: Arc<Stall>,
}

#[async_trait]
impl StoreCursor for SuspendingCursor {
    async fn next(&mut self) -> StoreResult<Option<StoredRecord>> {
        tokio::task::yield_now().await;
        self.stall.at(StallPoint::CursorNext(self.returned)).await;
        let record = self.inner.next().await?;
        if record.is_some() {
            self.returned += 1;
        }
        Ok(record)
    }

    fn exact_size(&self) -> Option<usize> {
        None
    }

    async fn restart(&mut self) -> StoreResult<()> {
        Err(StoreError::RestartUnsupported)
    }
}

struct SuspendingTransaction {
    inner: Box<dyn StoreTransaction>,
    stall: Arc<Stall>,
}

#[async_trait]
impl StoreTransaction for SuspendingTransaction {
    async fn put(
        &mut self,
        key: RecordKey,
        record: Record,
        precondition: Precondition,
    ) -> StoreResult<()> {
        tokio::task::yield_now().await;
        self.stall.at(StallPoint::Put).await;
        self.inner.put(key, record, precondition).await
    }

    async fn delete(&mut self, key: RecordKey, precondition: Precondition) -> StoreResult<()> {
        tokio::task::yield_now().await;
        self.inner.delete(key, precondition).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        tokio::task::yield_now().await;
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.inner.rollback().await
    }
}

/// Publisher that keeps every event in memory.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<ChangeEvent>>,
}

impl RecordingPublisher {
    /// Creates an empty publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events published so far.
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().clone()
    }

    /// Removes and returns the events published so far.
    pub fn take(&self) -> Vec<ChangeEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: ChangeEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unitdb_store::MemoryStore;

    fn record(name: &str) -> Record {
        [("name".to_string(), unitdb_codec::Value::from(name))]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn recording_store_logs_transaction_calls() {
        let store = RecordingStore::new(MemoryStore::new());
        let key = RecordKey::new("Person", "p-1");
        let mut tx = store.begin().await.unwrap();
        tx.put(key.clone(), record("Ulli"), Precondition::Absent)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(
            store.ops(),
            vec![
                StoreOp::Begin,
                StoreOp::Put(key, Precondition::Absent),
                StoreOp::Commit
            ]
        );
    }

    #[tokio::test]
    async fn failing_store_fails_the_armed_call() {
        let inner = Arc::new(MemoryStore::new());
        let store = FailingStore::shared(inner.clone());
        store.fail_at(1);

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .put(RecordKey::new("Person", "p-1"), record("Ulli"), Precondition::None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        tx.rollback().await.unwrap();
        assert_eq!(inner.record_count(), 0);
        assert_eq!(store.calls(), 2);
    }

    #[tokio::test]
    async fn suspending_cursor_hides_its_size() {
        let store = SuspendingStore::new(MemoryStore::new());
        let mut cursor = store.cursor(&NativeQuery::all("Person")).await.unwrap();
        assert_eq!(cursor.exact_size(), None);
        assert!(cursor.next().await.unwrap().is_none());
        assert!(matches!(
            cursor.restart().await,
            Err(StoreError::RestartUnsupported)
        ));
    }
}
