//! Copy-on-write versioned tables shared by the bundled stores.
//!
//! Committed state is an immutable [`Tables`] value behind an `Arc`. A
//! commit builds the next value (cloning only the touched per-type tables)
//! and swaps it in under a write lock, so cursors keep iterating the
//! snapshot they were created on.

use crate::adapter::{StoreCursor, StoreTransaction};
use crate::error::{StoreError, StoreResult};
use crate::key::{ConflictPolicy, Precondition, RecordKey, StoredRecord};
use crate::predicate::{NativeQuery, Predicate};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use unitdb_codec::Record;

/// Records of one entity type, ordered by identity.
pub(crate) type Table = BTreeMap<String, Versioned>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Versioned {
    pub(crate) record: Record,
    pub(crate) version: u64,
}

/// One staged write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Write {
    Put {
        key: RecordKey,
        record: Record,
        precondition: Precondition,
    },
    Delete {
        key: RecordKey,
        precondition: Precondition,
    },
}

impl Write {
    pub(crate) fn key(&self) -> &RecordKey {
        match self {
            Self::Put { key, .. } | Self::Delete { key, .. } => key,
        }
    }

    fn precondition(&self) -> Precondition {
        match self {
            Self::Put { precondition, .. } | Self::Delete { precondition, .. } => *precondition,
        }
    }
}

/// An immutable snapshot of every table.
#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    types: BTreeMap<String, Arc<Table>>,
    last_version: u64,
}

impl Tables {
    pub(crate) fn get(&self, key: &RecordKey) -> Option<StoredRecord> {
        let entry = self.types.get(&key.entity_type)?.get(&key.id)?;
        Some(StoredRecord {
            key: key.clone(),
            record: entry.record.clone(),
            version: entry.version,
        })
    }

    fn version_of(&self, key: &RecordKey) -> Option<u64> {
        self.types
            .get(&key.entity_type)
            .and_then(|table| table.get(&key.id))
            .map(|entry| entry.version)
    }

    pub(crate) fn table(&self, entity_type: &str) -> Option<Arc<Table>> {
        self.types.get(entity_type).cloned()
    }

    pub(crate) fn record_count(&self) -> usize {
        self.types.values().map(|table| table.len()).sum()
    }

    /// Applies a batch in order, returning the resulting snapshot.
    ///
    /// Each write's precondition is checked against the state left by the
    /// writes before it, so a delete followed by an insert of the same key
    /// succeeds within one batch. `Absent` is checked under every policy;
    /// the other preconditions only under [`ConflictPolicy::Optimistic`].
    pub(crate) fn apply(&self, writes: &[Write], policy: ConflictPolicy) -> StoreResult<Tables> {
        self.apply_checked(writes, |precondition| {
            policy == ConflictPolicy::Optimistic || precondition == Precondition::Absent
        })
    }

    /// Applies a batch that was already checked when it was committed.
    pub(crate) fn replay(&self, writes: &[Write]) -> StoreResult<Tables> {
        self.apply_checked(writes, |_| false)
    }

    fn apply_checked(
        &self,
        writes: &[Write],
        enforced: impl Fn(Precondition) -> bool,
    ) -> StoreResult<Tables> {
        let mut next = self.clone();
        for write in writes {
            let key = write.key();
            let precondition = write.precondition();
            if enforced(precondition) {
                let current = next.version_of(key);
                if !precondition.holds(current) {
                    return Err(StoreError::Conflict {
                        key: key.clone(),
                        expected: precondition,
                        current,
                    });
                }
            }
            match write {
                Write::Put { key, record, .. } => {
                    next.last_version += 1;
                    let entry = Versioned {
                        record: record.clone(),
                        version: next.last_version,
                    };
                    let table = next.types.entry(key.entity_type.clone()).or_default();
                    Arc::make_mut(table).insert(key.id.clone(), entry);
                }
                Write::Delete { key, .. } => {
                    if let Some(table) = next.types.get_mut(&key.entity_type) {
                        Arc::make_mut(table).remove(&key.id);
                    }
                }
            }
        }
        Ok(next)
    }
}

/// Hook run while the commit lock is held, before the new snapshot is
/// published.
pub(crate) trait Journal: Send + Sync {
    fn persist(&self, writes: &[Write]) -> StoreResult<()>;
}

/// Shared committed state of a store.
pub(crate) struct Engine {
    tables: RwLock<Arc<Tables>>,
    policy: ConflictPolicy,
    journal: Option<Box<dyn Journal>>,
}

impl Engine {
    pub(crate) fn new(
        tables: Tables,
        policy: ConflictPolicy,
        journal: Option<Box<dyn Journal>>,
    ) -> Self {
        Self {
            tables: RwLock::new(Arc::new(tables)),
            policy,
            journal,
        }
    }

    pub(crate) fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    pub(crate) fn snapshot(&self) -> Arc<Tables> {
        Arc::clone(&self.tables.read())
    }

    pub(crate) fn commit(&self, writes: &[Write]) -> StoreResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let mut current = self.tables.write();
        let next = current.apply(writes, self.policy)?;
        if let Some(journal) = &self.journal {
            journal.persist(writes)?;
        }
        *current = Arc::new(next);
        Ok(())
    }

    pub(crate) fn cursor(&self, query: &NativeQuery) -> StoreResult<TableCursor> {
        TableCursor::open(self.snapshot(), query)
    }
}

/// Transaction staging writes for an [`Engine`].
pub(crate) struct TableTransaction {
    engine: Arc<Engine>,
    writes: Vec<Write>,
}

impl TableTransaction {
    pub(crate) fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            writes: Vec::new(),
        }
    }
}

#[async_trait]
impl StoreTransaction for TableTransaction {
    async fn put(
        &mut self,
        key: RecordKey,
        record: Record,
        precondition: Precondition,
    ) -> StoreResult<()> {
        self.writes.push(Write::Put {
            key,
            record,
            precondition,
        });
        Ok(())
    }

    async fn delete(&mut self, key: RecordKey, precondition: Precondition) -> StoreResult<()> {
        self.writes.push(Write::Delete { key, precondition });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.engine.commit(&self.writes)?;
        tracing::trace!(writes = self.writes.len(), "store transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        tracing::trace!(writes = self.writes.len(), "store transaction rolled back");
        Ok(())
    }
}

/// Cursor over one table of a snapshot.
pub(crate) struct TableCursor {
    entity_type: String,
    table: Option<Arc<Table>>,
    filter: Predicate,
    offset: usize,
    limit: Option<usize>,
    size: usize,
    /// Identity of the last record scanned.
    position: Option<String>,
    exhausted: bool,
    skipped: usize,
    yielded: usize,
}

impl TableCursor {
    fn open(snapshot: Arc<Tables>, query: &NativeQuery) -> StoreResult<Self> {
        let table = snapshot.table(&query.entity_type);
        let matching = match (&table, &query.filter) {
            (None, _) => 0,
            (Some(table), Predicate::True) => table.len(),
            (Some(table), filter) => {
                let mut count = 0;
                for entry in table.values() {
                    if filter.evaluate(&entry.record)? {
                        count += 1;
                    }
                }
                count
            }
        };
        let windowed = matching.saturating_sub(query.offset);
        Ok(Self {
            entity_type: query.entity_type.clone(),
            table,
            filter: query.filter.clone(),
            offset: query.offset,
            limit: query.limit,
            size: query.limit.map_or(windowed, |limit| windowed.min(limit)),
            position: None,
            exhausted: false,
            skipped: 0,
            yielded: 0,
        })
    }

    fn advance(&mut self) -> StoreResult<Option<StoredRecord>> {
        if self.exhausted || self.limit.is_some_and(|limit| self.yielded >= limit) {
            return Ok(None);
        }
        let Some(table) = self.table.clone() else {
            self.exhausted = true;
            return Ok(None);
        };
        let start = match &self.position {
            Some(id) => Bound::Excluded(id.as_str()),
            None => Bound::Unbounded,
        };
        let mut found = None;
        let mut last_scanned = None;
        for (id, entry) in table.range::<str, _>((start, Bound::Unbounded)) {
            last_scanned = Some(id);
            if !self.filter.evaluate(&entry.record)? {
                continue;
            }
            if self.skipped < self.offset {
                self.skipped += 1;
                continue;
            }
            found = Some((id, entry));
            break;
        }
        match found {
            Some((id, entry)) => {
                self.yielded += 1;
                self.position = Some(id.clone());
                Ok(Some(StoredRecord {
                    key: RecordKey::new(self.entity_type.clone(), id.clone()),
                    record: entry.record.clone(),
                    version: entry.version,
                }))
            }
            None => {
                if let Some(id) = last_scanned {
                    self.position = Some(id.clone());
                }
                self.exhausted = true;
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl StoreCursor for TableCursor {
    async fn next(&mut self) -> StoreResult<Option<StoredRecord>> {
        self.advance()
    }

    fn exact_size(&self) -> Option<usize> {
        Some(self.size)
    }

    async fn restart(&mut self) -> StoreResult<()> {
        self.position = None;
        self.exhausted = false;
        self.skipped = 0;
        self.yielded = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unitdb_codec::Value;

    fn put(id: &str, n: i64, precondition: Precondition) -> Write {
        let mut record = Record::new();
        record.set("n", Value::Integer(n));
        Write::Put {
            key: RecordKey::new("T", id),
            record,
            precondition,
        }
    }

    #[test]
    fn apply_assigns_increasing_versions() {
        let tables = Tables::default()
            .apply(
                &[put("a", 1, Precondition::Absent), put("b", 2, Precondition::Absent)],
                ConflictPolicy::Optimistic,
            )
            .unwrap();
        let a = tables.get(&RecordKey::new("T", "a")).unwrap();
        let b = tables.get(&RecordKey::new("T", "b")).unwrap();
        assert!(a.version < b.version);
        assert_eq!(tables.record_count(), 2);
    }

    #[test]
    fn apply_is_all_or_nothing() {
        let base = Tables::default()
            .apply(&[put("a", 1, Precondition::None)], ConflictPolicy::Optimistic)
            .unwrap();
        let result = base.apply(
            &[put("b", 2, Precondition::Absent), put("a", 3, Precondition::Absent)],
            ConflictPolicy::Optimistic,
        );
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        assert!(base.get(&RecordKey::new("T", "b")).is_none());
    }

    #[test]
    fn delete_then_insert_in_one_batch() {
        let base = Tables::default()
            .apply(&[put("a", 1, Precondition::None)], ConflictPolicy::Optimistic)
            .unwrap();
        let version = base.get(&RecordKey::new("T", "a")).unwrap().version;
        let next = base
            .apply(
                &[
                    Write::Delete {
                        key: RecordKey::new("T", "a"),
                        precondition: Precondition::Version(version),
                    },
                    put("a", 9, Precondition::Absent),
                ],
                ConflictPolicy::Optimistic,
            )
            .unwrap();
        let stored = next.get(&RecordKey::new("T", "a")).unwrap();
        assert_eq!(stored.record.get("n"), Some(&Value::Integer(9)));
    }

    #[test]
    fn last_write_wins_ignores_stale_versions() {
        let base = Tables::default()
            .apply(&[put("a", 1, Precondition::None)], ConflictPolicy::LastWriteWins)
            .unwrap();
        let next = base
            .apply(&[put("a", 2, Precondition::Version(99))], ConflictPolicy::LastWriteWins)
            .unwrap();
        let stored = next.get(&RecordKey::new("T", "a")).unwrap();
        assert_eq!(stored.record.get("n"), Some(&Value::Integer(2)));
    }

    #[test]
    fn last_write_wins_still_refuses_to_insert_over_a_record() {
        let base = Tables::default()
            .apply(&[put("a", 1, Precondition::Absent)], ConflictPolicy::LastWriteWins)
            .unwrap();
        let result = base.apply(&[put("a", 2, Precondition::Absent)], ConflictPolicy::LastWriteWins);
        assert!(matches!(
            result,
            Err(StoreError::Conflict {
                expected: Precondition::Absent,
                current: Some(_),
                ..
            })
        ));
        let stored = base.get(&RecordKey::new("T", "a")).unwrap();
        assert_eq!(stored.record.get("n"), Some(&Value::Integer(1)));
    }

    #[test]
    fn replay_skips_checks() {
        let base = Tables::default()
            .apply(&[put("a", 1, Precondition::None)], ConflictPolicy::Optimistic)
            .unwrap();
        let next = base.replay(&[put("a", 2, Precondition::Absent)]).unwrap();
        let stored = next.get(&RecordKey::new("T", "a")).unwrap();
        assert_eq!(stored.record.get("n"), Some(&Value::Integer(2)));
    }

    #[test]
    fn snapshots_are_not_affected_by_later_applies() {
        let base = Tables::default()
            .apply(&[put("a", 1, Precondition::None)], ConflictPolicy::LastWriteWins)
            .unwrap();
        let table = base.table("T").unwrap();
        let _next = base
            .apply(&[put("b", 2, Precondition::None)], ConflictPolicy::LastWriteWins)
            .unwrap();
        assert_eq!(table.len(), 1);
    }
}
