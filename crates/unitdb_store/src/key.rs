//! Record identity, versions and write preconditions.

use std::fmt;
use unitdb_codec::Record;

/// Store-level identity of a record: entity type plus entity identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    /// Registered entity type name.
    pub entity_type: String,
    /// Opaque entity identity.
    pub id: String,
}

impl RecordKey {
    /// Creates a new record key.
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.id)
    }
}

/// A record as read from a store, with the version it was written at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// Key of the record.
    pub key: RecordKey,
    /// Property values.
    pub record: Record,
    /// Store-assigned version, increasing with every committed write.
    pub version: u64,
}

/// Condition a write expects to hold against the committed state.
///
/// [`Precondition::Absent`] is always enforced, so an insert never replaces
/// a record. The others are only enforced under
/// [`ConflictPolicy::Optimistic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precondition {
    /// No expectation.
    #[default]
    None,
    /// The record must not exist.
    Absent,
    /// The record must exist at exactly this version.
    Version(u64),
}

impl Precondition {
    /// Returns `true` if the precondition holds for the current version.
    #[must_use]
    pub fn holds(self, current: Option<u64>) -> bool {
        match self {
            Self::None => true,
            Self::Absent => current.is_none(),
            Self::Version(expected) => current == Some(expected),
        }
    }
}

/// How a store resolves concurrent commits touching the same record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Later commits overwrite earlier ones; only `Absent` is checked.
    #[default]
    LastWriteWins,
    /// Every write's precondition is checked; a mismatch fails the commit.
    Optimistic,
}
