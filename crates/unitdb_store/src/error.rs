//! Error types for store operations.

use crate::key::{Precondition, RecordKey};
use std::io;
use thiserror::Error;
use unitdb_codec::CodecError;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The persisted data is corrupted.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// The log file is held by another process.
    #[error("store is locked by another process")]
    Locked,

    /// A write precondition did not hold under optimistic conflict checks.
    #[error("write conflict on {key}: expected {expected:?}, current version {current:?}")]
    Conflict {
        /// The key being written.
        key: RecordKey,
        /// The precondition the writer declared.
        expected: Precondition,
        /// The version found in the store, if the record exists.
        current: Option<u64>,
    },

    /// The filter contains a predicate this store cannot evaluate.
    #[error("predicate not supported by this store: {0}")]
    UnsupportedPredicate(String),

    /// The cursor cannot be moved back to its first record.
    #[error("cursor is not restartable")]
    RestartUnsupported,

    /// Backend-specific failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Creates an unsupported-predicate error.
    pub fn unsupported_predicate(description: impl Into<String>) -> Self {
        Self::UnsupportedPredicate(description.into())
    }
}
