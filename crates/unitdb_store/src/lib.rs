//! # UnitDB Store
//!
//! The persistence boundary of UnitDB.
//!
//! A [`StoreAdapter`] holds property [`Record`](unitdb_codec::Record)s keyed
//! by [`RecordKey`], iterates them through [`StoreCursor`]s and applies
//! writes atomically through [`StoreTransaction`]s. Every operation is
//! `async` so that both synchronous and suspending backends satisfy the
//! same contract.
//!
//! ## Design Principles
//!
//! - Stores never interpret entity semantics; they see opaque records
//! - A cursor iterates a consistent snapshot taken when it was opened
//! - A transaction commits all staged writes or none of them
//! - Conflict resolution is a store policy ([`ConflictPolicy`])
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - Reference store, everything in memory
//! - [`LogStore`] - Durable store over a [`LogBackend`]
//!   ([`MemoryLog`] or [`FileLog`])

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod error;
mod key;
mod log;
mod memory;
mod predicate;
mod tables;

pub use adapter::{StoreAdapter, StoreCapabilities, StoreCursor, StoreTransaction};
pub use error::{StoreError, StoreResult};
pub use key::{ConflictPolicy, Precondition, RecordKey, StoredRecord};
pub use log::{FileLog, LogBackend, LogStore, LogStoreConfig, MemoryLog};
pub use memory::MemoryStore;
pub use predicate::{CompareOp, NativeQuery, Predicate, STARTS_WITH};
