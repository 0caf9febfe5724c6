//! In-memory log backend for testing.

use super::backend::LogBackend;
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory log.
///
/// Clones share the same bytes, so a test can keep a handle, drop the
/// store and reopen a new one over the same log to exercise recovery.
///
/// # Example
///
/// ```rust
/// use unitdb_store::{LogBackend, MemoryLog};
///
/// let log = MemoryLog::new();
/// let offset = log.append(b"test data").unwrap();
/// assert_eq!(offset, 0);
/// assert_eq!(log.len().unwrap(), 9);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    data: Arc<RwLock<Vec<u8>>>,
}

impl MemoryLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log with pre-existing bytes.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_bytes(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of the log contents.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl LogBackend for MemoryLog {
    fn len(&self) -> StoreResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn read_all(&self) -> StoreResult<Vec<u8>> {
        Ok(self.bytes())
    }

    fn append(&self, new_data: &[u8]) -> StoreResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn flush(&self) -> StoreResult<()> {
        Ok(())
    }

    fn sync(&self) -> StoreResult<()> {
        Ok(())
    }

    fn truncate(&self, new_len: u64) -> StoreResult<()> {
        let mut data = self.data.write();
        let current = data.len() as u64;
        if new_len > current {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cannot truncate to {new_len} bytes, log holds {current}"),
            )));
        }
        data.truncate(new_len as usize);
        Ok(())
    }
}
