//! Append-only byte log trait.

use crate::error::StoreResult;

/// An append-only byte log underneath a [`super::LogStore`].
///
/// Backends are **opaque byte stores**: they never interpret the frames
/// written to them. All methods take `&self`; implementations use interior
/// locking and must be `Send + Sync`.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_all` returns exactly the bytes appended so far
/// - `flush` pushes appended data to the operating system
/// - `sync` additionally makes it durable across power loss
///
/// # Implementors
///
/// - [`super::MemoryLog`] - For testing
/// - [`super::FileLog`] - For persistent storage
pub trait LogBackend: Send + Sync {
    /// Returns the current length of the log in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the length cannot be determined.
    fn len(&self) -> StoreResult<u64>;

    /// Returns `true` if the log holds no bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the length cannot be determined.
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Reads the whole log.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn read_all(&self) -> StoreResult<Vec<u8>>;

    /// Appends data, returning the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&self, data: &[u8]) -> StoreResult<u64>;

    /// Flushes appended data.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&self) -> StoreResult<()>;

    /// Syncs data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&self) -> StoreResult<()>;

    /// Truncates the log to `new_len` bytes.
    ///
    /// Used to drop a torn tail after a crash and to undo a partially
    /// persisted frame.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_len` exceeds the current length or the
    /// truncation fails.
    fn truncate(&self, new_len: u64) -> StoreResult<()>;
}
