//! File-backed log for persistent stores.

use super::backend::LogBackend;
use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A log stored in a single file.
///
/// The file is locked exclusively while the log is open, so only one
/// process writes to it at a time.
///
/// # Durability
///
/// - `flush()` calls `File::flush()` to push data to the OS
/// - `sync()` calls `File::sync_all()` to ensure data is on disk
///
/// # Example
///
/// ```no_run
/// use unitdb_store::{FileLog, LogBackend};
/// use std::path::Path;
///
/// let log = FileLog::open(Path::new("unitdb.log")).unwrap();
/// log.append(b"persistent data").unwrap();
/// log.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    state: Mutex<FileState>,
}

#[derive(Debug)]
struct FileState {
    file: File,
    len: u64,
}

impl FileLog {
    /// Opens or creates a log file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Locked`] if another process holds the file, or
    /// an I/O error if it cannot be opened.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        if file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked);
        }
        let len = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(FileState { file, len }),
        })
    }

    /// Returns the path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogBackend for FileLog {
    fn len(&self) -> StoreResult<u64> {
        Ok(self.state.lock().len)
    }

    fn read_all(&self) -> StoreResult<Vec<u8>> {
        let mut state = self.state.lock();
        let len = usize::try_from(state.len)
            .map_err(|_| StoreError::corrupted("log does not fit in memory"))?;
        let mut buffer = vec![0u8; len];
        state.file.seek(SeekFrom::Start(0))?;
        state.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&self, data: &[u8]) -> StoreResult<u64> {
        let mut state = self.state.lock();
        let offset = state.len;
        if data.is_empty() {
            return Ok(offset);
        }
        state.file.seek(SeekFrom::End(0))?;
        state.file.write_all(data)?;
        state.len += data.len() as u64;
        Ok(offset)
    }

    fn flush(&self) -> StoreResult<()> {
        self.state.lock().file.flush()?;
        Ok(())
    }

    fn sync(&self) -> StoreResult<()> {
        self.state.lock().file.sync_all()?;
        Ok(())
    }

    fn truncate(&self, new_len: u64) -> StoreResult<()> {
        let mut state = self.state.lock();
        if new_len > state.len {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cannot truncate to {new_len} bytes, log holds {}", state.len),
            )));
        }
        state.file.set_len(new_len)?;
        state.file.sync_all()?;
        state.len = new_len;
        Ok(())
    }
}

impl Drop for FileLog {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.state.get_mut().file);
    }
}
