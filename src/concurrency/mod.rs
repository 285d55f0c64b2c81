//! Single-writer guard for one (bucket table, node log) pair.
//!
//! Builds take the exclusive lock for their whole run; lookups take the shared
//! lock while they walk a chain.
//! Thread-level: parking_lot::RwLock
//! Process-level: fs4 file lock on `<field>_buckets.lock`, held shared for as
//! long as any reader in this process holds a guard.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{trace, warn};

use crate::error::{IndexError, Result};

pub struct LockManager {
    rw_lock: RwLock<()>,
    /// Number of live `ReadGuard`s. The file lock is taken when this leaves
    /// zero and released when it returns to zero.
    readers: Mutex<usize>,
    lock_file: File,
    lock_path: PathBuf,
}

impl LockManager {
    pub fn new(lock_path: &Path) -> Result<Self> {
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?;

        Ok(LockManager {
            rw_lock: RwLock::new(()),
            readers: Mutex::new(0),
            lock_file,
            lock_path: lock_path.to_path_buf(),
        })
    }

    fn lock_error(&self, kind: &str, e: std::io::Error) -> IndexError {
        IndexError::Lock(format!(
            "Failed to acquire {} lock on {}: {}",
            kind,
            self.lock_path.display(),
            e
        ))
    }

    /// Acquire a shared (read) lock.
    pub fn read_lock(&self) -> Result<ReadGuard<'_>> {
        let thread_guard = self.rw_lock.read();

        let mut readers = self.readers.lock();
        if *readers == 0 {
            FileExt::lock_shared(&self.lock_file).map_err(|e| self.lock_error("shared", e))?;
            trace!(path = %self.lock_path.display(), "shared file lock taken");
        }
        *readers += 1;
        drop(readers);

        Ok(ReadGuard {
            _thread_guard: thread_guard,
            manager: self,
        })
    }

    /// Acquire an exclusive (write) lock. No reader of this manager can be
    /// active once the thread-level write guard is held.
    pub fn write_lock(&self) -> Result<WriteGuard<'_>> {
        let thread_guard = self.rw_lock.write();

        FileExt::lock_exclusive(&self.lock_file).map_err(|e| self.lock_error("exclusive", e))?;

        Ok(WriteGuard {
            _thread_guard: thread_guard,
            manager: self,
        })
    }

    fn release_reader(&self) {
        let mut readers = self.readers.lock();
        *readers = readers.saturating_sub(1);
        if *readers == 0 {
            if let Err(e) = FileExt::unlock(&self.lock_file) {
                warn!(path = %self.lock_path.display(), error = %e, "failed to release shared lock");
            }
        }
    }
}

pub struct ReadGuard<'a> {
    _thread_guard: RwLockReadGuard<'a, ()>,
    manager: &'a LockManager,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.manager.release_reader();
    }
}

pub struct WriteGuard<'a> {
    _thread_guard: RwLockWriteGuard<'a, ()>,
    manager: &'a LockManager,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.manager.lock_file) {
            warn!(
                path = %self.manager.lock_path.display(),
                error = %e,
                "failed to release exclusive lock"
            );
        }
    }
}
