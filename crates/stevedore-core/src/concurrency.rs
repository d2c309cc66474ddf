use crate::CoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

/// Exclusive advisory lock on the store. The engine itself never locks;
/// callers hold this around mutating operations to serialize them.
pub struct StoreLock {
    file: File,
}

impl StoreLock {
    /// Block until no other process holds the lock.
    pub fn acquire(lock_path: &Path) -> Result<Self, CoreError> {
        let file = open_lock_file(lock_path)?;
        file.lock_exclusive().map_err(|e| {
            CoreError::Io(std::io::Error::new(
                e.kind(),
                format!("locking {}: {e}", lock_path.display()),
            ))
        })?;
        debug!("holding {}", lock_path.display());
        Ok(Self { file })
    }

    /// Returns `None` when the lock is already held.
    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, CoreError> {
        let file = open_lock_file(lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file })),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                debug!("{} is held elsewhere", lock_path.display());
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn open_lock_file(lock_path: &Path) -> Result<File, CoreError> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)?)
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!("failed to release store lock: {e}");
        }
    }
}
