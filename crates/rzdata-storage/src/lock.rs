//! Exclusive write lock for an archive directory.
//!
//! The lock is a `data.lock` file created with `create_new`, so two engines
//! racing for the same directory cannot both succeed. Acquisition fails
//! immediately when the file exists; there is no waiting or retry. The file
//! is removed when the guard drops.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{ArchiveError, LOCK_FILE, Result};

/// Held for the duration of one mutating operation.
#[derive(Debug)]
pub struct ArchiveLock {
    /// The lock file handle (kept open while held).
    _file: File,
    /// Path to the lock file.
    path: PathBuf,
}

impl ArchiveLock {
    /// Acquire the lock for `data_dir`.
    ///
    /// Returns [`ArchiveError::Locked`] if another holder exists.
    pub fn acquire(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(LOCK_FILE);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                // Holder pid is informational only
                if let Err(e) = writeln!(file, "{}", std::process::id()) {
                    warn!("could not record pid in {}: {e}", path.display());
                }
                debug!("acquired {}", path.display());
                Ok(Self { _file: file, path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(ArchiveError::Locked(path))
            }
            Err(e) => Err(ArchiveError::Io(e)),
        }
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ArchiveLock {
    fn drop(&mut self) {
        // Remove the lock file on drop to release the lock.
        let _ = std::fs::remove_file(&self.path);
    }
}
