//! Single-instance guard keyed by the executable's own path.
//!
//! The lock is an advisory `flock` on the binary file itself, so two
//! invocations of the same binary path exclude each other while distinct
//! binaries never do. Acquisition never blocks.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::RunError;

/// Held exclusive lock; released on [`InstanceLock::release`] or drop.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Attempts to take the lock without waiting.
    ///
    /// Returns `Ok(None)` when another process (or another open handle) holds it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, RunError> {
        let file = open_lock_file(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(RunError::Io(e)),
        }
    }

    /// Takes the lock or fails with [`RunError::AlreadyRunning`].
    pub fn acquire_or_fail(path: &Path) -> Result<Self, RunError> {
        Self::try_acquire(path)?.ok_or_else(|| RunError::AlreadyRunning {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::debug!(path = %self.path.display(), error = %e, "failed to release instance lock");
        }
    }
}

// Running executables cannot be opened for writing, so open read-only and
// only create the file when it does not exist yet.
fn open_lock_file(path: &Path) -> Result<File, RunError> {
    match OpenOptions::new().read(true).open(path) {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?),
        Err(e) => Err(RunError::Io(e)),
    }
}
