//! Exclusive run lock.
//!
//! The scheduler can fire while a slow pass is still executing. An
//! exclusively flocked lock file guarantees single-process semantics: a run
//! that cannot take the lock exits immediately without touching any state.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::debug;

/// Errors acquiring the run lock
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Another run holds the lock: {0}")]
    Busy(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Held for the duration of a pass; released on drop.
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Take the lock or fail fast with [`LockError::Busy`].
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).write(true).open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(path = %path.display(), "Run lock acquired");
                Ok(Self {
                    file,
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(LockError::Busy(path.to_path_buf()))
            }
            Err(e) => Err(LockError::Io(e)),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        debug!(path = %self.path.display(), "Run lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_is_busy() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run.lock");

        let _held = RunLock::acquire(&path).unwrap();
        assert!(matches!(
            RunLock::acquire(&path),
            Err(LockError::Busy(_))
        ));
    }

    #[test]
    fn test_released_on_drop() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run.lock");

        {
            let _held = RunLock::acquire(&path).unwrap();
        }
        let _again = RunLock::acquire(&path).unwrap();
    }

    #[test]
    fn test_creates_parent_directory() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state").join("run.lock");
        let _held = RunLock::acquire(&path).unwrap();
        assert!(path.exists());
    }
}
