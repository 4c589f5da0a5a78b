//! cache::lock
//!
//! Per-commit materialization lock.
//!
//! # Architecture
//!
//! Each commit has its own lock file under `<repo_dir>/.locks/`. The lock is
//! an OS-level exclusive file lock (`fs2`), so it coordinates independent
//! processes sharing one cache directory as well as threads of one process
//! (every acquisition opens its own file handle).
//!
//! Acquisition blocks by polling, up to a timeout, and gives up early when
//! the caller's [`Cancellation`] fires.
//!
//! # Invariants
//!
//! - The lock must be held while fetching and publishing a snapshot
//! - After acquiring, the caller must re-check whether the snapshot became
//!   ready while it waited
//! - The lock is released on drop (RAII); lock files are never deleted

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use thiserror::Error;
use tracing::debug;

use crate::core::cancel::Cancellation;

/// Polling interval when waiting for the lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors from lock operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another caller held the lock for longer than the timeout.
    #[error("timed out after {waited:?} waiting for {}", path.display())]
    Timeout { path: PathBuf, waited: Duration },

    /// The caller cancelled while waiting.
    #[error("cancelled while waiting for {}", path.display())]
    Cancelled { path: PathBuf },

    /// Failed to create, open or lock the lock file.
    #[error("lock i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An exclusive lock on one commit's materialization.
#[derive(Debug)]
pub struct SnapshotLock {
    path: PathBuf,
    file: Option<File>,
}

impl SnapshotLock {
    /// Acquire the lock, polling until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// - [`LockError::Timeout`] if the lock stays held past `timeout`
    /// - [`LockError::Cancelled`] if `cancel` fires while waiting
    /// - [`LockError::Io`] if the lock file cannot be created or locked
    pub fn acquire(
        path: &Path,
        timeout: Duration,
        cancel: &Cancellation,
    ) -> Result<Self, LockError> {
        let started = Instant::now();
        let mut logged = false;

        loop {
            if let Some(lock) = Self::try_acquire(path)? {
                return Ok(lock);
            }
            if cancel.is_cancelled() {
                return Err(LockError::Cancelled {
                    path: path.to_path_buf(),
                });
            }
            let waited = started.elapsed();
            if waited >= timeout {
                return Err(LockError::Timeout {
                    path: path.to_path_buf(),
                    waited,
                });
            }
            if !logged {
                debug!(path = %path.display(), "waiting for snapshot lock");
                logged = true;
            }
            thread::sleep(LOCK_POLL_INTERVAL.min(timeout - waited));
        }
    }

    /// Try to acquire the lock without blocking.
    ///
    /// Returns `Ok(None)` if someone else holds it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, LockError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| LockError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|source| LockError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                path: path.to_path_buf(),
                file: Some(file),
            })),
            Err(e) if is_contended(&e) => Ok(None),
            Err(source) => Err(LockError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Check whether someone currently holds the lock at `path`.
    ///
    /// Never creates the lock file.
    pub fn is_locked(path: &Path) -> Result<bool, LockError> {
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(source) => {
                return Err(LockError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = file.unlock();
                Ok(false)
            }
            Err(e) if is_contended(&e) => Ok(true),
            Err(source) => Err(LockError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Check if the lock is currently held by this guard.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SnapshotLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
