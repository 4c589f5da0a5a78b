//! cache
//!
//! On-disk cache of materialized repository snapshots.
//!
//! # Architecture
//!
//! One directory per resolved commit, published with the same
//! check / lock / re-check / stage / rename sequence every time:
//!
//! 1. If the snapshot directory carries a ready marker, return it. No lock,
//!    no transport call.
//! 2. Take the per-commit [`SnapshotLock`], blocking up to the configured
//!    timeout. Concurrent callers for the same commit wait here.
//! 3. Re-check: whoever held the lock may have published it.
//! 4. Fetch into a fresh staging directory, write the marker there.
//! 5. Rename the staging directory into place.
//!
//! A crash or failure before step 5 leaves only a staging directory, which
//! is never mistaken for a snapshot and is removed by the next attempt.
//!
//! # Invariants
//!
//! - A ready snapshot is never modified or deleted by this module
//! - At most one fetch per commit runs at a time, across threads and
//!   processes sharing the cache root
//! - No failure path leaves a ready-looking snapshot behind

mod lock;
mod marker;

pub use lock::{LockError, SnapshotLock};
pub use marker::{SnapshotMarker, MARKER_VERSION};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::auth::Credential;
use crate::core::cancel::Cancellation;
use crate::core::config::DEFAULT_LOCK_TIMEOUT;
use crate::core::paths::{CachePaths, READY_MARKER};
use crate::core::types::{EntityName, Oid, RepoName, ResolvedCommit};
use crate::error::{PriorError, Result};
use crate::transport::{Transport, TransportError};

/// Materialization state of one commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotState {
    Absent,
    /// Some caller holds the materialization lock.
    InProgress,
    Ready,
}

/// A ready snapshot on disk. Treat its content as read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub entity: EntityName,
    pub repository: RepoName,
    pub commit: Oid,
    path: PathBuf,
}

impl Snapshot {
    /// Root directory of the snapshot's content.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Metadata recorded when the snapshot was published.
    pub fn marker(&self) -> std::io::Result<SnapshotMarker> {
        SnapshotMarker::read(&self.path)
    }
}

/// Keyed store of snapshots under one cache root.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    paths: CachePaths,
    transport: Arc<dyn Transport>,
    lock_timeout: Duration,
}

impl SnapshotCache {
    pub fn new(root: PathBuf, transport: Arc<dyn Transport>) -> Self {
        Self {
            paths: CachePaths::new(root),
            transport,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// How long to wait for another caller's materialization.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn paths(&self) -> &CachePaths {
        &self.paths
    }

    /// Return the ready snapshot for `resolved`, fetching it if absent.
    ///
    /// # Errors
    ///
    /// - [`PriorError::MaterializationFailed`] if the fetch fails
    /// - [`PriorError::Cancelled`] if `cancel` fires before publishing
    /// - [`PriorError::Lock`] if another caller holds the lock too long
    pub fn get_or_materialize(
        &self,
        resolved: &ResolvedCommit,
        credential: Option<&Credential>,
        cancel: &Cancellation,
    ) -> Result<Snapshot> {
        if let Some(snapshot) = self.lookup(&resolved.entity, &resolved.repository, &resolved.commit)
        {
            debug!(snapshot = %resolved, path = %snapshot.path.display(), "snapshot cache hit");
            return Ok(snapshot);
        }
        if cancel.is_cancelled() {
            return Err(PriorError::cancelled(format!("materializing {}", resolved)));
        }

        let lock_path =
            self.paths
                .lock_path(&resolved.entity, &resolved.repository, &resolved.commit);
        let _lock = SnapshotLock::acquire(&lock_path, self.lock_timeout, cancel).map_err(
            |e| match e {
                LockError::Cancelled { .. } => {
                    PriorError::cancelled(format!("waiting to materialize {}", resolved))
                }
                other => PriorError::Lock(other),
            },
        )?;

        if let Some(snapshot) = self.lookup(&resolved.entity, &resolved.repository, &resolved.commit)
        {
            debug!(snapshot = %resolved, "snapshot published while waiting for lock");
            return Ok(snapshot);
        }

        self.clean_stale(resolved);
        self.materialize_locked(resolved, credential, cancel)
    }

    /// The ready snapshot for a commit, if there is one. Never fetches.
    pub fn lookup(&self, entity: &EntityName, repo: &RepoName, commit: &Oid) -> Option<Snapshot> {
        let path = self.paths.snapshot_dir(entity, repo, commit);
        SnapshotMarker::exists(&path).then(|| Snapshot {
            entity: entity.clone(),
            repository: repo.clone(),
            commit: commit.clone(),
            path,
        })
    }

    /// Current state of a commit's snapshot.
    pub fn state(&self, entity: &EntityName, repo: &RepoName, commit: &Oid) -> Result<SnapshotState> {
        if self.lookup(entity, repo, commit).is_some() {
            return Ok(SnapshotState::Ready);
        }
        if SnapshotLock::is_locked(&self.paths.lock_path(entity, repo, commit))? {
            Ok(SnapshotState::InProgress)
        } else {
            Ok(SnapshotState::Absent)
        }
    }

    /// Every ready snapshot of one repository, ordered by commit.
    pub fn list(&self, entity: &EntityName, repo: &RepoName) -> Result<Vec<Snapshot>> {
        let dir = self.paths.repo_dir(entity, repo);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(PriorError::MaterializationFailed {
                    entity: entity.to_string(),
                    repository: repo.to_string(),
                    commit: String::new(),
                    source: TransportError::Io(format!("cannot read {}: {}", dir.display(), e)),
                })
            }
        };

        let mut snapshots: Vec<Snapshot> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| !CachePaths::is_internal_name(name))
            .filter_map(|name| Oid::new(name).ok())
            .filter_map(|commit| self.lookup(entity, repo, &commit))
            .collect();
        snapshots.sort_by(|a, b| a.commit.cmp(&b.commit));
        Ok(snapshots)
    }

    /// Fetch and publish. Caller holds the lock and has checked the
    /// snapshot is absent.
    fn materialize_locked(
        &self,
        resolved: &ResolvedCommit,
        credential: Option<&Credential>,
        cancel: &Cancellation,
    ) -> Result<Snapshot> {
        let (entity, repo, commit) = (&resolved.entity, &resolved.repository, &resolved.commit);
        let staging = self.paths.new_staging_dir(entity, repo, commit);
        let target = self.paths.snapshot_dir(entity, repo, commit);

        debug!(snapshot = %resolved, staging = %staging.display(), "materializing snapshot");
        let outcome = fs::create_dir_all(&staging)
            .map_err(|e| io_error("create staging directory", &staging, e))
            .and_then(|()| {
                self.transport
                    .fetch(&resolved.remote, commit, &staging, credential, cancel)
            })
            .and_then(|()| {
                let replaced = SnapshotMarker::new(resolved)
                    .write(&staging)
                    .map_err(|e| io_error("write ready marker", &staging, e))?;
                if replaced {
                    warn!(
                        snapshot = %resolved,
                        name = READY_MARKER,
                        "repository tracks the reserved marker name; replaced it"
                    );
                }
                Ok(())
            })
            .and_then(|()| {
                if cancel.is_cancelled() {
                    Err(TransportError::Cancelled)
                } else {
                    Ok(())
                }
            })
            .and_then(|()| {
                fs::rename(&staging, &target).map_err(|e| io_error("publish snapshot", &target, e))
            });

        if let Err(err) = outcome {
            remove_dir_logged(&staging);
            return Err(match err {
                TransportError::Cancelled => {
                    PriorError::cancelled(format!("materializing {}", resolved))
                }
                source => PriorError::MaterializationFailed {
                    entity: entity.to_string(),
                    repository: repo.to_string(),
                    commit: commit.to_string(),
                    source,
                },
            });
        }

        info!(snapshot = %resolved, path = %target.display(), "published snapshot");
        Ok(Snapshot {
            entity: entity.clone(),
            repository: repo.clone(),
            commit: commit.clone(),
            path: target,
        })
    }

    /// Remove leftovers of earlier failed attempts for this commit.
    ///
    /// Caller holds the lock, so nothing removed here is in use.
    fn clean_stale(&self, resolved: &ResolvedCommit) {
        let (entity, repo, commit) = (&resolved.entity, &resolved.repository, &resolved.commit);

        // A directory without a marker was not published by this cache and
        // would block the rename.
        let target = self.paths.snapshot_dir(entity, repo, commit);
        if target.exists() {
            warn!(path = %target.display(), "removing unmarked snapshot directory");
            remove_dir_logged(&target);
        }

        let staging_root = self.paths.staging_root(entity, repo);
        let prefix = format!("{}-", commit.as_str());
        let Ok(entries) = fs::read_dir(&staging_root) else {
            return;
        };
        for entry in entries.filter_map(|entry| entry.ok()) {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                debug!(path = %entry.path().display(), "removing stale staging directory");
                remove_dir_logged(&entry.path());
            }
        }
    }
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> TransportError {
    TransportError::Io(format!("{} at {}: {}", action, path.display(), err))
}

fn remove_dir_logged(path: &Path) {
    if let Err(err) = fs::remove_dir_all(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %err, "failed to remove directory");
        }
    }
}
