//! cache::marker
//!
//! The ready marker written into every published snapshot.
//!
//! The marker is written into the staging directory before the rename, so a
//! snapshot directory without one was never published by this cache.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::paths::READY_MARKER;
use crate::core::types::{EntityName, Oid, RepoName, ResolvedCommit};

/// Current marker schema version.
pub const MARKER_VERSION: u32 = 1;

/// Metadata recorded alongside a published snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMarker {
    pub version: u32,
    pub entity: EntityName,
    pub repository: RepoName,
    pub commit: Oid,
    /// Remote the snapshot was fetched from.
    pub remote: String,
    pub fetched_at: DateTime<Utc>,
}

impl SnapshotMarker {
    pub fn new(resolved: &ResolvedCommit) -> Self {
        Self {
            version: MARKER_VERSION,
            entity: resolved.entity.clone(),
            repository: resolved.repository.clone(),
            commit: resolved.commit.clone(),
            remote: resolved.remote.as_str().to_string(),
            fetched_at: Utc::now(),
        }
    }

    /// Write the marker into `dir`, replacing any entry of the same name.
    ///
    /// An existing entry is removed first, never written through, so a
    /// symlink of that name cannot redirect the write. Returns whether an
    /// entry was replaced.
    pub fn write(&self, dir: &Path) -> io::Result<bool> {
        let path = dir.join(READY_MARKER);
        let replaced = match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&path).map(|()| true)?,
            Ok(_) => fs::remove_file(&path).map(|()| true)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(e),
        };
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&path, json)?;
        Ok(replaced)
    }

    /// Read the marker from a snapshot directory.
    pub fn read(dir: &Path) -> io::Result<Self> {
        let bytes = fs::read(dir.join(READY_MARKER))?;
        serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Whether `dir` carries a marker.
    pub fn exists(dir: &Path) -> bool {
        dir.join(READY_MARKER).is_file()
    }
}
