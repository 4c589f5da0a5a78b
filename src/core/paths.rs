//! core::paths
//!
//! Centralized path routing for the snapshot cache.
//!
//! # Architecture
//!
//! Every on-disk location the cache touches is computed here. No other
//! module joins entity, repository or commit names onto the cache root.
//!
//! # Storage Layout
//!
//! ```text
//! <root>/<entity>/<repository>/<commit>/                     ready snapshot
//! <root>/<entity>/<repository>/<commit>/.prior-snapshot.json ready marker
//! <root>/<entity>/<repository>/.staging/<commit>-<uuid>/     in-progress fetch
//! <root>/<entity>/<repository>/.locks/<commit>.lock          materialization lock
//! ```
//!
//! # Example
//!
//! ```
//! use prior::core::paths::CachePaths;
//! use prior::core::types::{EntityName, Oid, RepoName};
//! use std::path::PathBuf;
//!
//! let paths = CachePaths::new(PathBuf::from("/cache"));
//! let entity = EntityName::new("acme").unwrap();
//! let repo = RepoName::new("demo-data").unwrap();
//! let commit = Oid::new("a".repeat(40)).unwrap();
//!
//! assert_eq!(
//!     paths.snapshot_dir(&entity, &repo, &commit),
//!     PathBuf::from(format!("/cache/acme/demo-data/{}", "a".repeat(40)))
//! );
//! ```

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::core::types::{EntityName, Oid, RepoName};

/// File name of the marker written into a snapshot before it is published.
///
/// The name is reserved at the root of every snapshot. A repository that
/// tracks an entry of this name has it replaced by the marker.
pub const READY_MARKER: &str = ".prior-snapshot.json";

const STAGING_DIR: &str = ".staging";
const LOCKS_DIR: &str = ".locks";

/// Path routing for one cache root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePaths {
    root: PathBuf,
}

impl CachePaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// The cache root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every snapshot of one repository.
    pub fn repo_dir(&self, entity: &EntityName, repo: &RepoName) -> PathBuf {
        self.root.join(entity.as_str()).join(repo.as_str())
    }

    /// Published location of a snapshot.
    pub fn snapshot_dir(&self, entity: &EntityName, repo: &RepoName, commit: &Oid) -> PathBuf {
        self.repo_dir(entity, repo).join(commit.as_str())
    }

    /// Marker file that makes a snapshot directory `ready`.
    pub fn ready_marker(&self, entity: &EntityName, repo: &RepoName, commit: &Oid) -> PathBuf {
        self.snapshot_dir(entity, repo, commit).join(READY_MARKER)
    }

    /// Parent of all staging directories for one repository.
    pub fn staging_root(&self, entity: &EntityName, repo: &RepoName) -> PathBuf {
        self.repo_dir(entity, repo).join(STAGING_DIR)
    }

    /// A fresh, uniquely named staging directory for `commit`.
    ///
    /// Each call returns a different path.
    pub fn new_staging_dir(&self, entity: &EntityName, repo: &RepoName, commit: &Oid) -> PathBuf {
        self.staging_root(entity, repo)
            .join(format!("{}-{}", commit.as_str(), Uuid::new_v4().simple()))
    }

    /// Lock file guarding materialization of `commit`.
    pub fn lock_path(&self, entity: &EntityName, repo: &RepoName, commit: &Oid) -> PathBuf {
        self.repo_dir(entity, repo)
            .join(LOCKS_DIR)
            .join(format!("{}.lock", commit.as_str()))
    }

    /// True for names inside a repository directory that are not snapshots.
    pub fn is_internal_name(name: &str) -> bool {
        name == STAGING_DIR || name == LOCKS_DIR
    }
}
