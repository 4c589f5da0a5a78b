//! transport::traits
//!
//! Transport trait definition for reading remote dataset repositories.
//!
//! # Design
//!
//! A transport is a blocking, opaque collaborator. It answers three
//! questions about a remote and never touches the snapshot cache itself:
//! which refs exist, whether a commit exists, and what a commit contains
//! (written into a destination directory chosen by the caller).
//!
//! Every method takes a [`Cancellation`]; implementations check it at their
//! natural suspension points and return [`TransportError::Cancelled`].

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::auth::Credential;
use crate::core::cancel::Cancellation;
use crate::core::config::schema::{ENTITY_PLACEHOLDER, REPOSITORY_PLACEHOLDER};
use crate::core::types::{EntityName, Oid, RepoName};

/// Errors from transport operations.
///
/// Messages never include credential values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The repository, or a requested object, does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote refused the credential (or demanded one).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Network or connection problem. Usually transient.
    #[error("network error: {0}")]
    Network(String),

    /// The caller cancelled or the deadline passed.
    #[error("operation cancelled")]
    Cancelled,

    /// Local filesystem problem while writing fetched content.
    #[error("i/o error: {0}")]
    Io(String),

    /// Anything else reported by the underlying client.
    #[error("transport error: {0}")]
    Internal(String),
}

impl TransportError {
    /// True for failures that may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Network(_) | TransportError::Cancelled | TransportError::Io(_)
        )
    }
}

/// A ref advertised by a remote (one line of `git ls-remote`).
///
/// Annotated tags appear twice: once as `refs/tags/<name>` pointing at the
/// tag object and once as `refs/tags/<name>^{}` pointing at the commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    pub name: String,
    pub oid: Oid,
}

impl RemoteRef {
    pub fn new(name: impl Into<String>, oid: Oid) -> Self {
        Self {
            name: name.into(),
            oid,
        }
    }
}

/// Location of a remote repository: a URL or a local path.
///
/// # Example
///
/// ```
/// use prior::core::types::{EntityName, RepoName};
/// use prior::transport::RemoteLocation;
///
/// let remote = RemoteLocation::from_template(
///     "https://github.com/{entity}/{repository}.git",
///     &EntityName::new("acme").unwrap(),
///     &RepoName::new("demo-data").unwrap(),
/// );
/// assert_eq!(remote.as_str(), "https://github.com/acme/demo-data.git");
/// assert!(remote.local_path().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteLocation(String);

impl RemoteLocation {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    /// Expand a remote template for one repository.
    pub fn from_template(template: &str, entity: &EntityName, repo: &RepoName) -> Self {
        Self(
            template
                .replace(ENTITY_PLACEHOLDER, entity.as_str())
                .replace(REPOSITORY_PLACEHOLDER, repo.as_str()),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The filesystem path, for local remotes.
    ///
    /// `file://` URLs and plain paths are local; anything with another
    /// scheme, or scp-like `user@host:path` syntax, is not.
    pub fn local_path(&self) -> Option<PathBuf> {
        if let Some(path) = self.0.strip_prefix("file://") {
            return Some(PathBuf::from(path));
        }
        if self.0.contains("://") {
            return None;
        }
        if let Some((head, _)) = self.0.split_once(':') {
            // Windows drive letters ("C:\...") are local; "host:path" is not.
            let is_drive = head.len() == 1 && head.chars().all(|c| c.is_ascii_alphabetic());
            if !is_drive {
                return None;
            }
        }
        Some(PathBuf::from(&self.0))
    }
}

impl fmt::Display for RemoteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Blocking access to remote repositories.
///
/// Implementations must be thread-safe: one transport is shared by the
/// resolver and the snapshot cache, possibly across threads.
pub trait Transport: Send + Sync + fmt::Debug {
    /// List the refs the remote advertises.
    ///
    /// # Errors
    ///
    /// - [`TransportError::NotFound`] if the repository does not exist
    /// - [`TransportError::AuthFailed`] if it is inaccessible
    fn list_refs(
        &self,
        remote: &RemoteLocation,
        credential: Option<&Credential>,
        cancel: &Cancellation,
    ) -> Result<Vec<RemoteRef>, TransportError>;

    /// Check whether `commit` exists in the remote repository.
    fn contains_commit(
        &self,
        remote: &RemoteLocation,
        commit: &Oid,
        credential: Option<&Credential>,
        cancel: &Cancellation,
    ) -> Result<bool, TransportError>;

    /// Write the full tree of `commit` into `dest`.
    ///
    /// `dest` is a fresh directory owned by the caller. On error its content
    /// is unspecified; the caller discards it.
    fn fetch(
        &self,
        remote: &RemoteLocation,
        commit: &Oid,
        dest: &Path,
        credential: Option<&Credential>,
        cancel: &Cancellation,
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_path_detection() {
        assert_eq!(
            RemoteLocation::new("/srv/git/acme/demo").local_path(),
            Some(PathBuf::from("/srv/git/acme/demo"))
        );
        assert_eq!(
            RemoteLocation::new("file:///srv/git/demo").local_path(),
            Some(PathBuf::from("/srv/git/demo"))
        );
        assert_eq!(
            RemoteLocation::new("C:\\data\\demo").local_path(),
            Some(PathBuf::from("C:\\data\\demo"))
        );
        assert!(RemoteLocation::new("https://github.com/a/b.git")
            .local_path()
            .is_none());
        assert!(RemoteLocation::new("git@github.com:a/b.git")
            .local_path()
            .is_none());
    }

    #[test]
    fn transient_classification() {
        assert!(TransportError::Network("reset".into()).is_transient());
        assert!(TransportError::Cancelled.is_transient());
        assert!(!TransportError::NotFound("x".into()).is_transient());
        assert!(!TransportError::AuthFailed("x".into()).is_transient());
    }
}
