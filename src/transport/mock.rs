//! transport::mock
//!
//! Mock transport implementation for deterministic testing.
//!
//! # Design
//!
//! The mock stores repositories in memory: a list of advertised refs and a
//! file tree per commit. Failures can be queued for the next call of a given
//! operation, and every call is recorded so tests can assert how many
//! fetches actually happened.
//!
//! # Example
//!
//! ```
//! use prior::core::cancel::Cancellation;
//! use prior::transport::mock::MockTransport;
//! use prior::transport::{RemoteLocation, Transport};
//!
//! let transport = MockTransport::new();
//! let remote = RemoteLocation::new("mock://acme/demo-data");
//! let commit = transport.add_commit(&remote, &[("prior.toml", b"".as_slice())]);
//! transport.set_ref(&remote, "refs/tags/v1.0", &commit);
//!
//! let refs = transport.list_refs(&remote, None, &Cancellation::new()).unwrap();
//! assert_eq!(refs[0].oid, commit);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use super::traits::{RemoteLocation, RemoteRef, Transport, TransportError};
use crate::auth::Credential;
use crate::core::cancel::Cancellation;
use crate::core::types::Oid;

/// Mock transport for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    repos: HashMap<RemoteLocation, MockRepo>,
    next_commit: u64,
    fail_on: Vec<FailOn>,
    fetch_delay: Option<Duration>,
    required_token: Option<String>,
    operations: Vec<MockOperation>,
}

#[derive(Debug, Default)]
struct MockRepo {
    refs: Vec<RemoteRef>,
    commits: HashMap<Oid, BTreeMap<String, Vec<u8>>>,
}

/// A failure queued for the next matching call.
#[derive(Debug, Clone)]
pub enum FailOn {
    /// Fail `list_refs` with the given error.
    ListRefs(TransportError),
    /// Fail `fetch` before writing anything.
    Fetch(TransportError),
    /// Write part of the tree into the destination, then fail.
    FetchPartial(TransportError),
}

/// A recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    ListRefs { remote: RemoteLocation },
    ContainsCommit { remote: RemoteLocation, commit: Oid },
    Fetch { remote: RemoteLocation, commit: Oid },
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register an empty repository (no refs, no commits).
    pub fn add_repo(&self, remote: &RemoteLocation) {
        self.lock().repos.entry(remote.clone()).or_default();
    }

    /// Add a commit with the given files, creating the repository if needed.
    ///
    /// Commit ids are deterministic and unique per transport.
    pub fn add_commit(&self, remote: &RemoteLocation, files: &[(&str, &[u8])]) -> Oid {
        let mut inner = self.lock();
        inner.next_commit += 1;
        let oid = Oid::new(format!("{:04x}", inner.next_commit % 0x10000).repeat(10))
            .unwrap_or_else(|_| unreachable!("formatted as 40 hex digits"));

        let tree = files
            .iter()
            .map(|(path, content)| (path.to_string(), content.to_vec()))
            .collect();
        inner
            .repos
            .entry(remote.clone())
            .or_default()
            .commits
            .insert(oid.clone(), tree);
        oid
    }

    /// Point a ref at a commit, replacing any previous value.
    pub fn set_ref(&self, remote: &RemoteLocation, name: &str, oid: &Oid) {
        let mut inner = self.lock();
        let repo = inner.repos.entry(remote.clone()).or_default();
        repo.refs.retain(|r| r.name != name);
        repo.refs.push(RemoteRef::new(name, oid.clone()));
    }

    /// Queue a failure for the next matching call.
    pub fn fail_next(&self, fail: FailOn) {
        self.lock().fail_on.push(fail);
    }

    /// Sleep this long inside every fetch (to widen race windows).
    pub fn set_fetch_delay(&self, delay: Duration) {
        self.lock().fetch_delay = Some(delay);
    }

    /// Reject calls that do not present exactly this token.
    pub fn require_token(&self, token: &str) {
        self.lock().required_token = Some(token.to_string());
    }

    /// All calls recorded so far.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.lock().operations.clone()
    }

    /// Number of `fetch` calls recorded so far.
    pub fn fetch_count(&self) -> usize {
        self.lock()
            .operations
            .iter()
            .filter(|op| matches!(op, MockOperation::Fetch { .. }))
            .count()
    }

    fn take_failure(
        inner: &mut MockTransportInner,
        matches: impl Fn(&FailOn) -> bool,
    ) -> Option<FailOn> {
        let index = inner.fail_on.iter().position(matches)?;
        Some(inner.fail_on.remove(index))
    }

    fn check_access(
        inner: &MockTransportInner,
        remote: &RemoteLocation,
        credential: Option<&Credential>,
    ) -> Result<(), TransportError> {
        if !inner.repos.contains_key(remote) {
            return Err(TransportError::NotFound(format!("no repository at {}", remote)));
        }
        match (&inner.required_token, credential) {
            (Some(required), Some(given)) if given.expose() == required => Ok(()),
            (Some(_), _) => Err(TransportError::AuthFailed(format!(
                "{} requires a valid token",
                remote
            ))),
            (None, _) => Ok(()),
        }
    }
}

impl Transport for MockTransport {
    fn list_refs(
        &self,
        remote: &RemoteLocation,
        credential: Option<&Credential>,
        cancel: &Cancellation,
    ) -> Result<Vec<RemoteRef>, TransportError> {
        let mut inner = self.lock();
        inner.operations.push(MockOperation::ListRefs {
            remote: remote.clone(),
        });
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        if let Some(FailOn::ListRefs(err)) =
            Self::take_failure(&mut inner, |f| matches!(f, FailOn::ListRefs(_)))
        {
            return Err(err);
        }
        Self::check_access(&inner, remote, credential)?;
        Ok(inner
            .repos
            .get(remote)
            .map(|repo| repo.refs.clone())
            .unwrap_or_default())
    }

    fn contains_commit(
        &self,
        remote: &RemoteLocation,
        commit: &Oid,
        credential: Option<&Credential>,
        cancel: &Cancellation,
    ) -> Result<bool, TransportError> {
        let mut inner = self.lock();
        inner.operations.push(MockOperation::ContainsCommit {
            remote: remote.clone(),
            commit: commit.clone(),
        });
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        Self::check_access(&inner, remote, credential)?;
        Ok(inner
            .repos
            .get(remote)
            .is_some_and(|repo| repo.commits.contains_key(commit)))
    }

    fn fetch(
        &self,
        remote: &RemoteLocation,
        commit: &Oid,
        dest: &Path,
        credential: Option<&Credential>,
        cancel: &Cancellation,
    ) -> Result<(), TransportError> {
        let (tree, failure, delay) = {
            let mut inner = self.lock();
            inner.operations.push(MockOperation::Fetch {
                remote: remote.clone(),
                commit: commit.clone(),
            });
            Self::check_access(&inner, remote, credential)?;
            let failure = Self::take_failure(&mut inner, |f| {
                matches!(f, FailOn::Fetch(_) | FailOn::FetchPartial(_))
            });
            let tree = inner
                .repos
                .get(remote)
                .and_then(|repo| repo.commits.get(commit))
                .cloned()
                .ok_or_else(|| {
                    TransportError::NotFound(format!("commit {} not found in {}", commit, remote))
                })?;
            (tree, failure, inner.fetch_delay)
        };

        // Lock released: concurrent fetches overlap in time like real ones.
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        if let Some(FailOn::Fetch(err)) = failure {
            return Err(err);
        }

        let partial = matches!(failure, Some(FailOn::FetchPartial(_)));
        let limit = if partial { tree.len() / 2 + 1 } else { tree.len() };
        for (path, content) in tree.iter().take(limit) {
            let target = dest.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| TransportError::Io(e.to_string()))?;
            }
            fs::write(&target, content).map_err(|e| TransportError::Io(e.to_string()))?;
        }

        match failure {
            Some(FailOn::FetchPartial(err)) => Err(err),
            _ => Ok(()),
        }
    }
}
