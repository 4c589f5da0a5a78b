//! resolve
//!
//! Maps a [`Reference`] to the exact commit it names.
//!
//! # Resolution Order
//!
//! The first rule that matches wins:
//!
//! 1. Empty revision or `HEAD` - the remote's advertised `HEAD`
//! 2. Full object id - must be an advertised tip or exist upstream
//! 3. `refs/...` - that exact ref
//! 4. `refs/tags/<revision>` - annotated tags resolve to the tagged commit
//! 5. `refs/heads/<revision>`
//! 6. Abbreviated object id (7+ hex digits) matching exactly one tip
//!
//! A full object id is always checked against the remote, even when a
//! snapshot for it is already cached: a cache hit only proves the data
//! existed once, not that the caller may still read it.
//!
//! # Side Effects
//!
//! None beyond read queries against the remote. The resolver never writes
//! to the filesystem.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::auth::Credential;
use crate::core::cancel::Cancellation;
use crate::core::types::{Oid, Reference, ResolvedCommit};
use crate::error::{PriorError, Result};
use crate::transport::{RemoteLocation, RemoteRef, Transport, TransportError};

const HEAD: &str = "HEAD";
const PEELED_SUFFIX: &str = "^{}";

/// Resolves revisions against remote repositories.
#[derive(Debug, Clone)]
pub struct RevisionResolver {
    transport: Arc<dyn Transport>,
    remote_template: String,
}

impl RevisionResolver {
    /// Create a resolver that locates repositories with `remote_template`
    /// (containing `{entity}` and `{repository}`).
    pub fn new(transport: Arc<dyn Transport>, remote_template: impl Into<String>) -> Self {
        Self {
            transport,
            remote_template: remote_template.into(),
        }
    }

    /// The remote location a reference's repository lives at.
    pub fn remote_for(&self, reference: &Reference) -> RemoteLocation {
        RemoteLocation::from_template(
            &self.remote_template,
            &reference.entity,
            &reference.repository,
        )
    }

    /// Resolve `reference` to an exact commit.
    ///
    /// # Errors
    ///
    /// - [`PriorError::ReferenceNotFound`] if the repository does not exist
    ///   or refuses the credential
    /// - [`PriorError::RevisionNotFound`] if nothing matches the revision
    /// - [`PriorError::RemoteUnavailable`] on network failure
    /// - [`PriorError::Cancelled`] if `cancel` fires
    pub fn resolve(
        &self,
        reference: &Reference,
        credential: Option<&Credential>,
        cancel: &Cancellation,
    ) -> Result<ResolvedCommit> {
        let remote = self.remote_for(reference);
        let refs = self
            .transport
            .list_refs(&remote, credential, cancel)
            .map_err(|e| self.map_transport(reference, e))?;

        let spec = reference.revision.as_str();
        let commit = if spec.is_empty() || spec == HEAD {
            find_ref(&refs, HEAD)
        } else if Oid::is_full_hex(spec) {
            self.check_full_oid(reference, &remote, &refs, spec, credential, cancel)?
        } else if spec.starts_with("refs/") {
            find_peeled(&refs, spec)
        } else {
            find_peeled(&refs, &format!("refs/tags/{}", spec))
                .or_else(|| find_ref(&refs, &format!("refs/heads/{}", spec)))
                .or_else(|| find_abbreviated(&refs, spec))
        };

        match commit {
            Some(commit) => {
                debug!(
                    entity = %reference.entity,
                    repository = %reference.repository,
                    revision = reference.revision_or_head(),
                    commit = %commit,
                    "resolved revision"
                );
                Ok(ResolvedCommit {
                    entity: reference.entity.clone(),
                    repository: reference.repository.clone(),
                    commit,
                    remote,
                })
            }
            None => Err(self.revision_not_found(reference)),
        }
    }

    fn check_full_oid(
        &self,
        reference: &Reference,
        remote: &RemoteLocation,
        refs: &[RemoteRef],
        spec: &str,
        credential: Option<&Credential>,
        cancel: &Cancellation,
    ) -> Result<Option<Oid>> {
        let oid = Oid::new(spec)?;
        if refs.iter().any(|r| r.oid == oid) {
            return Ok(Some(oid));
        }
        let exists = self
            .transport
            .contains_commit(remote, &oid, credential, cancel)
            .map_err(|e| self.map_transport(reference, e))?;
        Ok(exists.then_some(oid))
    }

    fn revision_not_found(&self, reference: &Reference) -> PriorError {
        PriorError::RevisionNotFound {
            entity: reference.entity.to_string(),
            repository: reference.repository.to_string(),
            revision: reference.revision_or_head().to_string(),
        }
    }

    fn map_transport(&self, reference: &Reference, err: TransportError) -> PriorError {
        let entity = reference.entity.to_string();
        let repository = reference.repository.to_string();
        match err {
            TransportError::NotFound(_) | TransportError::AuthFailed(_) => {
                PriorError::ReferenceNotFound {
                    entity,
                    repository,
                    source: err,
                }
            }
            TransportError::Cancelled => {
                PriorError::cancelled(format!("resolving {}", reference))
            }
            _ => PriorError::RemoteUnavailable {
                entity,
                repository,
                source: err,
            },
        }
    }
}

fn find_ref(refs: &[RemoteRef], name: &str) -> Option<Oid> {
    refs.iter().find(|r| r.name == name).map(|r| r.oid.clone())
}

/// Look up a ref, preferring the peeled entry of an annotated tag.
fn find_peeled(refs: &[RemoteRef], name: &str) -> Option<Oid> {
    find_ref(refs, &format!("{}{}", name, PEELED_SUFFIX)).or_else(|| find_ref(refs, name))
}

/// Match an abbreviated id against advertised commits.
///
/// Tag objects are skipped when a peeled entry exists for them; an
/// ambiguous prefix matches nothing.
fn find_abbreviated(refs: &[RemoteRef], spec: &str) -> Option<Oid> {
    if !Oid::is_abbreviated_hex(spec) {
        return None;
    }
    let prefix = spec.to_ascii_lowercase();
    let peeled: BTreeSet<&str> = refs
        .iter()
        .filter_map(|r| r.name.strip_suffix(PEELED_SUFFIX))
        .collect();

    let candidates: BTreeSet<&Oid> = refs
        .iter()
        .filter(|r| !peeled.contains(r.name.as_str()))
        .map(|r| &r.oid)
        .filter(|oid| oid.as_str().starts_with(&prefix))
        .collect();

    match candidates.len() {
        1 => candidates.into_iter().next().cloned(),
        _ => None,
    }
}
