//! transport::git
//!
//! Transport implementation using git2.
//!
//! This is the only module that imports `git2`. Remote listing uses a
//! detached remote (the equivalent of `git ls-remote`), so resolution never
//! writes to disk. Fetching initialises a throwaway repository inside the
//! destination, checks out the requested commit, then deletes `.git` so the
//! destination holds nothing but the commit's tree.
//!
//! # Credentials
//!
//! A token is offered as HTTPS basic auth (`x-access-token:<token>`, or the
//! username embedded in the URL). SSH remotes fall back to the ssh agent.
//! libgit2 retries credential callbacks indefinitely on rejection, so the
//! callback gives up after the first refusal.
//!
//! # Cancellation
//!
//! [`Cancellation`] is checked before each network step and from the
//! transfer progress callback; returning `false` there makes libgit2 abort
//! the transfer with a user error, which maps to
//! [`TransportError::Cancelled`].

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use super::traits::{RemoteLocation, RemoteRef, Transport, TransportError};
use crate::auth::Credential;
use crate::core::cancel::Cancellation;
use crate::core::types::Oid;

/// Username paired with a bare token for HTTPS remotes.
const TOKEN_USERNAME: &str = "x-access-token";

/// Refspecs fetched when the remote will not serve a commit by id.
const FETCH_REFSPECS: [&str; 2] = [
    "+refs/heads/*:refs/remotes/origin/*",
    "+refs/tags/*:refs/tags/*",
];

/// git2-backed [`Transport`].
#[derive(Debug, Clone, Default)]
pub struct GitTransport {
    _private: (),
}

impl GitTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail fast for local remotes that do not exist.
    fn check_local(remote: &RemoteLocation) -> Result<(), TransportError> {
        match remote.local_path() {
            Some(path) if !path.exists() => Err(TransportError::NotFound(format!(
                "no repository at '{}'",
                path.display()
            ))),
            _ => Ok(()),
        }
    }

    fn check_cancel(cancel: &Cancellation) -> Result<(), TransportError> {
        if cancel.is_cancelled() {
            Err(TransportError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Bring `commit` into `repo`.
    ///
    /// The commit is first requested by id alone, which transfers only its
    /// history. Servers that refuse arbitrary wants get a second fetch of
    /// every branch and tag instead.
    ///
    /// Returns whether the commit is present afterwards.
    fn fetch_into(
        repo: &git2::Repository,
        remote: &RemoteLocation,
        commit: &Oid,
        credential: Option<&Credential>,
        cancel: &Cancellation,
    ) -> Result<bool, TransportError> {
        let oid = git2::Oid::from_str(commit.as_str())
            .map_err(|e| TransportError::Internal(e.message().to_string()))?;

        let mut git_remote = repo
            .remote_anonymous(remote.as_str())
            .map_err(|e| map_git2(e, remote, cancel))?;

        Self::check_cancel(cancel)?;
        let mut options = fetch_options(credential, cancel, git2::AutotagOption::None);
        match git_remote.fetch(&[commit.as_str()], Some(&mut options), None) {
            Ok(()) if repo.find_commit(oid).is_ok() => return Ok(true),
            Ok(()) => {}
            Err(err) => {
                Self::check_cancel(cancel)?;
                debug!(remote = %remote, commit = %commit, error = %err.message(), "fetch by id refused");
            }
        }

        Self::check_cancel(cancel)?;
        let mut options = fetch_options(credential, cancel, git2::AutotagOption::All);
        git_remote
            .fetch(&FETCH_REFSPECS, Some(&mut options), None)
            .map_err(|e| map_git2(e, remote, cancel))?;

        Ok(repo.find_commit(oid).is_ok())
    }
}

impl Transport for GitTransport {
    fn list_refs(
        &self,
        remote: &RemoteLocation,
        credential: Option<&Credential>,
        cancel: &Cancellation,
    ) -> Result<Vec<RemoteRef>, TransportError> {
        Self::check_local(remote)?;
        Self::check_cancel(cancel)?;

        let mut git_remote =
            git2::Remote::create_detached(remote.as_str()).map_err(|e| map_git2(e, remote, cancel))?;
        let connection = git_remote
            .connect_auth(
                git2::Direction::Fetch,
                Some(callbacks(credential, cancel)),
                None,
            )
            .map_err(|e| map_git2(e, remote, cancel))?;

        let mut refs = Vec::new();
        for head in connection.list().map_err(|e| map_git2(e, remote, cancel))? {
            // Unborn HEAD of an empty repository is advertised as zeros.
            if head.oid().is_zero() {
                continue;
            }
            let oid = Oid::new(head.oid().to_string())
                .map_err(|e| TransportError::Internal(e.to_string()))?;
            refs.push(RemoteRef::new(head.name(), oid));
        }

        Self::check_cancel(cancel)?;
        debug!(remote = %remote, count = refs.len(), "listed remote refs");
        Ok(refs)
    }

    fn contains_commit(
        &self,
        remote: &RemoteLocation,
        commit: &Oid,
        credential: Option<&Credential>,
        cancel: &Cancellation,
    ) -> Result<bool, TransportError> {
        let refs = self.list_refs(remote, credential, cancel)?;
        if refs.iter().any(|r| &r.oid == commit) {
            return Ok(true);
        }

        // Not a tip: probe with a scratch repository outside the cache. The
        // probe asks for this commit alone before falling back to all refs.
        let probe: PathBuf =
            std::env::temp_dir().join(format!("prior-probe-{}", Uuid::new_v4().simple()));
        let result = git2::Repository::init_bare(&probe)
            .map_err(|e| TransportError::Io(e.message().to_string()))
            .and_then(|repo| Self::fetch_into(&repo, remote, commit, credential, cancel));

        if let Err(err) = fs::remove_dir_all(&probe) {
            warn!(path = %probe.display(), error = %err, "failed to remove probe repository");
        }
        result
    }

    fn fetch(
        &self,
        remote: &RemoteLocation,
        commit: &Oid,
        dest: &Path,
        credential: Option<&Credential>,
        cancel: &Cancellation,
    ) -> Result<(), TransportError> {
        Self::check_local(remote)?;
        Self::check_cancel(cancel)?;

        fs::create_dir_all(dest)
            .map_err(|e| TransportError::Io(format!("cannot create {}: {}", dest.display(), e)))?;

        {
            let repo = git2::Repository::init(dest)
                .map_err(|e| TransportError::Io(e.message().to_string()))?;

            if !Self::fetch_into(&repo, remote, commit, credential, cancel)? {
                return Err(TransportError::NotFound(format!(
                    "commit {} not found in {}",
                    commit, remote
                )));
            }

            Self::check_cancel(cancel)?;
            let oid = git2::Oid::from_str(commit.as_str())
                .map_err(|e| TransportError::Internal(e.message().to_string()))?;
            let object = repo
                .find_commit(oid)
                .map_err(|e| map_git2(e, remote, cancel))?
                .into_object();

            let mut checkout = git2::build::CheckoutBuilder::new();
            checkout.force();
            repo.checkout_tree(&object, Some(&mut checkout))
                .map_err(|e| TransportError::Io(format!("checkout failed: {}", e.message())))?;
            repo.set_head_detached(oid)
                .map_err(|e| TransportError::Internal(e.message().to_string()))?;
        }

        fs::remove_dir_all(dest.join(".git"))
            .map_err(|e| TransportError::Io(format!("cannot remove .git: {}", e)))?;

        debug!(remote = %remote, commit = %commit, dest = %dest.display(), "fetched commit tree");
        Ok(())
    }
}

/// Build remote callbacks carrying the credential and cancellation check.
fn callbacks<'a>(
    credential: Option<&'a Credential>,
    cancel: &'a Cancellation,
) -> git2::RemoteCallbacks<'a> {
    let mut callbacks = git2::RemoteCallbacks::new();
    let mut attempts = 0u32;

    callbacks.credentials(move |_url, username, allowed| {
        attempts += 1;
        if attempts > 1 {
            return Err(git2::Error::new(
                git2::ErrorCode::Auth,
                git2::ErrorClass::Http,
                "credentials rejected",
            ));
        }

        if allowed.contains(git2::CredentialType::USER_PASS_PLAINTEXT) {
            if let Some(credential) = credential {
                return git2::Cred::userpass_plaintext(
                    username.unwrap_or(TOKEN_USERNAME),
                    credential.expose(),
                );
            }
        }
        if allowed.contains(git2::CredentialType::SSH_KEY) {
            if let Some(username) = username {
                return git2::Cred::ssh_key_from_agent(username);
            }
        }
        git2::Cred::default()
    });

    callbacks.transfer_progress(move |_progress| !cancel.is_cancelled());
    callbacks
}

fn fetch_options<'a>(
    credential: Option<&'a Credential>,
    cancel: &'a Cancellation,
    tags: git2::AutotagOption,
) -> git2::FetchOptions<'a> {
    let mut options = git2::FetchOptions::new();
    options
        .remote_callbacks(callbacks(credential, cancel))
        .download_tags(tags);
    options
}

/// Normalize a git2 error into a transport error category.
fn map_git2(err: git2::Error, remote: &RemoteLocation, cancel: &Cancellation) -> TransportError {
    if cancel.is_cancelled() || err.code() == git2::ErrorCode::User {
        return TransportError::Cancelled;
    }

    let message = format!("{}: {}", remote, err.message());
    let lowered = err.message().to_ascii_lowercase();

    match (err.code(), err.class()) {
        (git2::ErrorCode::Auth, _) => TransportError::AuthFailed(message),
        (git2::ErrorCode::NotFound, _) => TransportError::NotFound(message),
        _ if lowered.contains("authentication") || lowered.contains("401") || lowered.contains("403") => {
            TransportError::AuthFailed(message)
        }
        _ if lowered.contains("not found") || lowered.contains("404") => {
            TransportError::NotFound(message)
        }
        (git2::ErrorCode::Certificate, _)
        | (
            _,
            git2::ErrorClass::Net
            | git2::ErrorClass::Http
            | git2::ErrorClass::Ssl
            | git2::ErrorClass::Ssh
            | git2::ErrorClass::Os,
        ) => TransportError::Network(message),
        _ => TransportError::Internal(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> RemoteLocation {
        RemoteLocation::new("https://example.com/acme/demo.git")
    }

    #[test]
    fn missing_local_remote_is_not_found() {
        let transport = GitTransport::new();
        let remote = RemoteLocation::new("/definitely/not/a/repo/prior-test");
        let err = transport
            .list_refs(&remote, None, &Cancellation::new())
            .unwrap_err();
        assert!(matches!(err, TransportError::NotFound(_)));
    }

    #[test]
    fn cancelled_before_start() {
        let transport = GitTransport::new();
        let cancel = Cancellation::new();
        cancel.cancel();
        let err = transport.list_refs(&remote(), None, &cancel).unwrap_err();
        assert_eq!(err, TransportError::Cancelled);
    }

    #[test]
    fn error_mapping() {
        let cancel = Cancellation::new();
        let auth = git2::Error::new(git2::ErrorCode::Auth, git2::ErrorClass::Http, "nope");
        assert!(matches!(
            map_git2(auth, &remote(), &cancel),
            TransportError::AuthFailed(_)
        ));

        let missing = git2::Error::new(
            git2::ErrorCode::NotFound,
            git2::ErrorClass::Repository,
            "could not find repository",
        );
        assert!(matches!(
            map_git2(missing, &remote(), &cancel),
            TransportError::NotFound(_)
        ));

        let net = git2::Error::new(
            git2::ErrorCode::GenericError,
            git2::ErrorClass::Net,
            "connection reset",
        );
        assert!(matches!(
            map_git2(net, &remote(), &cancel),
            TransportError::Network(_)
        ));

        let user = git2::Error::new(git2::ErrorCode::User, git2::ErrorClass::Callback, "stop");
        assert_eq!(map_git2(user, &remote(), &cancel), TransportError::Cancelled);
    }

    /// Commit a single file onto `branch` of `repo`.
    fn commit_file(
        repo: &git2::Repository,
        branch: &str,
        name: &str,
        parent: Option<git2::Oid>,
    ) -> git2::Oid {
        let blob = repo.blob(name.as_bytes()).unwrap();
        let mut builder = repo.treebuilder(None).unwrap();
        builder.insert(name, blob, 0o100644).unwrap();
        let tree = repo.find_tree(builder.write().unwrap()).unwrap();
        let signature = git2::Signature::now("Test", "test@example.com").unwrap();
        let parents: Vec<git2::Commit<'_>> =
            parent.map(|p| repo.find_commit(p).unwrap()).into_iter().collect();
        let parents: Vec<&git2::Commit<'_>> = parents.iter().collect();
        repo.commit(
            Some(&format!("refs/heads/{}", branch)),
            &signature,
            &signature,
            name,
            &tree,
            &parents,
        )
        .unwrap()
    }

    #[test]
    fn non_tip_commit_is_fetched_without_unrelated_branches() {
        let upstream_dir = tempfile::TempDir::new().unwrap();
        let upstream = git2::Repository::init(upstream_dir.path()).unwrap();
        let first = commit_file(&upstream, "main", "a.txt", None);
        commit_file(&upstream, "main", "b.txt", Some(first));
        let unrelated = commit_file(&upstream, "other", "c.txt", None);

        let scratch_dir = tempfile::TempDir::new().unwrap();
        let scratch = git2::Repository::init_bare(scratch_dir.path()).unwrap();
        let remote = RemoteLocation::new(upstream_dir.path().to_string_lossy());
        let commit = Oid::new(first.to_string()).unwrap();

        let found =
            GitTransport::fetch_into(&scratch, &remote, &commit, None, &Cancellation::new())
                .unwrap();
        assert!(found);
        assert!(scratch.find_commit(first).is_ok());
        assert!(scratch.find_commit(unrelated).is_err());
    }
}
