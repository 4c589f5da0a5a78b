//! client
//!
//! The [`Prior`] client: reference in, dataset out.
//!
//! # Pipeline
//!
//! ```text
//! Reference -> RevisionResolver -> ResolvedCommit
//!           -> SnapshotCache    -> Snapshot (fetched only if absent)
//!           -> ManifestLoader   -> DatasetDict of LazyRecordSequence
//! ```
//!
//! # Credentials
//!
//! A client resolves its default credential once, at construction. Each
//! call may replace it with a [`CredentialOverride`]; nothing is sourced
//! behind the caller's back after that.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use tracing::{debug, info};

use crate::auth::{Credential, CredentialChain, CredentialOverride};
use crate::cache::{Snapshot, SnapshotCache};
use crate::core::cancel::Cancellation;
use crate::core::config::Config;
use crate::core::types::{Reference, ResolvedCommit};
use crate::dataset::DatasetDict;
use crate::error::Result;
use crate::manifest::ManifestLoader;
use crate::resolve::RevisionResolver;
use crate::transport::{GitTransport, Transport};

/// Resolves, caches and loads datasets.
#[derive(Debug, Clone)]
pub struct Prior {
    resolver: RevisionResolver,
    cache: SnapshotCache,
    loader: ManifestLoader,
    default_credential: Option<Credential>,
}

impl Prior {
    /// Build a client from configuration, using the git transport and the
    /// standard credential chain.
    pub fn from_config(config: &Config) -> Result<Self> {
        let resolved = CredentialChain::from_config(config).resolve()?;
        let (credential, source) = match resolved {
            Some((credential, source)) => (Some(credential), Some(source)),
            None => (None, None),
        };
        info!(
            cache_dir = %config.cache_dir().display(),
            remote = config.remote_template(),
            credential = ?source,
            "initialized client"
        );

        Ok(Self::new(
            Arc::new(GitTransport::new()),
            config.cache_dir(),
            config.remote_template(),
        )
        .with_lock_timeout(config.lock_timeout())
        .with_credential(credential))
    }

    /// Build a client from parts. No default credential.
    pub fn new(
        transport: Arc<dyn Transport>,
        cache_root: PathBuf,
        remote_template: impl Into<String>,
    ) -> Self {
        Self {
            resolver: RevisionResolver::new(Arc::clone(&transport), remote_template),
            cache: SnapshotCache::new(cache_root, transport),
            loader: ManifestLoader::new(),
            default_credential: None,
        }
    }

    /// Replace the default credential.
    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.default_credential = credential;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.cache = self.cache.with_lock_timeout(timeout);
        self
    }

    pub fn default_credential(&self) -> Option<&Credential> {
        self.default_credential.as_ref()
    }

    pub fn resolver(&self) -> &RevisionResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Resolve a reference to a commit.
    pub fn resolve(
        &self,
        reference: &Reference,
        credential: &CredentialOverride,
        cancel: &Cancellation,
    ) -> Result<ResolvedCommit> {
        self.resolver
            .resolve(reference, credential.apply(self.default_credential()), cancel)
    }

    /// Return the ready snapshot of a resolved commit, fetching if absent.
    pub fn materialize(
        &self,
        resolved: &ResolvedCommit,
        credential: &CredentialOverride,
        cancel: &Cancellation,
    ) -> Result<Snapshot> {
        self.cache
            .get_or_materialize(resolved, credential.apply(self.default_credential()), cancel)
    }

    /// Load the splits of a ready snapshot.
    pub fn load(&self, snapshot: &Snapshot) -> Result<DatasetDict> {
        self.loader.load(snapshot)
    }

    /// Resolve, materialize and load in one call, with no deadline.
    ///
    /// `credential` of `None` means the client's default.
    pub fn resolve_and_load(
        &self,
        entity: &str,
        repository: &str,
        revision: &str,
        credential: Option<Credential>,
    ) -> Result<DatasetDict> {
        let reference = Reference::new(entity, repository, revision)?;
        self.resolve_and_load_with(&reference, &credential.into(), &Cancellation::new())
    }

    /// Resolve, materialize and load with explicit credential choice and
    /// cancellation.
    pub fn resolve_and_load_with(
        &self,
        reference: &Reference,
        credential: &CredentialOverride,
        cancel: &Cancellation,
    ) -> Result<DatasetDict> {
        let resolved = self.resolve(reference, credential, cancel)?;
        let snapshot = self.materialize(&resolved, credential, cancel)?;
        debug!(reference = %reference, path = %snapshot.path().display(), "loading manifest");
        self.load(&snapshot)
    }
}

static DEFAULT_CLIENT: OnceCell<Prior> = OnceCell::new();

/// The process-wide client, built from [`Config::load`] on first use.
pub fn default_client() -> Result<&'static Prior> {
    DEFAULT_CLIENT.get_or_try_init(|| Prior::from_config(&Config::load()?))
}

/// Resolve `entity/repository@revision` and load its splits using the
/// process-wide client.
///
/// An empty `revision` means the repository's default branch. A
/// `credential` replaces the default credential for this call only.
///
/// # Example
///
/// ```no_run
/// let dict = prior::resolve_and_load("acme", "demo-data", "v1.0", None)?;
/// let train = dict.get("train")?;
/// for record in train {
///     println!("{}", record?);
/// }
/// # Ok::<(), prior::PriorError>(())
/// ```
pub fn resolve_and_load(
    entity: &str,
    repository: &str,
    revision: &str,
    credential: Option<Credential>,
) -> Result<DatasetDict> {
    default_client()?.resolve_and_load(entity, repository, revision, credential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::schema::{FileConfig, SecretsConfig};
    use crate::error::PriorError;
    use crate::transport::mock::MockTransport;
    use crate::transport::RemoteLocation;
    use tempfile::TempDir;

    const MANIFEST: &[u8] = b"[splits.train]\nkind = \"jsonl\"\npath = \"train.jsonl\"\n";

    fn client(temp: &TempDir) -> (MockTransport, Prior) {
        let mock = MockTransport::new();
        let remote = RemoteLocation::new("mock://acme/demo-data");
        let commit = mock.add_commit(
            &remote,
            &[
                ("prior.toml", MANIFEST),
                ("train.jsonl", b"{\"x\":1}\n{\"x\":2}\n".as_slice()),
            ],
        );
        mock.set_ref(&remote, "refs/heads/main", &commit);
        mock.set_ref(&remote, "HEAD", &commit);
        let prior = Prior::new(
            Arc::new(mock.clone()),
            temp.path().to_path_buf(),
            "mock://{entity}/{repository}",
        );
        (mock, prior)
    }

    #[test]
    fn resolve_and_load_end_to_end() {
        let temp = TempDir::new().unwrap();
        let (_mock, prior) = client(&temp);
        let dict = prior.resolve_and_load("acme", "demo-data", "main", None).unwrap();
        assert_eq!(dict.dataset(), "demo-data");
        assert_eq!(dict.get("train").unwrap().len(), 2);
    }

    #[test]
    fn invalid_reference_never_reaches_transport() {
        let temp = TempDir::new().unwrap();
        let (mock, prior) = client(&temp);
        let err = prior
            .resolve_and_load("../etc", "demo-data", "main", None)
            .unwrap_err();
        assert!(matches!(err, PriorError::InvalidReference(_)));
        assert!(mock.operations().is_empty());
    }

    #[test]
    fn per_call_credential_overrides_default() {
        let temp = TempDir::new().unwrap();
        let (mock, prior) = client(&temp);
        mock.require_token("right");
        let prior = prior.with_credential(Credential::new("wrong"));

        let err = prior
            .resolve_and_load("acme", "demo-data", "main", None)
            .unwrap_err();
        assert!(matches!(err, PriorError::ReferenceNotFound { .. }));

        let ok = prior.resolve_and_load("acme", "demo-data", "main", Credential::new("right"));
        assert!(ok.is_ok());
    }

    #[test]
    fn anonymous_override_drops_default() {
        let temp = TempDir::new().unwrap();
        let (mock, prior) = client(&temp);
        mock.require_token("right");
        let prior = prior.with_credential(Credential::new("right"));

        let reference = Reference::new("acme", "demo-data", "main").unwrap();
        let err = prior
            .resolve(&reference, &CredentialOverride::Anonymous, &Cancellation::new())
            .unwrap_err();
        assert!(matches!(err, PriorError::ReferenceNotFound { .. }));
    }

    #[test]
    fn from_config_uses_configured_cache() {
        let temp = TempDir::new().unwrap();
        let file = FileConfig {
            cache_dir: Some(temp.path().join("cache")),
            secrets: Some(SecretsConfig {
                path: Some(temp.path().join("secrets.toml")),
            }),
            ..FileConfig::default()
        };
        let config = Config::from_file(file).unwrap();
        let prior = Prior::from_config(&config).unwrap();
        assert_eq!(prior.cache().paths().root(), temp.path().join("cache"));
    }
}
