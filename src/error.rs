//! error
//!
//! The public error taxonomy.
//!
//! Lower layers own their own error enums ([`TransportError`],
//! [`LockError`], [`ConfigError`], [`SecretError`], [`TypeError`]). Those are
//! translated into [`PriorError`] at the component boundary, with enough
//! context to tell which reference, commit or path failed.
//!
//! Callers branch on [`PriorError::kind`] or [`PriorError::is_retryable`]
//! rather than matching message text.

use std::path::PathBuf;

use thiserror::Error;

use crate::cache::LockError;
use crate::core::config::ConfigError;
use crate::core::types::TypeError;
use crate::secrets::SecretError;
use crate::transport::TransportError;

/// Result alias used throughout the crate.
pub type Result<T, E = PriorError> = std::result::Result<T, E>;

/// Everything that can go wrong between a reference and a record.
#[derive(Debug, Error)]
pub enum PriorError {
    /// The entity or repository does not exist, or is not accessible with
    /// the credential offered.
    #[error("repository {entity}/{repository} not found or not accessible: {source}")]
    ReferenceNotFound {
        entity: String,
        repository: String,
        #[source]
        source: TransportError,
    },

    /// The repository exists but nothing in it matches the revision.
    #[error("revision '{revision}' not found in {entity}/{repository}")]
    RevisionNotFound {
        entity: String,
        repository: String,
        revision: String,
    },

    /// Fetching a snapshot did not complete. Nothing was published.
    #[error("failed to materialize {entity}/{repository}@{commit}: {source}")]
    MaterializationFailed {
        entity: String,
        repository: String,
        commit: String,
        #[source]
        source: TransportError,
    },

    /// The snapshot has no manifest file.
    #[error("manifest missing: {}", path.display())]
    ManifestMissing { path: PathBuf },

    /// The manifest exists but does not describe a usable dataset.
    #[error("manifest malformed at {}: {message}", path.display())]
    ManifestMalformed { path: PathBuf, message: String },

    /// An index outside `0..len`.
    #[error("index {index} out of range for {split} (length {len})")]
    IndexOutOfRange {
        index: usize,
        len: usize,
        split: String,
    },

    /// Entity, repository or revision text is not a legal name.
    #[error("invalid reference: {0}")]
    InvalidReference(#[from] TypeError),

    /// The remote could not be reached while resolving a revision.
    #[error("remote for {entity}/{repository} unavailable: {source}")]
    RemoteUnavailable {
        entity: String,
        repository: String,
        #[source]
        source: TransportError,
    },

    /// A record's payload could not be decoded.
    #[error("record {index} of {split} is malformed: {message}")]
    RecordMalformed {
        index: usize,
        split: String,
        message: String,
    },

    /// No split with this name in the dataset.
    #[error("split '{name}' not found (available: {})", available.join(", "))]
    SplitNotFound {
        name: String,
        available: Vec<String>,
    },

    /// The caller cancelled, or the deadline passed.
    #[error("operation cancelled: {context}")]
    Cancelled { context: String },

    /// The materialization lock could not be taken.
    #[error("cache lock error: {0}")]
    Lock(#[from] LockError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("credential store error: {0}")]
    Credential(#[from] SecretError),
}

/// Coarse category of a [`PriorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Something named by the caller does not exist upstream.
    NotFound,
    /// A network or fetch failure that may succeed later.
    Transient,
    /// The snapshot's content is unusable.
    Content,
    /// The caller passed something invalid.
    Usage,
    /// Local configuration or credential storage problem.
    Environment,
}

impl PriorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PriorError::ReferenceNotFound { .. }
            | PriorError::RevisionNotFound { .. } => ErrorKind::NotFound,
            PriorError::MaterializationFailed { .. }
            | PriorError::RemoteUnavailable { .. }
            | PriorError::Cancelled { .. }
            | PriorError::Lock(_) => ErrorKind::Transient,
            PriorError::ManifestMissing { .. }
            | PriorError::ManifestMalformed { .. }
            | PriorError::RecordMalformed { .. } => ErrorKind::Content,
            PriorError::IndexOutOfRange { .. }
            | PriorError::InvalidReference(_)
            | PriorError::SplitNotFound { .. } => ErrorKind::Usage,
            PriorError::Config(_) | PriorError::Credential(_) => ErrorKind::Environment,
        }
    }

    /// Whether retrying the same call unchanged may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub(crate) fn cancelled(context: impl Into<String>) -> Self {
        PriorError::Cancelled {
            context: context.into(),
        }
    }
}
