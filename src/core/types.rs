//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`EntityName`] - Validated owner of a dataset repository
//! - [`RepoName`] - Validated dataset repository name
//! - [`Oid`] - Git object identifier (SHA)
//! - [`Reference`] - Caller-supplied (entity, repository, revision) triple
//! - [`ResolvedCommit`] - A reference pinned to an exact commit
//!
//! # Validation
//!
//! These types enforce validity at construction time. Entity and repository
//! names become directory names inside the snapshot cache, so anything that
//! could escape the cache root is rejected here.
//!
//! # Examples
//!
//! ```
//! use prior::core::types::{EntityName, Oid, Reference, RepoName};
//!
//! let reference = Reference::new("acme", "demo-data", "v1.0").unwrap();
//! assert_eq!(reference.to_string(), "acme/demo-data@v1.0");
//!
//! assert!(EntityName::new("../etc").is_err());
//! assert!(RepoName::new("").is_err());
//! assert!(Oid::new("not-a-sha").is_err());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::RemoteLocation;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid entity name: {0}")]
    InvalidEntity(String),

    #[error("invalid repository name: {0}")]
    InvalidRepository(String),

    #[error("invalid revision: {0}")]
    InvalidRevision(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),
}

/// Validate a single path segment shared by entity and repository names.
///
/// Mirrors the rules hosting services apply to owner and repository names
/// closely enough to keep every accepted name a safe directory name.
fn validate_segment(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name cannot be empty".into());
    }
    if name.len() > 100 {
        return Err("name cannot exceed 100 characters".into());
    }
    if name == "." || name == ".." {
        return Err(format!("'{}' is reserved", name));
    }
    if name.starts_with('.') {
        return Err("name cannot start with '.'".into());
    }
    if name.ends_with(".lock") {
        return Err("name cannot end with '.lock'".into());
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(format!("name cannot contain '{}'", c.escape_default()));
    }
    Ok(())
}

/// A validated entity (user or organisation) name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityName(String);

impl EntityName {
    /// Create a new validated entity name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidEntity` if the name is empty, contains a
    /// path separator or other disallowed characters, or starts with `.`.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        validate_segment(&name).map_err(TypeError::InvalidEntity)?;
        Ok(Self(name))
    }

    /// Get the entity name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EntityName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntityName> for String {
    fn from(name: EntityName) -> Self {
        name.0
    }
}

impl fmt::Display for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated repository name.
///
/// A trailing `.git` is accepted and stripped so `demo-data.git` and
/// `demo-data` share a cache directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoName(String);

impl RepoName {
    /// Create a new validated repository name.
    ///
    /// # Example
    ///
    /// ```
    /// use prior::core::types::RepoName;
    ///
    /// assert_eq!(RepoName::new("houses.git").unwrap().as_str(), "houses");
    /// assert!(RepoName::new("a/b").is_err());
    /// ```
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        let name = match name.strip_suffix(".git") {
            Some(stripped) => stripped.to_string(),
            None => name,
        };
        validate_segment(&name).map_err(TypeError::InvalidRepository)?;
        Ok(Self(name))
    }

    /// Get the repository name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RepoName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RepoName> for String {
    fn from(name: RepoName) -> Self {
        name.0
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A Git object identifier (SHA-1 or SHA-256 hex string).
///
/// # Example
///
/// ```
/// use prior::core::types::Oid;
///
/// let oid = Oid::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(oid.as_str(), "abc123def4567890abc123def4567890abc12345");
/// assert_eq!(oid.short(7), "abc123d");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    /// Create a new validated object id.
    ///
    /// The OID is normalized to lowercase.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` if the string is not a full hex OID.
    pub fn new(oid: impl Into<String>) -> Result<Self, TypeError> {
        let oid = oid.into().to_ascii_lowercase();
        Self::validate(&oid)?;
        Ok(Self(oid))
    }

    /// Check whether `text` has the shape of a full object id.
    pub fn is_full_hex(text: &str) -> bool {
        Self::validate(text).is_ok()
    }

    /// Check whether `text` could be an abbreviated object id.
    pub fn is_abbreviated_hex(text: &str) -> bool {
        (7..40).contains(&text.len()) && text.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// Get an abbreviated form of the OID.
    pub fn short(&self, len: usize) -> &str {
        let end = len.min(self.0.len());
        &self.0[..end]
    }

    fn validate(oid: &str) -> Result<(), TypeError> {
        // SHA-1 is 40 hex chars, SHA-256 is 64
        if oid.len() != 40 && oid.len() != 64 {
            return Err(TypeError::InvalidOid(format!(
                "expected 40 or 64 hex characters, got {}",
                oid.len()
            )));
        }
        if !oid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidOid(
                "object id must be hexadecimal".into(),
            ));
        }
        Ok(())
    }

    /// Get the object id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A caller-supplied dataset reference.
///
/// The revision is kept as free text (tag, branch, full or abbreviated
/// commit, or `HEAD`). It is interpreted by the resolver, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub entity: EntityName,
    pub repository: RepoName,
    pub revision: String,
}

impl Reference {
    /// Build a reference from raw strings.
    ///
    /// An empty revision means the remote's default branch.
    pub fn new(
        entity: impl Into<String>,
        repository: impl Into<String>,
        revision: impl Into<String>,
    ) -> Result<Self, TypeError> {
        let revision = revision.into().trim().to_string();
        if revision.chars().any(|c| c.is_ascii_control() || c == ' ') {
            return Err(TypeError::InvalidRevision(format!(
                "'{}' contains whitespace or control characters",
                revision.escape_default()
            )));
        }
        if revision.contains("..") {
            return Err(TypeError::InvalidRevision(format!(
                "'{}' is a range, not a single revision",
                revision
            )));
        }
        Ok(Self {
            entity: EntityName::new(entity)?,
            repository: RepoName::new(repository)?,
            revision,
        })
    }

    /// Revision text used in messages (`HEAD` when unspecified).
    pub fn revision_or_head(&self) -> &str {
        if self.revision.is_empty() {
            "HEAD"
        } else {
            &self.revision
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}",
            self.entity,
            self.repository,
            self.revision_or_head()
        )
    }
}

/// A reference pinned to an exact, immutable commit.
///
/// Two resolved commits with equal entity, repository and commit share one
/// snapshot, whatever revision text produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedCommit {
    pub entity: EntityName,
    pub repository: RepoName,
    pub commit: Oid,
    /// Where the repository was resolved from.
    pub remote: RemoteLocation,
}

impl fmt::Display for ResolvedCommit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}",
            self.entity,
            self.repository,
            self.commit.short(12)
        )
    }
}
