//! secrets::traits
//!
//! Session secret lookup.
//!
//! Some earlier, out-of-band login leaves an access token behind; the
//! credential chain reads it through a [`SecretStore`] as its
//! lowest-precedence source. This crate never writes sessions.
//!
//! Implementations never log or include secret values in error messages.

use thiserror::Error;

/// Errors from reading session secrets.
///
/// Messages never include secret values.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("failed to read session secrets: {0}")]
    ReadError(String),
}

/// Read-only key-value view of session secrets.
///
/// Keys are namespaced strings such as `"token"` or `"token.acme"`.
pub trait SecretStore: Send + Sync {
    /// Get a secret by key. `Ok(None)` when absent.
    fn get(&self, key: &str) -> Result<Option<String>, SecretError>;
}
