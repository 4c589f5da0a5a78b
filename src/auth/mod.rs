//! auth
//!
//! Credentials for private dataset repositories.
//!
//! The core never sources credentials on its own initiative: a
//! [`CredentialChain`] is resolved once when a [`crate::Prior`] client is
//! built, and every call may override the result with a
//! [`CredentialOverride`].
//!
//! Tokens never appear in logs, errors, or debug output.

mod credential;

pub use credential::{
    Credential, CredentialChain, CredentialOverride, CredentialSource, GITHUB_TOKEN_ENV,
    TOKEN_ENV,
};
