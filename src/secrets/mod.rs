//! secrets
//!
//! Session secret storage.
//!
//! The ambient "logged in" state is a token persisted by some earlier,
//! out-of-band login. This crate only reads it (see
//! [`crate::auth::CredentialChain`]).
//!
//! # Security
//!
//! - Secrets are **never** logged or included in error messages
//! - A session file open to other users is reported with a warning

mod file_store;
mod traits;

pub use file_store::FileSecretStore;
pub use traits::{SecretError, SecretStore};

/// Key under which the session access token is stored.
pub const TOKEN_KEY: &str = "token";
