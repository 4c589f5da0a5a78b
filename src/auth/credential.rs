//! auth::credential
//!
//! Opaque access tokens and the precedence chain that picks one.
//!
//! # Precedence
//!
//! Most specific wins:
//! 1. A value set explicitly in-process
//! 2. Environment variables, in the order they were added to the chain
//! 3. The ambient session (a token left in a [`SecretStore`] by a login)
//!
//! # Security
//!
//! [`Credential`] redacts its value in `Debug` and `Display`. The only way
//! to read the token is [`Credential::expose`], which the transport calls
//! when libgit2 asks for credentials.

use std::fmt;

use crate::core::config::Config;
use crate::secrets::{FileSecretStore, SecretError, SecretStore, TOKEN_KEY};

/// Environment variable checked first for a token.
pub const TOKEN_ENV: &str = "PRIOR_TOKEN";

/// Fallback environment variable for GitHub-hosted datasets.
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// An opaque access token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a token. Returns `None` for blank input.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into().trim().to_string();
        (!token.is_empty()).then_some(Self(token))
    }

    /// The raw token. Never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Where a resolved credential came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Explicit,
    Environment(String),
    Session,
}

/// Per-call credential choice.
#[derive(Debug, Clone, Default)]
pub enum CredentialOverride {
    /// Use the process-wide default resolved at startup.
    #[default]
    Default,
    /// Use this credential for this call only.
    Use(Credential),
    /// Send no credential, even if a default exists.
    Anonymous,
}

impl CredentialOverride {
    /// Apply the override to a default credential.
    pub fn apply<'a>(&'a self, default: Option<&'a Credential>) -> Option<&'a Credential> {
        match self {
            CredentialOverride::Default => default,
            CredentialOverride::Use(credential) => Some(credential),
            CredentialOverride::Anonymous => None,
        }
    }
}

impl From<Option<Credential>> for CredentialOverride {
    fn from(value: Option<Credential>) -> Self {
        match value {
            Some(credential) => CredentialOverride::Use(credential),
            None => CredentialOverride::Default,
        }
    }
}

/// Ordered list of credential sources.
///
/// # Example
///
/// ```
/// use prior::auth::{Credential, CredentialChain, CredentialSource};
///
/// let chain = CredentialChain::new()
///     .explicit(Credential::new("from-code"))
///     .env_var("PRIOR_TOKEN");
///
/// let (credential, source) = chain
///     .resolve_with(|_| Some("from-env".to_string()))
///     .unwrap()
///     .unwrap();
/// assert_eq!(credential.expose(), "from-code");
/// assert_eq!(source, CredentialSource::Explicit);
/// ```
#[derive(Default)]
pub struct CredentialChain {
    explicit: Option<Credential>,
    env_vars: Vec<String>,
    session: Option<Box<dyn SecretStore>>,
}

impl fmt::Debug for CredentialChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialChain")
            .field("explicit", &self.explicit.is_some())
            .field("env_vars", &self.env_vars)
            .field("session", &self.session.is_some())
            .finish()
    }
}

impl CredentialChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard chain: `PRIOR_TOKEN`, the configured `token_env`,
    /// `GITHUB_TOKEN`, then the session file.
    pub fn from_config(config: &Config) -> Self {
        let mut chain = Self::new().env_var(TOKEN_ENV);
        if let Some(var) = config.token_env() {
            chain = chain.env_var(var);
        }
        chain = chain.env_var(GITHUB_TOKEN_ENV);
        match config.secrets_path() {
            Some(path) => chain.session(Box::new(FileSecretStore::with_path(path))),
            None => chain,
        }
    }

    /// Set (or clear) the explicit in-process value.
    pub fn explicit(mut self, credential: Option<Credential>) -> Self {
        self.explicit = credential;
        self
    }

    /// Append an environment variable to consult.
    pub fn env_var(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.env_vars.contains(&name) {
            self.env_vars.push(name);
        }
        self
    }

    /// Set the session store.
    pub fn session(mut self, store: Box<dyn SecretStore>) -> Self {
        self.session = Some(store);
        self
    }

    /// Resolve against the process environment.
    pub fn resolve(&self) -> Result<Option<(Credential, CredentialSource)>, SecretError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve using `env` to look up environment variables.
    ///
    /// # Errors
    ///
    /// Only the session store can fail; explicit and environment sources
    /// cannot.
    pub fn resolve_with(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<(Credential, CredentialSource)>, SecretError> {
        if let Some(credential) = &self.explicit {
            return Ok(Some((credential.clone(), CredentialSource::Explicit)));
        }

        for name in &self.env_vars {
            if let Some(credential) = env(name).and_then(Credential::new) {
                return Ok(Some((credential, CredentialSource::Environment(name.clone()))));
            }
        }

        if let Some(store) = &self.session {
            if let Some(credential) = store.get(TOKEN_KEY)?.and_then(Credential::new) {
                return Ok(Some((credential, CredentialSource::Session)));
            }
        }

        Ok(None)
    }
}
