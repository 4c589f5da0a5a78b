//! core::config::schema
//!
//! Configuration schema types.
//!
//! Located at (in order of precedence):
//! 1. `$PRIOR_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/prior/config.toml`
//! 3. `~/.prior/config.toml` (canonical location)
//!
//! # Validation
//!
//! Config values are validated after parsing: the remote template must
//! contain both placeholders and the lock timeout must be positive.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Placeholder replaced by the entity name in the remote template.
pub const ENTITY_PLACEHOLDER: &str = "{entity}";

/// Placeholder replaced by the repository name in the remote template.
pub const REPOSITORY_PLACEHOLDER: &str = "{repository}";

/// Global configuration file contents.
///
/// # Example
///
/// ```toml
/// cache_dir = "/data/prior-cache"
/// remote = "https://github.com/{entity}/{repository}.git"
/// lock_timeout_secs = 600
/// token_env = "ACME_DATASETS_TOKEN"
///
/// [secrets]
/// path = "/home/me/.prior/secrets.toml"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Root of the snapshot cache.
    pub cache_dir: Option<PathBuf>,

    /// Remote URL template.
    pub remote: Option<String>,

    /// How long to wait for another process materializing the same commit.
    pub lock_timeout_secs: Option<u64>,

    /// Extra environment variable consulted for an access token.
    pub token_env: Option<String>,

    /// Session secret storage.
    pub secrets: Option<SecretsConfig>,
}

/// Session secret storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SecretsConfig {
    /// Path to the secrets file written by an out-of-band login.
    pub path: Option<PathBuf>,
}

impl FileConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(remote) = &self.remote {
            validate_remote_template(remote)?;
        }

        if self.lock_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "lock_timeout_secs must be greater than zero".into(),
            ));
        }

        if let Some(var) = &self.token_env {
            if var.is_empty() || var.contains('=') {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid token_env '{}'",
                    var
                )));
            }
        }

        Ok(())
    }
}

/// Check that a remote template names both the entity and the repository.
pub fn validate_remote_template(template: &str) -> Result<(), ConfigError> {
    for placeholder in [ENTITY_PLACEHOLDER, REPOSITORY_PLACEHOLDER] {
        if !template.contains(placeholder) {
            return Err(ConfigError::InvalidValue(format!(
                "remote template '{}' must contain {}",
                template, placeholder
            )));
        }
    }
    Ok(())
}
