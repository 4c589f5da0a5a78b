//! core::config
//!
//! Configuration schema and loading.
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Environment overrides (`PRIOR_CACHE_DIR`, `PRIOR_REMOTE`)
//!
//! # Config File Locations
//!
//! Searched in order:
//! 1. `$PRIOR_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/prior/config.toml`
//! 3. `~/.prior/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use prior::core::config::Config;
//!
//! let config = Config::load().unwrap();
//! println!("cache: {}", config.cache_dir().display());
//! println!("remote: {}", config.remote_template());
//! ```

pub mod schema;

pub use schema::{FileConfig, SecretsConfig};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Default remote template.
pub const DEFAULT_REMOTE: &str = "https://github.com/{entity}/{repository}.git";

/// Default time to wait for another process's materialization.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(600);

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("home directory not found")]
    NoHomeDir,
}

/// Merged configuration from all sources.
///
/// Accessors apply defaults, so a `Config::default()` is usable as is.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Values read from the config file
    pub file: FileConfig,
    /// Environment overrides captured at load time
    env_cache_dir: Option<PathBuf>,
    env_remote: Option<String>,
    /// Path to the config file (if loaded)
    loaded_from: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the standard locations and the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or a
    /// value (from the file or the environment) is invalid. A missing config
    /// file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    /// Load configuration using `env` to look up environment variables.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let (file, loaded_from) = match Self::locate(&env) {
            Some(path) => (Self::read_file(&path)?, Some(path)),
            None => (FileConfig::default(), None),
        };
        file.validate()?;

        let env_remote = env("PRIOR_REMOTE").filter(|v| !v.is_empty());
        if let Some(remote) = &env_remote {
            schema::validate_remote_template(remote)?;
        }

        Ok(Self {
            file,
            env_cache_dir: env("PRIOR_CACHE_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            env_remote,
            loaded_from,
        })
    }

    /// Build a config from an already-parsed file, without the environment.
    pub fn from_file(file: FileConfig) -> Result<Self, ConfigError> {
        file.validate()?;
        Ok(Self {
            file,
            ..Self::default()
        })
    }

    /// Find the config file, if any.
    fn locate(env: &impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
        if let Some(path) = env("PRIOR_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Some(xdg_home) = env("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("prior/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        let path = dirs::home_dir()?.join(".prior/config.toml");
        path.exists().then_some(path)
    }

    /// Read and parse a config file.
    pub fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Directory for per-user state (`~/.prior`).
    pub fn home_dir() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".prior"))
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    /// Root of the snapshot cache.
    ///
    /// Defaults to `~/.prior/cache` (or `./.prior/cache` without a home
    /// directory).
    pub fn cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.env_cache_dir {
            return dir.clone();
        }
        if let Some(dir) = &self.file.cache_dir {
            return dir.clone();
        }
        Self::home_dir()
            .unwrap_or_else(|_| PathBuf::from(".prior"))
            .join("cache")
    }

    /// Remote URL template.
    ///
    /// Defaults to GitHub over HTTPS.
    pub fn remote_template(&self) -> &str {
        self.env_remote
            .as_deref()
            .or(self.file.remote.as_deref())
            .unwrap_or(DEFAULT_REMOTE)
    }

    /// How long to wait for another process's materialization.
    pub fn lock_timeout(&self) -> Duration {
        self.file
            .lock_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_LOCK_TIMEOUT)
    }

    /// Extra environment variable consulted for a token.
    pub fn token_env(&self) -> Option<&str> {
        self.file.token_env.as_deref()
    }

    /// Path of the session secrets file.
    pub fn secrets_path(&self) -> Option<PathBuf> {
        self.file
            .secrets
            .as_ref()
            .and_then(|s| s.path.clone())
            .or_else(|| Self::home_dir().ok().map(|dir| dir.join("secrets.toml")))
    }

    /// Get the path to the loaded config file.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.loaded_from.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_without_file() {
        let config = Config::from_file(FileConfig::default()).unwrap();
        assert_eq!(config.remote_template(), DEFAULT_REMOTE);
        assert_eq!(config.lock_timeout(), DEFAULT_LOCK_TIMEOUT);
        assert!(config.token_env().is_none());
        assert!(config.loaded_from().is_none());
    }

    #[test]
    fn load_file_from_prior_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
            cache_dir = "/srv/cache"
            lock_timeout_secs = 5
            "#,
        )
        .unwrap();

        let config =
            Config::load_with(env_from(&[("PRIOR_CONFIG", path.to_str().unwrap())])).unwrap();
        assert_eq!(config.cache_dir(), PathBuf::from("/srv/cache"));
        assert_eq!(config.lock_timeout(), Duration::from_secs(5));
        assert_eq!(config.loaded_from(), Some(path.as_path()));
    }

    #[test]
    fn load_file_from_xdg() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("prior")).unwrap();
        fs::write(
            temp.path().join("prior/config.toml"),
            "remote = \"file:///git/{entity}/{repository}\"\n",
        )
        .unwrap();

        let config = Config::load_with(env_from(&[(
            "XDG_CONFIG_HOME",
            temp.path().to_str().unwrap(),
        )]))
        .unwrap();
        assert_eq!(config.remote_template(), "file:///git/{entity}/{repository}");
    }

    #[test]
    fn environment_overrides_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "cache_dir = \"/from/file\"\n").unwrap();

        let config = Config::load_with(env_from(&[
            ("PRIOR_CONFIG", path.to_str().unwrap()),
            ("PRIOR_CACHE_DIR", "/from/env"),
            ("PRIOR_REMOTE", "/local/{entity}/{repository}"),
        ]))
        .unwrap();
        assert_eq!(config.cache_dir(), PathBuf::from("/from/env"));
        assert_eq!(config.remote_template(), "/local/{entity}/{repository}");
    }

    #[test]
    fn invalid_env_remote_rejected() {
        let result = Config::load_with(env_from(&[("PRIOR_REMOTE", "https://example.com/x")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn parse_error_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "cache_dir = [").unwrap();

        let err =
            Config::load_with(env_from(&[("PRIOR_CONFIG", path.to_str().unwrap())])).unwrap_err();
        match err {
            ConfigError::ParseError { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
