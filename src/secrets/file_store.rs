//! secrets::file_store
//!
//! Session secrets read from a flat TOML table (by default
//! `~/.prior/secrets.toml`).
//!
//! A missing file is an empty session. On Unix, a file readable by group or
//! others is still used, with a warning.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use tracing::warn;

use super::traits::{SecretError, SecretStore};

/// Session file reader.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, SecretError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(SecretError::ReadError(format!(
                    "cannot read '{}': {}",
                    self.path.display(),
                    e
                )))
            }
        };
        self.check_permissions();

        // The toml error text can quote file content, so it is dropped.
        toml::from_str(&content).map_err(|_| {
            SecretError::ReadError(format!(
                "cannot parse secrets file '{}'",
                self.path.display()
            ))
        })
    }

    #[cfg(unix)]
    fn check_permissions(&self) {
        if let Ok(metadata) = fs::metadata(&self.path) {
            let mode = metadata.permissions().mode() & 0o777;
            if mode & 0o077 != 0 {
                warn!(
                    path = %self.path.display(),
                    mode = %format!("{:o}", mode),
                    "session file is accessible by other users"
                );
            }
        }
    }

    #[cfg(not(unix))]
    fn check_permissions(&self) {}
}

impl SecretStore for FileSecretStore {
    fn get(&self, key: &str) -> Result<Option<String>, SecretError> {
        Ok(self.read_all()?.remove(key))
    }
}
