//! manifest::schema
//!
//! Manifest file schema.
//!
//! # Example
//!
//! ```toml
//! dataset = "demo-data"
//!
//! [splits.train]
//! kind = "jsonl"
//! path = "data/train.jsonl.gz"
//! count = 100
//!
//! [splits.val]
//! kind = "listing"
//! path = "val/index.json"
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Parsed `prior.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Dataset name. Defaults to the repository name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,

    /// Named record collections.
    #[serde(default)]
    pub splits: BTreeMap<String, SourceSpec>,
}

/// Where one split's records come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum SourceSpec {
    /// One JSON document per line; `.gz` files are decompressed.
    Jsonl {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<usize>,
    },
    /// A JSON array of file paths, one record per referenced file.
    Listing {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<usize>,
    },
}

impl SourceSpec {
    pub fn path(&self) -> &str {
        match self {
            SourceSpec::Jsonl { path, .. } | SourceSpec::Listing { path, .. } => path,
        }
    }

    /// Record count declared in the manifest, if any.
    pub fn count(&self) -> Option<usize> {
        match self {
            SourceSpec::Jsonl { count, .. } | SourceSpec::Listing { count, .. } => *count,
        }
    }
}

impl Manifest {
    /// Parse manifest text.
    pub fn parse(text: &str) -> Result<Self, String> {
        let manifest: Manifest = toml::from_str(text).map_err(|e| e.to_string())?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Structural checks that need no filesystem access.
    pub fn validate(&self) -> Result<(), String> {
        if self.splits.is_empty() {
            return Err("manifest declares no splits".into());
        }
        if let Some(dataset) = &self.dataset {
            if dataset.trim().is_empty() {
                return Err("dataset name cannot be empty".into());
            }
        }
        for (name, spec) in &self.splits {
            if name.trim().is_empty() || name.chars().any(char::is_whitespace) {
                return Err(format!("invalid split name '{}'", name));
            }
            if spec.path().trim().is_empty() {
                return Err(format!("split '{}' has an empty path", name));
            }
        }
        Ok(())
    }
}
