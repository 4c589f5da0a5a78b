//! manifest
//!
//! Reads a snapshot's manifest and builds one lazy sequence per split.
//!
//! # Architecture
//!
//! The manifest lives at a fixed path, [`MANIFEST_FILE`], at the snapshot
//! root. Loading is eager only where it has to be:
//!
//! - the manifest itself is parsed and validated up front
//! - each split's source file must exist and, after following symlinks,
//!   lie inside the snapshot
//! - a record count is established per split by counting the source; a
//!   count declared in the manifest must agree with it
//!
//! Records are never decoded here; that is left to
//! [`LazyRecordSequence`](crate::dataset::LazyRecordSequence).

pub mod schema;
pub mod source;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::cache::Snapshot;
use crate::dataset::{DatasetDict, LazyRecordSequence};
use crate::error::{PriorError, Result};

pub use schema::{Manifest, SourceSpec};
pub use source::{JsonLinesSource, ListingSource, RecordSource, SourceError};

/// Manifest file name at the snapshot root.
pub const MANIFEST_FILE: &str = "prior.toml";

/// Builds datasets from snapshot manifests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestLoader;

impl ManifestLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load every split of a ready snapshot.
    ///
    /// The dataset name defaults to the snapshot's repository name.
    pub fn load(&self, snapshot: &Snapshot) -> Result<DatasetDict> {
        self.load_dir(snapshot.path(), snapshot.repository.as_str())
    }

    /// Load every split described by the manifest under `root`.
    ///
    /// # Errors
    ///
    /// - [`PriorError::ManifestMissing`] if there is no manifest file
    /// - [`PriorError::ManifestMalformed`] if it does not parse, names a
    ///   missing or escaping source, or declares a wrong count
    pub fn load_dir(&self, root: &Path, default_name: &str) -> Result<DatasetDict> {
        let manifest_path = root.join(MANIFEST_FILE);
        let text = match fs::read_to_string(&manifest_path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(PriorError::ManifestMissing {
                    path: manifest_path,
                })
            }
            Err(e) => {
                return Err(PriorError::ManifestMalformed {
                    path: manifest_path,
                    message: e.to_string(),
                })
            }
        };

        let malformed = |message: String| PriorError::ManifestMalformed {
            path: manifest_path.clone(),
            message,
        };

        let manifest = Manifest::parse(&text).map_err(malformed)?;
        let root = fs::canonicalize(root).map_err(|e| malformed(e.to_string()))?;
        let dataset = manifest
            .dataset
            .clone()
            .unwrap_or_else(|| default_name.to_string());

        let mut splits = BTreeMap::new();
        for (name, spec) in &manifest.splits {
            let source = open_source(&root, spec)
                .map_err(|message| malformed(format!("split '{}': {}", name, message)))?;
            debug!(dataset = %dataset, split = %name, len = source.len(), "loaded split");
            splits.insert(
                name.clone(),
                LazyRecordSequence::new(dataset.clone(), name.clone(), source),
            );
        }

        Ok(DatasetDict::new(dataset, splits))
    }
}

/// Open the source a split names and check its declared count.
///
/// `root` must be canonical.
fn open_source(root: &Path, spec: &SourceSpec) -> std::result::Result<Arc<dyn RecordSource>, String> {
    let path = source::resolve_relative(root, spec.path())?;
    if !path.is_file() {
        return Err(format!("source '{}' does not exist", spec.path()));
    }
    let path = source::confine(root, &path)?;

    let source: Arc<dyn RecordSource> = match spec {
        SourceSpec::Jsonl { count, .. } => {
            Arc::new(JsonLinesSource::open(path, *count).map_err(|e| e.to_string())?)
        }
        SourceSpec::Listing { count, .. } => {
            let listing = ListingSource::open(root, &path).map_err(|e| e.to_string())?;
            if let Some(declared) = count {
                if *declared != listing.len() {
                    return Err(format!(
                        "declares {} records, listing has {}",
                        declared,
                        listing.len()
                    ));
                }
            }
            Arc::new(listing)
        }
    };
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn missing_manifest() {
        let temp = TempDir::new().unwrap();
        let err = ManifestLoader::new().load_dir(temp.path(), "demo").unwrap_err();
        assert!(matches!(err, PriorError::ManifestMissing { .. }));
    }

    #[test]
    fn malformed_toml() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), MANIFEST_FILE, "this is = = not toml");
        let err = ManifestLoader::new().load_dir(temp.path(), "demo").unwrap_err();
        assert!(matches!(err, PriorError::ManifestMalformed { .. }));
    }

    #[test]
    fn missing_source_is_malformed() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            MANIFEST_FILE,
            "[splits.train]\nkind = \"jsonl\"\npath = \"nope.jsonl\"\n",
        );
        let err = ManifestLoader::new().load_dir(temp.path(), "demo").unwrap_err();
        assert!(
            matches!(err, PriorError::ManifestMalformed { ref message, .. } if message.contains("train"))
        );
    }

    #[test]
    fn escaping_source_is_malformed() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            MANIFEST_FILE,
            "[splits.train]\nkind = \"jsonl\"\npath = \"../../etc/passwd\"\n",
        );
        let err = ManifestLoader::new().load_dir(temp.path(), "demo").unwrap_err();
        assert!(matches!(err, PriorError::ManifestMalformed { .. }));
    }

    #[test]
    fn huge_declared_count_is_malformed() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "t.jsonl", "{\"i\":0}\n");
        write(
            temp.path(),
            MANIFEST_FILE,
            "[splits.train]\nkind = \"jsonl\"\npath = \"t.jsonl\"\ncount = 1000000000000\n",
        );
        let err = ManifestLoader::new().load_dir(temp.path(), "demo").unwrap_err();
        assert!(matches!(err, PriorError::ManifestMalformed { .. }));
        assert!(err.to_string().contains("declares 1000000000000 records"));
    }

    #[cfg(unix)]
    #[test]
    fn source_behind_symlink_out_of_snapshot_is_malformed() {
        let outside = TempDir::new().unwrap();
        write(outside.path(), "train.jsonl", "{\"leaked\":true}\n");

        let temp = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), temp.path().join("data")).unwrap();
        write(
            temp.path(),
            MANIFEST_FILE,
            "[splits.train]\nkind = \"jsonl\"\npath = \"data/train.jsonl\"\n",
        );
        let err = ManifestLoader::new().load_dir(temp.path(), "demo").unwrap_err();
        assert!(matches!(err, PriorError::ManifestMalformed { .. }));
        assert!(err.to_string().contains("outside the snapshot"));
    }

    #[cfg(unix)]
    #[test]
    fn listing_entry_behind_symlink_is_record_malformed() {
        let outside = TempDir::new().unwrap();
        write(outside.path(), "secret.json", "{\"leaked\":true}");

        let temp = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), temp.path().join("data")).unwrap();
        write(temp.path(), "index.json", "[\"data/secret.json\"]");
        write(
            temp.path(),
            MANIFEST_FILE,
            "[splits.val]\nkind = \"listing\"\npath = \"index.json\"\n",
        );
        let dict = ManifestLoader::new().load_dir(temp.path(), "demo").unwrap();
        let err = dict.get("val").unwrap().get(0).unwrap_err();
        assert!(matches!(err, PriorError::RecordMalformed { index: 0, .. }));
    }

    #[test]
    fn listing_count_mismatch_is_malformed() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "val/0.json", "{}");
        write(temp.path(), "val/index.json", "[\"val/0.json\"]");
        write(
            temp.path(),
            MANIFEST_FILE,
            "[splits.val]\nkind = \"listing\"\npath = \"val/index.json\"\ncount = 2\n",
        );
        let err = ManifestLoader::new().load_dir(temp.path(), "demo").unwrap_err();
        assert!(matches!(err, PriorError::ManifestMalformed { .. }));
    }

    #[test]
    fn loads_splits_without_decoding() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "train.jsonl", "{\"i\":0}\n{\"i\":1}\n{\"i\":2}\n");
        write(temp.path(), "val/a.json", "{\"i\":\"a\"}");
        write(temp.path(), "val/index.json", "[\"val/a.json\"]");
        write(
            temp.path(),
            MANIFEST_FILE,
            r#"
[splits.train]
kind = "jsonl"
path = "train.jsonl"

[splits.val]
kind = "listing"
path = "val/index.json"
count = 1
"#,
        );

        let dict = ManifestLoader::new().load_dir(temp.path(), "demo").unwrap();
        assert_eq!(dict.dataset(), "demo");
        assert_eq!(dict.names(), vec!["train", "val"]);

        let train = dict.get("train").unwrap();
        assert_eq!(train.len(), 3);
        assert_eq!(train.cached_count(), 0);
        assert_eq!(dict.get("val").unwrap().get(0).unwrap()["i"], "a");
    }

    #[test]
    fn dataset_name_from_manifest() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "t.jsonl", "{}\n");
        write(
            temp.path(),
            MANIFEST_FILE,
            "dataset = \"houses\"\n[splits.train]\nkind = \"jsonl\"\npath = \"t.jsonl\"\n",
        );
        let dict = ManifestLoader::new().load_dir(temp.path(), "demo").unwrap();
        assert_eq!(dict.dataset(), "houses");
        assert_eq!(dict.get("train").unwrap().dataset(), "houses");
    }
}
