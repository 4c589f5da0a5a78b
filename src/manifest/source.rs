//! manifest::source
//!
//! Record sources: where a split's records come from and how one record is
//! decoded.
//!
//! A source knows its length up front. Decoding a record is the expensive
//! step and is left to [`RecordSource::materialize`], which the lazy
//! sequence calls at most once per index.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use once_cell::sync::OnceCell;
use serde_json::Value;
use thiserror::Error;

/// Errors raised while reading or decoding records.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },
}

/// A finite, indexable collection of undecoded records.
pub trait RecordSource: Send + Sync + fmt::Debug {
    /// Number of records. Known without decoding any of them.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode record `index`. Callers guarantee `index < len()`.
    fn materialize(&self, index: usize) -> Result<Value, SourceError>;
}

/// Join a manifest-relative path onto the snapshot root.
///
/// Rejects absolute paths and anything climbing out with `..`. This is a
/// purely lexical check; symlinks are handled by [`confine`].
pub fn resolve_relative(root: &Path, relative: &str) -> Result<PathBuf, String> {
    let path = Path::new(relative);
    if relative.trim().is_empty() {
        return Err("path cannot be empty".into());
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(format!("path '{}' escapes the snapshot", relative));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!("path '{}' must be relative", relative));
            }
        }
    }
    Ok(root.join(path))
}

/// Resolve every symlink in `path` and require the target to lie under
/// `root`, which must already be canonical.
///
/// Returns the canonical path.
pub fn confine(root: &Path, path: &Path) -> Result<PathBuf, String> {
    let resolved = fs::canonicalize(path)
        .map_err(|e| format!("cannot resolve '{}': {}", path.display(), e))?;
    if !resolved.starts_with(root) {
        return Err(format!(
            "'{}' resolves outside the snapshot",
            path.display()
        ));
    }
    Ok(resolved)
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Open a file, transparently decompressing `.gz`.
fn open_reader(path: &Path) -> Result<Box<dyn Read>, SourceError> {
    let file = File::open(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if is_gzip(path) {
        Ok(Box::new(GzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

fn read_to_string(path: &Path) -> Result<String, SourceError> {
    let mut text = String::new();
    open_reader(path)?
        .read_to_string(&mut text)
        .map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(text)
}

/// One JSON document per non-blank line.
///
/// Opening streams through the file once to count records. The lines are
/// kept in memory from the first record access on, and each line is parsed
/// only when its record is materialized.
pub struct JsonLinesSource {
    path: PathBuf,
    len: usize,
    lines: OnceCell<Vec<String>>,
}

impl JsonLinesSource {
    /// Open a JSON-lines file and count its records.
    ///
    /// A `declared` count must match the file.
    pub fn open(path: PathBuf, declared: Option<usize>) -> Result<Self, SourceError> {
        let len = count_lines(&path)?;
        if let Some(declared) = declared {
            if declared != len {
                return Err(SourceError::Invalid {
                    path,
                    message: format!("manifest declares {} records, file has {}", declared, len),
                });
            }
        }
        Ok(Self {
            path,
            len,
            lines: OnceCell::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lines(&self) -> Result<&[String], SourceError> {
        let lines = self.lines.get_or_try_init(|| read_lines(&self.path))?;
        if lines.len() != self.len {
            return Err(SourceError::Invalid {
                path: self.path.clone(),
                message: format!(
                    "file changed since it was opened ({} records, now {})",
                    self.len,
                    lines.len()
                ),
            });
        }
        Ok(lines)
    }
}

fn count_lines(path: &Path) -> Result<usize, SourceError> {
    let mut reader = BufReader::new(open_reader(path)?);
    let mut line = String::new();
    let mut count = 0;
    loop {
        line.clear();
        let read = reader.read_line(&mut line).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if read == 0 {
            return Ok(count);
        }
        if !line.trim().is_empty() {
            count += 1;
        }
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>, SourceError> {
    let reader = BufReader::new(open_reader(path)?);
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

impl fmt::Debug for JsonLinesSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonLinesSource")
            .field("path", &self.path)
            .field("len", &self.len)
            .field("loaded", &self.lines.get().is_some())
            .finish()
    }
}

impl RecordSource for JsonLinesSource {
    fn len(&self) -> usize {
        self.len
    }

    fn materialize(&self, index: usize) -> Result<Value, SourceError> {
        let line = &self.lines()?[index];
        serde_json::from_str(line).map_err(|source| SourceError::Json {
            path: self.path.clone(),
            source,
        })
    }
}

/// A JSON array of snapshot-relative file paths; each record is the parsed
/// content of one referenced file.
///
/// Entries are checked lexically at open. Symlinks are resolved when a
/// record is read, and an entry whose target leaves the snapshot fails
/// that record.
#[derive(Debug)]
pub struct ListingSource {
    root: PathBuf,
    entries: Vec<PathBuf>,
}

impl ListingSource {
    /// Read the listing at `path`. Entries are resolved against `root`.
    pub fn open(root: &Path, path: &Path) -> Result<Self, SourceError> {
        let root = fs::canonicalize(root).map_err(|source| SourceError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let text = read_to_string(path)?;
        let raw: Vec<String> = serde_json::from_str(&text).map_err(|source| SourceError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        let entries = raw
            .iter()
            .map(|entry| resolve_relative(&root, entry))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|message| SourceError::Invalid {
                path: path.to_path_buf(),
                message,
            })?;

        Ok(Self { root, entries })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl RecordSource for ListingSource {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn materialize(&self, index: usize) -> Result<Value, SourceError> {
        let entry = &self.entries[index];
        let path = confine(&self.root, entry).map_err(|message| SourceError::Invalid {
            path: entry.clone(),
            message,
        })?;
        let text = read_to_string(&path)?;
        serde_json::from_str(&text).map_err(|source| SourceError::Json { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn relative_paths() {
        let root = Path::new("/snap");
        assert_eq!(
            resolve_relative(root, "data/train.jsonl").unwrap(),
            PathBuf::from("/snap/data/train.jsonl")
        );
        assert!(resolve_relative(root, "../outside").is_err());
        assert!(resolve_relative(root, "data/../../x").is_err());
        assert!(resolve_relative(root, "/etc/passwd").is_err());
        assert!(resolve_relative(root, "").is_err());
    }

    #[test]
    fn jsonl_counts_when_undeclared() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("train.jsonl");
        fs::write(&path, "{\"a\":1}\n\n{\"a\":2}\n").unwrap();

        let source = JsonLinesSource::open(path, None).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.materialize(1).unwrap()["a"], 2);
    }

    #[test]
    fn jsonl_lines_load_on_first_access() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("train.jsonl");
        fs::write(&path, "{\"a\":1}\n").unwrap();

        let source = JsonLinesSource::open(path, Some(1)).unwrap();
        assert!(source.lines.get().is_none());
        assert_eq!(source.materialize(0).unwrap()["a"], 1);
        assert!(source.lines.get().is_some());
    }

    #[test]
    fn jsonl_declared_count_mismatch() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("train.jsonl");
        fs::write(&path, "{}\n{}\n").unwrap();

        let err = JsonLinesSource::open(path, Some(3)).unwrap_err();
        assert!(matches!(err, SourceError::Invalid { .. }));
        assert!(err.to_string().contains("declares 3 records, file has 2"));
    }

    #[test]
    fn jsonl_huge_declared_count_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("train.jsonl");
        fs::write(&path, "{}\n").unwrap();

        assert!(matches!(
            JsonLinesSource::open(path, Some(1_000_000_000_000)),
            Err(SourceError::Invalid { .. })
        ));
    }

    #[test]
    fn jsonl_gzip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("train.jsonl.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"{\"x\":\"a\"}\n{\"x\":\"b\"}\n").unwrap();
        fs::write(&path, encoder.finish().unwrap()).unwrap();

        let source = JsonLinesSource::open(path, None).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.materialize(0).unwrap()["x"], "a");
    }

    #[test]
    fn jsonl_bad_line_fails_only_that_record() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("train.jsonl");
        fs::write(&path, "{\"ok\":true}\nnot json\n").unwrap();

        let source = JsonLinesSource::open(path, None).unwrap();
        assert!(source.materialize(0).is_ok());
        assert!(matches!(
            source.materialize(1),
            Err(SourceError::Json { .. })
        ));
    }

    #[test]
    fn listing_reads_referenced_files() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("val")).unwrap();
        fs::write(temp.path().join("val/0.json"), "{\"id\":0}").unwrap();
        fs::write(temp.path().join("val/1.json"), "{\"id\":1}").unwrap();
        let index = temp.path().join("val/index.json");
        fs::write(&index, "[\"val/0.json\", \"val/1.json\"]").unwrap();

        let source = ListingSource::open(temp.path(), &index).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.materialize(1).unwrap()["id"], 1);
    }

    #[cfg(unix)]
    #[test]
    fn listing_entry_through_symlink_out_of_root_fails() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.json"), "{\"leaked\":true}").unwrap();

        let snapshot = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), snapshot.path().join("data")).unwrap();
        fs::write(snapshot.path().join("inside.json"), "{\"ok\":true}").unwrap();
        let index = snapshot.path().join("index.json");
        fs::write(&index, "[\"data/secret.json\", \"inside.json\"]").unwrap();

        let source = ListingSource::open(snapshot.path(), &index).unwrap();
        let err = source.materialize(0).unwrap_err();
        assert!(matches!(err, SourceError::Invalid { .. }));
        assert!(err.to_string().contains("outside the snapshot"));
        assert_eq!(source.materialize(1).unwrap()["ok"], true);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_within_root_is_allowed() {
        let snapshot = TempDir::new().unwrap();
        let root = fs::canonicalize(snapshot.path()).unwrap();
        fs::create_dir_all(root.join("real")).unwrap();
        fs::write(root.join("real/a.json"), "{}").unwrap();
        std::os::unix::fs::symlink(root.join("real"), root.join("alias")).unwrap();

        let resolved = confine(&root, &root.join("alias/a.json")).unwrap();
        assert_eq!(resolved, root.join("real/a.json"));
    }

    #[test]
    fn listing_rejects_escaping_entries() {
        let temp = TempDir::new().unwrap();
        let index = temp.path().join("index.json");
        fs::write(&index, "[\"../secret.json\"]").unwrap();
        assert!(matches!(
            ListingSource::open(temp.path(), &index),
            Err(SourceError::Invalid { .. })
        ));
    }
}
