//! dataset::dict
//!
//! Named splits of one dataset.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

use super::LazyRecordSequence;
use crate::error::{PriorError, Result};

/// The splits of a dataset, keyed and iterated by name.
#[derive(Debug, Clone)]
pub struct DatasetDict {
    dataset: String,
    splits: BTreeMap<String, LazyRecordSequence>,
}

impl DatasetDict {
    pub fn new(dataset: impl Into<String>, splits: BTreeMap<String, LazyRecordSequence>) -> Self {
        Self {
            dataset: dataset.into(),
            splits,
        }
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// The split named `name`.
    ///
    /// # Errors
    ///
    /// [`PriorError::SplitNotFound`], listing the splits that do exist.
    pub fn get(&self, name: &str) -> Result<&LazyRecordSequence> {
        self.splits
            .get(name)
            .ok_or_else(|| PriorError::SplitNotFound {
                name: name.to_string(),
                available: self.splits.keys().cloned().collect(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.splits.contains_key(name)
    }

    /// Split names in order.
    pub fn names(&self) -> Vec<&str> {
        self.splits.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.splits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, LazyRecordSequence> {
        self.splits.iter()
    }

    pub fn into_inner(self) -> BTreeMap<String, LazyRecordSequence> {
        self.splits
    }
}

impl<'a> IntoIterator for &'a DatasetDict {
    type Item = (&'a String, &'a LazyRecordSequence);
    type IntoIter = btree_map::Iter<'a, String, LazyRecordSequence>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for DatasetDict {
    type Item = (String, LazyRecordSequence);
    type IntoIter = btree_map::IntoIter<String, LazyRecordSequence>;

    fn into_iter(self) -> Self::IntoIter {
        self.splits.into_iter()
    }
}

impl fmt::Display for DatasetDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DatasetDict(")?;
        let last = self.splits.len().saturating_sub(1);
        for (i, (name, split)) in self.splits.iter().enumerate() {
            let nested = split.to_string().replace('\n', "\n    ");
            let sep = if i == last { "" } else { "," };
            writeln!(f, "    {}={}{}", name, nested, sep)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{RecordSource, SourceError};
    use serde_json::{json, Value};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Fixed(usize);

    impl RecordSource for Fixed {
        fn len(&self) -> usize {
            self.0
        }

        fn materialize(&self, index: usize) -> std::result::Result<Value, SourceError> {
            Ok(json!(index))
        }
    }

    fn dict() -> DatasetDict {
        let mut splits = BTreeMap::new();
        for (name, len) in [("train", 100), ("val", 20)] {
            splits.insert(
                name.to_string(),
                LazyRecordSequence::new("demo-data", name, Arc::new(Fixed(len))),
            );
        }
        DatasetDict::new("demo-data", splits)
    }

    #[test]
    fn get_known_and_unknown() {
        let dict = dict();
        assert_eq!(dict.get("train").unwrap().len(), 100);
        assert_eq!(dict.get("val").unwrap().len(), 20);

        let err = dict.get("test").unwrap_err();
        assert!(matches!(
            err,
            PriorError::SplitNotFound { ref available, .. } if available == &["train", "val"]
        ));
    }

    #[test]
    fn iterates_in_name_order() {
        let dict = dict();
        let names: Vec<&String> = dict.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["train", "val"]);
        assert!(dict.contains("val"));
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn display_nests_splits() {
        let text = dict().to_string();
        assert!(text.starts_with("DatasetDict(\n    train=Dataset(\n"));
        assert!(text.contains("        size=100,"));
        assert!(text.contains("    val=Dataset("));
        assert!(text.ends_with("    )\n)"));
    }
}
