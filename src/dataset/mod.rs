//! dataset
//!
//! Memoizing, lazily materialized views over a split's records.
//!
//! # Memoization
//!
//! A [`LazyRecordSequence`] keeps a sparse map from record index to cache
//! slot. A slot is created the first time its index is touched, so memory
//! grows with the records actually read, not with the split's length.
//! Indexed access ([`LazyRecordSequence::get`]) and iteration
//! ([`LazyRecordSequence::iter`]) both go through the same slot, so:
//!
//! - a record is decoded at most once, whichever path touches it first
//! - once a slot is filled its value never changes; every later access,
//!   by either path, returns the same `Arc`
//! - iteration restarted after partial consumption starts again at index 0
//!   and reuses every slot already filled
//!
//! Slots are `OnceCell`s, so concurrent readers of one record block on a
//! single decode instead of racing. The map lock is only held to find or
//! insert a slot, never while decoding.
//!
//! Clones and [`select`](LazyRecordSequence::select) views share the cache.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use prior::dataset::LazyRecordSequence;
//! use prior::manifest::{RecordSource, SourceError};
//! use serde_json::{json, Value};
//!
//! #[derive(Debug)]
//! struct Squares;
//!
//! impl RecordSource for Squares {
//!     fn len(&self) -> usize { 4 }
//!     fn materialize(&self, i: usize) -> Result<Value, SourceError> {
//!         Ok(json!(i * i))
//!     }
//! }
//!
//! let seq = LazyRecordSequence::new("numbers", "train", Arc::new(Squares));
//! assert_eq!(*seq.get(3).unwrap(), json!(9));
//! let all: Vec<_> = seq.iter().collect::<Result<_, _>>().unwrap();
//! assert_eq!(all.len(), 4);
//! assert!(Arc::ptr_eq(&all[3], &seq.get(3).unwrap()));
//! ```

mod dict;

pub use dict::DatasetDict;

use std::collections::HashMap;
use std::fmt;
use std::iter::FusedIterator;
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::OnceCell;
use serde_json::Value;

use crate::error::{PriorError, Result};
use crate::manifest::RecordSource;

/// A materialized record. Shared between the cache and every caller.
pub type Record = Arc<Value>;

type Slot = Arc<OnceCell<Record>>;

/// Lazy, memoizing, indexable and restartable view over records.
#[derive(Clone)]
pub struct LazyRecordSequence {
    dataset: Arc<str>,
    split: Arc<str>,
    source: Arc<dyn RecordSource>,
    /// Length of the underlying source.
    source_len: usize,
    /// Slots for touched source positions, shared by clones and views.
    cache: Arc<Mutex<HashMap<usize, Slot>>>,
    /// Source positions visible through this view; `None` means all.
    indices: Option<Arc<[usize]>>,
}

impl LazyRecordSequence {
    pub fn new(
        dataset: impl Into<String>,
        split: impl Into<String>,
        source: Arc<dyn RecordSource>,
    ) -> Self {
        let (dataset, split): (String, String) = (dataset.into(), split.into());
        Self {
            dataset: Arc::from(dataset),
            split: Arc::from(split),
            source_len: source.len(),
            source,
            cache: Arc::default(),
            indices: None,
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<usize, Slot>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn slot(&self, position: usize) -> Slot {
        Arc::clone(self.slots().entry(position).or_default())
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn split(&self) -> &str {
        &self.split
    }

    /// Number of records. Never decodes anything.
    pub fn len(&self) -> usize {
        match &self.indices {
            Some(indices) => indices.len(),
            None => self.source_len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn source_index(&self, index: usize) -> Option<usize> {
        match &self.indices {
            Some(indices) => indices.get(index).copied(),
            None => (index < self.source_len).then_some(index),
        }
    }

    fn out_of_range(&self, index: usize) -> PriorError {
        PriorError::IndexOutOfRange {
            index,
            len: self.len(),
            split: self.split.to_string(),
        }
    }

    /// The record at `index`, decoding it on first access.
    ///
    /// # Errors
    ///
    /// - [`PriorError::IndexOutOfRange`] if `index >= len()`; the cache is
    ///   left untouched
    /// - [`PriorError::RecordMalformed`] if decoding fails; the slot stays
    ///   empty so a later call tries again
    pub fn get(&self, index: usize) -> Result<Record> {
        let position = self
            .source_index(index)
            .ok_or_else(|| self.out_of_range(index))?;

        self.slot(position)
            .get_or_try_init(|| self.source.materialize(position).map(Arc::new))
            .cloned()
            .map_err(|e| PriorError::RecordMalformed {
                index,
                split: self.split.to_string(),
                message: e.to_string(),
            })
    }

    /// Iterate records in index order, materializing through the same cache
    /// as [`get`](Self::get). Each call starts a fresh pass at index 0.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            sequence: self,
            next: 0,
        }
    }

    /// Whether the record at `index` has been materialized.
    pub fn is_cached(&self, index: usize) -> bool {
        self.source_index(index).is_some_and(|position| {
            self.slots()
                .get(&position)
                .is_some_and(|slot| slot.get().is_some())
        })
    }

    /// Number of records in this view already materialized.
    pub fn cached_count(&self) -> usize {
        let slots = self.slots();
        let filled = |position: &usize| slots.get(position).is_some_and(|s| s.get().is_some());
        match &self.indices {
            Some(indices) => indices.iter().filter(|p| filled(p)).count(),
            None => slots.keys().filter(|p| filled(p)).count(),
        }
    }

    /// A view over the given positions, in the given order.
    ///
    /// The view shares this sequence's cache: records materialized through
    /// either are materialized for both.
    ///
    /// # Errors
    ///
    /// [`PriorError::IndexOutOfRange`] for the first position `>= len()`.
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        let mapped = indices
            .iter()
            .map(|&i| self.source_index(i).ok_or_else(|| self.out_of_range(i)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            dataset: Arc::clone(&self.dataset),
            split: Arc::clone(&self.split),
            source: Arc::clone(&self.source),
            source_len: self.source_len,
            cache: Arc::clone(&self.cache),
            indices: Some(Arc::from(mapped)),
        })
    }
}

impl fmt::Debug for LazyRecordSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyRecordSequence")
            .field("dataset", &self.dataset)
            .field("split", &self.split)
            .field("len", &self.len())
            .field("cached", &self.cached_count())
            .finish()
    }
}

impl fmt::Display for LazyRecordSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Dataset(\n    dataset={},\n    size={},\n    split={}\n)",
            self.dataset,
            self.len(),
            self.split
        )
    }
}

/// Iterator over a [`LazyRecordSequence`].
///
/// Yields `Err` for a record that fails to decode and moves on to the next.
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    sequence: &'a LazyRecordSequence,
    next: usize,
}

impl Iterator for Iter<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.sequence.len() {
            return None;
        }
        let item = self.sequence.get(self.next);
        self.next += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.sequence.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl FusedIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a LazyRecordSequence {
    type Item = Result<Record>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
