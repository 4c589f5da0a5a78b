//! Property-based tests for the memoization contract and core types.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated access patterns and inputs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{json, Value};

use prior::core::types::{EntityName, Oid, RepoName};
use prior::dataset::{LazyRecordSequence, Record};
use prior::manifest::{RecordSource, SourceError};
use prior::PriorError;

/// Source whose records are distinct objects, counting every decode.
#[derive(Debug)]
struct CountingSource {
    calls: Vec<AtomicUsize>,
}

impl CountingSource {
    fn new(len: usize) -> Arc<Self> {
        Arc::new(Self {
            calls: (0..len).map(|_| AtomicUsize::new(0)).collect(),
        })
    }

    fn calls(&self, index: usize) -> usize {
        self.calls[index].load(Ordering::SeqCst)
    }
}

impl RecordSource for CountingSource {
    fn len(&self) -> usize {
        self.calls.len()
    }

    fn materialize(&self, index: usize) -> Result<Value, SourceError> {
        let n = self.calls[index].fetch_add(1, Ordering::SeqCst);
        // A fresh decode would differ from the first one.
        Ok(json!({ "index": index, "decode": n }))
    }
}

/// One step of an access pattern.
#[derive(Debug, Clone)]
enum Access {
    Get(usize),
    IterateAll,
    IteratePrefix(usize),
}

fn access(max_len: usize) -> impl Strategy<Value = Access> {
    prop_oneof![
        (0..max_len * 2).prop_map(Access::Get),
        Just(Access::IterateAll),
        (0..max_len + 1).prop_map(Access::IteratePrefix),
    ]
}

fn collect_all(seq: &LazyRecordSequence) -> Vec<Record> {
    seq.iter().map(|r| r.unwrap()).collect()
}

proptest! {
    /// Any mix of indexing and (partial) iteration decodes each record at
    /// most once and always observes the same value per index.
    #[test]
    fn every_record_decoded_at_most_once(
        len in 0usize..40,
        pattern in prop::collection::vec(access(40), 0..30),
    ) {
        let source = CountingSource::new(len);
        let seq = LazyRecordSequence::new("demo", "train", source.clone());
        let mut seen: Vec<Option<Record>> = vec![None; len];

        let mut observe = |i: usize, record: Record| {
            match &seen[i] {
                Some(previous) => assert!(Arc::ptr_eq(previous, &record)),
                None => seen[i] = Some(record),
            }
        };

        for step in pattern {
            match step {
                Access::Get(i) if i < len => observe(i, seq.get(i).unwrap()),
                Access::Get(i) => {
                    let before = seq.cached_count();
                    let is_out_of_range = matches!(seq.get(i), Err(PriorError::IndexOutOfRange { .. }));
                    prop_assert!(is_out_of_range);
                    prop_assert_eq!(seq.cached_count(), before);
                }
                Access::IterateAll => {
                    for (i, record) in seq.iter().enumerate() {
                        observe(i, record.unwrap());
                    }
                }
                Access::IteratePrefix(k) => {
                    for (i, record) in seq.iter().take(k).enumerate() {
                        observe(i, record.unwrap());
                    }
                }
            }
        }

        for i in 0..len {
            prop_assert!(source.calls(i) <= 1);
            prop_assert_eq!(seq.is_cached(i), source.calls(i) == 1);
        }
    }

    /// Restarting iteration after consuming k records yields the same full
    /// sequence as an uninterrupted pass.
    #[test]
    fn restart_after_partial_iteration(len in 0usize..50, k in 0usize..60) {
        let source = CountingSource::new(len);
        let seq = LazyRecordSequence::new("demo", "train", source.clone());

        let prefix: Vec<Record> = seq.iter().take(k).map(|r| r.unwrap()).collect();
        let full = collect_all(&seq);

        prop_assert_eq!(full.len(), len);
        prop_assert_eq!(prefix.len(), k.min(len));
        for (a, b) in prefix.iter().zip(&full) {
            prop_assert!(Arc::ptr_eq(a, b));
        }
        for (i, record) in full.iter().enumerate() {
            prop_assert_eq!(&record["index"], &json!(i));
            prop_assert_eq!(&record["decode"], &json!(0));
        }
    }

    /// `get(i)` agrees with position i of iteration, whichever ran first.
    #[test]
    fn get_agrees_with_iteration(len in 1usize..40, picks in prop::collection::vec(any::<prop::sample::Index>(), 1..10)) {
        let source = CountingSource::new(len);
        let seq = LazyRecordSequence::new("demo", "train", source.clone());

        let early: Vec<(usize, Record)> = picks
            .iter()
            .map(|p| {
                let i = p.index(len);
                (i, seq.get(i).unwrap())
            })
            .collect();
        let full = collect_all(&seq);

        for (i, record) in early {
            prop_assert!(Arc::ptr_eq(&record, &full[i]));
            prop_assert!(Arc::ptr_eq(&seq.get(i).unwrap(), &full[i]));
        }
    }

    /// A selection view maps positions through to the parent's records.
    #[test]
    fn select_view_shares_records(len in 1usize..30, picks in prop::collection::vec(any::<prop::sample::Index>(), 0..15)) {
        let source = CountingSource::new(len);
        let seq = LazyRecordSequence::new("demo", "train", source.clone());
        let indices: Vec<usize> = picks.iter().map(|p| p.index(len)).collect();

        let view = seq.select(&indices).unwrap();
        prop_assert_eq!(view.len(), indices.len());

        for (position, &i) in indices.iter().enumerate() {
            prop_assert!(Arc::ptr_eq(&view.get(position).unwrap(), &seq.get(i).unwrap()));
        }
        for i in 0..len {
            prop_assert!(source.calls(i) <= 1);
        }
    }
}

// =============================================================================
// Types
// =============================================================================

/// Strategy for generating valid name characters.
fn name_char() -> impl Strategy<Value = char> {
    prop_oneof![
        prop::char::range('a', 'z'),
        prop::char::range('A', 'Z'),
        prop::char::range('0', '9'),
        Just('-'),
        Just('_'),
        Just('.'),
    ]
}

/// Strategy for generating valid entity and repository names.
fn valid_name() -> impl Strategy<Value = String> {
    prop::collection::vec(name_char(), 1..40).prop_filter_map("must be a valid name", |chars| {
        let name: String = chars.into_iter().collect();
        if name.starts_with('.') || name.ends_with(".lock") || name.ends_with(".git") {
            None
        } else {
            Some(name)
        }
    })
}

proptest! {
    #[test]
    fn valid_names_accepted(name in valid_name()) {
        prop_assert!(EntityName::new(name.clone()).is_ok());
        let repo = RepoName::new(name.clone()).unwrap();
        prop_assert_eq!(repo.as_str(), name.as_str());
    }

    #[test]
    fn names_with_separators_rejected(a in valid_name(), b in valid_name()) {
        let joined = format!("{}/{}", a, b);
        prop_assert!(EntityName::new(joined.clone()).is_err());
        prop_assert!(RepoName::new(joined).is_err());
    }

    #[test]
    fn oid_normalizes_to_lowercase(hex in "[0-9a-fA-F]{40}") {
        let oid = Oid::new(hex.clone()).unwrap();
        prop_assert_eq!(oid.as_str(), hex.to_ascii_lowercase());
        prop_assert!(Oid::is_full_hex(oid.as_str()));
    }

    #[test]
    fn short_oids_rejected(hex in "[0-9a-f]{1,39}") {
        prop_assert!(Oid::new(hex).is_err());
    }
}
