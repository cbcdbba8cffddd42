//! Ordered, deduplicating compaction index.

use crate::record::Record;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::btree_map::{BTreeMap, Entry};

/// Ordering key for compaction: known timestamps ascending, unknown last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UpdatedAtKey(Option<DateTime<Utc>>);

impl Ord for UpdatedAtKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0, other.0) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(&b),
        }
    }
}

impl PartialOrd for UpdatedAtKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An ordered map of records keyed by `updated_at`, ascending, with
/// unknown-timestamp records sorting after all known-timestamp ones.
///
/// The insert policy is first-wins: a record whose key is already present
/// is dropped. This collapses exact-timestamp duplicates down to one
/// surviving record, which also means two genuinely distinct records that
/// share an `updated_at` collapse to whichever arrived first.
#[derive(Debug, Default)]
pub struct CompactionIndex {
    entries: BTreeMap<UpdatedAtKey, Record>,
}

impl CompactionIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record unless one with an identical `updated_at` is
    /// already present. Returns whether the record was kept.
    pub fn insert(&mut self, record: Record) -> bool {
        match self.entries.entry(UpdatedAtKey(record.updated_at())) {
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Number of surviving records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no records.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates surviving records in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.entries.values()
    }
}
