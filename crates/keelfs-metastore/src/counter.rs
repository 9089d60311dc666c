//! Live-entry counters per (collection kind, partition).
//!
//! Size queries must not scan the backend, so the engine keeps a
//! concurrent map of live counts, settled on every committed write and
//! rebuilt from a full scan at open and after recovery.

use crate::codec::CollectionKind;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub(crate) struct PartitionCounters {
    counts: DashMap<(CollectionKind, String), u64>,
}

impl PartitionCounters {
    pub fn new() -> Self {
        Self {
            counts: DashMap::new(),
        }
    }

    pub fn increment(&self, kind: CollectionKind, partition: &str) {
        *self
            .counts
            .entry((kind, partition.to_string()))
            .or_insert(0) += 1;
    }

    pub fn decrement(&self, kind: CollectionKind, partition: &str) {
        if let Some(mut entry) = self.counts.get_mut(&(kind, partition.to_string())) {
            *entry = entry.saturating_sub(1);
        }
    }

    pub fn get(&self, kind: CollectionKind, partition: &str) -> u64 {
        self.counts
            .get(&(kind, partition.to_string()))
            .map_or(0, |entry| *entry)
    }

    /// Forget a partition's count entirely (after a clear).
    pub fn reset(&self, kind: CollectionKind, partition: &str) {
        self.counts.remove(&(kind, partition.to_string()));
    }

    /// Sum of live entries across all partitions of one kind.
    pub fn total(&self, kind: CollectionKind) -> u64 {
        self.counts
            .iter()
            .filter(|entry| entry.key().0 == kind)
            .map(|entry| *entry.value())
            .sum()
    }
}
