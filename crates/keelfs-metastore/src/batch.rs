//! Atomic transaction batches.
//!
//! A [`Transaction`] stages hash and sorted mutations without making them
//! visible, then commits them as one backend batch. Dropping the handle
//! (or calling [`Transaction::rollback`]) discards everything staged.

use crate::backend::{StoreBackend, WriteBatch};
use crate::codec::{self, CollectionKind};
use crate::engine::KvStorage;
use keelfs_common::Result;

/// Staged group of mutations against one [`KvStorage`].
///
/// Handles are independent of each other but single-writer: feed one
/// handle from one thread. Staging never touches the engine; the
/// closed-engine and quota checks happen at [`Transaction::commit`], and
/// on any failure none of the staged mutations apply.
#[must_use = "staged mutations are discarded unless committed"]
pub struct Transaction<'a, S: StoreBackend> {
    storage: &'a KvStorage<S>,
    batch: WriteBatch,
}

impl<'a, S: StoreBackend> Transaction<'a, S> {
    pub(crate) fn new(storage: &'a KvStorage<S>) -> Self {
        Self {
            storage,
            batch: WriteBatch::new(),
        }
    }

    /// Stage an upsert into a partition's hash collection.
    pub fn hset(&mut self, partition: &str, field: &[u8], value: &[u8]) {
        self.batch.put(
            codec::encode_key(partition, CollectionKind::Hash, field),
            value.to_vec(),
        );
    }

    /// Stage a delete from a partition's hash collection.
    pub fn hdel(&mut self, partition: &str, field: &[u8]) {
        self.batch
            .delete(codec::encode_key(partition, CollectionKind::Hash, field));
    }

    /// Stage an upsert into a partition's sorted collection.
    pub fn sset(&mut self, partition: &str, member: &[u8], value: &[u8]) {
        self.batch.put(
            codec::encode_key(partition, CollectionKind::Sorted, member),
            value.to_vec(),
        );
    }

    /// Stage a delete from a partition's sorted collection.
    pub fn sdel(&mut self, partition: &str, member: &[u8]) {
        self.batch
            .delete(codec::encode_key(partition, CollectionKind::Sorted, member));
    }

    /// Number of staged mutations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Apply every staged mutation as one atomic write. All of them become
    /// visible together, or none do.
    pub fn commit(self) -> Result<()> {
        self.storage.commit_batch(self.batch)
    }

    /// Discard the staged mutations. Equivalent to dropping the handle.
    pub fn rollback(self) {}
}
