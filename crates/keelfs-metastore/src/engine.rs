//! Storage engine facade
//!
//! [`KvStorage`] layers hash-table and sorted-set collections, partitioned
//! by namespace, over a [`StoreBackend`], and owns everything around the
//! backend: lifecycle, per-partition entry counters, quota admission, and
//! checkpoint/recovery.

use crate::backend::{BackendOptions, MemoryStore, RedbStore, StoreBackend, WriteBatch, WriteOp};
use crate::batch::Transaction;
use crate::checkpoint;
use crate::codec::{self, CollectionKind};
use crate::counter::PartitionCounters;
use crate::iterator::EntryIter;
use crate::quota::QuotaTracker;
use keelfs_common::{Error, LocalFileSystem, Result};
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Storage engine configuration.
///
/// There is no `Default`: every deployment states its data directory,
/// both quota ceilings and the compression choice explicitly.
#[derive(Clone)]
pub struct StorageOptions {
    /// Directory holding the backend's data files.
    pub data_dir: PathBuf,
    /// Ceiling on live bytes accounted against memory.
    pub max_memory_quota_bytes: u64,
    /// Ceiling on live bytes accounted against disk.
    pub max_disk_quota_bytes: u64,
    /// Ask the backend to compress its on-disk representation.
    pub compression: bool,
    /// File-system capability used for directory preparation and
    /// checkpoint transport.
    pub fs: Arc<dyn LocalFileSystem>,
}

impl fmt::Debug for StorageOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageOptions")
            .field("data_dir", &self.data_dir)
            .field("max_memory_quota_bytes", &self.max_memory_quota_bytes)
            .field("max_disk_quota_bytes", &self.max_disk_quota_bytes)
            .field("compression", &self.compression)
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of the engine, for logs and monitoring endpoints.
#[derive(Debug, Clone)]
pub struct StorageStatistics {
    /// Backend identifier, `"redb"` or `"memory"`.
    pub backend: &'static str,
    /// Live bytes currently accounted against the quotas.
    pub used_bytes: u64,
    /// Configured memory ceiling.
    pub max_memory_quota_bytes: u64,
    /// Configured disk ceiling.
    pub max_disk_quota_bytes: u64,
    /// Entries across all hash collections.
    pub hash_entries: u64,
    /// Entries across all sorted collections.
    pub sorted_entries: u64,
}

/// State that only exists while the engine is open.
struct Inner<S> {
    backend: S,
    counters: PartitionCounters,
    quota: QuotaTracker,
}

enum State<S> {
    Closed,
    Open(Inner<S>),
}

/// Metadata storage engine over a pluggable ordered KV backend.
///
/// Each partition owns two collections: a hash table keyed by field and a
/// sorted set keyed by member, both mapping to opaque byte values. All
/// operations are safe to call from multiple threads; lifecycle changes
/// (open, close, recover) serialize against in-flight operations.
pub struct KvStorage<S: StoreBackend> {
    options: StorageOptions,
    state: RwLock<State<S>>,
    /// Whether the stale-directory check has run. Only the first open of an
    /// instance wipes a pre-existing data directory; re-opens, including
    /// the one inside recovery, must keep the files they find.
    prepared: AtomicBool,
}

/// Engine backed by the persistent redb store.
pub type RedbStorage = KvStorage<RedbStore>;
/// Engine backed by the volatile in-memory store.
pub type MemoryStorage = KvStorage<MemoryStore>;

impl<S: StoreBackend> KvStorage<S> {
    /// Create an engine in the closed state. Call [`open`](Self::open)
    /// before issuing operations.
    #[must_use]
    pub fn new(options: StorageOptions) -> Self {
        Self {
            options,
            state: RwLock::new(State::Closed),
            prepared: AtomicBool::new(false),
        }
    }

    /// The configuration this engine was built with.
    #[must_use]
    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    /// Whether the engine currently accepts operations.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(*self.state.read(), State::Open(_))
    }

    fn inner(&self) -> Result<MappedRwLockReadGuard<'_, Inner<S>>> {
        RwLockReadGuard::try_map(self.state.read(), |state| match state {
            State::Open(inner) => Some(inner),
            State::Closed => None,
        })
        .map_err(|_| Error::StorageClosed)
    }

    /// Open the engine, preparing the data directory and loading whatever
    /// the backend finds there. Opening an already open engine is a no-op.
    ///
    /// The first open of an instance treats an existing data directory as
    /// stale state from a previous process and wipes it.
    pub fn open(&self) -> Result<()> {
        let mut state = self.state.write();
        if let State::Open(_) = *state {
            debug!("storage already open");
            return Ok(());
        }

        let inner = self.open_backend()?;
        info!(
            "Opened {} storage at {:?} ({} hash / {} sorted entries, {} bytes live)",
            inner.backend.name(),
            self.options.data_dir,
            inner.counters.total(CollectionKind::Hash),
            inner.counters.total(CollectionKind::Sorted),
            inner.quota.used(),
        );
        *state = State::Open(inner);
        Ok(())
    }

    fn open_backend(&self) -> Result<Inner<S>> {
        let dir = &self.options.data_dir;
        if !self.prepared.load(Ordering::Relaxed) {
            if self.options.fs.dir_exists(dir) {
                warn!("Found stale data directory {:?}, clearing it", dir);
                self.options.fs.remove_all(dir)?;
            }
            self.prepared.store(true, Ordering::Relaxed);
        }
        self.options.fs.create_dir_all(dir)?;

        let backend = S::open(
            dir,
            &BackendOptions {
                compression: self.options.compression,
            },
        )?;
        let (counters, used) = Self::census(&backend)?;
        let quota = QuotaTracker::new(
            self.options.max_memory_quota_bytes,
            self.options.max_disk_quota_bytes,
            used,
        );
        Ok(Inner {
            backend,
            counters,
            quota,
        })
    }

    /// Walk the keyspace once to rebuild entry counters and live-byte
    /// usage after an open or a recovery.
    fn census(backend: &S) -> Result<(PartitionCounters, u64)> {
        let counters = PartitionCounters::new();
        let mut used = 0u64;
        for (key, value) in backend.scan_all()? {
            let (partition, kind, _) = codec::decode_key(&key)?;
            counters.increment(kind, &partition);
            used += (key.len() + value.len()) as u64;
        }
        Ok((counters, used))
    }

    /// Flush and shut the engine down. Closing an already closed engine is
    /// a no-op; operations issued afterwards fail with
    /// [`Error::StorageClosed`].
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.write();
        match std::mem::replace(&mut *state, State::Closed) {
            State::Closed => Ok(()),
            State::Open(inner) => {
                inner.backend.flush()?;
                info!(
                    "Closed {} storage at {:?}",
                    inner.backend.name(),
                    self.options.data_dir
                );
                Ok(())
            }
        }
    }

    /// Insert or overwrite `field` in the partition's hash table.
    pub fn hset(&self, partition: &str, field: &[u8], value: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(
            codec::encode_key(partition, CollectionKind::Hash, field),
            value.to_vec(),
        );
        self.commit_batch(batch)
    }

    /// Look up `field` in the partition's hash table.
    pub fn hget(&self, partition: &str, field: &[u8]) -> Result<Vec<u8>> {
        let inner = self.inner()?;
        inner
            .backend
            .get(&codec::encode_key(partition, CollectionKind::Hash, field))?
            .ok_or(Error::NotFound)
    }

    /// Remove `field` from the partition's hash table. Removing an absent
    /// field succeeds.
    pub fn hdel(&self, partition: &str, field: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(codec::encode_key(partition, CollectionKind::Hash, field));
        self.commit_batch(batch)
    }

    /// Every entry of the partition's hash table.
    ///
    /// Failures surface through [`EntryIter::status`], not here: callers
    /// drain the iterator, then check that it ended cleanly.
    pub fn hgetall(&self, partition: &str) -> EntryIter {
        self.collect(codec::collection_range(partition, CollectionKind::Hash))
    }

    /// Number of entries in the partition's hash table.
    ///
    /// Unlike the other accessors this does not fail on a closed engine:
    /// it reports 0, and callers that need the distinction check
    /// [`is_open`](Self::is_open) first.
    #[must_use]
    pub fn hsize(&self, partition: &str) -> u64 {
        match self.inner() {
            Ok(inner) => inner.counters.get(CollectionKind::Hash, partition),
            Err(_) => 0,
        }
    }

    /// Drop the partition's entire hash table.
    pub fn hclear(&self, partition: &str) -> Result<()> {
        self.clear(partition, CollectionKind::Hash)
    }

    /// Insert or overwrite `member` in the partition's sorted set.
    pub fn sset(&self, partition: &str, member: &[u8], value: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(
            codec::encode_key(partition, CollectionKind::Sorted, member),
            value.to_vec(),
        );
        self.commit_batch(batch)
    }

    /// Look up `member` in the partition's sorted set.
    pub fn sget(&self, partition: &str, member: &[u8]) -> Result<Vec<u8>> {
        let inner = self.inner()?;
        inner
            .backend
            .get(&codec::encode_key(partition, CollectionKind::Sorted, member))?
            .ok_or(Error::NotFound)
    }

    /// Remove `member` from the partition's sorted set. Removing an absent
    /// member succeeds.
    pub fn sdel(&self, partition: &str, member: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(codec::encode_key(partition, CollectionKind::Sorted, member));
        self.commit_batch(batch)
    }

    /// Entries of the partition's sorted set with member `>=` the given
    /// one, in member order. The member itself need not exist.
    pub fn sseek(&self, partition: &str, member: &[u8]) -> EntryIter {
        self.collect(codec::seek_range(partition, member))
    }

    /// Every entry of the partition's sorted set, in member order.
    pub fn sgetall(&self, partition: &str) -> EntryIter {
        self.collect(codec::collection_range(partition, CollectionKind::Sorted))
    }

    /// Number of entries in the partition's sorted set. Reports 0 on a
    /// closed engine, like [`hsize`](Self::hsize).
    #[must_use]
    pub fn ssize(&self, partition: &str) -> u64 {
        match self.inner() {
            Ok(inner) => inner.counters.get(CollectionKind::Sorted, partition),
            Err(_) => 0,
        }
    }

    /// Drop the partition's entire sorted set.
    pub fn sclear(&self, partition: &str) -> Result<()> {
        self.clear(partition, CollectionKind::Sorted)
    }

    fn collect(&self, range: Range<Vec<u8>>) -> EntryIter {
        let inner = match self.inner() {
            Ok(inner) => inner,
            Err(e) => return EntryIter::failed(e),
        };
        let raw = match inner.backend.scan(range) {
            Ok(raw) => raw,
            Err(e) => return EntryIter::failed(e),
        };
        let mut entries = Vec::with_capacity(raw.len());
        for (key, value) in raw {
            match codec::decode_key(&key) {
                Ok((_, _, user_key)) => entries.push((user_key, value)),
                Err(e) => return EntryIter::failed(e),
            }
        }
        EntryIter::ok(entries)
    }

    fn clear(&self, partition: &str, kind: CollectionKind) -> Result<()> {
        let inner = self.inner()?;
        let removal = inner
            .backend
            .remove_range(codec::collection_range(partition, kind))?;
        inner.counters.reset(kind, partition);
        inner.quota.release(removal.bytes);
        debug!(
            "cleared {} entries ({} bytes) from partition {}",
            removal.entries, removal.bytes, partition
        );
        Ok(())
    }

    /// Start a transaction batch. Staged mutations apply atomically on
    /// [`Transaction::commit`]; dropping the handle discards them.
    pub fn begin_transaction(&self) -> Transaction<'_, S> {
        Transaction::new(self)
    }

    pub(crate) fn commit_batch(&self, batch: WriteBatch) -> Result<()> {
        let inner = self.inner()?;
        if batch.is_empty() {
            return Ok(());
        }

        // Keys were produced by `codec::encode_key`; decoding them up
        // front keeps the settling pass below infallible.
        let mut touched = Vec::with_capacity(batch.len());
        for op in batch.ops() {
            touched.push(codec::decode_key(op.key())?);
        }

        let gross: u64 = batch
            .ops()
            .iter()
            .map(|op| match op {
                WriteOp::Put { key, value } => (key.len() + value.len()) as u64,
                WriteOp::Delete { .. } => 0,
            })
            .sum();
        inner.quota.reserve(gross)?;

        let outcome = match inner.backend.apply(&batch) {
            Ok(outcome) => outcome,
            Err(e) => {
                inner.quota.release(gross);
                return Err(e);
            }
        };

        let mut net = 0i64;
        for ((op, prior), (partition, kind, _)) in batch
            .ops()
            .iter()
            .zip(&outcome.prior_value_len)
            .zip(&touched)
        {
            match (op, prior) {
                (WriteOp::Put { key, value }, None) => {
                    inner.counters.increment(*kind, partition);
                    net += (key.len() + value.len()) as i64;
                }
                (WriteOp::Put { value, .. }, Some(old)) => {
                    net += value.len() as i64 - *old as i64;
                }
                (WriteOp::Delete { key }, Some(old)) => {
                    inner.counters.decrement(*kind, partition);
                    net -= key.len() as i64 + *old as i64;
                }
                (WriteOp::Delete { .. }, None) => {}
            }
        }
        inner.quota.settle(gross, net);
        debug!("committed batch of {} ops, net {} bytes", batch.len(), net);
        Ok(())
    }

    /// Write a point-in-time checkpoint into `dir`, returning the names of
    /// the files that make it up, data files plus the manifest. Concurrent
    /// batches land entirely before or after the snapshot.
    pub fn checkpoint(&self, dir: &Path) -> Result<Vec<String>> {
        let inner = self.inner()?;
        self.options.fs.create_dir_all(dir)?;
        let mut files = inner.backend.checkpoint(dir)?;
        checkpoint::write_manifest(dir, inner.backend.name(), &files)?;
        files.push(checkpoint::MANIFEST_FILE.to_string());
        info!(
            "Checkpointed {} storage to {:?} ({} files)",
            inner.backend.name(),
            dir,
            files.len()
        );
        Ok(files)
    }

    /// Replace the engine's contents with a checkpoint previously written
    /// by [`checkpoint`](Self::checkpoint).
    ///
    /// The manifest is validated before the engine is touched: a missing,
    /// malformed or tampered checkpoint fails the call and leaves the
    /// current state as it was. Once validation passes the data directory
    /// is rebuilt from the checkpoint files and the engine reopens on top,
    /// whether or not it was open before.
    pub fn recover(&self, source: &Path) -> Result<()> {
        let mut state = self.state.write();

        let manifest = checkpoint::read_manifest(source)?;
        if manifest.backend != S::NAME {
            return Err(Error::invalid_checkpoint(format!(
                "checkpoint was written by the {} backend, this engine uses {}",
                manifest.backend,
                S::NAME
            )));
        }
        checkpoint::verify(source, &manifest)?;

        if let State::Open(inner) = std::mem::replace(&mut *state, State::Closed) {
            inner.backend.flush()?;
        }

        let dir = &self.options.data_dir;
        self.options.fs.remove_all(dir)?;
        self.options.fs.create_dir_all(dir)?;
        for entry in &manifest.files {
            self.options
                .fs
                .copy_file(&source.join(&entry.name), &dir.join(&entry.name))?;
        }
        // The restored files are current state now, not stale leftovers.
        self.prepared.store(true, Ordering::Relaxed);

        let inner = self.open_backend()?;
        info!(
            "Recovered {} storage from {:?} ({} hash / {} sorted entries, {} bytes live)",
            inner.backend.name(),
            source,
            inner.counters.total(CollectionKind::Hash),
            inner.counters.total(CollectionKind::Sorted),
            inner.quota.used(),
        );
        *state = State::Open(inner);
        Ok(())
    }

    /// Entry counts and quota usage for monitoring.
    pub fn statistics(&self) -> Result<StorageStatistics> {
        let inner = self.inner()?;
        Ok(StorageStatistics {
            backend: inner.backend.name(),
            used_bytes: inner.quota.used(),
            max_memory_quota_bytes: self.options.max_memory_quota_bytes,
            max_disk_quota_bytes: self.options.max_disk_quota_bytes,
            hash_entries: inner.counters.total(CollectionKind::Hash),
            sorted_entries: inner.counters.total(CollectionKind::Sorted),
        })
    }
}

impl<S: StoreBackend> Drop for KvStorage<S> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close storage cleanly: {}", e);
        }
    }
}
