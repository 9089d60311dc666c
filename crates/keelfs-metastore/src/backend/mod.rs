//! Ordered store backend abstraction
//!
//! The engine talks to its ordered key-value store through [`StoreBackend`],
//! a narrow capability: point reads, one atomic batch-apply, bounded range
//! scans, bulk range removal and checkpoint-to-directory. Both backends keep
//! the full keyspace in one flat ordered table; partition and collection
//! structure lives entirely in the key encoding.
//!
//! # Backends
//!
//! - [`RedbStore`]: persistent, backed by a single-file redb database
//! - [`MemoryStore`]: volatile BTreeMap store with the same contract, used
//!   by tests and by deployments that replicate metadata from elsewhere

pub mod memory;
pub mod redb;

use keelfs_common::Result;
use std::ops::Range;
use std::path::Path;

/// Backend tuning options carried over from the engine configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendOptions {
    /// Ask the backend to compress its on-disk representation. Backends
    /// without a compressed format accept and ignore the flag.
    pub compression: bool,
}

/// One staged mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl WriteOp {
    /// The backend key this op touches.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// An ordered list of mutations applied as one atomic unit.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(WriteOp::Put { key, value });
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(WriteOp::Delete { key });
    }

    #[must_use]
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Per-op results of applying a [`WriteBatch`].
///
/// `prior_value_len[i]` is the byte length of the value the i-th op
/// replaced or removed, `None` when the key was absent. The engine settles
/// entry counters and quota usage from this without a second read pass.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub prior_value_len: Vec<Option<u64>>,
}

/// Result of a bulk range removal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeRemoval {
    /// Number of entries removed.
    pub entries: u64,
    /// Total encoded bytes (key + value) removed.
    pub bytes: u64,
}

/// Ordered key-value store capability consumed by the engine.
///
/// Implementations must be safe for concurrent use: `apply` calls from
/// different threads may interleave but each batch lands atomically, and
/// reads observe either all of a batch or none of it.
pub trait StoreBackend: Send + Sync + Sized {
    /// Short identifier recorded in checkpoint manifests, logs and
    /// statistics. A checkpoint can only be restored into an engine whose
    /// backend carries the same name.
    const NAME: &'static str;

    /// Open the store inside `dir`, loading any state a previous instance
    /// (or a restored checkpoint) left there.
    fn open(dir: &Path, options: &BackendOptions) -> Result<Self>;

    /// Short identifier for logs and statistics.
    fn name(&self) -> &'static str {
        Self::NAME
    }

    /// Point read.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Apply every op of `batch` atomically, in order.
    fn apply(&self, batch: &WriteBatch) -> Result<BatchOutcome>;

    /// All entries with `range.start <= key < range.end`, in key order.
    fn scan(&self, range: Range<Vec<u8>>) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Every entry in the store, in key order.
    fn scan_all(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Atomically remove every entry inside `range`.
    fn remove_range(&self, range: Range<Vec<u8>>) -> Result<RangeRemoval>;

    /// Write a self-contained snapshot of the current state into `dir`,
    /// returning the names of the files created. The snapshot reflects one
    /// point in time: concurrent batches land entirely before or after it.
    fn checkpoint(&self, dir: &Path) -> Result<Vec<String>>;

    /// Flush outstanding state to durable storage, if any.
    fn flush(&self) -> Result<()>;
}

// Re-exports
pub use self::memory::MemoryStore;
pub use self::redb::RedbStore;
