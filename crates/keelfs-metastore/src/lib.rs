//! KeelFS Metastore - Metadata-server storage engine
//!
//! Hash-table and ordered-set semantics, partitioned by namespace, on top
//! of a pluggable ordered key-value backend. Mutations can be grouped into
//! atomic transaction batches; the whole keyspace can be checkpointed to a
//! directory and recovered from one. Writes are admitted against memory
//! and disk quotas configured at open time.
//!
//! The request layer of the metadata server (directory entries, inode
//! attributes) sits on top of [`KvStorage`]; nothing in this crate knows
//! about file-system semantics.

pub mod backend;
pub mod batch;
pub mod checkpoint;
pub mod codec;
mod counter;
pub mod engine;
pub mod iterator;
mod quota;

pub use backend::{
    BackendOptions, BatchOutcome, MemoryStore, RangeRemoval, RedbStore, StoreBackend, WriteBatch,
    WriteOp,
};
pub use batch::Transaction;
pub use engine::{KvStorage, MemoryStorage, RedbStorage, StorageOptions, StorageStatistics};
pub use iterator::EntryIter;
pub use keelfs_common::{DiskFileSystem, Error, LocalFileSystem, QuotaKind, Result};
