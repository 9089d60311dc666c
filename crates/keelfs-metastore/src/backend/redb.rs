//! Persistent backend backed by redb.
//!
//! The whole keyspace lives in one `&[u8] -> &[u8]` table inside a
//! single-file database. Every batch is one write transaction, so
//! atomicity and point-in-time reads come straight from redb's MVCC.
//! A checkpoint is a fresh database file filled from a pinned read
//! snapshot, which keeps the copy consistent without stalling writers.

use super::{BackendOptions, BatchOutcome, RangeRemoval, StoreBackend, WriteBatch, WriteOp};
use keelfs_common::{Error, Result};
use redb::{Database, ReadableTable, TableDefinition};
use std::ops::Range;
use std::path::Path;
use tracing::debug;

const DATA_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("keelfs_meta");

/// File name of the database this backend keeps in its directory.
pub const DB_FILE: &str = "meta.redb";

/// Persistent [`StoreBackend`] over a redb database.
#[derive(Debug)]
pub struct RedbStore {
    db: Database,
}

impl StoreBackend for RedbStore {
    const NAME: &'static str = "redb";

    fn open(dir: &Path, options: &BackendOptions) -> Result<Self> {
        if options.compression {
            debug!("redb backend has no block compression, ignoring the request");
        }
        std::fs::create_dir_all(dir)?;
        let path = dir.join(DB_FILE);
        let db = Database::create(&path)
            .map_err(|e| Error::backend(format!("failed to open database: {e}")))?;

        // Create the table eagerly so later read txns don't fail
        let write_txn = db
            .begin_write()
            .map_err(|e| Error::backend(format!("failed to begin write txn: {e}")))?;
        {
            let _t = write_txn
                .open_table(DATA_TABLE)
                .map_err(|e| Error::backend(format!("failed to open table: {e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| Error::backend(format!("failed to commit: {e}")))?;

        Ok(Self { db })
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| Error::backend(format!("failed to begin read txn: {e}")))?;
        let table = read_txn
            .open_table(DATA_TABLE)
            .map_err(|e| Error::backend(format!("failed to open table: {e}")))?;
        let value = table
            .get(key)
            .map_err(|e| Error::backend(format!("failed to read key: {e}")))?
            .map(|v| v.value().to_vec());
        Ok(value)
    }

    fn apply(&self, batch: &WriteBatch) -> Result<BatchOutcome> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| Error::backend(format!("failed to begin write txn: {e}")))?;
        let mut prior = Vec::with_capacity(batch.len());
        {
            let mut table = write_txn
                .open_table(DATA_TABLE)
                .map_err(|e| Error::backend(format!("failed to open table: {e}")))?;
            for op in batch.ops() {
                let previous_len = match op {
                    WriteOp::Put { key, value } => table
                        .insert(key.as_slice(), value.as_slice())
                        .map_err(|e| Error::backend(format!("failed to write key: {e}")))?
                        .map(|g| g.value().len() as u64),
                    WriteOp::Delete { key } => table
                        .remove(key.as_slice())
                        .map_err(|e| Error::backend(format!("failed to delete key: {e}")))?
                        .map(|g| g.value().len() as u64),
                };
                prior.push(previous_len);
            }
        }
        write_txn
            .commit()
            .map_err(|e| Error::backend(format!("failed to commit batch: {e}")))?;
        Ok(BatchOutcome {
            prior_value_len: prior,
        })
    }

    fn scan(&self, range: Range<Vec<u8>>) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| Error::backend(format!("failed to begin read txn: {e}")))?;
        let table = read_txn
            .open_table(DATA_TABLE)
            .map_err(|e| Error::backend(format!("failed to open table: {e}")))?;
        let mut entries = Vec::new();
        let iter = table
            .range(range.start.as_slice()..range.end.as_slice())
            .map_err(|e| Error::backend(format!("failed to scan range: {e}")))?;
        for item in iter {
            let (k, v) = item.map_err(|e| Error::backend(format!("failed to scan entry: {e}")))?;
            entries.push((k.value().to_vec(), v.value().to_vec()));
        }
        Ok(entries)
    }

    fn scan_all(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| Error::backend(format!("failed to begin read txn: {e}")))?;
        let table = read_txn
            .open_table(DATA_TABLE)
            .map_err(|e| Error::backend(format!("failed to open table: {e}")))?;
        let mut entries = Vec::new();
        let iter = table
            .iter()
            .map_err(|e| Error::backend(format!("failed to scan table: {e}")))?;
        for item in iter {
            let (k, v) = item.map_err(|e| Error::backend(format!("failed to scan entry: {e}")))?;
            entries.push((k.value().to_vec(), v.value().to_vec()));
        }
        Ok(entries)
    }

    fn remove_range(&self, range: Range<Vec<u8>>) -> Result<RangeRemoval> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| Error::backend(format!("failed to begin write txn: {e}")))?;
        let mut removal = RangeRemoval::default();
        {
            let mut table = write_txn
                .open_table(DATA_TABLE)
                .map_err(|e| Error::backend(format!("failed to open table: {e}")))?;
            // Collect matching keys first, then remove
            let doomed: Vec<(Vec<u8>, u64)> = {
                let iter = table
                    .range(range.start.as_slice()..range.end.as_slice())
                    .map_err(|e| Error::backend(format!("failed to scan range: {e}")))?;
                let mut doomed = Vec::new();
                for item in iter {
                    let (k, v) =
                        item.map_err(|e| Error::backend(format!("failed to scan entry: {e}")))?;
                    let bytes = (k.value().len() + v.value().len()) as u64;
                    doomed.push((k.value().to_vec(), bytes));
                }
                doomed
            };
            for (key, bytes) in doomed {
                table
                    .remove(key.as_slice())
                    .map_err(|e| Error::backend(format!("failed to delete key: {e}")))?;
                removal.entries += 1;
                removal.bytes += bytes;
            }
        }
        write_txn
            .commit()
            .map_err(|e| Error::backend(format!("failed to commit removal: {e}")))?;
        Ok(removal)
    }

    fn checkpoint(&self, dir: &Path) -> Result<Vec<String>> {
        // Pin the consistency point before building the copy; batches
        // committing from here on are not part of this checkpoint.
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| Error::backend(format!("failed to begin read txn: {e}")))?;
        let source = read_txn
            .open_table(DATA_TABLE)
            .map_err(|e| Error::backend(format!("failed to open table: {e}")))?;

        let target_path = dir.join(DB_FILE);
        // A stale image from an earlier checkpoint into the same directory
        // must not shine through.
        match std::fs::remove_file(&target_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let target = Database::create(&target_path)
            .map_err(|e| Error::backend(format!("failed to create checkpoint database: {e}")))?;
        let write_txn = target
            .begin_write()
            .map_err(|e| Error::backend(format!("failed to begin checkpoint txn: {e}")))?;
        {
            let mut table = write_txn
                .open_table(DATA_TABLE)
                .map_err(|e| Error::backend(format!("failed to open checkpoint table: {e}")))?;
            let iter = source
                .iter()
                .map_err(|e| Error::backend(format!("failed to scan table: {e}")))?;
            for item in iter {
                let (k, v) =
                    item.map_err(|e| Error::backend(format!("failed to scan entry: {e}")))?;
                table
                    .insert(k.value(), v.value())
                    .map_err(|e| Error::backend(format!("failed to copy entry: {e}")))?;
            }
        }
        write_txn
            .commit()
            .map_err(|e| Error::backend(format!("failed to commit checkpoint: {e}")))?;

        Ok(vec![DB_FILE.to_string()])
    }

    fn flush(&self) -> Result<()> {
        // Commits are durable as they land; nothing is buffered here.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn put_one(store: &RedbStore, key: &[u8], value: &[u8]) {
        let mut batch = WriteBatch::new();
        batch.put(key.to_vec(), value.to_vec());
        store.apply(&batch).unwrap();
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RedbStore::open(dir.path(), &BackendOptions::default()).unwrap();
            put_one(&store, b"key", b"value");
        }
        let store = RedbStore::open(dir.path(), &BackendOptions::default()).unwrap();
        assert_eq!(store.get(b"key").unwrap(), Some(b"value".to_vec()));
    }

    #[test]
    fn test_apply_reports_prior_lengths() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path(), &BackendOptions::default()).unwrap();

        let mut batch = WriteBatch::new();
        batch.put(b"k".to_vec(), b"first".to_vec());
        batch.put(b"k".to_vec(), b"second!".to_vec());
        batch.delete(b"k".to_vec());
        batch.delete(b"k".to_vec());
        let outcome = store.apply(&batch).unwrap();

        assert_eq!(outcome.prior_value_len, vec![None, Some(5), Some(7), None]);
    }

    #[test]
    fn test_scan_is_ordered_and_bounded() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path(), &BackendOptions::default()).unwrap();
        for key in [b"d", b"a", b"c", b"b"] {
            put_one(&store, key, b"v");
        }

        let entries = store.scan(b"b".to_vec()..b"d".to_vec()).unwrap();
        let keys: Vec<&[u8]> = entries.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![b"b".as_slice(), b"c".as_slice()]);
    }

    #[test]
    fn test_remove_range() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path(), &BackendOptions::default()).unwrap();
        put_one(&store, b"aa", b"xx");
        put_one(&store, b"ab", b"yy");
        put_one(&store, b"b", b"keep");

        let removal = store.remove_range(b"a".to_vec()..b"b".to_vec()).unwrap();
        assert_eq!(removal.entries, 2);
        assert_eq!(removal.bytes, 8);
        assert_eq!(store.get(b"aa").unwrap(), None);
        assert!(store.get(b"b").unwrap().is_some());
    }

    #[test]
    fn test_checkpoint_is_self_contained() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path(), &BackendOptions::default()).unwrap();
        put_one(&store, b"k1", b"v1");

        let cp = tempdir().unwrap();
        let files = store.checkpoint(cp.path()).unwrap();
        assert_eq!(files, vec![DB_FILE.to_string()]);

        // Mutations after the checkpoint do not leak into it
        put_one(&store, b"k2", b"v2");
        drop(store);

        let restored = RedbStore::open(cp.path(), &BackendOptions::default()).unwrap();
        assert_eq!(restored.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(restored.get(b"k2").unwrap(), None);
    }

    #[test]
    fn test_open_rejects_non_database_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(DB_FILE), b"this is not a database").unwrap();

        let err = RedbStore::open(dir.path(), &BackendOptions::default()).unwrap_err();
        assert!(err.is_internal());
    }
}
