//! Volatile in-memory backend.
//!
//! A lock-guarded `BTreeMap` gives the same ordered-scan contract as the
//! persistent backend without touching disk. Checkpoints are written as a
//! single checksummed bincode image; `open` consumes such an image if one
//! was copied into the data directory during recovery, so the recover path
//! works identically for both backends. Outside of that hand-off the store
//! is volatile: dropping it loses everything.

use super::{BackendOptions, BatchOutcome, RangeRemoval, StoreBackend, WriteBatch, WriteOp};
use keelfs_common::{Error, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::ops::Range;
use std::path::Path;

/// File name of the checkpoint image this backend writes.
pub const IMAGE_FILE: &str = "memstore.img";

const CRC_LEN: usize = 4;

/// Volatile [`StoreBackend`] over a `BTreeMap`.
#[derive(Debug)]
pub struct MemoryStore {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    fn read_image(path: &Path) -> Result<BTreeMap<Vec<u8>, Vec<u8>>> {
        let raw = std::fs::read(path)?;
        if raw.len() < CRC_LEN {
            return Err(Error::corruption("memory store image too short"));
        }
        let (crc_bytes, payload) = raw.split_at(CRC_LEN);
        let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        if crc32c::crc32c(payload) != expected {
            return Err(Error::corruption("memory store image checksum mismatch"));
        }
        let entries: Vec<(Vec<u8>, Vec<u8>)> = bincode::deserialize(payload).map_err(|e| {
            Error::serialization(format!("failed to decode memory store image: {e}"))
        })?;
        Ok(entries.into_iter().collect())
    }

    fn write_image(path: &Path, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        let payload = bincode::serialize(&entries).map_err(|e| {
            Error::serialization(format!("failed to encode memory store image: {e}"))
        })?;
        let crc = crc32c::crc32c(&payload);

        // Write to a temporary file first, then rename into place
        let tmp = path.with_extension("img.tmp");
        {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            let mut writer = std::io::BufWriter::new(file);
            writer.write_all(&crc.to_le_bytes())?;
            writer.write_all(&payload)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl StoreBackend for MemoryStore {
    const NAME: &'static str = "memory";

    fn open(dir: &Path, _options: &BackendOptions) -> Result<Self> {
        let image = dir.join(IMAGE_FILE);
        let map = if image.exists() {
            let map = Self::read_image(&image)?;
            // The image is a recovery hand-off, not a live store; a later
            // reopen starts empty again.
            std::fs::remove_file(&image)?;
            map
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            map: RwLock::new(map),
        })
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.map.read().get(key).cloned())
    }

    fn apply(&self, batch: &WriteBatch) -> Result<BatchOutcome> {
        let mut map = self.map.write();
        let mut prior = Vec::with_capacity(batch.len());
        for op in batch.ops() {
            let previous = match op {
                WriteOp::Put { key, value } => map.insert(key.clone(), value.clone()),
                WriteOp::Delete { key } => map.remove(key),
            };
            prior.push(previous.map(|v| v.len() as u64));
        }
        Ok(BatchOutcome {
            prior_value_len: prior,
        })
    }

    fn scan(&self, range: Range<Vec<u8>>) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let map = self.map.read();
        Ok(map
            .range(range)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn scan_all(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let map = self.map.read();
        Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn remove_range(&self, range: Range<Vec<u8>>) -> Result<RangeRemoval> {
        let mut map = self.map.write();
        // Collect keys first, then remove
        let doomed: Vec<Vec<u8>> = map.range(range).map(|(k, _)| k.clone()).collect();
        let mut removal = RangeRemoval::default();
        for key in doomed {
            if let Some(value) = map.remove(&key) {
                removal.entries += 1;
                removal.bytes += (key.len() + value.len()) as u64;
            }
        }
        Ok(removal)
    }

    fn checkpoint(&self, dir: &Path) -> Result<Vec<String>> {
        let entries: Vec<(Vec<u8>, Vec<u8>)> = {
            let map = self.map.read();
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        Self::write_image(&dir.join(IMAGE_FILE), &entries)?;
        Ok(vec![IMAGE_FILE.to_string()])
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn empty_store() -> MemoryStore {
        let dir = tempdir().unwrap();
        MemoryStore::open(dir.path(), &BackendOptions::default()).unwrap()
    }

    fn put_one(store: &MemoryStore, key: &[u8], value: &[u8]) {
        let mut batch = WriteBatch::new();
        batch.put(key.to_vec(), value.to_vec());
        store.apply(&batch).unwrap();
    }

    #[test]
    fn test_apply_reports_prior_lengths() {
        let store = empty_store();

        let mut batch = WriteBatch::new();
        batch.put(b"k".to_vec(), b"first".to_vec());
        batch.put(b"k".to_vec(), b"second!".to_vec());
        batch.delete(b"k".to_vec());
        batch.delete(b"k".to_vec());
        let outcome = store.apply(&batch).unwrap();

        assert_eq!(
            outcome.prior_value_len,
            vec![None, Some(5), Some(7), None]
        );
        assert_eq!(store.get(b"k").unwrap(), None);
    }

    #[test]
    fn test_scan_is_ordered_and_bounded() {
        let store = empty_store();
        for key in [b"b", b"d", b"a", b"c"] {
            put_one(&store, key, b"v");
        }

        let entries = store.scan(b"b".to_vec()..b"d".to_vec()).unwrap();
        let keys: Vec<&[u8]> = entries.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![b"b".as_slice(), b"c".as_slice()]);
    }

    #[test]
    fn test_remove_range_counts_bytes() {
        let store = empty_store();
        put_one(&store, b"aa", b"xx");
        put_one(&store, b"ab", b"yy");
        put_one(&store, b"b", b"keep");

        let removal = store.remove_range(b"a".to_vec()..b"b".to_vec()).unwrap();
        assert_eq!(removal.entries, 2);
        assert_eq!(removal.bytes, 8);
        assert!(store.get(b"b").unwrap().is_some());
    }

    #[test]
    fn test_checkpoint_image_round_trip() {
        let store = empty_store();
        put_one(&store, b"k1", b"v1");
        put_one(&store, b"k2", b"v2");

        let cp = tempdir().unwrap();
        let files = store.checkpoint(cp.path()).unwrap();
        assert_eq!(files, vec![IMAGE_FILE.to_string()]);

        let restored = MemoryStore::open(cp.path(), &BackendOptions::default()).unwrap();
        assert_eq!(restored.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(restored.get(b"k2").unwrap(), Some(b"v2".to_vec()));

        // The image is consumed by open
        assert!(!cp.path().join(IMAGE_FILE).exists());
    }

    #[test]
    fn test_image_checksum_detects_tamper() {
        let store = empty_store();
        put_one(&store, b"k", b"value");

        let cp = tempdir().unwrap();
        store.checkpoint(cp.path()).unwrap();

        let image = cp.path().join(IMAGE_FILE);
        let mut raw = std::fs::read(&image).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        std::fs::write(&image, &raw).unwrap();

        let err = MemoryStore::open(cp.path(), &BackendOptions::default()).unwrap_err();
        assert!(err.is_internal());
    }
}
