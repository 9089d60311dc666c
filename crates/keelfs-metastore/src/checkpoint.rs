//! Checkpoint manifest.
//!
//! A checkpoint directory is self-describing: next to the backend's data
//! files sits a `CHECKPOINT.json` manifest naming every file with its size
//! and crc32c. Recovery refuses a directory whose manifest is missing or
//! whose files do not match it, so a mistyped path or a half-copied
//! directory is caught before live data gets discarded.

use keelfs_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name of the manifest inside a checkpoint directory.
pub const MANIFEST_FILE: &str = "CHECKPOINT.json";

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub format_version: u32,
    /// Backend that produced the data files.
    pub backend: String,
    pub files: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub size_bytes: u64,
    pub crc32c: u32,
}

fn file_digest(path: &Path) -> Result<(u64, u32)> {
    let bytes = std::fs::read(path)?;
    Ok((bytes.len() as u64, crc32c::crc32c(&bytes)))
}

/// Describe `files` inside `dir` and write the manifest next to them.
pub fn write_manifest(dir: &Path, backend: &str, files: &[String]) -> Result<CheckpointManifest> {
    let mut entries = Vec::with_capacity(files.len());
    for name in files {
        let (size_bytes, crc) = file_digest(&dir.join(name))?;
        entries.push(ManifestEntry {
            name: name.clone(),
            size_bytes,
            crc32c: crc,
        });
    }
    let manifest = CheckpointManifest {
        format_version: FORMAT_VERSION,
        backend: backend.to_string(),
        files: entries,
    };
    let json = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| Error::serialization(format!("failed to encode manifest: {e}")))?;

    // Write to a temporary file first, then rename into place
    let tmp = dir.join(format!("{MANIFEST_FILE}.tmp"));
    std::fs::write(&tmp, &json)?;
    std::fs::rename(&tmp, dir.join(MANIFEST_FILE))?;
    Ok(manifest)
}

/// Load the manifest of a checkpoint directory.
pub fn read_manifest(dir: &Path) -> Result<CheckpointManifest> {
    let bytes = std::fs::read(dir.join(MANIFEST_FILE)).map_err(|e| {
        Error::invalid_checkpoint(format!("{}: no readable manifest: {e}", dir.display()))
    })?;
    let manifest: CheckpointManifest = serde_json::from_slice(&bytes).map_err(|e| {
        Error::invalid_checkpoint(format!("{}: malformed manifest: {e}", dir.display()))
    })?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(Error::invalid_checkpoint(format!(
            "unsupported manifest version {}",
            manifest.format_version
        )));
    }
    Ok(manifest)
}

/// Verify that every data file the manifest names is present and intact.
pub fn verify(dir: &Path, manifest: &CheckpointManifest) -> Result<()> {
    for entry in &manifest.files {
        let path = dir.join(&entry.name);
        if !path.is_file() {
            return Err(Error::invalid_checkpoint(format!(
                "missing checkpoint file {}",
                entry.name
            )));
        }
        let (size_bytes, crc) = file_digest(&path)?;
        if size_bytes != entry.size_bytes || crc != entry.crc32c {
            return Err(Error::invalid_checkpoint(format!(
                "checkpoint file {} does not match its manifest",
                entry.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_manifest_round_trip() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("data.bin"), b"payload").unwrap();

        let written = write_manifest(dir.path(), "redb", &["data.bin".to_string()]).unwrap();
        assert_eq!(written.files.len(), 1);
        assert_eq!(written.files[0].size_bytes, 7);

        let read = read_manifest(dir.path()).unwrap();
        assert_eq!(read.backend, "redb");
        assert_eq!(read.files[0].name, "data.bin");
        assert_eq!(read.files[0].crc32c, written.files[0].crc32c);

        verify(dir.path(), &read).unwrap();
    }

    #[test]
    fn test_missing_manifest_is_invalid_checkpoint() {
        let dir = tempdir().unwrap();
        let err = read_manifest(dir.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidCheckpoint(_)));
    }

    #[test]
    fn test_malformed_manifest_is_invalid_checkpoint() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), b"{ not json").unwrap();
        let err = read_manifest(dir.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidCheckpoint(_)));
    }

    #[test]
    fn test_verify_detects_tampered_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("data.bin"), b"payload").unwrap();
        let manifest = write_manifest(dir.path(), "memory", &["data.bin".to_string()]).unwrap();

        std::fs::write(dir.path().join("data.bin"), b"PAYLOAD").unwrap();
        let err = verify(dir.path(), &manifest).unwrap_err();
        assert!(matches!(err, Error::InvalidCheckpoint(_)));
    }

    #[test]
    fn test_verify_detects_missing_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("data.bin"), b"payload").unwrap();
        let manifest = write_manifest(dir.path(), "memory", &["data.bin".to_string()]).unwrap();

        std::fs::remove_file(dir.path().join("data.bin")).unwrap();
        let err = verify(dir.path(), &manifest).unwrap_err();
        assert!(matches!(err, Error::InvalidCheckpoint(_)));
    }
}
