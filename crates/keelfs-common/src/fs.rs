//! Local-filesystem capability for the storage lifecycle.
//!
//! The storage engine only needs a handful of directory operations to
//! prepare its data directory and to move checkpoint files around. They
//! live behind a trait so tests can substitute a mock filesystem, e.g.
//! one that refuses to delete a stale data directory.

use crate::Result;
use std::path::Path;

/// Narrow filesystem capability consumed by the storage engine.
pub trait LocalFileSystem: Send + Sync {
    /// Whether `path` exists and is a directory.
    fn dir_exists(&self, path: &Path) -> bool;

    /// Create `path` together with any missing parents.
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Recursively delete a file or directory tree.
    ///
    /// Deleting a path that does not exist succeeds.
    fn remove_all(&self, path: &Path) -> Result<()>;

    /// File names (not full paths) of the direct children of `dir`.
    fn list_dir(&self, dir: &Path) -> Result<Vec<String>>;

    /// Copy a single file, replacing `to` if it already exists.
    fn copy_file(&self, from: &Path, to: &Path) -> Result<()>;
}

/// [`LocalFileSystem`] backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskFileSystem;

impl LocalFileSystem for DiskFileSystem {
    fn dir_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        let meta = match std::fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if meta.is_dir() {
            std::fs::remove_dir_all(path)?;
        } else {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn list_dir(&self, dir: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        // read_dir order is platform-dependent
        names.sort();
        Ok(names)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        std::fs::copy(from, to)?;
        Ok(())
    }
}
