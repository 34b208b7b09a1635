//! Build-asset directory for images referenced by compiled documents.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Failed to create asset directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Failed to copy {from} into the asset directory: {source}")]
    Copy { from: PathBuf, source: io::Error },
}

/// Copies images into a shared directory under collision-free names
///
/// The destination name is derived from the source's absolute path, so the
/// same image always lands in the same place and is copied at most once.
#[derive(Debug, Clone)]
pub struct AssetStore {
    dir: PathBuf,
}

impl AssetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where `source` will be stored
    pub fn destination_for(&self, source: &Path) -> PathBuf {
        let digest = blake3::hash(source.to_string_lossy().as_bytes()).to_hex();
        let name = match source.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.{}", digest, ext.to_ascii_lowercase()),
            None => digest.to_string(),
        };
        self.dir.join(name)
    }

    /// Copy `source` into the store unless it is already there
    pub fn ingest(&self, source: &Path) -> Result<PathBuf, AssetError> {
        let destination = self.destination_for(source);
        if destination.exists() {
            return Ok(destination);
        }

        fs::create_dir_all(&self.dir).map_err(|source| AssetError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        // Copy through a temporary file so concurrent workers never see a
        // partially written asset
        let copy_err = |e: io::Error| AssetError::Copy {
            from: source.to_path_buf(),
            source: e,
        };
        let temp = tempfile::NamedTempFile::new_in(&self.dir).map_err(copy_err)?;
        fs::copy(source, temp.path()).map_err(copy_err)?;
        temp.persist(&destination)
            .map_err(|e| copy_err(e.error))?;

        tracing::debug!("Copied asset {:?} -> {:?}", source, destination);
        Ok(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_destination_is_stable_and_keeps_extension() {
        let store = AssetStore::new("/tmp/assets");
        let a = store.destination_for(Path::new("/vault/img/cat.PNG"));
        let b = store.destination_for(Path::new("/vault/img/cat.PNG"));
        let c = store.destination_for(Path::new("/vault/other/cat.PNG"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.extension().unwrap(), "png");
    }

    #[test]
    fn test_ingest_copies_once() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("pic.png");
        fs::write(&source, b"first").unwrap();
        let store = AssetStore::new(dir.path().join("assets"));

        let copied = store.ingest(&source).unwrap();
        assert_eq!(fs::read(&copied).unwrap(), b"first");

        fs::write(&source, b"second").unwrap();
        let again = store.ingest(&source).unwrap();
        assert_eq!(copied, again);
        assert_eq!(fs::read(&again).unwrap(), b"first");
    }

    #[test]
    fn test_missing_source() {
        let dir = tempdir().unwrap();
        let store = AssetStore::new(dir.path().join("assets"));
        assert!(matches!(
            store.ingest(&dir.path().join("ghost.png")),
            Err(AssetError::Copy { .. })
        ));
    }
}
