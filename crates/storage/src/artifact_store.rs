use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::{CleanupError, ReadError};

/// Outcome of a best-effort removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    AlreadyAbsent,
}

/// Owns the local staging directory where dumps wait for upload.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    staging_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Result<Self> {
        let staging_dir = staging_dir.into();
        std::fs::create_dir_all(&staging_dir)
            .with_context(|| format!("create staging directory: {}", staging_dir.display()))?;
        Ok(Self { staging_dir })
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Reads the whole staged file into memory.
    pub async fn read_all(&self, path: &Path) -> Result<Vec<u8>, ReadError> {
        tokio::fs::read(path).await.map_err(|source| ReadError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Deletes the staged file. A file that is already gone is not an error.
    pub async fn remove(&self, path: &Path) -> Result<Removal, CleanupError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "removed staged artifact");
                Ok(Removal::Removed)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Removal::AlreadyAbsent),
            Err(source) => Err(CleanupError {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_missing_staging_dir() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("nested").join("staging");
        let store = ArtifactStore::new(&dir).expect("store");
        assert!(dir.is_dir());
        assert_eq!(store.staging_dir(), dir.as_path());
    }

    #[tokio::test]
    async fn read_all_returns_full_contents() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(tmp.path()).expect("store");
        let path = tmp.path().join("backup.sql");
        let payload = vec![b'x'; 500];
        std::fs::write(&path, &payload).expect("write");

        let read = store.read_all(&path).await.expect("read");
        assert_eq!(read, payload);
    }

    #[tokio::test]
    async fn read_all_flags_missing_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(tmp.path()).expect("store");

        let err = store
            .read_all(&tmp.path().join("nope.sql"))
            .await
            .unwrap_err();
        assert!(err.is_missing());
    }

    #[tokio::test]
    async fn reading_a_directory_is_not_missing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(tmp.path()).expect("store");
        let dir = tmp.path().join("backup.sql");
        std::fs::create_dir(&dir).expect("mkdir");

        let err = store.read_all(&dir).await.unwrap_err();
        assert!(!err.is_missing());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(tmp.path()).expect("store");
        let path = tmp.path().join("backup.sql");
        std::fs::write(&path, b"dump").expect("write");

        assert_eq!(store.remove(&path).await.expect("first"), Removal::Removed);
        assert!(!path.exists());
        assert_eq!(
            store.remove(&path).await.expect("second"),
            Removal::AlreadyAbsent
        );
    }

    #[tokio::test]
    async fn remove_reports_other_failures() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(tmp.path()).expect("store");
        let dir = tmp.path().join("backup.sql");
        std::fs::create_dir(&dir).expect("mkdir");

        let err = store.remove(&dir).await.unwrap_err();
        assert_eq!(err.path, dir);
    }
}
