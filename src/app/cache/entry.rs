//! Completed cache entries and the files behind them

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, warn};

use super::key::CacheKey;

/// A cache key bound to the on-disk file holding its content
///
/// Only created once a fill has fully succeeded; never updated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Key this entry answers
    pub key: CacheKey,
    /// Local file holding the complete origin body
    pub local_path: PathBuf,
    /// When the fill completed
    pub filled_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an entry for a completed fill
    pub fn new(key: CacheKey, local_path: PathBuf) -> Self {
        Self {
            key,
            local_path,
            filled_at: Utc::now(),
        }
    }

    /// Path of the cached file
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Remove the backing file
    ///
    /// A file that is already gone counts as removed.
    pub async fn remove_file(&self) -> io::Result<()> {
        remove_if_present(&self.local_path).await
    }
}

/// Remove a file, treating "not found" as success
pub(crate) async fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Removes a file on drop unless disarmed
///
/// Owns a cache file from the moment it is created until it is registered.
/// Drop runs on error returns, on task abort and on runtime shutdown alike,
/// so a file that never made it into the store does not outlive its fill.
#[derive(Debug)]
pub(crate) struct FileGuard {
    path: PathBuf,
    armed: bool,
}

impl FileGuard {
    pub(crate) fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    /// Keep the file
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for FileGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // May run outside any runtime, so this stays blocking
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed unregistered file {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::cache::KeyDeriver;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_remove_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc.png");
        fs::write(&path, b"ABC").await.unwrap();

        let key = KeyDeriver::derive("/abc.png", "").unwrap();
        let entry = CacheEntry::new(key, path.clone());
        assert_eq!(entry.local_path(), path.as_path());

        entry.remove_file().await.unwrap();
        assert!(!path.exists());

        // Second removal is a no-op
        entry.remove_file().await.unwrap();
    }

    #[test]
    fn test_armed_guard_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.bin");
        std::fs::write(&path, b"PART").unwrap();

        drop(FileGuard::new(&path));
        assert!(!path.exists());
    }

    #[test]
    fn test_disarmed_guard_keeps_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("complete.bin");
        std::fs::write(&path, b"DONE").unwrap();

        FileGuard::new(&path).disarm();
        assert!(path.exists());
    }

    #[test]
    fn test_guard_tolerates_missing_file() {
        let dir = TempDir::new().unwrap();
        drop(FileGuard::new(&dir.path().join("never-created.bin")));
    }
}
