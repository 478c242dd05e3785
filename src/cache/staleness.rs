//! Staleness Tracker Module
//!
//! Detects, from file metadata alone, whether the document changed since
//! this instance last decoded it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{CacheError, Result};

// == File Version ==
/// Cheap identity of one version of the document file.
///
/// Every save renames a fresh file into place, so the inode changes on
/// each write even when the modification time granularity is coarse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileVersion {
    Missing,
    Present {
        modified: Option<SystemTime>,
        len: u64,
        inode: u64,
    },
}

impl FileVersion {
    /// Reads the current version marker of `path`.
    pub fn of(path: &Path) -> Result<Self> {
        match fs::metadata(path) {
            Ok(metadata) => Ok(FileVersion::Present {
                modified: metadata.modified().ok(),
                len: metadata.len(),
                inode: inode(&metadata),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FileVersion::Missing),
            Err(e) => Err(CacheError::io(path, "read metadata of", e)),
        }
    }
}

#[cfg(unix)]
fn inode(metadata: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn inode(_metadata: &fs::Metadata) -> u64 {
    0
}

// == Staleness Tracker ==
/// Remembers the version of the last snapshot this instance decoded.
#[derive(Debug)]
pub struct StalenessTracker {
    path: PathBuf,
    recorded: Option<FileVersion>,
}

impl StalenessTracker {
    /// Creates a tracker with nothing recorded, so the first check is stale.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            recorded: None,
        }
    }

    /// True if nothing was recorded yet or the file's marker differs.
    pub fn is_stale(&self) -> Result<bool> {
        match self.recorded {
            None => Ok(true),
            Some(recorded) => Ok(FileVersion::of(&self.path)? != recorded),
        }
    }

    /// Records the marker the current snapshot was decoded at.
    ///
    /// Callers must take the marker *before* reading the bytes, so a write
    /// landing in between shows up as stale on the next check.
    pub fn record_fresh(&mut self, version: FileVersion) {
        self.recorded = Some(version);
    }

    pub fn recorded(&self) -> Option<FileVersion> {
        self.recorded
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_tracker_is_stale() {
        let dir = TempDir::new().unwrap();
        let tracker = StalenessTracker::new(dir.path().join("cache.json"));

        assert!(tracker.recorded().is_none());
        assert!(tracker.is_stale().unwrap());
    }

    #[test]
    fn test_missing_file_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");

        assert_eq!(FileVersion::of(&path).unwrap(), FileVersion::Missing);

        let mut tracker = StalenessTracker::new(&path);
        tracker.record_fresh(FileVersion::Missing);
        assert!(!tracker.is_stale().unwrap());

        fs::write(&path, "{}").unwrap();
        assert!(tracker.is_stale().unwrap());
    }

    #[test]
    fn test_fresh_until_file_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{}").unwrap();

        let mut tracker = StalenessTracker::new(&path);
        tracker.record_fresh(FileVersion::of(&path).unwrap());
        assert!(!tracker.is_stale().unwrap());

        fs::write(&path, "{\n  \"key\": \"value\"\n}").unwrap();
        assert!(tracker.is_stale().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_replaced_file_is_stale() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{}").unwrap();

        let mut tracker = StalenessTracker::new(&path);
        tracker.record_fresh(FileVersion::of(&path).unwrap());

        // Same length, new file swapped in
        let replacement = dir.path().join("replacement.json");
        fs::write(&replacement, "{}").unwrap();
        fs::rename(&replacement, &path).unwrap();

        assert!(tracker.is_stale().unwrap());
    }
}
