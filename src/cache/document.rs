//! Atomic Document Store Module
//!
//! Owns the physical cache file. Saves go through a temporary file in the
//! same directory followed by a single rename, so readers only ever see a
//! complete old or complete new document.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cache::staleness::FileVersion;
use crate::error::{CacheError, Result};

// == Document Store ==
#[derive(Debug, Clone)]
pub struct DocumentStore {
    path: PathBuf,
    directory: PathBuf,
}

impl DocumentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self { path, directory }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // == Load ==
    /// Returns the whole file, or no bytes when the file does not exist yet.
    pub fn load(&self) -> Result<Vec<u8>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(CacheError::io(&self.path, "read cache file", e)),
        }
    }

    // == Save ==
    /// Replaces the file with `bytes` in one rename.
    ///
    /// On failure the temporary file is removed and the previous document
    /// stays in place.
    pub fn save(&self, bytes: &[u8]) -> Result<()> {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", file_name))
            .suffix(".tmp")
            .tempfile_in(&self.directory)
            .map_err(|e| CacheError::io(&self.directory, "create temporary file in", e))?;

        temp.write_all(bytes)
            .map_err(|e| CacheError::io(temp.path(), "write temporary file", e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| CacheError::io(temp.path(), "sync temporary file", e))?;

        // Temporary files are created owner-only; keep the document readable
        // by the other processes sharing it.
        let permissions = match fs::metadata(&self.path) {
            Ok(metadata) => Some(metadata.permissions()),
            Err(_) => default_permissions(),
        };
        if let Some(permissions) = permissions {
            temp.as_file()
                .set_permissions(permissions)
                .map_err(|e| CacheError::io(temp.path(), "set permissions of", e))?;
        }

        temp.persist(&self.path)
            .map_err(|e| CacheError::io(&self.path, "replace cache file", e.error))?;

        debug!(path = %self.path.display(), bytes = bytes.len(), "Cache file replaced");
        Ok(())
    }

    /// Current version marker of the file.
    pub fn version(&self) -> Result<FileVersion> {
        FileVersion::of(&self.path)
    }
}

#[cfg(unix)]
fn default_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<fs::Permissions> {
    None
}
