//! Exclusivity Gate Module
//!
//! Cross-process mutual exclusion for document mutation, built on an
//! advisory lock over a `.lock` file next to the document. Contention is
//! handled with bounded exponential backoff instead of blocking forever.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::config::LockSettings;
use crate::error::{CacheError, Result};

// == Lock Token ==
/// Proof of holding the gate. Dropping a held token releases it.
#[derive(Debug)]
pub struct LockToken {
    lock_path: PathBuf,
    file: Option<File>,
    waited: Duration,
    contended: bool,
}

impl LockToken {
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Time spent waiting for other holders.
    pub fn waited(&self) -> Duration {
        self.waited
    }

    /// True if the first attempt found the lock taken.
    pub fn was_contended(&self) -> bool {
        self.contended
    }
}

impl Drop for LockToken {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}

// == Exclusivity Gate ==
#[derive(Debug, Clone)]
pub struct ExclusivityGate {
    lock_path: PathBuf,
    settings: LockSettings,
}

impl ExclusivityGate {
    /// Gate guarding the document at `document_path` (lock file `<document>.lock`).
    pub fn for_document(document_path: &Path, settings: LockSettings) -> Self {
        let mut lock_name = document_path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        lock_name.push(".lock");

        Self {
            lock_path: document_path.with_file_name(lock_name),
            settings,
        }
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    // == Acquire ==
    /// Waits until this caller is the only holder, or fails with
    /// `LockTimeout` once the configured ceiling has passed.
    pub fn acquire(&self) -> Result<LockToken> {
        // The lock file is never deleted: removing it would let two holders
        // lock different inodes.
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| CacheError::io(&self.lock_path, "open lock file", e))?;

        let start = Instant::now();
        let mut backoff = self.settings.initial_backoff;
        let mut contended = false;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    let waited = start.elapsed();
                    if contended {
                        debug!(lock = %self.lock_path.display(), ?waited, "Cache lock acquired after waiting");
                    }
                    return Ok(LockToken {
                        lock_path: self.lock_path.clone(),
                        file: Some(file),
                        waited,
                        contended,
                    });
                }
                Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                    contended = true;
                    let waited = start.elapsed();
                    if waited >= self.settings.max_wait {
                        warn!(lock = %self.lock_path.display(), ?waited, "Gave up waiting for cache lock");
                        return Err(CacheError::LockTimeout {
                            path: self.lock_path.clone(),
                            waited,
                        });
                    }

                    let remaining = self.settings.max_wait - waited;
                    std::thread::sleep(jittered(backoff).min(remaining));
                    backoff = (backoff * 2).min(self.settings.max_backoff);
                }
                Err(e) => {
                    return Err(CacheError::io(&self.lock_path, "lock", e));
                }
            }
        }
    }

    // == Release ==
    /// Releases a held token. Releasing twice, or a token taken from another
    /// gate, is reported as `InvalidLockUse` and changes nothing.
    pub fn release(&self, token: &mut LockToken) -> Result<()> {
        if token.lock_path != self.lock_path {
            return Err(CacheError::InvalidLockUse(format!(
                "token for {} released on {}",
                token.lock_path.display(),
                self.lock_path.display()
            )));
        }
        let file = token.file.take().ok_or_else(|| {
            CacheError::InvalidLockUse(format!(
                "lock {} already released",
                self.lock_path.display()
            ))
        })?;

        FileExt::unlock(&file).map_err(|e| CacheError::io(&self.lock_path, "unlock", e))
    }
}

/// Adds up to 25% random jitter so waiting processes do not retry in step.
fn jittered(backoff: Duration) -> Duration {
    let base = backoff.as_millis() as u64;
    let jitter = fastrand::u64(0..=base / 4);
    Duration::from_millis(base + jitter)
}
