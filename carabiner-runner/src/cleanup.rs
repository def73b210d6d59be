//! Process-wide list of extracted executables still on disk.
//!
//! Every materialized binary is registered here as well as being owned by its
//! [`ExecutableHandle`](crate::ExecutableHandle). Whichever path runs first
//! (handle release, handle drop, or [`purge`]) removes the file; the others
//! find it gone and do nothing. Hold a [`CleanupGuard`] for the lifetime of
//! `main` so files are purged even when a supervisor is leaked.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

static REGISTERED: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

fn registered() -> std::sync::MutexGuard<'static, Vec<PathBuf>> {
    REGISTERED.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Add `path` to the list removed by [`purge`].
pub fn register(path: &Path) {
    let mut paths = registered();
    if !paths.iter().any(|p| p == path) {
        paths.push(path.to_path_buf());
    }
}

/// Forget `path` without touching the file.
pub fn unregister(path: &Path) {
    registered().retain(|p| p != path);
}

pub fn is_registered(path: &Path) -> bool {
    registered().iter().any(|p| p == path)
}

/// Remove `path`, treating an already-missing file as success.
pub fn remove_quietly(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Delete every registered file. Returns how many were still present.
pub fn purge() -> usize {
    let paths = std::mem::take(&mut *registered());
    let mut removed = 0;
    for path in paths {
        if !path.exists() {
            continue;
        }
        match remove_quietly(&path) {
            Ok(()) => removed += 1,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to remove extracted Carabiner binary");
            }
        }
    }
    removed
}

/// Purges the registered files when dropped.
#[derive(Debug)]
#[must_use = "files are purged when the guard is dropped"]
pub struct CleanupGuard {
    _private: (),
}

/// Create a guard that calls [`purge`] when it goes out of scope.
pub fn guard() -> CleanupGuard {
    CleanupGuard { _private: () }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let removed = purge();
        if removed > 0 {
            tracing::debug!(removed, "purged extracted Carabiner binaries");
        }
    }
}
