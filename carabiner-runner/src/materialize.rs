//! Extraction of the Carabiner binary to an executable temp file.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempPath;

use crate::cleanup;
use crate::error::{io_err, RunnerError};
use crate::platform::{PlatformIdentifier, RESOURCE_PREFIX};
use crate::source::BinarySource;

/// An extracted, executable copy of the Carabiner binary.
///
/// The file is removed when the handle is released or dropped, and is also on
/// the process-wide [`cleanup`] list in case the handle is leaked.
#[derive(Debug)]
pub struct ExecutableHandle {
    path: TempPath,
}

impl ExecutableHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now. Deleting an already-removed file succeeds.
    pub fn release(self) -> Result<(), RunnerError> {
        cleanup::remove_quietly(&self.path).map_err(|e| io_err(self.path.to_path_buf(), e))
    }
}

impl Drop for ExecutableHandle {
    fn drop(&mut self) {
        cleanup::unregister(&self.path);
    }
}

/// Looks up the binary for one platform and extracts it at most once.
pub struct Materializer {
    platform: PlatformIdentifier,
    source: Arc<dyn BinarySource>,
    temp_dir: PathBuf,
    executable: Option<ExecutableHandle>,
}

impl Materializer {
    pub fn new(platform: PlatformIdentifier, source: Arc<dyn BinarySource>) -> Self {
        Self {
            platform,
            source,
            temp_dir: std::env::temp_dir(),
            executable: None,
        }
    }

    /// Extract into `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn platform(&self) -> &PlatformIdentifier {
        &self.platform
    }

    /// Whether a binary is registered for `platform`. Performs no extraction.
    pub fn can_supply(&self, platform: &PlatformIdentifier) -> bool {
        self.source.contains(&platform.resource_key())
    }

    /// The extracted executable, if [`materialize`](Self::materialize) has succeeded.
    pub fn current(&self) -> Option<&ExecutableHandle> {
        self.executable.as_ref()
    }

    /// Extract the binary on first call; later calls return the same handle
    /// without touching the filesystem.
    pub fn materialize(&mut self) -> Result<&ExecutableHandle, RunnerError> {
        let handle = match self.executable.take() {
            Some(handle) => handle,
            None => self.extract()?,
        };
        Ok(self.executable.insert(handle))
    }

    /// Delete the extracted file, if any. A later `materialize` extracts afresh.
    pub fn release(&mut self) -> Result<(), RunnerError> {
        match self.executable.take() {
            Some(handle) => handle.release(),
            None => Ok(()),
        }
    }

    fn extract(&self) -> Result<ExecutableHandle, RunnerError> {
        let key = self.platform.resource_key();
        let payload = self
            .source
            .payload(&key)
            .map_err(|e| io_err(&key, e))?
            .ok_or_else(|| RunnerError::PlatformUnsupported { key: key.clone() })?;

        let mut file = tempfile::Builder::new()
            .prefix(RESOURCE_PREFIX)
            .suffix(".exe")
            .tempfile_in(&self.temp_dir)
            .map_err(|e| io_err(&self.temp_dir, e))?;
        let path = file.path().to_path_buf();

        let metadata = file.as_file().metadata().map_err(|e| io_err(&path, e))?;
        if metadata.permissions().readonly() {
            return Err(io_err(
                &path,
                io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "unable to write to temporary file",
                ),
            ));
        }

        file.as_file_mut()
            .write_all(&payload)
            .and_then(|()| file.as_file_mut().flush())
            .map_err(|e| io_err(&path, e))?;
        set_executable(&path)?;

        // Closes the write handle; exec fails with ETXTBSY while it is open.
        let path = file.into_temp_path();
        cleanup::register(&path);
        tracing::debug!(
            key = %key,
            path = %path.display(),
            bytes = payload.len(),
            "extracted Carabiner binary",
        );
        Ok(ExecutableHandle { path })
    }
}

impl std::fmt::Debug for Materializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Materializer")
            .field("platform", &self.platform)
            .field("temp_dir", &self.temp_dir)
            .field("executable", &self.executable)
            .finish_non_exhaustive()
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), RunnerError> {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), RunnerError> {
    Ok(())
}
