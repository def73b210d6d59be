//! Where Carabiner binaries come from.
//!
//! A [`BinarySource`] maps resource keys (`Carabiner_Linux_x64`, ...) to the
//! raw bytes of an executable. How those bytes were bundled is not our
//! concern; applications usually register `include_bytes!` payloads in an
//! [`EmbeddedBinaries`], the CLI reads them from a directory.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub trait BinarySource: Send + Sync {
    /// Whether a payload is registered under `key`. Must not have side effects.
    fn contains(&self, key: &str) -> bool;

    /// The full payload registered under `key`, or `None` if there is none.
    fn payload(&self, key: &str) -> io::Result<Option<Cow<'_, [u8]>>>;
}

/// Payloads held in memory, typically compiled into the application.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedBinaries {
    payloads: BTreeMap<String, Cow<'static, [u8]>>,
}

impl EmbeddedBinaries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` under `key`, replacing any earlier payload.
    pub fn with(mut self, key: impl Into<String>, bytes: impl Into<Cow<'static, [u8]>>) -> Self {
        self.insert(key, bytes);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, bytes: impl Into<Cow<'static, [u8]>>) {
        self.payloads.insert(key.into(), bytes.into());
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.payloads.keys().map(String::as_str)
    }
}

impl BinarySource for EmbeddedBinaries {
    fn contains(&self, key: &str) -> bool {
        self.payloads.contains_key(key)
    }

    fn payload(&self, key: &str) -> io::Result<Option<Cow<'_, [u8]>>> {
        Ok(self
            .payloads
            .get(key)
            .map(|bytes| Cow::Borrowed(bytes.as_ref())))
    }
}

/// Payloads stored as files named after their resource key.
///
/// `Carabiner_Linux_x64` is looked up as `<dir>/Carabiner_Linux_x64`.
#[derive(Debug, Clone)]
pub struct DirectoryBinaries {
    dir: PathBuf,
}

impl DirectoryBinaries {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl BinarySource for DirectoryBinaries {
    fn contains(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    fn payload(&self, key: &str) -> io::Result<Option<Cow<'_, [u8]>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(Cow::Owned(bytes))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}
