//! Binary extraction: lookup, memoization, permissions, and removal.

use std::borrow::Cow;
use std::fs;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use carabiner_runner::{
    cleanup, BinarySource, EmbeddedBinaries, Materializer, PlatformIdentifier, RunnerError,
};
use tempfile::TempDir;

const PAYLOAD: &[u8] = b"#!/bin/sh\nexit 0\n";

fn linux_x64() -> PlatformIdentifier {
    PlatformIdentifier::from_host("Linux", "amd64")
}

/// Counts payload reads so tests can tell whether a copy happened.
struct CountingSource {
    inner: EmbeddedBinaries,
    reads: AtomicUsize,
}

impl CountingSource {
    fn new(inner: EmbeddedBinaries) -> Arc<Self> {
        Arc::new(Self {
            inner,
            reads: AtomicUsize::new(0),
        })
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl BinarySource for CountingSource {
    fn contains(&self, key: &str) -> bool {
        self.inner.contains(key)
    }

    fn payload(&self, key: &str) -> io::Result<Option<Cow<'_, [u8]>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.payload(key)
    }
}

fn materializer(dir: &TempDir, source: Arc<dyn BinarySource>) -> Materializer {
    Materializer::new(linux_x64(), source).with_temp_dir(dir.path())
}

#[test]
fn can_supply_checks_the_exact_key_only() {
    let dir = TempDir::new().expect("tempdir");
    let source = CountingSource::new(EmbeddedBinaries::new().with("Carabiner_Linux_x64", PAYLOAD));
    let m = materializer(&dir, source.clone());

    assert!(m.can_supply(&linux_x64()));
    assert!(!m.can_supply(&PlatformIdentifier::from_host("Linux", "aarch64")));
    assert!(!m.can_supply(&PlatformIdentifier::from_host("Mac OS X", "amd64")));
    assert_eq!(source.reads(), 0, "can_supply must not read the payload");
    assert!(m.current().is_none());
    assert_eq!(fs::read_dir(dir.path()).expect("read_dir").count(), 0);
}

#[test]
fn missing_payload_is_platform_unsupported() {
    let dir = TempDir::new().expect("tempdir");
    let mut m = materializer(&dir, Arc::new(EmbeddedBinaries::new()));

    let err = m.materialize().unwrap_err();
    match &err {
        RunnerError::PlatformUnsupported { key } => assert_eq!(key, "Carabiner_Linux_x64"),
        other => panic!("expected PlatformUnsupported, got {other}"),
    }
    assert!(err.to_string().contains("Carabiner_Linux_x64"));
    assert_eq!(fs::read_dir(dir.path()).expect("read_dir").count(), 0);
}

#[test]
fn materialize_copies_once_and_returns_the_same_path() {
    let dir = TempDir::new().expect("tempdir");
    let source = CountingSource::new(EmbeddedBinaries::new().with("Carabiner_Linux_x64", PAYLOAD));
    let mut m = materializer(&dir, source.clone());

    let first = m.materialize().expect("first").path().to_path_buf();
    let second = m.materialize().expect("second").path().to_path_buf();

    assert_eq!(first, second);
    assert_eq!(source.reads(), 1, "second call must not copy again");
    assert_eq!(fs::read(&first).expect("read copy"), PAYLOAD);
    assert!(first.starts_with(dir.path()));
    let name = first.file_name().and_then(|n| n.to_str()).expect("file name");
    assert!(name.starts_with("Carabiner"), "got {name}");
    assert!(name.ends_with(".exe"), "got {name}");
    assert!(cleanup::is_registered(&first));
}

#[test]
fn separate_materializers_extract_separate_copies() {
    let dir = TempDir::new().expect("tempdir");
    let source: Arc<dyn BinarySource> =
        Arc::new(EmbeddedBinaries::new().with("Carabiner_Linux_x64", PAYLOAD));
    let mut a = materializer(&dir, source.clone());
    let mut b = materializer(&dir, source);

    let path_a = a.materialize().expect("a").path().to_path_buf();
    let path_b = b.materialize().expect("b").path().to_path_buf();
    assert_ne!(path_a, path_b);
}

#[cfg(unix)]
#[test]
fn extracted_binary_is_executable() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().expect("tempdir");
    let mut m = materializer(
        &dir,
        Arc::new(EmbeddedBinaries::new().with("Carabiner_Linux_x64", PAYLOAD)),
    );
    let path = m.materialize().expect("materialize").path().to_path_buf();
    let mode = fs::metadata(&path).expect("metadata").permissions().mode();
    assert_eq!(mode & 0o111, 0o111, "mode was {mode:o}");
}

#[test]
fn release_removes_the_file_and_is_idempotent() {
    let dir = TempDir::new().expect("tempdir");
    let source = CountingSource::new(EmbeddedBinaries::new().with("Carabiner_Linux_x64", PAYLOAD));
    let mut m = materializer(&dir, source.clone());
    let path = m.materialize().expect("materialize").path().to_path_buf();

    // someone else got there first
    fs::remove_file(&path).expect("external removal");
    m.release().expect("release after external removal");
    m.release().expect("second release is a no-op");
    assert!(!cleanup::is_registered(&path));
    assert!(m.current().is_none());

    // a fresh extraction happens after release
    let again = m.materialize().expect("materialize again").path().to_path_buf();
    assert!(again.exists());
    assert_eq!(source.reads(), 2);
}

#[test]
fn dropping_the_materializer_removes_the_file() {
    let dir = TempDir::new().expect("tempdir");
    let mut m = materializer(
        &dir,
        Arc::new(EmbeddedBinaries::new().with("Carabiner_Linux_x64", PAYLOAD)),
    );
    let path = m.materialize().expect("materialize").path().to_path_buf();
    assert!(path.exists());

    drop(m);
    assert!(!path.exists());
    assert!(!cleanup::is_registered(&path));
}

#[test]
fn unwritable_temp_dir_is_an_io_error() {
    let dir = TempDir::new().expect("tempdir");
    let missing = dir.path().join("does-not-exist");
    let mut m = Materializer::new(
        linux_x64(),
        Arc::new(EmbeddedBinaries::new().with("Carabiner_Linux_x64", PAYLOAD)),
    )
    .with_temp_dir(&missing);

    let err = m.materialize().unwrap_err();
    assert!(matches!(err, RunnerError::Io { .. }), "got: {err}");
    assert!(err.to_string().contains("does-not-exist"));
}
