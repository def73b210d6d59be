use std::path::{Path, PathBuf};

pub const SETTINGS_FILE: &str = "config.yaml";
pub const BINARIES_DIR: &str = "bin";

pub fn carabiner_root(home: &Path) -> PathBuf {
    home.join(".carabiner")
}

pub fn settings_path(home: &Path) -> PathBuf {
    carabiner_root(home).join(SETTINGS_FILE)
}

/// Default directory searched for `Carabiner_<os>_<arch>` binaries.
pub fn binaries_dir(home: &Path) -> PathBuf {
    carabiner_root(home).join(BINARIES_DIR)
}
