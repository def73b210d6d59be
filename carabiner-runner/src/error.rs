use std::path::PathBuf;

use thiserror::Error;

/// Error surface for platform lookup, binary extraction, and process control.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("incompatible platform: there is no Carabiner binary named {key}")]
    PlatformUnsupported { key: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    #[error("failed to parse settings at {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RunnerError {
    RunnerError::Io {
        path: path.into(),
        source,
    }
}
