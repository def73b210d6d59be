//! Where supervisor output goes.
//!
//! The supervisor only decides the level and the text of each record; the
//! [`LogSink`] decides how it is stored. [`TracingSink`] forwards to `tracing`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => f.write_str("info"),
            LogLevel::Warn => f.write_str("warn"),
            LogLevel::Error => f.write_str("error"),
        }
    }
}

pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, text: &str);
}

/// Forwards every record to `tracing` under the `carabiner` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, text: &str) {
        match level {
            LogLevel::Info => tracing::info!(target: "carabiner", "{text}"),
            LogLevel::Warn => tracing::warn!(target: "carabiner", "{text}"),
            LogLevel::Error => tracing::error!(target: "carabiner", "{text}"),
        }
    }
}

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// `info` filter. Calling this more than once is harmless.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
