//! Runs the Carabiner helper: picks the binary for this platform, extracts
//! it, launches it, drains its output, and stops it again.

pub mod cleanup;
pub mod config;
mod error;
pub mod materialize;
pub mod paths;
pub mod platform;
pub mod sink;
pub mod source;
mod supervisor;

pub use cleanup::CleanupGuard;
pub use config::{Settings, SupervisorConfig};
pub use error::RunnerError;
pub use materialize::{ExecutableHandle, Materializer};
pub use platform::{Arch, Os, PlatformIdentifier};
pub use sink::{init_tracing, LogLevel, LogSink, TracingSink};
pub use source::{BinarySource, DirectoryBinaries, EmbeddedBinaries};
pub use supervisor::{
    classify_exit, exit_code, OutputLine, OutputStream, Supervisor, SupervisorState,
    Termination, LINE_CHANNEL_CAPACITY,
};
