//! Lifecycle of the Carabiner helper process.
//!
//! A [`Supervisor`] is either idle or running one child. `start` and `stop`
//! are idempotent. While the child runs, two drain tasks copy its stdout and
//! stderr line by line into the [`LogSink`] and onto a broadcast channel.
//! Whichever drain task sees end-of-stream first takes the child out of the
//! process slot, waits for it, and logs how it ended; the other finds the
//! slot already empty and exits quietly.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, watch, Mutex};

use crate::config::SupervisorConfig;
use crate::error::{io_err, RunnerError};
use crate::materialize::Materializer;
use crate::platform::PlatformIdentifier;
use crate::sink::{LogLevel, LogSink};

/// Capacity of the output line broadcast channel. Slow subscribers lag and
/// skip lines rather than blocking the drain tasks.
pub const LINE_CHANNEL_CAPACITY: usize = 256;

/// Spawn attempts while the freshly written executable is still busy.
const SPAWN_BUSY_RETRIES: u32 = 5;
const SPAWN_BUSY_BACKOFF: Duration = Duration::from_millis(20);

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    /// Sink level used for lines from this stream.
    pub fn level(self) -> LogLevel {
        match self {
            OutputStream::Stdout => LogLevel::Info,
            OutputStream::Stderr => LogLevel::Error,
        }
    }
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => f.write_str("stdout"),
            OutputStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// One line printed by the helper, without its line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running { pid: Option<u32> },
}

/// How the helper process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Normal,
    /// Ended by our own `stop()` signal.
    Forced,
    Abnormal(i32),
}

impl Termination {
    pub fn level(self) -> LogLevel {
        match self {
            Termination::Normal | Termination::Forced => LogLevel::Info,
            Termination::Abnormal(_) => LogLevel::Warn,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Normal => f.write_str("Carabiner exited normally"),
            Termination::Forced => f.write_str("Carabiner was forcibly terminated"),
            Termination::Abnormal(code) => {
                write!(f, "Carabiner exited abnormally with status {code}")
            }
        }
    }
}

/// Classify an exit status the way the platform reports our own stop signal:
/// SIGTERM surfaces as 143 off Windows, `TerminateProcess` as 1 on Windows.
pub fn classify_exit(code: i32, platform: &PlatformIdentifier) -> Termination {
    match code {
        0 => Termination::Normal,
        143 if !platform.is_windows() => Termination::Forced,
        1 if platform.is_windows() => Termination::Forced,
        other => Termination::Abnormal(other),
    }
}

/// Shell-style exit code: signal deaths become `128 + signal`.
pub fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(-1)
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

pub struct Supervisor {
    shared: Arc<Shared>,
}

struct Shared {
    platform: PlatformIdentifier,
    sink: Arc<dyn LogSink>,
    lines: broadcast::Sender<OutputLine>,
    state: watch::Sender<SupervisorState>,
    /// Serializes start/stop/configure. Owns everything only they touch.
    control: Mutex<Control>,
    /// Non-empty exactly while a child is believed to be running.
    slot: Mutex<Option<Running>>,
    generations: AtomicU64,
}

struct Control {
    config: SupervisorConfig,
    materializer: Materializer,
}

struct Running {
    generation: u64,
    child: Child,
}

impl Supervisor {
    pub fn new(materializer: Materializer, sink: Arc<dyn LogSink>) -> Self {
        Self::with_config(materializer, sink, SupervisorConfig::default())
    }

    pub fn with_config(
        materializer: Materializer,
        sink: Arc<dyn LogSink>,
        config: SupervisorConfig,
    ) -> Self {
        let (lines, _) = broadcast::channel(LINE_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(SupervisorState::Idle);
        Self {
            shared: Arc::new(Shared {
                platform: materializer.platform().clone(),
                sink,
                lines,
                state,
                control: Mutex::new(Control {
                    config,
                    materializer,
                }),
                slot: Mutex::new(None),
                generations: AtomicU64::new(0),
            }),
        }
    }

    pub fn platform(&self) -> &PlatformIdentifier {
        &self.shared.platform
    }

    /// Receive every line the helper prints from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<OutputLine> {
        self.shared.lines.subscribe()
    }

    /// Last published state. Flips to `Idle` only after termination has been
    /// classified and logged, and only if no newer child was started meanwhile.
    pub fn state(&self) -> SupervisorState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SupervisorState> {
        self.shared.state.subscribe()
    }

    pub async fn is_running(&self) -> bool {
        self.shared.slot.lock().await.is_some()
    }

    /// Whether a compatible binary is available for this platform.
    pub async fn can_run(&self) -> bool {
        let control = self.shared.control.lock().await;
        control.materializer.can_supply(&self.shared.platform)
    }

    pub async fn config(&self) -> SupervisorConfig {
        self.shared.control.lock().await.config
    }

    /// Path of the extracted binary, once `start` has extracted it.
    pub async fn executable_path(&self) -> Option<PathBuf> {
        let control = self.shared.control.lock().await;
        control
            .materializer
            .current()
            .map(|handle| handle.path().to_path_buf())
    }

    /// Replace the configuration. Fails while the helper is running.
    pub async fn configure(&self, config: SupervisorConfig) -> Result<(), RunnerError> {
        let mut control = self.shared.control.lock().await;
        self.ensure_idle().await?;
        control.config = config;
        Ok(())
    }

    pub async fn set_port(&self, port: u32) -> Result<(), RunnerError> {
        let mut control = self.shared.control.lock().await;
        let config = control.config.with_port(port)?;
        self.ensure_idle().await?;
        control.config = config;
        Ok(())
    }

    pub async fn set_update_interval(&self, update_interval_ms: u32) -> Result<(), RunnerError> {
        let mut control = self.shared.control.lock().await;
        let config = control.config.with_update_interval(update_interval_ms)?;
        self.ensure_idle().await?;
        control.config = config;
        Ok(())
    }

    async fn ensure_idle(&self) -> Result<(), RunnerError> {
        if self.shared.slot.lock().await.is_some() {
            return Err(RunnerError::IllegalState(
                "cannot reconfigure Carabiner while it is running",
            ));
        }
        Ok(())
    }

    /// Launch the helper unless it is already running.
    ///
    /// Extraction and spawn failures are returned as-is; nothing is retried
    /// apart from a short wait while the new executable is still busy.
    pub async fn start(&self) -> Result<(), RunnerError> {
        let mut control = self.shared.control.lock().await;
        if self.shared.slot.lock().await.is_some() {
            return Ok(());
        }

        let config = control.config;
        let executable = control.materializer.materialize()?.path().to_path_buf();
        let mut child = spawn_helper(&executable, &config).await?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(io_err(
                &executable,
                io::Error::other("Carabiner output pipes unavailable"),
            ));
        };

        let pid = child.id();
        let generation = self.shared.generations.fetch_add(1, Ordering::Relaxed) + 1;
        {
            // State changes are published under the slot lock so a late
            // reporter for an older child cannot interleave.
            let mut slot = self.shared.slot.lock().await;
            *slot = Some(Running { generation, child });
            self.shared
                .state
                .send_replace(SupervisorState::Running { pid });
        }

        let pid_text = pid.map_or_else(|| "unknown".to_string(), |pid| pid.to_string());
        self.shared.sink.log(
            LogLevel::Info,
            &format!(
                "Carabiner started (pid {pid_text}, port {}, poll {} ms)",
                config.port(),
                config.update_interval_ms()
            ),
        );
        tracing::debug!(generation, executable = %executable.display(), "spawned drain tasks");

        tokio::spawn(drain(
            self.shared.clone(),
            generation,
            OutputStream::Stdout,
            stdout,
        ));
        tokio::spawn(drain(
            self.shared.clone(),
            generation,
            OutputStream::Stderr,
            stderr,
        ));
        drop(control);
        Ok(())
    }

    /// Ask the helper to exit. Returns without waiting; use
    /// [`wait_for_idle`](Self::wait_for_idle) to observe the exit.
    pub async fn stop(&self) -> Result<(), RunnerError> {
        self.shared.stop(None).await
    }

    /// Resolve once no helper is running.
    pub async fn wait_for_idle(&self) {
        let mut state = self.shared.state.subscribe();
        // The sender lives in `shared`, which we hold, so this cannot fail.
        let _ = state
            .wait_for(|state| *state == SupervisorState::Idle)
            .await;
    }

    /// Stop the helper, wait for it to exit, and delete the extracted binary.
    pub async fn shutdown(self) -> Result<(), RunnerError> {
        self.stop().await?;
        self.wait_for_idle().await;
        let mut control = self.shared.control.lock().await;
        control.materializer.release()
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.shared.slot.try_lock() {
            if let Some(running) = slot.as_mut() {
                if let Err(err) = terminate(&mut running.child) {
                    tracing::warn!(error = %err, "failed to stop Carabiner on drop");
                }
            }
        }
    }
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("platform", &self.shared.platform)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Shared {
    /// Signal the running child. With `Some(generation)`, only that child.
    async fn stop(&self, generation: Option<u64>) -> Result<(), RunnerError> {
        let _control = self.control.lock().await;
        let mut slot = self.slot.lock().await;
        let Some(running) = slot.as_mut() else {
            return Ok(());
        };
        if generation.is_some_and(|generation| generation != running.generation) {
            return Ok(());
        }
        terminate(&mut running.child)
    }

    fn publish(&self, stream: OutputStream, text: String) {
        self.sink.log(stream.level(), &text);
        // No subscribers is fine.
        let _ = self.lines.send(OutputLine { stream, text });
    }

    async fn report_termination(&self, generation: u64) {
        let running = {
            let mut slot = self.slot.lock().await;
            let owned = slot
                .as_ref()
                .is_some_and(|running| running.generation == generation);
            if owned {
                slot.take()
            } else {
                None
            }
        };
        let Some(Running { mut child, .. }) = running else {
            return;
        };

        let waited = child.wait().await;
        let (level, text) = termination_record(waited, &self.platform);
        self.sink.log(level, &text);
        tracing::debug!(generation, "Carabiner exit reported");

        // A newer child may have been started while we waited.
        let slot = self.slot.lock().await;
        if slot.is_none() {
            self.state.send_replace(SupervisorState::Idle);
        }
    }
}

/// Sink record for the outcome of waiting on the helper.
fn termination_record(
    waited: io::Result<ExitStatus>,
    platform: &PlatformIdentifier,
) -> (LogLevel, String) {
    match waited {
        Ok(status) => {
            let termination = classify_exit(exit_code(status), platform);
            (termination.level(), termination.to_string())
        }
        Err(err) => (
            LogLevel::Warn,
            format!("Unexpected problem waiting for Carabiner to exit: {err}"),
        ),
    }
}

async fn drain<R>(shared: Arc<Shared>, generation: u64, stream: OutputStream, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(trim_line_ending(&buf)).into_owned();
                shared.publish(stream, text);
            }
            Err(err) => {
                shared.sink.log(
                    LogLevel::Error,
                    &format!("Problem reading Carabiner {stream}: {err}"),
                );
                if let Err(err) = shared.stop(Some(generation)).await {
                    shared.sink.log(
                        LogLevel::Error,
                        &format!("Problem stopping Carabiner: {err}"),
                    );
                }
                break;
            }
        }
    }
    shared.report_termination(generation).await;
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

async fn spawn_helper(executable: &Path, config: &SupervisorConfig) -> Result<Child, RunnerError> {
    let mut command = Command::new(executable);
    command
        .args(config.launch_args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut attempts = 0;
    loop {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(err) if is_text_file_busy(&err) && attempts < SPAWN_BUSY_RETRIES => {
                attempts += 1;
                tokio::time::sleep(SPAWN_BUSY_BACKOFF).await;
            }
            Err(err) => return Err(io_err(executable, err)),
        }
    }
}

#[cfg(unix)]
fn is_text_file_busy(err: &io::Error) -> bool {
    err.raw_os_error() == Some(nix::errno::Errno::ETXTBSY as i32)
}

#[cfg(not(unix))]
fn is_text_file_busy(_err: &io::Error) -> bool {
    false
}

#[cfg(unix)]
fn terminate(child: &mut Child) -> Result<(), RunnerError> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // Already reaped.
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = i32::try_from(pid)
        .map_err(|_| RunnerError::InvalidArgument(format!("pid {pid} out of range")))?;
    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(io_err("kill(SIGTERM)", io::Error::from(errno))),
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> Result<(), RunnerError> {
    child
        .start_kill()
        .map_err(|e| io_err("TerminateProcess", e))
}
