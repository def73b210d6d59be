//! `carabiner run`: supervise the helper in the foreground.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;

use carabiner_protocol::Message;
use carabiner_runner::{
    cleanup, init_tracing, paths, DirectoryBinaries, Materializer, OutputLine, OutputStream,
    PlatformIdentifier, Settings, Supervisor, SupervisorConfig, SupervisorState, TracingSink,
};

use super::{home_dir, load_settings, render_json, render_text};

/// How long to keep reading output once the helper has exited.
const FLUSH_GRACE: Duration = Duration::from_millis(200);

/// Arguments for `carabiner run`. Flags override `~/.carabiner/config.yaml`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// TCP port Carabiner listens on (1-32767).
    #[arg(long)]
    pub port: Option<u32>,

    /// Link polling interval in milliseconds (1-1000).
    #[arg(long, value_name = "MS")]
    pub poll: Option<u32>,

    /// Directory holding `Carabiner_<os>_<arch>` binaries.
    #[arg(long, value_name = "DIR")]
    pub binary_dir: Option<PathBuf>,

    /// Print each message as JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let _cleanup = cleanup::guard();
        init_tracing();

        let home = home_dir()?;
        let flags = Settings {
            port: self.port,
            update_interval_ms: self.poll,
            binary_dir: self.binary_dir,
        };
        let settings = flags.or(load_settings(&home)?);
        let config = settings
            .supervisor_config()
            .context("invalid Carabiner configuration")?;
        let binary_dir = settings
            .binary_dir
            .unwrap_or_else(|| paths::binaries_dir(&home));

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start tokio runtime")?;
        runtime.block_on(supervise(config, binary_dir, self.json))
    }
}

async fn supervise(config: SupervisorConfig, binary_dir: PathBuf, json: bool) -> Result<()> {
    let platform = PlatformIdentifier::identify();
    let materializer = Materializer::new(
        platform.clone(),
        Arc::new(DirectoryBinaries::new(&binary_dir)),
    );
    let supervisor = Supervisor::with_config(materializer, Arc::new(TracingSink), config);
    if !supervisor.can_run().await {
        bail!(
            "no Carabiner binary for {platform}: expected {}",
            binary_dir.join(platform.resource_key()).display()
        );
    }

    let mut lines = supervisor.subscribe();
    let mut state = supervisor.watch_state();
    supervisor.start().await.context("failed to start Carabiner")?;

    loop {
        tokio::select! {
            line = lines.recv() => match line {
                Ok(line) => print_line(&line, json)?,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "fell behind Carabiner output");
                }
                Err(RecvError::Closed) => break,
            },
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == SupervisorState::Idle {
                    flush(&mut lines, json).await?;
                    break;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("ctrl-c handler failed")?;
                tracing::info!("received ctrl-c, stopping Carabiner");
                break;
            }
        }
    }

    supervisor
        .shutdown()
        .await
        .context("failed to shut down Carabiner")
}

/// Drain lines still in flight after the helper exited.
async fn flush(lines: &mut Receiver<OutputLine>, json: bool) -> Result<()> {
    while let Ok(line) = tokio::time::timeout(FLUSH_GRACE, lines.recv()).await {
        match line {
            Ok(line) => print_line(&line, json)?,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
    Ok(())
}

fn print_line(line: &OutputLine, json: bool) -> Result<()> {
    if line.stream != OutputStream::Stdout {
        return Ok(());
    }
    match Message::decode(&line.text) {
        Ok(message) if json => println!("{}", render_json(&message)?),
        Ok(message) => println!("{}", render_text(&message)),
        Err(err) => tracing::warn!(line = %line.text, error = %err, "ignoring malformed Carabiner message"),
    }
    Ok(())
}
