//! Carabiner: run the Ableton Link bridge and read what it says.
//!
//! # Usage
//!
//! ```text
//! carabiner run [--port <port>] [--poll <ms>] [--binary-dir <dir>] [--json]
//! carabiner decode [--text] [<line>...]
//! carabiner platform [--binary-dir <dir>] [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{decode::DecodeArgs, platform::PlatformArgs, run::RunArgs};

#[derive(Parser, Debug)]
#[command(
    name = "carabiner",
    version,
    about = "Supervise the Carabiner helper and decode its messages",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start Carabiner and print every message it reports until Ctrl-C.
    Run(RunArgs),

    /// Decode Carabiner message lines given as arguments or on stdin.
    Decode(DecodeArgs),

    /// Show which Carabiner binary this host needs and whether it is present.
    Platform(PlatformArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Decode(args) => args.run(),
        Commands::Platform(args) => args.run(),
    }
}
