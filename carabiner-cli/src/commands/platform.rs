//! `carabiner platform`: resource key and binary availability for this host.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use carabiner_runner::{paths, BinarySource, DirectoryBinaries, PlatformIdentifier};

use super::{home_dir, load_settings};

/// Arguments for `carabiner platform`.
#[derive(Args, Debug)]
pub struct PlatformArgs {
    /// Directory holding `Carabiner_<os>_<arch>` binaries.
    #[arg(long, value_name = "DIR")]
    pub binary_dir: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl PlatformArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let dir = match self.binary_dir {
            Some(dir) => dir,
            None => load_settings(&home)?
                .binary_dir
                .unwrap_or_else(|| paths::binaries_dir(&home)),
        };

        let platform = PlatformIdentifier::identify();
        let key = platform.resource_key();
        let source = DirectoryBinaries::new(&dir);
        let available = source.contains(&key);
        let binary = source.dir().join(&key);

        if self.json {
            let payload = serde_json::json!({
                "os": platform.os.to_string(),
                "arch": platform.arch.to_string(),
                "resource_key": key,
                "binary": binary.display().to_string(),
                "available": available,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to render platform JSON")?
            );
            return Ok(());
        }

        println!("platform:     {platform}");
        println!("resource key: {key}");
        if available {
            println!("binary:       {} (available)", binary.display());
        } else {
            println!("binary:       {} (not found)", binary.display());
        }
        Ok(())
    }
}
