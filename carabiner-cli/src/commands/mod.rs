pub mod decode;
pub mod platform;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use carabiner_protocol::{Details, Message};
use carabiner_runner::{paths, Settings};

/// Home directory, as the settings file and default binary dir live under it.
pub(crate) fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

pub(crate) fn load_settings(home: &Path) -> Result<Settings> {
    let path = paths::settings_path(home);
    Settings::load(&path).with_context(|| format!("failed to load {}", path.display()))
}

/// One-line human rendering: `status bpm=120.5 peers=1`.
pub(crate) fn render_text(message: &Message) -> String {
    let tag = message.message_type();
    match message.details() {
        Details::Absent => tag.to_string(),
        Details::Text(text) => format!("{tag} {text:?}"),
        Details::Symbol(symbol) => format!("{tag} {symbol}"),
        Details::Map(map) => {
            let fields: Vec<String> = map.iter().map(|(k, v)| format!("{k}={v}")).collect();
            if fields.is_empty() {
                tag.to_string()
            } else {
                format!("{tag} {}", fields.join(" "))
            }
        }
    }
}

pub(crate) fn render_json(message: &Message) -> Result<String> {
    serde_json::to_string(message).context("failed to render message JSON")
}
