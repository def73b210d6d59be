//! Supervisor configuration and the optional settings file.

use std::fs;
use std::io::ErrorKind;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, RunnerError};

pub const DEFAULT_PORT: u16 = 17000;
pub const DEFAULT_UPDATE_INTERVAL_MS: u16 = 20;

pub const PORT_RANGE: RangeInclusive<u32> = 1..=32767;
pub const UPDATE_INTERVAL_RANGE: RangeInclusive<u32> = 1..=1000;

/// Port and polling interval handed to Carabiner on launch.
///
/// Always within range: the only ways to build one are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    port: u16,
    update_interval_ms: u16,
}

impl SupervisorConfig {
    pub fn new(port: u32, update_interval_ms: u32) -> Result<Self, RunnerError> {
        Ok(Self {
            port: validate_port(port)?,
            update_interval_ms: validate_update_interval(update_interval_ms)?,
        })
    }

    /// TCP port Carabiner listens on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// How often, in milliseconds, Carabiner checks for Link changes.
    pub fn update_interval_ms(&self) -> u16 {
        self.update_interval_ms
    }

    pub fn with_port(self, port: u32) -> Result<Self, RunnerError> {
        Ok(Self {
            port: validate_port(port)?,
            ..self
        })
    }

    pub fn with_update_interval(self, update_interval_ms: u32) -> Result<Self, RunnerError> {
        Ok(Self {
            update_interval_ms: validate_update_interval(update_interval_ms)?,
            ..self
        })
    }

    /// Command-line arguments for the helper process.
    pub fn launch_args(&self) -> Vec<String> {
        vec![
            "--daemon".to_string(),
            "--port".to_string(),
            self.port.to_string(),
            "--poll".to_string(),
            self.update_interval_ms.to_string(),
        ]
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
        }
    }
}

fn validate_port(port: u32) -> Result<u16, RunnerError> {
    if !PORT_RANGE.contains(&port) {
        return Err(RunnerError::InvalidArgument(format!(
            "port must be between 1 and 32767, got {port}"
        )));
    }
    u16::try_from(port).map_err(|_| RunnerError::InvalidArgument(format!("port {port} out of range")))
}

fn validate_update_interval(ms: u32) -> Result<u16, RunnerError> {
    if !UPDATE_INTERVAL_RANGE.contains(&ms) {
        return Err(RunnerError::InvalidArgument(format!(
            "update interval must be between 1 and 1000 ms, got {ms}"
        )));
    }
    u16::try_from(ms).map_err(|_| {
        RunnerError::InvalidArgument(format!("update interval {ms} out of range"))
    })
}

// ---------------------------------------------------------------------------
// Settings file
// ---------------------------------------------------------------------------

/// Contents of `~/.carabiner/config.yaml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_interval_ms: Option<u32>,
    /// Directory holding `Carabiner_<os>_<arch>` binaries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary_dir: Option<PathBuf>,
}

impl Settings {
    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, RunnerError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(io_err(path, err)),
        };
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).map_err(|source| RunnerError::Settings {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Fill unset fields from `fallback`.
    pub fn or(self, fallback: Settings) -> Settings {
        Settings {
            port: self.port.or(fallback.port),
            update_interval_ms: self.update_interval_ms.or(fallback.update_interval_ms),
            binary_dir: self.binary_dir.or(fallback.binary_dir),
        }
    }

    /// Validated supervisor config, using defaults for unset fields.
    pub fn supervisor_config(&self) -> Result<SupervisorConfig, RunnerError> {
        SupervisorConfig::new(
            self.port.unwrap_or(u32::from(DEFAULT_PORT)),
            self.update_interval_ms
                .unwrap_or(u32::from(DEFAULT_UPDATE_INTERVAL_MS)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case(1)]
    #[case(17000)]
    #[case(32767)]
    fn accepts_ports_in_range(#[case] port: u32) {
        let config = SupervisorConfig::new(port, 20).expect("valid port");
        assert_eq!(u32::from(config.port()), port);
    }

    #[rstest]
    #[case(0)]
    #[case(32768)]
    #[case(65535)]
    fn rejects_ports_out_of_range(#[case] port: u32) {
        let err = SupervisorConfig::new(port, 20).unwrap_err();
        assert!(matches!(err, RunnerError::InvalidArgument(_)), "got: {err}");
    }

    #[rstest]
    #[case(0, false)]
    #[case(1, true)]
    #[case(1000, true)]
    #[case(1001, false)]
    fn update_interval_bounds(#[case] ms: u32, #[case] ok: bool) {
        assert_eq!(SupervisorConfig::new(17000, ms).is_ok(), ok);
        assert_eq!(SupervisorConfig::default().with_update_interval(ms).is_ok(), ok);
    }

    #[test]
    fn defaults_match_carabiner() {
        let config = SupervisorConfig::default();
        assert_eq!(config.port(), 17000);
        assert_eq!(config.update_interval_ms(), 20);
    }

    #[test]
    fn launch_args_are_positional_flags() {
        let config = SupervisorConfig::new(17001, 50).expect("config");
        assert_eq!(
            config.launch_args(),
            vec!["--daemon", "--port", "17001", "--poll", "50"]
        );
    }

    #[test]
    fn with_port_keeps_interval() {
        let config = SupervisorConfig::new(17000, 33)
            .and_then(|c| c.with_port(18000))
            .expect("config");
        assert_eq!(config.port(), 18000);
        assert_eq!(config.update_interval_ms(), 33);
    }

    #[test]
    fn missing_settings_file_yields_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let settings = Settings::load(&dir.path().join("config.yaml")).expect("load");
        assert_eq!(settings, Settings::default());
        assert_eq!(
            settings.supervisor_config().expect("config"),
            SupervisorConfig::default()
        );
    }

    #[test]
    fn settings_file_is_parsed_and_validated() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("config.yaml");
        fs::write(&path, "port: 17100\nupdate_interval_ms: 40\nbinary_dir: /opt/carabiner\n")
            .expect("write");

        let settings = Settings::load(&path).expect("load");
        assert_eq!(settings.port, Some(17100));
        assert_eq!(settings.binary_dir, Some(PathBuf::from("/opt/carabiner")));
        let config = settings.supervisor_config().expect("config");
        assert_eq!(config.update_interval_ms(), 40);

        fs::write(&path, "port: 40000\n").expect("write");
        let err = Settings::load(&path)
            .expect("load")
            .supervisor_config()
            .unwrap_err();
        assert!(matches!(err, RunnerError::InvalidArgument(_)));
    }

    #[test]
    fn unknown_settings_keys_are_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("config.yaml");
        fs::write(&path, "prot: 17100\n").expect("write");
        let err = Settings::load(&path).unwrap_err();
        assert!(matches!(err, RunnerError::Settings { .. }), "got: {err}");
        assert!(err.to_string().contains("config.yaml"));
    }

    #[test]
    fn flags_override_file_values() {
        let file = Settings {
            port: Some(17100),
            update_interval_ms: Some(40),
            binary_dir: None,
        };
        let flags = Settings {
            port: Some(17200),
            ..Settings::default()
        };
        let merged = flags.or(file);
        assert_eq!(merged.port, Some(17200));
        assert_eq!(merged.update_interval_ms, Some(40));
    }
}
