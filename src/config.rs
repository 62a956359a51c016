//! Configuration file handling for midi-recorder.
//!
//! Loads configuration from `~/.config/midi-recorder/config.toml` or a custom path.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::session::RecordingSettings;
use crate::timing::TimingMode;

/// Largest resolution representable in a metrical SMF header (15 bits).
pub const MAX_RESOLUTION: u16 = 0x7FFF;

/// Tempo bounds. The lower bound keeps microseconds-per-quarter within 24 bits.
pub const MIN_TEMPO_BPM: f64 = 4.0;
pub const MAX_TEMPO_BPM: f64 = 1000.0;

/// Configuration file structure for midi-recorder.
/// Loaded from ~/.config/midi-recorder/config.toml (or custom path via --config).
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct DeviceConfig {
    /// Substring of the port name to pick without prompting
    pub name: Option<String>,
    /// Pick the first available port without prompting
    #[serde(default)]
    pub auto_select: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RecordingConfig {
    #[serde(default = "default_resolution")]
    pub resolution: u16,
    #[serde(default = "default_tempo")]
    pub tempo_bpm: f64,
    #[serde(default = "default_time_signature")]
    pub time_signature: (u8, u8),
    #[serde(default)]
    pub timing: TimingMode,
    #[serde(default = "default_true")]
    pub filter_realtime: bool,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        RecordingConfig {
            resolution: default_resolution(),
            tempo_bpm: default_tempo(),
            time_signature: default_time_signature(),
            timing: TimingMode::default(),
            filter_realtime: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct OutputConfig {
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            directory: default_directory(),
            prefix: default_prefix(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_resolution() -> u16 {
    480
}

fn default_tempo() -> f64 {
    120.0
}

fn default_time_signature() -> (u8, u8) {
    (4, 4)
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_prefix() -> String {
    "piano_recording".to_string()
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;
            Self::parse(&content, &path)
        } else {
            log::debug!("No config file at {}, using defaults", path.display());
            Ok(Config::default())
        }
    }

    /// Load configuration from a path the user named explicitly.
    /// Unlike [`Config::load`], a missing file is an error.
    pub fn load_from_explicit(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Validate the recording section and turn it into session settings.
    pub fn recording_settings(&self) -> Result<RecordingSettings, ConfigError> {
        let rec = &self.recording;
        let settings = RecordingSettings {
            resolution: rec.resolution,
            tempo_bpm: rec.tempo_bpm,
            time_signature: rec.time_signature,
            timing: rec.timing,
            filter_realtime: rec.filter_realtime,
        };
        settings.validate()?;
        Ok(settings)
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", path.display(), source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {}", path.display(), source)]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("midi-recorder").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/midi-recorder/config.toml")
        })
}

/// Contents written by `midi-recorder config init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# midi-recorder configuration

[device]
# Pick the first port whose name contains this text
# name = "Digital Piano"
# Skip the menu and record from the first port
auto_select = false

[recording]
# Ticks per quarter note
resolution = 480
# Tempo written to the tempo track
tempo_bpm = 120.0
# Numerator, denominator
time_signature = [4, 4]
# How wall-clock time becomes ticks: seconds, tempo, milliseconds
timing = "seconds"
# Drop clock/active-sensing and other real-time messages
filter_realtime = true

[output]
directory = "."
prefix = "piano_recording"
"#;
