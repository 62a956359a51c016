//! CLI argument parsing with clap.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use super::enums::Timing;
use crate::config::{MAX_RESOLUTION, MAX_TEMPO_BPM, MIN_TEMPO_BPM};

/// Parse and validate resolution (1-32767 ticks per quarter note)
fn parse_resolution(s: &str) -> Result<u16, String> {
    let ticks: u16 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid resolution", s))?;
    if ticks == 0 || ticks > MAX_RESOLUTION {
        return Err(format!(
            "Resolution must be between 1 and {}, got {}",
            MAX_RESOLUTION, ticks
        ));
    }
    Ok(ticks)
}

/// Parse and validate tempo in BPM
fn parse_tempo(s: &str) -> Result<f64, String> {
    let bpm: f64 = s.parse().map_err(|_| format!("'{}' is not a valid number", s))?;
    if !(MIN_TEMPO_BPM..=MAX_TEMPO_BPM).contains(&bpm) {
        return Err(format!(
            "Tempo must be between {} and {} BPM, got {}",
            MIN_TEMPO_BPM, MAX_TEMPO_BPM, bpm
        ));
    }
    Ok(bpm)
}

/// Record a MIDI input device to a Standard MIDI File
#[derive(Parser, Debug)]
#[command(name = "midi-recorder")]
#[command(version, about = "Record a MIDI input device to a Standard MIDI File", long_about = None)]
#[command(after_help = "EXAMPLES:
    # Pick a port from the menu, press Ctrl+C to stop and save
    midi-recorder

    # Record from the first port whose name contains \"Piano\"
    midi-recorder --device Piano

    # Millisecond ticks, keep MIDI clock messages
    midi-recorder --first --timing milliseconds --keep-realtime")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Record from the first input whose name contains this text
    #[arg(long, short)]
    pub device: Option<String>,

    /// Record from the first available input without prompting
    #[arg(long, conflicts_with = "device")]
    pub first: bool,

    /// Directory for the recorded file (default: current directory)
    #[arg(long, short)]
    pub output_dir: Option<PathBuf>,

    /// File name prefix (default: piano_recording)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Ticks per quarter note (default: 480)
    #[arg(long, short, value_parser = parse_resolution)]
    pub resolution: Option<u16>,

    /// Tempo written to the file in BPM (default: 120)
    #[arg(long, short, value_parser = parse_tempo)]
    pub tempo: Option<f64>,

    /// How elapsed time becomes ticks
    #[arg(long, value_enum)]
    pub timing: Option<Timing>,

    /// Store clock and other real-time messages instead of dropping them
    #[arg(long)]
    pub keep_realtime: bool,

    /// Config file path
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(long, short, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List available MIDI input ports
    ListDevices,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}
