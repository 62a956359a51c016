//! Subcommand handlers for recording, list-devices, and config actions.

use chrono::Local;
use std::path::Path;

use super::args::{Args, ConfigAction};
use crate::chooser::{DeviceChooser, FirstDeviceChooser, NameChooser, PromptChooser};
use crate::config::{self, Config, DEFAULT_CONFIG_TOML};
use crate::devices::{self, MidiBackend};
use crate::error::{RecorderError, Result};
use crate::midi_input::MidirBackend;
use crate::session::{unique_output_path, Recorder, StopReason};
use crate::signal::{setup_ctrlc_handler, CancelToken};

/// Load the config file. An explicit `--config` path must exist; the
/// default path falls back to built-in settings.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(p) => Config::load_from_explicit(p)?,
        None => Config::load(None)?,
    };
    Ok(config)
}

/// Merge settings: CLI args > config file > built-in defaults.
pub fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(name) = &args.device {
        config.device.name = Some(name.clone());
    }
    if args.first {
        config.device.name = None;
        config.device.auto_select = true;
    }
    if let Some(dir) = &args.output_dir {
        config.output.directory = dir.clone();
    }
    if let Some(prefix) = &args.prefix {
        config.output.prefix = prefix.clone();
    }
    if let Some(resolution) = args.resolution {
        config.recording.resolution = resolution;
    }
    if let Some(tempo) = args.tempo {
        config.recording.tempo_bpm = tempo;
    }
    if let Some(timing) = args.timing {
        config.recording.timing = timing.into();
    }
    if args.keep_realtime {
        config.recording.filter_realtime = false;
    }
}

/// Selection policy for the merged configuration: a name pattern wins over
/// auto-select, and the interactive menu is the fallback.
pub fn chooser_for(config: &Config) -> Box<dyn DeviceChooser> {
    if let Some(name) = &config.device.name {
        Box::new(NameChooser::new(name.clone()))
    } else if config.device.auto_select {
        Box::new(FirstDeviceChooser)
    } else {
        Box::new(PromptChooser::stdio())
    }
}

/// Record from a device until Ctrl+C, then save.
pub fn record(args: &Args) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, args);
    let settings = config.recording_settings()?;

    let mut recorder = Recorder::new(MidirBackend::new());
    let devices = recorder.list_devices()?;

    let interactive = config.device.name.is_none() && !config.device.auto_select;
    if !interactive {
        devices::print_devices(&devices);
    }
    let mut chooser = chooser_for(&config);
    let device = recorder.select_device(chooser.as_mut(), &devices)?;
    println!("\nSelected MIDI input port: {}", device.name);

    // Installed after the prompt so Ctrl+C there still ends the process.
    let cancel = CancelToken::new();
    if let Err(e) = setup_ctrlc_handler(cancel.clone()) {
        log::warn!("Failed to set Ctrl+C handler: {}", e);
    }

    let dir = &config.output.directory;
    std::fs::create_dir_all(dir).map_err(|e| RecorderError::Io {
        path: dir.clone(),
        source: e,
    })?;
    let path = unique_output_path(dir, &config.output.prefix, Local::now());

    let mut session = recorder.start_session(&device, settings)?;
    println!("\nRecording MIDI events... Press Ctrl+C to stop recording.");

    let reason = recorder.capture_loop(&mut session, &cancel)?;
    match reason {
        StopReason::Interrupted => println!("\nRecording stopped."),
        StopReason::SourceDisconnected => println!("\nMIDI input disconnected, recording stopped."),
    }

    recorder.save(&session, &path)?;
    println!("\nRecording saved to: {}", path.display());
    Ok(())
}

/// List available MIDI inputs and print them to stdout.
pub fn list_devices(backend: &dyn MidiBackend) -> Result<()> {
    let devices = devices::list_devices(backend)?;
    devices::print_devices(&devices);
    println!();
    println!("Use --device <name> to record from a port without the menu.");
    Ok(())
}

/// Handle config subcommand actions.
pub fn handle_config_action(action: ConfigAction, path: Option<&Path>) -> Result<()> {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(config::default_path);

    match action {
        ConfigAction::Show => {
            let cfg = load_config(path)?;
            let settings = cfg.recording_settings()?;

            println!("Current configuration:");
            match (&cfg.device.name, cfg.device.auto_select) {
                (Some(name), _) => println!("  Device: first port matching '{}'", name),
                (None, true) => println!("  Device: first available port"),
                (None, false) => println!("  Device: ask"),
            }
            println!("  Resolution: {} ticks per quarter note", settings.resolution);
            println!("  Tempo: {} BPM", settings.tempo_bpm);
            println!(
                "  Time signature: {}/{}",
                settings.time_signature.0, settings.time_signature.1
            );
            println!("  Timing: {}", settings.timing);
            println!(
                "  Real-time messages: {}",
                if settings.filter_realtime { "dropped" } else { "kept" }
            );
            println!("  Output: {}", cfg.output.directory.display());
            println!("  Prefix: {}", cfg.output.prefix);
            println!();

            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found)", config_path.display());
            }
        }
        ConfigAction::Init => {
            if config_path.exists() {
                eprintln!("Use 'midi-recorder config show' to view current settings.");
                return Err(RecorderError::Io {
                    path: config_path,
                    source: std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "config file already exists",
                    ),
                });
            }

            let io_err = |source| RecorderError::Io {
                path: config_path.clone(),
                source,
            };
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
            std::fs::write(&config_path, DEFAULT_CONFIG_TOML).map_err(io_err)?;

            println!("Created config file: {}", config_path.display());
        }
    }
    Ok(())
}
