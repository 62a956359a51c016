//! Recording session lifecycle.
//!
//! [`Recorder`] walks a session through
//! `Idle -> DeviceListed -> DeviceSelected -> Recording -> Stopping -> Saved`,
//! ending in `Aborted` when no device is found or the user cancels.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::chooser::DeviceChooser;
use crate::config::{ConfigError, MAX_RESOLUTION, MAX_TEMPO_BPM, MIN_TEMPO_BPM};
use crate::devices::{self, Device, EventSource, MidiBackend, RawMessage, Received};
use crate::error::{RecorderError, Result};
use crate::message::CapturedMessage;
use crate::recording::Recording;
use crate::signal::CancelToken;
use crate::timing::{TickClock, TimingMode};

/// Resolved recording parameters (config file and CLI merged).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordingSettings {
    /// Ticks per quarter note
    pub resolution: u16,
    pub tempo_bpm: f64,
    /// Numerator and denominator, e.g. `(4, 4)`
    pub time_signature: (u8, u8),
    pub timing: TimingMode,
    /// Drop real-time messages instead of storing them
    pub filter_realtime: bool,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        RecordingSettings {
            resolution: 480,
            tempo_bpm: 120.0,
            time_signature: (4, 4),
            timing: TimingMode::Seconds,
            filter_realtime: true,
        }
    }
}

impl RecordingSettings {
    /// Check that the settings can be written to a Standard MIDI File:
    /// resolution fits the 15-bit header, tempo stays within the 24-bit
    /// tempo event, and the time signature denominator is a power of two.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.resolution == 0 || self.resolution > MAX_RESOLUTION {
            return Err(ConfigError::Invalid(format!(
                "resolution must be between 1 and {}, got {}",
                MAX_RESOLUTION, self.resolution
            )));
        }
        if !(MIN_TEMPO_BPM..=MAX_TEMPO_BPM).contains(&self.tempo_bpm) {
            return Err(ConfigError::Invalid(format!(
                "tempo must be between {} and {} BPM, got {}",
                MIN_TEMPO_BPM, MAX_TEMPO_BPM, self.tempo_bpm
            )));
        }
        let (numerator, denominator) = self.time_signature;
        if numerator == 0 || !denominator.is_power_of_two() || denominator > 64 {
            return Err(ConfigError::Invalid(format!(
                "time signature {}/{} is not valid",
                numerator, denominator
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    DeviceListed,
    DeviceSelected,
    Recording,
    Stopping,
    Saved,
    Aborted,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::DeviceListed => "device-listed",
            SessionState::DeviceSelected => "device-selected",
            SessionState::Recording => "recording",
            SessionState::Stopping => "stopping",
            SessionState::Saved => "saved",
            SessionState::Aborted => "aborted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Saved | SessionState::Aborted)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why capture ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Ctrl+C or another cancellation
    Interrupted,
    /// The device stopped delivering
    SourceDisconnected,
}

/// Counters kept while capturing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub received: usize,
    pub stored: usize,
    pub filtered: usize,
    pub malformed: usize,
}

/// What happened to one incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    /// Appended to the track; carries the console line, if any
    Stored { delta: u32, description: Option<String> },
    /// Real-time message dropped by policy
    Filtered,
    /// Bytes that do not form a MIDI message
    Malformed,
}

/// An open device and the recording being filled from it.
pub struct Session {
    device: Device,
    settings: RecordingSettings,
    recording: Recording,
    clock: TickClock,
    source: Option<Box<dyn EventSource>>,
    stats: CaptureStats,
    stop_reason: Option<StopReason>,
}

impl Session {
    /// Session whose clock starts at `start`.
    pub fn new(
        device: Device,
        settings: RecordingSettings,
        source: Box<dyn EventSource>,
        start: Instant,
    ) -> Self {
        Session {
            device,
            recording: Recording::new(&settings),
            clock: TickClock::new(start, settings.timing, settings.resolution, settings.tempo_bpm),
            settings,
            source: Some(source),
            stats: CaptureStats::default(),
            stop_reason: None,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn settings(&self) -> &RecordingSettings {
        &self.settings
    }

    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn started_at(&self) -> Instant {
        self.clock.start()
    }

    /// Timestamp, filter, and append one raw message.
    pub fn ingest(&mut self, raw: &RawMessage) -> Ingested {
        self.stats.received += 1;

        let message = match CapturedMessage::parse(&raw.bytes) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("Ignoring {}", e);
                self.stats.malformed += 1;
                return Ingested::Malformed;
            }
        };

        if self.settings.filter_realtime && message.is_realtime() {
            self.stats.filtered += 1;
            return Ingested::Filtered;
        }

        let delta = self.clock.delta_for(raw.at);
        let description = message.describe();
        if description.is_none() {
            log::debug!("MIDI {:02X?} (delta {})", raw.bytes, delta);
        }
        self.recording.active_track_mut().push(delta, message);
        self.stats.stored += 1;

        Ingested::Stored { delta, description }
    }
}

/// Drives one recording from device discovery to the saved file.
pub struct Recorder<B> {
    backend: B,
    state: SessionState,
}

impl<B: MidiBackend> Recorder<B> {
    pub fn new(backend: B) -> Self {
        Recorder {
            backend,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn require_state(&self, expected: SessionState, action: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(RecorderError::InvalidState {
                action,
                state: self.state.as_str(),
            });
        }
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        log::debug!("Session {} -> {}", self.state, next);
        self.state = next;
    }

    /// Enumerate inputs.
    ///
    /// # Errors
    /// [`RecorderError::NoDeviceFound`] aborts the session.
    pub fn list_devices(&mut self) -> Result<Vec<Device>> {
        self.require_state(SessionState::Idle, "list devices")?;
        match devices::list_devices(&self.backend) {
            Ok(list) => {
                self.transition(SessionState::DeviceListed);
                Ok(list)
            }
            Err(e) => {
                if matches!(e, RecorderError::NoDeviceFound) {
                    self.transition(SessionState::Aborted);
                }
                Err(e)
            }
        }
    }

    /// Let `chooser` pick one of `devices`.
    pub fn select_device(
        &mut self,
        chooser: &mut dyn DeviceChooser,
        devices: &[Device],
    ) -> Result<Device> {
        self.require_state(SessionState::DeviceListed, "select a device")?;
        if devices.is_empty() {
            self.transition(SessionState::Aborted);
            return Err(RecorderError::NoDeviceFound);
        }

        match chooser.choose(devices) {
            Ok(device) if devices.contains(&device) => {
                self.transition(SessionState::DeviceSelected);
                Ok(device)
            }
            Ok(device) => Err(RecorderError::InvalidSelection(format!(
                "'{}' is not one of the listed devices",
                device.name
            ))),
            Err(e) => {
                if matches!(e, RecorderError::UserCancelled) {
                    self.transition(SessionState::Aborted);
                }
                Err(e)
            }
        }
    }

    /// Open `device` and start a recording. The clock starts once the device
    /// is open. Settings are validated before the device is touched.
    pub fn start_session(
        &mut self,
        device: &Device,
        settings: RecordingSettings,
    ) -> Result<Session> {
        self.require_state(SessionState::DeviceSelected, "start recording")?;
        settings.validate()?;
        let source = self.backend.open(device)?;
        let session = Session::new(device.clone(), settings, source, Instant::now());
        log::info!(
            "Recording from '{}' at {} TPQN, {} BPM, {} timing",
            device.name,
            settings.resolution,
            settings.tempo_bpm,
            settings.timing
        );
        self.transition(SessionState::Recording);
        Ok(session)
    }

    /// Receive until cancelled or the device disconnects, printing a line
    /// per note, pedal, or controller event.
    pub fn capture_loop(&mut self, session: &mut Session, cancel: &CancelToken) -> Result<StopReason> {
        self.require_state(SessionState::Recording, "capture")?;

        let reason = loop {
            let Some(source) = session.source.as_mut() else {
                break StopReason::SourceDisconnected;
            };
            match source.receive(cancel) {
                Received::Message(raw) => {
                    if let Ingested::Stored {
                        description: Some(line),
                        ..
                    } = session.ingest(&raw)
                    {
                        println!("{}", line);
                    }
                }
                Received::Cancelled => break StopReason::Interrupted,
                Received::Disconnected => {
                    log::warn!("MIDI input '{}' disconnected", session.device.name);
                    break StopReason::SourceDisconnected;
                }
            }
        };

        self.stop_session(session, reason)?;
        Ok(reason)
    }

    /// End capture and release the device. Nothing is recorded afterwards.
    pub fn stop_session(&mut self, session: &mut Session, reason: StopReason) -> Result<()> {
        self.require_state(SessionState::Recording, "stop")?;
        session.source = None;
        session.stop_reason = Some(reason);
        let stats = session.stats;
        log::info!(
            "Capture stopped ({:?}): {} received, {} stored, {} filtered, {} malformed",
            reason,
            stats.received,
            stats.stored,
            stats.filtered,
            stats.malformed
        );
        self.transition(SessionState::Stopping);
        Ok(())
    }

    /// Write the recording to `path`. Returns once the file is on disk.
    pub fn save(&mut self, session: &Session, path: &Path) -> Result<()> {
        self.require_state(SessionState::Stopping, "save")?;
        session.recording.save(path)?;
        self.transition(SessionState::Saved);
        Ok(())
    }
}

/// `<dir>/<prefix>_<YYYYmmdd_HHMMSS>.mid`
pub fn output_path(dir: &Path, prefix: &str, now: DateTime<Local>) -> PathBuf {
    dir.join(format!("{}_{}.mid", prefix, now.format("%Y%m%d_%H%M%S")))
}

/// Like [`output_path`], adding `_1`, `_2`, ... when a file of that name
/// already exists.
pub fn unique_output_path(dir: &Path, prefix: &str, now: DateTime<Local>) -> PathBuf {
    let base = output_path(dir, prefix, now);
    if !base.exists() {
        return base;
    }
    let stem = format!("{}_{}", prefix, now.format("%Y%m%d_%H%M%S"));
    (1..)
        .map(|n| dir.join(format!("{}_{}.mid", stem, n)))
        .find(|p| !p.exists())
        .unwrap_or(base)
}
