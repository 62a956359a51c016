//! End-to-end tests for the recorder lifecycle against scripted MIDI sources.
//!
//! These cover device listing, selection, capture, interruption, and the
//! saved file without needing real MIDI hardware.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::unbounded;
use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use tempfile::TempDir;

use midi_recorder::chooser::{FirstDeviceChooser, NameChooser, PromptChooser};
use midi_recorder::devices::{ChannelSource, Device, EventSource, MidiBackend, RawMessage, Received};
use midi_recorder::session::{Recorder, RecordingSettings, SessionState, StopReason};
use midi_recorder::signal::CancelToken;
use midi_recorder::timing::TimingMode;
use midi_recorder::RecorderError;

// ==================== Test Doubles ====================

/// Shared reference instant for scripted offsets; unset means "first receive".
type ScriptBase = Arc<Mutex<Option<Instant>>>;

/// Plays back `(offset, bytes)` pairs, then behaves as if Ctrl+C was pressed.
struct ScriptedSource {
    base: ScriptBase,
    script: VecDeque<(u64, Vec<u8>)>,
    interrupt: CancelToken,
    disconnect_at_end: bool,
}

impl EventSource for ScriptedSource {
    fn receive(&mut self, cancel: &CancelToken) -> Received {
        if cancel.is_cancelled() {
            return Received::Cancelled;
        }
        match self.script.pop_front() {
            Some((millis, bytes)) => {
                let base = *self.base.lock().unwrap().get_or_insert_with(Instant::now);
                Received::Message(RawMessage {
                    at: base + Duration::from_millis(millis),
                    bytes,
                })
            }
            None if self.disconnect_at_end => Received::Disconnected,
            None => {
                self.interrupt.cancel();
                Received::Cancelled
            }
        }
    }
}

struct ScriptedBackend {
    names: Vec<&'static str>,
    base: ScriptBase,
    script: Vec<(u64, Vec<u8>)>,
    interrupt: CancelToken,
    disconnect_at_end: bool,
    opened: Vec<String>,
}

impl ScriptedBackend {
    fn new(names: &[&'static str], script: Vec<(u64, Vec<u8>)>, interrupt: CancelToken) -> Self {
        ScriptedBackend {
            names: names.to_vec(),
            base: ScriptBase::default(),
            script,
            interrupt,
            disconnect_at_end: false,
            opened: Vec::new(),
        }
    }
}

impl MidiBackend for ScriptedBackend {
    fn list(&self) -> midi_recorder::Result<Vec<Device>> {
        Ok(self
            .names
            .iter()
            .enumerate()
            .map(|(index, name)| Device {
                index,
                name: name.to_string(),
            })
            .collect())
    }

    fn open(&mut self, device: &Device) -> midi_recorder::Result<Box<dyn EventSource>> {
        self.opened.push(device.name.clone());
        Ok(Box::new(ScriptedSource {
            base: self.base.clone(),
            script: self.script.clone().into(),
            interrupt: self.interrupt.clone(),
            disconnect_at_end: self.disconnect_at_end,
        }))
    }
}

/// Backend whose single device is fed through a channel by the test.
struct ChannelBackend {
    rx: Option<crossbeam_channel::Receiver<RawMessage>>,
}

impl MidiBackend for ChannelBackend {
    fn list(&self) -> midi_recorder::Result<Vec<Device>> {
        Ok(vec![Device {
            index: 0,
            name: "Channel Piano".to_string(),
        }])
    }

    fn open(&mut self, _device: &Device) -> midi_recorder::Result<Box<dyn EventSource>> {
        let rx = self
            .rx
            .take()
            .ok_or_else(|| RecorderError::Backend("already open".to_string()))?;
        Ok(Box::new(ChannelSource::with_poll_interval(
            rx,
            Duration::from_millis(5),
        )))
    }
}

fn ms_settings(filter_realtime: bool) -> RecordingSettings {
    RecordingSettings {
        resolution: 480,
        tempo_bpm: 120.0,
        time_signature: (4, 4),
        timing: TimingMode::Milliseconds,
        filter_realtime,
    }
}

fn piano_script() -> Vec<(u64, Vec<u8>)> {
    vec![
        (100, vec![0x90, 60, 100]),
        (150, vec![0xF8]),
        (350, vec![0xB0, 64, 127]),
        (600, vec![0x80, 60, 0]),
        (900, vec![0xB0, 64, 0]),
    ]
}

/// Record the script from the first device and return the saved file bytes.
fn record_script(
    script: Vec<(u64, Vec<u8>)>,
    settings: RecordingSettings,
) -> (Vec<u8>, StopReason) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("take.mid");
    let cancel = CancelToken::new();

    let mut recorder = Recorder::new(ScriptedBackend::new(&["Piano"], script, cancel.clone()));
    let devices = recorder.list_devices().unwrap();
    let device = recorder
        .select_device(&mut FirstDeviceChooser, &devices)
        .unwrap();
    let mut session = recorder.start_session(&device, settings).unwrap();
    // Script offsets count from the session clock's own start.
    *recorder.backend().base.lock().unwrap() = Some(session.started_at());
    let reason = recorder.capture_loop(&mut session, &cancel).unwrap();
    recorder.save(&session, &path).unwrap();
    assert_eq!(recorder.state(), SessionState::Saved);

    (std::fs::read(&path).unwrap(), reason)
}

/// Absolute tick of every non-meta event in a parsed track.
fn absolute_event_ticks(track: &[midly::TrackEvent<'_>]) -> Vec<u64> {
    let mut now = 0u64;
    let mut ticks = Vec::new();
    for event in track {
        now += u64::from(event.delta.as_int());
        if !matches!(event.kind, TrackEventKind::Meta(_)) {
            ticks.push(now);
        }
    }
    ticks
}

// ==================== Lifecycle Tests ====================

#[test]
fn test_full_session_writes_playable_file() {
    let (bytes, reason) = record_script(piano_script(), ms_settings(true));
    assert_eq!(reason, StopReason::Interrupted);

    let smf = Smf::parse(&bytes).unwrap();
    assert_eq!(smf.header.format, Format::Parallel);
    assert!(matches!(smf.header.timing, Timing::Metrical(t) if t.as_int() == 480));
    assert_eq!(smf.tracks.len(), 2);

    let meta = &smf.tracks[0];
    assert!(meta
        .iter()
        .any(|e| e.kind == TrackEventKind::Meta(MetaMessage::TimeSignature(4, 2, 24, 8))));
    assert!(meta.iter().any(|e| matches!(
        e.kind,
        TrackEventKind::Meta(MetaMessage::Tempo(t)) if t.as_int() == 500_000
    )));

    let events: Vec<_> = smf.tracks[1]
        .iter()
        .filter(|e| !matches!(e.kind, TrackEventKind::Meta(_)))
        .collect();
    assert_eq!(events.len(), 4, "clock message should be filtered");
    assert!(matches!(
        events[0].kind,
        TrackEventKind::Midi { message: MidiMessage::NoteOn { .. }, .. }
    ));
    assert!(matches!(
        events[1].kind,
        TrackEventKind::Midi { message: MidiMessage::Controller { .. }, .. }
    ));
    assert!(matches!(
        events[2].kind,
        TrackEventKind::Midi { message: MidiMessage::NoteOff { .. }, .. }
    ));
    assert_eq!(
        smf.tracks[1].last().map(|e| e.kind),
        Some(TrackEventKind::Meta(MetaMessage::EndOfTrack))
    );
}

#[test]
fn test_cumulative_deltas_match_arrival_offsets() {
    let (bytes, _) = record_script(piano_script(), ms_settings(true));
    let smf = Smf::parse(&bytes).unwrap();

    assert_eq!(absolute_event_ticks(&smf.tracks[1]), vec![100, 350, 600, 900]);
}

#[test]
fn test_cumulative_deltas_in_seconds_mode() {
    let settings = RecordingSettings {
        timing: TimingMode::Seconds,
        ..ms_settings(true)
    };
    let (bytes, _) = record_script(piano_script(), settings);
    let smf = Smf::parse(&bytes).unwrap();

    // 480 ticks per second: 100ms is 48 ticks.
    assert_eq!(absolute_event_ticks(&smf.tracks[1]), vec![48, 168, 288, 432]);
}

#[test]
fn test_realtime_kept_when_not_filtering() {
    let (bytes, _) = record_script(piano_script(), ms_settings(false));
    let smf = Smf::parse(&bytes).unwrap();

    let escapes: Vec<_> = smf.tracks[1]
        .iter()
        .filter(|e| matches!(e.kind, TrackEventKind::Escape(_)))
        .collect();
    assert_eq!(escapes.len(), 1);
    assert_eq!(escapes[0].kind, TrackEventKind::Escape(&[0xF8]));
    assert_eq!(absolute_event_ticks(&smf.tracks[1]).len(), 5);
}

#[test]
fn test_interrupt_before_any_event_saves_meta_only_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.mid");
    let cancel = CancelToken::new();

    let mut recorder = Recorder::new(ScriptedBackend::new(
        &["Piano"],
        piano_script(),
        cancel.clone(),
    ));
    let devices = recorder.list_devices().unwrap();
    let device = recorder
        .select_device(&mut FirstDeviceChooser, &devices)
        .unwrap();
    let mut session = recorder.start_session(&device, ms_settings(true)).unwrap();

    cancel.cancel();
    let reason = recorder.capture_loop(&mut session, &cancel).unwrap();
    assert_eq!(reason, StopReason::Interrupted);
    assert_eq!(session.recording().event_count(), 0);

    recorder.save(&session, &path).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    let smf = Smf::parse(&bytes).unwrap();
    assert_eq!(smf.header.format, Format::Parallel);
    assert_eq!(smf.tracks.len(), 1);
}

#[test]
fn test_disconnect_ends_capture_and_still_saves() {
    let cancel = CancelToken::new();
    let mut backend = ScriptedBackend::new(&["Piano"], piano_script(), cancel.clone());
    backend.disconnect_at_end = true;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("unplugged.mid");
    let mut recorder = Recorder::new(backend);
    let devices = recorder.list_devices().unwrap();
    let device = recorder
        .select_device(&mut FirstDeviceChooser, &devices)
        .unwrap();
    let mut session = recorder.start_session(&device, ms_settings(true)).unwrap();

    let reason = recorder.capture_loop(&mut session, &cancel).unwrap();
    assert_eq!(reason, StopReason::SourceDisconnected);
    assert_eq!(session.stop_reason(), Some(StopReason::SourceDisconnected));
    assert_eq!(session.stats().stored, 4);
    assert_eq!(session.stats().filtered, 1);

    recorder.save(&session, &path).unwrap();
    assert!(path.exists());
}

#[test]
fn test_cancel_from_another_thread_unblocks_capture() {
    let (tx, rx) = unbounded();
    let cancel = CancelToken::new();
    let mut recorder = Recorder::new(ChannelBackend { rx: Some(rx) });

    let devices = recorder.list_devices().unwrap();
    let device = recorder
        .select_device(&mut FirstDeviceChooser, &devices)
        .unwrap();
    let mut session = recorder.start_session(&device, ms_settings(true)).unwrap();
    let start = session.started_at();

    let remote = cancel.clone();
    let feeder = std::thread::spawn(move || {
        tx.send(RawMessage {
            at: start + Duration::from_millis(20),
            bytes: vec![0x90, 64, 80],
        })
        .unwrap();
        std::thread::sleep(Duration::from_millis(30));
        remote.cancel();
        // Keep the sender alive until after cancellation.
        std::thread::sleep(Duration::from_millis(30));
        drop(tx);
    });

    let reason = recorder.capture_loop(&mut session, &cancel).unwrap();
    feeder.join().unwrap();

    assert_eq!(reason, StopReason::Interrupted);
    let track = session.recording().active_track();
    assert_eq!(track.len(), 1);
    assert_eq!(track.events()[0].delta, 20);
}

// ==================== Selection Tests ====================

#[test]
fn test_no_device_found_captures_nothing() {
    let cancel = CancelToken::new();
    let mut recorder = Recorder::new(ScriptedBackend::new(&[], piano_script(), cancel));

    assert!(matches!(
        recorder.list_devices(),
        Err(RecorderError::NoDeviceFound)
    ));
    assert_eq!(recorder.state(), SessionState::Aborted);
    assert!(recorder.backend().opened.is_empty());
}

#[test]
fn test_prompt_quit_aborts_without_opening() {
    let cancel = CancelToken::new();
    let mut recorder = Recorder::new(ScriptedBackend::new(
        &["Piano", "Pads"],
        piano_script(),
        cancel,
    ));
    let devices = recorder.list_devices().unwrap();

    let mut chooser = PromptChooser::new(Cursor::new(b"7\nq\n".to_vec()), Vec::new());
    let result = recorder.select_device(&mut chooser, &devices);

    assert!(matches!(result, Err(RecorderError::UserCancelled)));
    assert_eq!(recorder.state(), SessionState::Aborted);
    assert!(recorder.backend().opened.is_empty());
}

#[test]
fn test_named_device_is_opened() {
    let cancel = CancelToken::new();
    let mut recorder = Recorder::new(ScriptedBackend::new(
        &["IAC Bus", "Digital Piano", "Pads"],
        Vec::new(),
        cancel,
    ));
    let devices = recorder.list_devices().unwrap();
    let device = recorder
        .select_device(&mut NameChooser::new("piano"), &devices)
        .unwrap();
    assert!(devices.contains(&device));

    recorder.start_session(&device, ms_settings(true)).unwrap();
    assert_eq!(recorder.backend().opened, vec!["Digital Piano".to_string()]);
    assert_eq!(recorder.state(), SessionState::Recording);
}

// ==================== Settings Tests ====================

#[test]
fn test_invalid_settings_rejected_before_device_opens() {
    let cancel = CancelToken::new();
    let mut recorder = Recorder::new(ScriptedBackend::new(&["Piano"], piano_script(), cancel));
    let devices = recorder.list_devices().unwrap();
    let device = recorder
        .select_device(&mut FirstDeviceChooser, &devices)
        .unwrap();

    let zero_resolution = RecordingSettings {
        resolution: 0,
        ..ms_settings(true)
    };
    assert!(matches!(
        recorder.start_session(&device, zero_resolution),
        Err(RecorderError::Config(_))
    ));

    let odd_meter = RecordingSettings {
        time_signature: (4, 3),
        ..ms_settings(true)
    };
    assert!(matches!(
        recorder.start_session(&device, odd_meter),
        Err(RecorderError::Config(_))
    ));

    assert!(recorder.backend().opened.is_empty());
    assert_eq!(recorder.state(), SessionState::DeviceSelected);

    recorder.start_session(&device, ms_settings(true)).unwrap();
    assert_eq!(recorder.backend().opened, vec!["Piano".to_string()]);
}
