//! In-memory recording and its Standard MIDI File encoding.

use midly::num::{u15, u24, u28};
use midly::{Format, Header, MetaMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{RecorderError, Result};
use crate::message::CapturedMessage;
use crate::session::RecordingSettings;

/// Clocks per metronome click and 32nd notes per quarter written with the
/// time signature.
const CLOCKS_PER_CLICK: u8 = 24;
const THIRTY_SECONDS_PER_QUARTER: u8 = 8;

/// A captured message and its delta-time from the previous event in the track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub delta: u32,
    pub message: CapturedMessage,
}

/// Append-only sequence of events in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Track {
    name: Option<String>,
    events: Vec<RecordedEvent>,
}

impl Track {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Track {
            name: Some(name.into()),
            events: Vec::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn push(&mut self, delta: u32, message: CapturedMessage) {
        self.events.push(RecordedEvent { delta, message });
    }

    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Absolute tick of each event, i.e. the running sum of deltas.
    pub fn absolute_ticks(&self) -> Vec<u64> {
        self.events
            .iter()
            .scan(0u64, |acc, e| {
                *acc += u64::from(e.delta);
                Some(*acc)
            })
            .collect()
    }

    fn encode(&self) -> Vec<TrackEvent<'_>> {
        let mut out = Vec::with_capacity(self.events.len() + 2);
        if let Some(name) = &self.name {
            out.push(TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())),
            });
        }
        for event in &self.events {
            out.push(TrackEvent {
                delta: u28::new(event.delta),
                kind: event.message.track_event_kind(),
            });
        }
        out.push(end_of_track());
        out
    }
}

/// Tracks plus the global metadata written to the tempo track.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    resolution: u16,
    tempo_bpm: f64,
    time_signature: (u8, u8),
    tracks: Vec<Track>,
}

impl Recording {
    /// New recording with a single empty event track.
    pub fn new(settings: &RecordingSettings) -> Self {
        Recording {
            resolution: settings.resolution,
            tempo_bpm: settings.tempo_bpm,
            time_signature: settings.time_signature,
            tracks: vec![Track::named("Recording")],
        }
    }

    pub fn resolution(&self) -> u16 {
        self.resolution
    }

    pub fn tempo_bpm(&self) -> f64 {
        self.tempo_bpm
    }

    pub fn time_signature(&self) -> (u8, u8) {
        self.time_signature
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// The track that receives captured events.
    pub fn active_track(&self) -> &Track {
        &self.tracks[self.tracks.len() - 1]
    }

    pub fn active_track_mut(&mut self) -> &mut Track {
        let last = self.tracks.len() - 1;
        &mut self.tracks[last]
    }

    pub fn event_count(&self) -> usize {
        self.tracks.iter().map(Track::len).sum()
    }

    /// Microseconds per quarter note for the tempo meta event.
    pub fn tempo_micros(&self) -> u32 {
        (60_000_000.0 / self.tempo_bpm).round() as u32
    }

    /// Build the SMF structure: tempo track first, then every track that
    /// captured something.
    pub fn to_smf(&self) -> Smf<'_> {
        let header = Header::new(Format::Parallel, Timing::Metrical(u15::new(self.resolution)));
        let mut tracks: Vec<midly::Track<'_>> = vec![self.meta_track()];
        tracks.extend(self.tracks.iter().filter(|t| !t.is_empty()).map(Track::encode));
        Smf { header, tracks }
    }

    fn meta_track(&self) -> Vec<TrackEvent<'static>> {
        let (numerator, denominator) = self.time_signature;
        vec![
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::TimeSignature(
                    numerator,
                    denominator.trailing_zeros() as u8,
                    CLOCKS_PER_CLICK,
                    THIRTY_SECONDS_PER_QUARTER,
                )),
            },
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(self.tempo_micros()))),
            },
            end_of_track(),
        ]
    }

    /// Resolution must fit the 15-bit header field, the tempo the 24-bit
    /// tempo event, and the time signature denominator must be a power of two.
    pub fn check_encodable(&self) -> Result<()> {
        if self.resolution == 0 || self.resolution > 0x7FFF {
            return Err(RecorderError::Encode(format!(
                "resolution {} does not fit a metrical header",
                self.resolution
            )));
        }
        if !(self.tempo_bpm.is_finite() && self.tempo_bpm > 0.0)
            || self.tempo_micros() > 0x00FF_FFFF
        {
            return Err(RecorderError::Encode(format!(
                "tempo {} BPM cannot be written as a tempo event",
                self.tempo_bpm
            )));
        }
        let (numerator, denominator) = self.time_signature;
        if numerator == 0 || !denominator.is_power_of_two() {
            return Err(RecorderError::Encode(format!(
                "time signature {}/{} cannot be written",
                numerator, denominator
            )));
        }
        Ok(())
    }

    /// Encode the whole file into `out`.
    pub fn write_to<W: Write>(&self, out: W) -> std::io::Result<()> {
        self.to_smf().write_std(out)
    }

    /// Write the file to `path`.
    ///
    /// Bytes go to a sibling temporary file that is synced and then renamed
    /// over `path`, so a failed or interrupted write never leaves a truncated
    /// file behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.check_encodable()?;
        let tmp = temp_path(path);
        let io_err = |source| RecorderError::Io {
            path: path.to_path_buf(),
            source,
        };

        let result = (|| -> std::io::Result<()> {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            self.write_to(&mut writer)?;
            writer.flush()?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
            fs::rename(&tmp, path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(e));
        }

        log::info!(
            "Wrote {} event(s) to {}",
            self.event_count(),
            path.display()
        );
        Ok(())
    }
}

fn end_of_track() -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}
