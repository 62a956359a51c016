//! Captured MIDI messages: classification, naming, and console descriptions.

use midly::live::LiveEvent;
use midly::num::u4;
use midly::{MidiMessage, TrackEventKind};
use thiserror::Error;

/// Note names indexed by `note % 12`.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Controller number of the sustain pedal.
pub const SUSTAIN_PEDAL: u8 = 64;

/// Errors from decoding raw bytes delivered by a device.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("empty MIDI message")]
    Empty,
    #[error("malformed MIDI message {bytes:02X?}: {reason}")]
    Malformed { bytes: Vec<u8>, reason: String },
}

/// One MIDI message as it arrived from the device, owned so it can outlive
/// the driver's buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturedMessage {
    /// Channel voice message
    Channel { channel: u4, message: MidiMessage },
    /// System exclusive payload: every byte after `F0`, always ending in `F7`
    SysEx(Vec<u8>),
    /// Other system common message, raw bytes including status
    Common(Vec<u8>),
    /// Single-byte real-time message (`F8..=FF`)
    Realtime(u8),
}

impl CapturedMessage {
    /// Decode one complete message as delivered by the platform MIDI layer.
    pub fn parse(bytes: &[u8]) -> Result<Self, MessageError> {
        let status = *bytes.first().ok_or(MessageError::Empty)?;

        match status {
            0xF8..=0xFF => Ok(CapturedMessage::Realtime(status)),
            0xF0 => {
                let mut payload = bytes[1..].to_vec();
                if payload.last() != Some(&0xF7) {
                    payload.push(0xF7);
                }
                Ok(CapturedMessage::SysEx(payload))
            }
            0xF1..=0xF7 => Ok(CapturedMessage::Common(bytes.to_vec())),
            _ => match LiveEvent::parse(bytes) {
                Ok(LiveEvent::Midi { channel, message }) => {
                    Ok(CapturedMessage::Channel { channel, message })
                }
                Ok(_) => Ok(CapturedMessage::Common(bytes.to_vec())),
                Err(e) => Err(MessageError::Malformed {
                    bytes: bytes.to_vec(),
                    reason: e.to_string(),
                }),
            },
        }
    }

    /// Timing clock, start/stop/continue, active sensing, reset.
    pub fn is_realtime(&self) -> bool {
        matches!(self, CapturedMessage::Realtime(_))
    }

    /// The event as it is written into a track.
    pub fn track_event_kind(&self) -> TrackEventKind<'_> {
        match self {
            CapturedMessage::Channel { channel, message } => TrackEventKind::Midi {
                channel: *channel,
                message: *message,
            },
            CapturedMessage::SysEx(payload) => TrackEventKind::SysEx(payload),
            CapturedMessage::Common(bytes) => TrackEventKind::Escape(bytes),
            CapturedMessage::Realtime(status) => {
                TrackEventKind::Escape(std::slice::from_ref(status))
            }
        }
    }

    /// Console line for the message, or `None` for messages that are only
    /// worth a debug log.
    pub fn describe(&self) -> Option<String> {
        let CapturedMessage::Channel { message, .. } = self else {
            return None;
        };

        match *message {
            MidiMessage::NoteOn { key, vel } => {
                Some(describe_note("On", key.as_int(), vel.as_int()))
            }
            MidiMessage::NoteOff { key, vel } => {
                Some(describe_note("Off", key.as_int(), vel.as_int()))
            }
            MidiMessage::Controller { controller, value }
                if controller.as_int() == SUSTAIN_PEDAL =>
            {
                Some(format!("Sustain Pedal: {}", sustain_state(value.as_int())))
            }
            MidiMessage::Controller { controller, value } => Some(format!(
                "Control Change: control={}, value={}",
                controller.as_int(),
                value.as_int()
            )),
            _ => None,
        }
    }
}

fn describe_note(state: &str, note: u8, velocity: u8) -> String {
    format!(
        "Note {}: {} (note={}, velocity={})",
        state,
        note_name(note),
        note,
        velocity
    )
}

/// Scientific pitch name of a MIDI note number, e.g. 60 is `C4`.
pub fn note_name(note: u8) -> String {
    let octave = i32::from(note) / 12 - 1;
    format!("{}{}", NOTE_NAMES[usize::from(note % 12)], octave)
}

/// Sustain pedal reads as pressed from value 64 upward.
pub fn sustain_state(value: u8) -> &'static str {
    if value >= 64 {
        "On"
    } else {
        "Off"
    }
}
