//! Error types for the recorder.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while listing, selecting, recording, or saving.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// No MIDI input endpoints were enumerated
    #[error("No MIDI input ports found. Please connect your device and try again.")]
    NoDeviceFound,

    /// Out-of-range or non-numeric menu input
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// The user dismissed the device menu
    #[error("Device selection cancelled")]
    UserCancelled,

    /// File could not be written
    #[error("Failed to write '{}': {}", path.display(), source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Platform MIDI layer failed to initialize or connect
    #[error("MIDI backend error: {0}")]
    Backend(String),

    /// The recording could not be encoded as a Standard MIDI File
    #[error("Failed to encode MIDI file: {0}")]
    Encode(String),

    /// An operation was attempted from the wrong session state
    #[error("Cannot {action} while session is {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RecorderError {
    /// Process exit code for this error.
    ///
    /// Cancellation is a normal exit; everything else is a failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            RecorderError::UserCancelled => 0,
            _ => 1,
        }
    }
}

impl From<midir::InitError> for RecorderError {
    fn from(e: midir::InitError) -> Self {
        RecorderError::Backend(e.to_string())
    }
}

impl From<midir::ConnectError<midir::MidiInput>> for RecorderError {
    fn from(e: midir::ConnectError<midir::MidiInput>) -> Self {
        RecorderError::Backend(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RecorderError>;
