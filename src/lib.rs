//! midi-recorder library crate.
//!
//! Lists MIDI inputs, records one of them, and writes the captured events to
//! a type-1 Standard MIDI File.

pub mod chooser;
pub mod cli;
pub mod config;
pub mod devices;
pub mod error;
pub mod message;
pub mod midi_input;
pub mod recording;
pub mod session;
pub mod signal;
pub mod timing;

pub use error::{RecorderError, Result};
