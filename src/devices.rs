//! MIDI input device discovery and the receive side of an open device.
//!
//! The platform MIDI layer sits behind [`MidiBackend`] so the capture and
//! encoding logic can run against scripted sources in tests.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crate::error::{RecorderError, Result};
use crate::signal::CancelToken;

/// How long a blocking receive waits before re-checking for cancellation.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Represents a single MIDI input endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub index: usize,
    pub name: String,
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Raw bytes of one message and the instant they arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub at: Instant,
    pub bytes: Vec<u8>,
}

/// Outcome of one blocking receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Message(RawMessage),
    /// The cancel token fired while waiting
    Cancelled,
    /// The device went away; nothing more will arrive
    Disconnected,
}

/// Receive side of an open MIDI input.
pub trait EventSource {
    /// Block until a message arrives, the token is cancelled, or the source
    /// disconnects.
    fn receive(&mut self, cancel: &CancelToken) -> Received;
}

/// Platform capability: enumerate inputs and open one of them.
pub trait MidiBackend {
    /// Currently available input endpoints, in platform order.
    fn list(&self) -> Result<Vec<Device>>;

    /// Open `device` for reading.
    fn open(&mut self, device: &Device) -> Result<Box<dyn EventSource>>;
}

/// Query the backend for inputs.
///
/// # Errors
/// Returns [`RecorderError::NoDeviceFound`] if nothing is connected.
pub fn list_devices(backend: &dyn MidiBackend) -> Result<Vec<Device>> {
    let devices = backend.list()?;
    log::debug!("Enumerated {} MIDI input port(s)", devices.len());
    if devices.is_empty() {
        return Err(RecorderError::NoDeviceFound);
    }
    Ok(devices)
}

/// Print the device list to stdout.
pub fn print_devices(devices: &[Device]) {
    println!("Available MIDI input ports:");
    if devices.is_empty() {
        println!("  (none found)");
        return;
    }
    for (i, device) in devices.iter().enumerate() {
        println!("  {}. {}", i + 1, device.name);
    }
}

/// [`EventSource`] fed by a channel, as filled from a driver callback.
pub struct ChannelSource {
    rx: Receiver<RawMessage>,
    poll_interval: Duration,
}

impl ChannelSource {
    pub fn new(rx: Receiver<RawMessage>) -> Self {
        Self::with_poll_interval(rx, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(rx: Receiver<RawMessage>, poll_interval: Duration) -> Self {
        ChannelSource { rx, poll_interval }
    }

    /// Wait at most one poll interval. `None` means nothing happened.
    pub fn poll(&mut self, cancel: &CancelToken) -> Option<Received> {
        if cancel.is_cancelled() {
            return Some(Received::Cancelled);
        }
        match self.rx.recv_timeout(self.poll_interval) {
            Ok(message) => Some(Received::Message(message)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Received::Disconnected),
        }
    }
}

impl EventSource for ChannelSource {
    fn receive(&mut self, cancel: &CancelToken) -> Received {
        loop {
            if let Some(received) = self.poll(cancel) {
                return received;
            }
        }
    }
}
