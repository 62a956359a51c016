//! Platform MIDI input through `midir`.

use crossbeam_channel::unbounded;
use midir::{Ignore, MidiInput, MidiInputConnection, MidiInputPort};
use std::time::{Duration, Instant};

use crate::devices::{ChannelSource, Device, EventSource, MidiBackend, RawMessage, Received};
use crate::error::{RecorderError, Result};
use crate::signal::CancelToken;

const CLIENT_NAME: &str = "midi-recorder";
const CONNECTION_NAME: &str = "midi-recorder-input";
const WATCH_CLIENT_NAME: &str = "midi-recorder-watch";

/// How often an idle source re-enumerates ports to notice an unplugged device.
const PORT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// [`MidiBackend`] over the operating system's MIDI subsystem.
#[derive(Debug, Default)]
pub struct MidirBackend;

impl MidirBackend {
    pub fn new() -> Self {
        MidirBackend
    }

    fn client(name: &str) -> Result<MidiInput> {
        let mut input = MidiInput::new(name)?;
        // Real-time filtering is a recording policy, so let everything through.
        input.ignore(Ignore::None);
        Ok(input)
    }
}

/// Names of the current ports, in platform order. Unreadable names are empty.
fn port_names(input: &MidiInput, ports: &[MidiInputPort]) -> Vec<String> {
    ports
        .iter()
        .map(|p| input.port_name(p).unwrap_or_default())
        .collect()
}

/// Position of `device` in a fresh enumeration.
///
/// Only a port with the same name qualifies. When several ports share the
/// name, the one at the device's original index wins, then the first.
pub fn match_port(names: &[String], device: &Device) -> Option<usize> {
    let candidates: Vec<usize> = names
        .iter()
        .enumerate()
        .filter(|(_, name)| **name == device.name)
        .map(|(i, _)| i)
        .collect();

    if candidates.contains(&device.index) {
        Some(device.index)
    } else {
        candidates.first().copied()
    }
}

impl MidiBackend for MidirBackend {
    fn list(&self) -> Result<Vec<Device>> {
        let input = Self::client(CLIENT_NAME)?;
        let mut devices = Vec::new();
        for (index, port) in input.ports().iter().enumerate() {
            match input.port_name(port) {
                Ok(name) => devices.push(Device { index, name }),
                Err(e) => log::warn!("Skipping MIDI port {}: {}", index, e),
            }
        }
        Ok(devices)
    }

    fn open(&mut self, device: &Device) -> Result<Box<dyn EventSource>> {
        let input = Self::client(CLIENT_NAME)?;
        let ports = input.ports();
        let port = match_port(&port_names(&input, &ports), device)
            .and_then(|i| ports.get(i))
            .ok_or_else(|| {
                RecorderError::Backend(format!(
                    "MIDI input '{}' is no longer available",
                    device.name
                ))
            })?
            .clone();
        let watch = Self::client(WATCH_CLIENT_NAME)?;
        let (tx, rx) = unbounded();

        let connection = input.connect(
            &port,
            CONNECTION_NAME,
            move |_timestamp, message, _| {
                let raw = RawMessage {
                    at: Instant::now(),
                    bytes: message.to_vec(),
                };
                // The receiver is gone once the session has stopped.
                let _ = tx.send(raw);
            },
            (),
        )?;

        log::info!("Connected to MIDI input '{}'", device.name);
        Ok(Box::new(MidirSource {
            _connection: connection,
            inner: ChannelSource::new(rx),
            watch,
            name: device.name.clone(),
            last_check: Instant::now(),
        }))
    }
}

/// Keeps the driver connection open for as long as the source lives.
///
/// The callback owns the channel sender for the life of the connection, so
/// an unplugged device never closes the channel. Instead the source checks
/// on idle polls that its port is still enumerated.
struct MidirSource {
    _connection: MidiInputConnection<()>,
    inner: ChannelSource,
    watch: MidiInput,
    name: String,
    last_check: Instant,
}

impl MidirSource {
    fn port_present(&self) -> bool {
        let ports = self.watch.ports();
        port_names(&self.watch, &ports).contains(&self.name)
    }
}

impl EventSource for MidirSource {
    fn receive(&mut self, cancel: &CancelToken) -> Received {
        loop {
            if let Some(received) = self.inner.poll(cancel) {
                return received;
            }
            if self.last_check.elapsed() >= PORT_CHECK_INTERVAL {
                self.last_check = Instant::now();
                if !self.port_present() {
                    return Received::Disconnected;
                }
            }
        }
    }
}
