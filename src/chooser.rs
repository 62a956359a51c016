//! Device selection policies.
//!
//! The interactive prompt is one [`DeviceChooser`] among others, so recording
//! never depends on a terminal being attached.

use std::io::{BufRead, Write};

use crate::devices::Device;
use crate::error::{RecorderError, Result};

/// Picks one device out of a non-empty list.
pub trait DeviceChooser {
    /// Return an element of `devices`, or [`RecorderError::UserCancelled`].
    fn choose(&mut self, devices: &[Device]) -> Result<Device>;
}

/// Non-interactive: always the first device.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstDeviceChooser;

impl DeviceChooser for FirstDeviceChooser {
    fn choose(&mut self, devices: &[Device]) -> Result<Device> {
        devices.first().cloned().ok_or(RecorderError::NoDeviceFound)
    }
}

/// Non-interactive: first device whose name contains a pattern
/// (case-insensitive).
#[derive(Debug, Clone)]
pub struct NameChooser {
    pattern: String,
}

impl NameChooser {
    pub fn new(pattern: impl Into<String>) -> Self {
        NameChooser {
            pattern: pattern.into(),
        }
    }
}

impl DeviceChooser for NameChooser {
    fn choose(&mut self, devices: &[Device]) -> Result<Device> {
        let needle = self.pattern.to_lowercase();
        devices
            .iter()
            .find(|d| d.name.to_lowercase().contains(&needle))
            .cloned()
            .ok_or_else(|| {
                let available: Vec<&str> = devices.iter().map(|d| d.name.as_str()).collect();
                RecorderError::InvalidSelection(format!(
                    "no MIDI input matches '{}' (available: {})",
                    self.pattern,
                    available.join(", ")
                ))
            })
    }
}

/// What a line typed at the prompt means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Zero-based index into the device list
    Index(usize),
    Quit,
}

/// Interpret one line of prompt input against a list of `count` devices.
///
/// Numbers are 1-based as shown in the menu; `q` quits.
pub fn parse_selection(line: &str, count: usize) -> Result<Selection> {
    let line = line.trim();
    if line.eq_ignore_ascii_case("q") {
        return Ok(Selection::Quit);
    }
    let number: usize = line
        .parse()
        .map_err(|_| RecorderError::InvalidSelection("Please enter a valid number.".to_string()))?;
    if number == 0 || number > count {
        return Err(RecorderError::InvalidSelection(
            "Invalid selection. Please try again.".to_string(),
        ));
    }
    Ok(Selection::Index(number - 1))
}

/// Numbered menu on a line-based input, re-asking until the answer is valid.
pub struct PromptChooser<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptChooser<R, W> {
    pub fn new(input: R, output: W) -> Self {
        PromptChooser { input, output }
    }

    fn render(&mut self, devices: &[Device]) -> std::io::Result<()> {
        writeln!(self.output, "\nAvailable MIDI ports:")?;
        for (i, device) in devices.iter().enumerate() {
            writeln!(self.output, "{}. {}", i + 1, device.name)?;
        }
        Ok(())
    }

    fn ask(&mut self) -> std::io::Result<Option<String>> {
        write!(self.output, "\nSelect MIDI port number (or 'q' to quit): ")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}

impl PromptChooser<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdio() -> Self {
        PromptChooser::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> DeviceChooser for PromptChooser<R, W> {
    fn choose(&mut self, devices: &[Device]) -> Result<Device> {
        if devices.is_empty() {
            return Err(RecorderError::NoDeviceFound);
        }
        self.render(devices).map_err(prompt_io_error)?;

        loop {
            // End of input means nobody is there to answer.
            let Some(line) = self.ask().map_err(prompt_io_error)? else {
                return Err(RecorderError::UserCancelled);
            };
            match parse_selection(&line, devices.len()) {
                Ok(Selection::Index(i)) => return Ok(devices[i].clone()),
                Ok(Selection::Quit) => return Err(RecorderError::UserCancelled),
                Err(RecorderError::InvalidSelection(msg)) => {
                    log::debug!("Rejected selection {:?}", line.trim());
                    writeln!(self.output, "{}", msg).map_err(prompt_io_error)?;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn prompt_io_error(e: std::io::Error) -> RecorderError {
    RecorderError::Io {
        path: "<terminal>".into(),
        source: e,
    }
}
