//! CLI enum types.

use clap::ValueEnum;

use crate::timing::TimingMode;

/// Wall-clock to tick conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Timing {
    /// ticks = seconds x resolution
    #[default]
    Seconds,
    /// ticks = beats at the file's tempo x resolution
    Tempo,
    /// ticks = milliseconds
    Milliseconds,
}

impl From<Timing> for TimingMode {
    fn from(t: Timing) -> Self {
        match t {
            Timing::Seconds => TimingMode::Seconds,
            Timing::Tempo => TimingMode::Tempo,
            Timing::Milliseconds => TimingMode::Milliseconds,
        }
    }
}
