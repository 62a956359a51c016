//! Wall-clock to MIDI tick conversion.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Largest delta-time a track event can carry (28-bit variable-length quantity).
pub const MAX_DELTA_TICKS: u32 = 0x0FFF_FFFF;

/// How elapsed wall-clock time is turned into ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingMode {
    /// `ticks = seconds * resolution`
    #[default]
    Seconds,
    /// `ticks = seconds * resolution * bpm / 60`, so playback at the file's
    /// tempo matches real time
    Tempo,
    /// `ticks = milliseconds`
    Milliseconds,
}

impl TimingMode {
    pub fn ticks_per_second(self, resolution: u16, tempo_bpm: f64) -> f64 {
        let (numerator, denominator) = self.rate(resolution, tempo_bpm);
        numerator as f64 / denominator as f64
    }

    /// Ticks per second as an exact fraction. Tempo is kept to 1/1000 BPM.
    fn rate(self, resolution: u16, tempo_bpm: f64) -> (u128, u128) {
        match self {
            TimingMode::Seconds => (u128::from(resolution), 1),
            TimingMode::Tempo => {
                let milli_bpm = (tempo_bpm * 1000.0).round().max(0.0) as u128;
                (u128::from(resolution) * milli_bpm, 60_000)
            }
            TimingMode::Milliseconds => (1000, 1),
        }
    }
}

impl std::fmt::Display for TimingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimingMode::Seconds => write!(f, "seconds"),
            TimingMode::Tempo => write!(f, "tempo"),
            TimingMode::Milliseconds => write!(f, "milliseconds"),
        }
    }
}

/// Converts message arrival instants into delta-times.
///
/// Every instant is measured against the session start, and the delta is the
/// distance from the previously emitted absolute tick. Truncation error is
/// therefore bounded by one tick over the whole track instead of growing with
/// each event.
#[derive(Debug, Clone)]
pub struct TickClock {
    start: Instant,
    rate_numerator: u128,
    rate_denominator: u128,
    last_tick: u64,
}

impl TickClock {
    pub fn new(start: Instant, mode: TimingMode, resolution: u16, tempo_bpm: f64) -> Self {
        let (rate_numerator, rate_denominator) = mode.rate(resolution, tempo_bpm);
        TickClock {
            start,
            rate_numerator,
            rate_denominator,
            last_tick: 0,
        }
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    /// Absolute tick position of `at`. Instants before the start map to zero.
    pub fn absolute_ticks(&self, at: Instant) -> u64 {
        let nanos = at.saturating_duration_since(self.start).as_nanos();
        let ticks = nanos * self.rate_numerator / (self.rate_denominator * 1_000_000_000);
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }

    /// Delta since the last emitted event, advancing the clock.
    ///
    /// Never negative: an instant earlier than the previous one yields zero.
    pub fn delta_for(&mut self, at: Instant) -> u32 {
        let absolute = self.absolute_ticks(at).max(self.last_tick);
        let delta = (absolute - self.last_tick).min(u64::from(MAX_DELTA_TICKS));
        if delta == u64::from(MAX_DELTA_TICKS) {
            log::warn!("Gap between events exceeds the largest encodable delta, clamping");
        }
        self.last_tick += delta;
        delta as u32
    }

    /// Absolute tick of the last emitted event.
    pub fn position(&self) -> u64 {
        self.last_tick
    }
}
