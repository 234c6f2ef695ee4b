//! Tempo handling.

use serde::Deserialize;

/// Slowest tempo the sequencer will run at
pub const MIN_BPM: u32 = 60;
/// Fastest tempo the sequencer will run at
pub const MAX_BPM: u32 = 300;
/// Tempo used when nothing else is specified
pub const DEFAULT_BPM: u32 = 120;
/// Each step is a 16th note, so there are 4 steps in a beat
pub const STEPS_PER_BEAT: u32 = 4;

/// Microseconds in a minute, for converting BPM to the SMF tempo meta event
const MICROS_PER_MINUTE: u32 = 60_000_000;

/// A tempo in beats per minute. This can only be constructed through `Bpm::new`, which clamps,
/// so any `Bpm` you hold is always within `MIN_BPM..=MAX_BPM`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(from = "u32")]
pub struct Bpm(u32);

impl Bpm {
    /// Create a tempo, clamping it into the supported range rather than rejecting it.
    pub fn new(bpm: u32) -> Self {
        let clamped = bpm.max(MIN_BPM).min(MAX_BPM);

        if clamped != bpm {
            tracing::warn!(requested = bpm, clamped, "tempo out of range");
        }

        Bpm(clamped)
    }

    /// The raw BPM value
    pub fn get(self) -> u32 {
        self.0
    }

    /// The length of a single step (a 16th note) in seconds
    pub fn step_duration(self) -> f64 {
        60. / self.0 as f64 / STEPS_PER_BEAT as f64
    }

    /// Microseconds per quarter note, as stored in the SMF "set tempo" meta event. This is always
    /// below `2^24` for the supported range.
    pub fn micros_per_quarter(self) -> u32 {
        MICROS_PER_MINUTE / self.0
    }
}

impl Default for Bpm {
    fn default() -> Self {
        Bpm(DEFAULT_BPM)
    }
}

impl From<u32> for Bpm {
    fn from(bpm: u32) -> Self {
        Bpm::new(bpm)
    }
}
