//! Error types for the export pipeline and pattern loading.
//!
//! Transport operations never fail: out-of-range tempos are clamped and
//! out-of-range grid indices are ignored. Everything that can go wrong lives
//! on the path from "some input" to "some bytes on disk", so the error types
//! are split the same way: bad input, broken encoder invariants, and the
//! host's file writer failing.

use std::{io, path::PathBuf};

/// The input pattern was malformed. Always reported before any encoding work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The pattern text could not be parsed at all
    #[error("could not parse pattern: {0}")]
    Syntax(String),
    /// The grid (or one of its rows) was not a list
    #[error("expected a list of tracks, each a list of steps")]
    NotAList,
    /// The grid didn't have exactly 8 tracks
    #[error("expected {expected} tracks, found {found}")]
    WrongTrackCount {
        /// Number of tracks a pattern must have
        expected: usize,
        /// Number of tracks in the input
        found: usize,
    },
    /// A track didn't have exactly 16 steps
    #[error("track {track}: expected {expected} steps, found {found}")]
    WrongStepCount {
        /// 1-based track index
        track: usize,
        /// Number of steps a track must have
        expected: usize,
        /// Number of steps in the input
        found: usize,
    },
    /// A cell held something other than `true` or `false`
    #[error("track {track}, step {step}: cell is not a boolean")]
    NonBooleanCell {
        /// 1-based track index
        track: usize,
        /// 1-based step index
        step: usize,
    },
}

/// An invariant of the MIDI encoder was violated. Given a validated pattern
/// and the event builder in this crate these are unreachable, but a caller can
/// hand arbitrary events to `smf::encode`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    /// The events weren't sorted by tick
    #[error("event {index} at tick {tick} comes before the previous event at tick {previous}")]
    NegativeDelta {
        /// Position of the offending event in the list
        index: usize,
        /// Absolute tick of the offending event
        tick: u32,
        /// Absolute tick of the event before it
        previous: u32,
    },
    /// The value doesn't fit in the 4 bytes a MIDI VLQ is allowed
    #[error("{0} is too large for a variable-length quantity")]
    VlqOverflow(u32),
    /// A channel event had a status byte outside `0x80..=0xEF`
    #[error("{0:#04x} is not a channel voice status byte")]
    InvalidStatus(u8),
    /// The track's byte length didn't fit in the chunk length field
    #[error("track chunk of {0} bytes is too long")]
    TrackTooLong(usize),
    /// PPQN must be non-zero and must not set the SMPTE bit
    #[error("{0} is not a valid ticks-per-quarter-note division")]
    InvalidDivision(u16),
    /// A channel event's data byte had the high bit set, which would make it read as a status
    #[error("{0:#04x} is not a valid data byte")]
    InvalidData(u8),
    /// Export resolution has to be a non-zero multiple of 16 so steps and notes are whole ticks
    #[error("{0} ticks per quarter note is not a non-zero multiple of 16")]
    InvalidResolution(u16),
}

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// See `ValidationError`
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// See `EncodingError`
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    /// The file writer failed. The underlying error is passed through as-is.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The path we tried to write to (or read from)
        path: PathBuf,
        /// The error from the filesystem
        source: io::Error,
    },
    /// The configuration file couldn't be read or parsed
    #[error("invalid config: {0}")]
    Config(String),
    /// A pattern couldn't be serialised to RON
    #[error("could not serialise pattern: {0}")]
    Serialize(String),
    /// Writing command output (trigger lines, the grid) failed
    #[error("could not write output: {0}")]
    Output(#[source] io::Error),
    /// The time passed to a command was negative, infinite or NaN
    #[error("time must be finite and non-negative")]
    InvalidTime,
}

/// Shorthand for results using the crate's `Error`
pub type Result<T> = std::result::Result<T, Error>;
