#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! # Drum pattern sequencer
//!
//! A 16-step, 8-track drum machine core. It has two jobs: turn elapsed time into step triggers
//! while playing (the `clock` module), and turn a pattern into a Standard MIDI File (the `events`
//! and `smf` modules). Everything else is plumbing around those two.
//!
//! ## Usage
//!
//! A host creates a `Sequencer`, edits its pattern, and calls `Sequencer::poll` once per update
//! with the current time. Each poll returns the steps that were reached since the previous one,
//! along with the tracks that are on at each of them, and it's up to the host to make sound (or
//! draw something) in response. `Sequencer::export` produces the bytes of a single-loop MIDI file
//! for the current pattern and tempo.
//!
//! The binary wraps this in a tiny command language read from stdin, see `session::Command`.
//!
//! ### Some notes
//!
//! - Time is an `f64` number of seconds from whatever monotonic clock the host has. We only ever
//!   look at differences, so the epoch doesn't matter, and the position is always derived from
//!   `now - start` instead of being accumulated, so it can't drift. A tempo change moves `start`
//!   rather than resetting anything.
//! - Nothing here is synchronised and there's no global state. If a host wants to poll from one
//!   thread and edit from another it should put the `Sequencer` in a `Mutex`.
//! - Triggers and MIDI bytes per event are bounded, so they're returned in `ArrayVec`s and the
//!   playback path never allocates. Exporting does allocate, but that's a one-off user action.
//! - The MIDI writer is our own rather than a library: we only write format 0 with a single
//!   track, which is a fixed header plus a list of events, and owning the encoder means we can
//!   write straight into a byte buffer without going through the filesystem.

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod pattern;
pub mod sequencer;
pub mod session;
pub mod smf;
pub mod tempo;

pub use crate::{
    clock::{Clock, Seconds},
    config::Config,
    error::{EncodingError, Error, Result, ValidationError},
    events::{build_events, build_events_with, ExportOptions, MidiEvent},
    pattern::{Pattern, Step, Track, NUM_STEPS, NUM_TRACKS},
    sequencer::{export, export_rows, FileWriter, FsWriter, Sequencer, Trigger},
    smf::{encode, TrackChunk},
    tempo::Bpm,
};
