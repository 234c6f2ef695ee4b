//! The sequencer instance that owns the pattern and the clock.
//!
//! There's no global state anywhere in this crate, the host creates a `Sequencer` and passes it
//! around. None of it is synchronised, so a multi-threaded host needs to put it behind a single
//! owner (or a `Mutex`, which is a lot easier and should do the job in most cases).

use crate::{
    clock::{Clock, Seconds, MAX_CATCH_UP},
    error::{Error, Result},
    events::{build_events_with, ExportOptions},
    pattern::{ActiveTracks, Pattern, Step, Track},
    smf,
    tempo::Bpm,
};
use arrayvec::ArrayVec;
use std::{fs, io, path::Path};

/// A step that was reached, along with the tracks that should sound on it. This is what the audio
/// (or UI) layer consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    /// The step that was reached, in `1..=16`
    pub step: Step,
    /// The tracks that are on at that step, ascending
    pub tracks: ActiveTracks,
}

impl Trigger {
    /// Look up which tracks are active for `step` in `pattern`
    fn new(step: Step, pattern: &Pattern) -> Self {
        Trigger {
            step,
            tracks: pattern.active_tracks(step),
        }
    }
}

/// The triggers from a single `poll`, bounded the same way as the clock's catch-up
pub type Triggers = ArrayVec<[Trigger; MAX_CATCH_UP]>;

/// Somewhere to put exported bytes. The sequencer never opens files itself, so that hosts can
/// write to wherever they like (and so tests can fail on purpose).
pub trait FileWriter {
    /// Write all of `bytes` to `path`, replacing anything already there
    fn write(&mut self, path: &Path, bytes: &[u8]) -> io::Result<()>;
}

/// Writes straight to the filesystem
#[derive(Debug, Default, Copy, Clone)]
pub struct FsWriter;

impl FileWriter for FsWriter {
    fn write(&mut self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        fs::write(path, bytes)
    }
}

/// Build and encode one loop of `pattern` as a Standard MIDI File.
///
/// This is a pure function of its arguments. A `Pattern` can only hold a valid 8x16 grid of
/// booleans, so by the time we get here the pattern has already been validated (see
/// `Pattern::from_rows`/`Pattern::from_ron`). The options are checked here, before anything is
/// built.
pub fn export(pattern: &Pattern, bpm: Bpm, options: &ExportOptions) -> Result<Vec<u8>> {
    options.validate()?;

    let events = build_events_with(pattern, bpm, options);
    let bytes = smf::encode(&events, options.resolution)?;

    tracing::info!(
        events = events.len(),
        bytes = bytes.len(),
        bpm = bpm.get(),
        "exported pattern"
    );

    Ok(bytes)
}

/// Validate an untyped grid and export it. Nothing is encoded unless the grid is exactly 8 tracks
/// of 16 steps.
pub fn export_rows(rows: &[Vec<bool>], bpm: Bpm, options: &ExportOptions) -> Result<Vec<u8>> {
    let pattern = Pattern::from_rows(rows)?;

    export(&pattern, bpm, options)
}

/// A drum machine: one pattern, one transport, and the settings used when exporting.
#[derive(Debug, Clone, Default)]
pub struct Sequencer {
    /// The grid being played
    pattern: Pattern,
    /// Transport and playback position
    clock: Clock,
    /// Settings for `export`
    options: ExportOptions,
}

impl Sequencer {
    /// Create a stopped sequencer with an empty pattern
    pub fn new(bpm: Bpm, options: ExportOptions) -> Self {
        Sequencer {
            pattern: Pattern::new(),
            clock: Clock::new(bpm),
            options,
        }
    }

    /// The current pattern
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Swap in a new pattern, returning the old one. This can happen mid-playback, the new pattern
    /// is used from the next step that's reached.
    pub fn replace_pattern(&mut self, pattern: Pattern) -> Pattern {
        std::mem::replace(&mut self.pattern, pattern)
    }

    /// Flip a cell. Out-of-range indices are ignored.
    pub fn toggle(&mut self, track: Track, step: Step) {
        self.pattern.toggle(track, step);
    }

    /// Set a cell. Out-of-range indices are ignored.
    pub fn set(&mut self, track: Track, step: Step, on: bool) {
        self.pattern.set(track, step, on);
    }

    /// Turn off every cell
    pub fn clear(&mut self) {
        self.pattern.clear();
    }

    /// The transport
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// The export settings
    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// The current tempo
    pub fn bpm(&self) -> Bpm {
        self.clock.bpm()
    }

    /// The step at the playhead
    pub fn current_step(&self) -> Step {
        self.clock.current_step()
    }

    /// Whether we're playing
    pub fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    /// Start playing. The trigger for the starting step is returned straight away rather than
    /// waiting for the next poll.
    pub fn play(&mut self, now: Seconds) -> Option<Trigger> {
        let step = self.clock.play(now)?;

        Some(Trigger::new(step, &self.pattern))
    }

    /// Stop without rewinding
    pub fn pause(&mut self) {
        self.clock.pause();
    }

    /// Stop and rewind to step 1
    pub fn stop(&mut self) {
        self.clock.stop();
    }

    /// Advance the clock to `now` and return a trigger for each step reached, using the pattern as
    /// it is right now.
    pub fn poll(&mut self, now: Seconds) -> Triggers {
        let pattern = &self.pattern;

        self.clock
            .poll(now)
            .into_iter()
            .map(|step| Trigger::new(step, pattern))
            .collect()
    }

    /// Change the tempo without jumping. Out-of-range values are clamped.
    pub fn set_bpm(&mut self, bpm: u32, now: Seconds) {
        self.clock.set_bpm(Bpm::new(bpm), now);
    }

    /// Export the current pattern at the current tempo. Doesn't touch the transport.
    pub fn export(&self) -> Result<Vec<u8>> {
        export(&self.pattern, self.bpm(), &self.options)
    }

    /// Export the current pattern and hand the bytes to `writer`. If the writer fails, its error is
    /// returned as-is and nothing is retried.
    pub fn export_to<W>(&self, path: &Path, writer: &mut W) -> Result<()>
    where
        W: FileWriter + ?Sized,
    {
        let bytes = self.export()?;

        writer.write(path, &bytes).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::info!(path = %path.display(), "wrote MIDI file");

        Ok(())
    }
}
