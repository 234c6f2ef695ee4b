//! A command-driven host for the sequencer.
//!
//! Commands are a `serde::Deserialize` enum parsed with [RON](https://github.com/ron-rs/ron), one
//! per line, instead of inventing our own command language. See `Command` for the full list. A
//! session keeps its own "now", which only moves when told to (`Advance` and `Run`), so a script of
//! commands always produces the same output regardless of how fast it's fed in.

use crate::{
    clock::Seconds,
    config::Config,
    error::{Error, Result},
    events::DRUM_NAMES,
    pattern::{Pattern, Step, Track},
    sequencer::{FileWriter, FsWriter, Sequencer, Trigger},
};
use serde::Deserialize;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

/// The most polls a single `Advance` will make. At the default frame rate this is a bit over two
/// hours of playback.
pub const MAX_ADVANCE_FRAMES: u64 = 1 << 20;

/// A command to send to the session, parsed from RON.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub enum Command {
    /// Start playing from the current step
    Play,
    /// Stop playing but stay on the current step
    Pause,
    /// Stop playing and go back to step 1
    Stop,
    /// Set the tempo. Out-of-range values are clamped to 60..=300.
    SetBpm(u32),
    /// Flip a single cell
    Toggle {
        /// Track, 1..=8
        track: Track,
        /// Step, 1..=16
        step: Step,
    },
    /// Turn a single cell on or off
    Set {
        /// Track, 1..=8
        track: Track,
        /// Step, 1..=16
        step: Step,
        /// The new state of the cell
        on: bool,
    },
    /// Turn every cell off
    Clear,
    /// Move time forward immediately, polling at the configured frame rate and printing any
    /// triggers.
    Advance(Time),
    /// Like `Advance`, but actually wait in real time between polls.
    Run(Time),
    /// Print the pattern and transport state
    Show,
    /// Export the pattern as a MIDI file
    Export(PathBuf),
    /// Save the pattern as RON
    Save(PathBuf),
    /// Load a pattern saved with `Save`, replacing the current one
    Load(PathBuf),
}

/// An amount of time to advance by
#[derive(Deserialize, Debug, Copy, Clone, PartialEq)]
pub enum Time {
    /// A number of seconds
    Seconds(f64),
    /// A number of steps at the current tempo. If the tempo changes later this doesn't change
    /// retroactively, it's converted to seconds as soon as the command runs.
    Steps(u32),
}

/// A sequencer, a virtual clock, and somewhere to write files to.
#[derive(Debug)]
pub struct Session<W = FsWriter> {
    /// The sequencer being driven
    sequencer: Sequencer,
    /// The session's idea of the current time
    now: Seconds,
    /// Time between polls while advancing
    frame: Seconds,
    /// Where `Export` and `Save` write to
    writer: W,
}

impl Session<FsWriter> {
    /// Create a session that writes files to disk
    pub fn new(config: Config) -> Self {
        Self::with_writer(config, FsWriter)
    }
}

impl<W: FileWriter> Session<W> {
    /// Create a session that writes files through `writer`
    pub fn with_writer(config: Config, writer: W) -> Self {
        Session {
            frame: config.frame_duration(),
            sequencer: Sequencer::new(config.bpm, config.export),
            now: 0.,
            writer,
        }
    }

    /// The sequencer
    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// The file writer
    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// The session's current time
    pub fn now(&self) -> Seconds {
        self.now
    }

    /// Convert a `Time` to seconds at the current tempo
    fn to_seconds(&self, time: Time) -> Result<Seconds> {
        let seconds = match time {
            Time::Seconds(seconds) => seconds,
            Time::Steps(steps) => steps as f64 * self.sequencer.clock().step_duration(),
        };

        if seconds.is_finite() && seconds >= 0. {
            Ok(seconds)
        } else {
            Err(Error::InvalidTime)
        }
    }

    /// Receive a single command. See the documentation for `Command` for more information.
    /// Anything the command prints goes to `out`.
    pub fn update(&mut self, command: Command, out: &mut impl Write) -> Result<()> {
        match command {
            Command::Play => {
                if let Some(trigger) = self.sequencer.play(self.now) {
                    print_trigger(out, self.now, &trigger)?;
                }
            }
            Command::Pause => self.sequencer.pause(),
            Command::Stop => self.sequencer.stop(),
            Command::SetBpm(bpm) => self.sequencer.set_bpm(bpm, self.now),
            Command::Toggle { track, step } => self.sequencer.toggle(track, step),
            Command::Set { track, step, on } => self.sequencer.set(track, step, on),
            Command::Clear => self.sequencer.clear(),
            Command::Advance(time) => self.advance(time, false, out)?,
            Command::Run(time) => self.advance(time, true, out)?,
            Command::Show => self.show(out)?,
            Command::Export(path) => {
                self.sequencer.export_to(&path, &mut self.writer)?;

                writeln!(out, "exported {}", path.display()).map_err(Error::Output)?;
            }
            Command::Save(path) => {
                let text = self.sequencer.pattern().to_ron()?;

                self.writer
                    .write(&path, text.as_bytes())
                    .map_err(|source| Error::Io {
                        path: path.clone(),
                        source,
                    })?;

                writeln!(out, "saved {}", path.display()).map_err(Error::Output)?;
            }
            Command::Load(path) => {
                let pattern = load_pattern(&path)?;

                self.sequencer.replace_pattern(pattern);
            }
        }

        Ok(())
    }

    /// Poll the sequencer once per frame until `time` has passed, printing every trigger. Each
    /// frame's time is computed from the start rather than by adding up frame lengths, so rounding
    /// errors don't build up over a long advance. The last frame is cut short to land on the end.
    ///
    /// A virtual advance never polls more than `MAX_ADVANCE_FRAMES` times. Anything before the
    /// last `MAX_ADVANCE_FRAMES` frames is jumped over with a single poll, which the clock treats
    /// like any other stall.
    fn advance(&mut self, time: Time, realtime: bool, out: &mut impl Write) -> Result<()> {
        let duration = self.to_seconds(time)?;
        let end = self.now + duration;
        let mut start = self.now;
        let mut frames = (duration / self.frame).ceil() as u64;

        if !realtime && frames > MAX_ADVANCE_FRAMES {
            frames = MAX_ADVANCE_FRAMES;
            start = end - frames as f64 * self.frame;

            tracing::debug!(from = self.now, to = start, "skipping ahead");

            self.now = start;

            for trigger in self.sequencer.poll(self.now) {
                print_trigger(out, self.now, &trigger)?;
            }
        }

        for i in 1..=frames {
            let next = (start + i as f64 * self.frame).min(end);

            if realtime {
                thread::sleep(Duration::from_secs_f64((next - self.now).max(0.)));
            }

            self.now = next;

            for trigger in self.sequencer.poll(self.now) {
                print_trigger(out, self.now, &trigger)?;
            }
        }

        self.now = end;

        Ok(())
    }

    /// Print the grid, with track names, and where the playhead is
    fn show(&self, out: &mut impl Write) -> Result<()> {
        let sequencer = &self.sequencer;

        writeln!(
            out,
            "{} bpm, step {}, {}",
            sequencer.bpm().get(),
            sequencer.current_step(),
            if sequencer.is_playing() {
                "playing"
            } else {
                "stopped"
            }
        )
        .map_err(Error::Output)?;

        for (line, name) in sequencer.pattern().to_string().lines().zip(&DRUM_NAMES) {
            writeln!(out, "{:<10} {}", name, line).map_err(Error::Output)?;
        }

        Ok(())
    }
}

/// Read and validate a pattern file
pub fn load_pattern(path: &Path) -> Result<Pattern> {
    let text = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(Pattern::from_ron(&text)?)
}

/// Print a trigger as `time step: names`, e.g. `0.500 5: kick, snare`
fn print_trigger(out: &mut impl Write, now: Seconds, trigger: &Trigger) -> Result<()> {
    let names = trigger
        .tracks
        .iter()
        .filter_map(|&track| DRUM_NAMES.get((track as usize).checked_sub(1)?))
        .copied()
        .collect::<Vec<_>>();

    let names = if names.is_empty() {
        "-".to_string()
    } else {
        names.join(", ")
    };

    writeln!(out, "{:.3} {}: {}", now, trigger.step, names).map_err(Error::Output)
}
