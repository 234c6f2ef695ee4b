//! Converting a pattern into MIDI events for one loop.

use crate::{
    error::EncodingError,
    pattern::{Pattern, Step, Track, NUM_STEPS, NUM_TRACKS},
    smf::{pack_u24, MAX_DATA, MAX_DIVISION},
    tempo::Bpm,
};
use num_integer::Integer;
use serde::Deserialize;

/// A tick in the output file, relative to the start of the loop
pub type Tick = u32;

/// The SMF time base. 96 divides cleanly into 16ths (and triplets), which is all we need.
pub const TICKS_PER_QUARTER: u16 = 96;
/// The velocity every note is written with
pub const DEFAULT_VELOCITY: u8 = 100;
/// General MIDI puts percussion on channel 10, which is 9 when zero-indexed
pub const DRUM_CHANNEL: u8 = 9;
/// The name written to the track name meta event
pub const DEFAULT_TRACK_NAME: &str = "Drum Pattern";

/// Status nibble for a note-on message
pub const NOTE_ON: u8 = 0x90;
/// Status nibble for a note-off message
pub const NOTE_OFF: u8 = 0x80;

/// Meta event type for the sequence/track name
pub const META_TRACK_NAME: u8 = 0x03;
/// Meta event type for end-of-track. Every track chunk must finish with one of these.
pub const META_END_OF_TRACK: u8 = 0x2F;
/// Meta event type for "set tempo", whose payload is 24-bit microseconds per quarter note
pub const META_SET_TEMPO: u8 = 0x51;

/// The General MIDI percussion key for each track, indexed by `track - 1`.
pub const DRUM_MAP: [u8; NUM_TRACKS] = [
    36, // kick
    38, // snare
    42, // closed hi-hat
    46, // open hi-hat
    49, // crash
    51, // ride
    45, // low tom
    50, // high tom
];

/// Human-readable names for the tracks, for display only
pub const DRUM_NAMES: [&str; NUM_TRACKS] = [
    "kick", "snare", "closed hat", "open hat", "crash", "ride", "low tom", "high tom",
];

/// The GM key for a track, or `None` if the track doesn't exist
pub fn drum_note(track: Track) -> Option<u8> {
    DRUM_MAP.get((track as usize).checked_sub(1)?).copied()
}

/// A single event in the output track, at an absolute tick.
///
/// There are exactly two kinds of event we write, and the encoder matches on this exhaustively, so
/// it's impossible to build something that has the fields of both or neither.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiEvent {
    /// A channel voice message (note-on/off, CC, etc.)
    Channel {
        /// Absolute time of the event
        tick: Tick,
        /// Status byte, including the channel in the low nibble
        status: u8,
        /// First data byte
        data1: u8,
        /// Second data byte. Not written for messages which only take one data byte.
        data2: u8,
    },
    /// A meta event, which only exists in files and is never sent to a device
    Meta {
        /// Absolute time of the event
        tick: Tick,
        /// The meta event type, e.g. `META_SET_TEMPO`
        kind: u8,
        /// The raw payload, whose length is written before it as a VLQ
        payload: Vec<u8>,
    },
}

impl MidiEvent {
    /// A note-on on the drum channel
    pub fn note_on(tick: Tick, note: u8, velocity: u8) -> Self {
        MidiEvent::Channel {
            tick,
            status: NOTE_ON | DRUM_CHANNEL,
            data1: note,
            data2: velocity,
        }
    }

    /// A note-off on the drum channel
    pub fn note_off(tick: Tick, note: u8) -> Self {
        MidiEvent::Channel {
            tick,
            status: NOTE_OFF | DRUM_CHANNEL,
            data1: note,
            data2: 0,
        }
    }

    /// A meta event
    pub fn meta(tick: Tick, kind: u8, payload: impl Into<Vec<u8>>) -> Self {
        MidiEvent::Meta {
            tick,
            kind,
            payload: payload.into(),
        }
    }

    /// The absolute time of this event
    pub fn tick(&self) -> Tick {
        match *self {
            MidiEvent::Channel { tick, .. } | MidiEvent::Meta { tick, .. } => tick,
        }
    }

    /// Whether this is a meta event
    pub fn is_meta(&self) -> bool {
        matches!(self, MidiEvent::Meta { .. })
    }

    /// Where this event goes relative to other events on the same tick: meta events like the
    /// track name and tempo go first so they're in effect before any notes, then channel events,
    /// and end-of-track always goes last.
    fn order(&self) -> u8 {
        match self {
            MidiEvent::Meta {
                kind: self::META_END_OF_TRACK,
                ..
            } => 2,
            MidiEvent::Meta { .. } => 0,
            MidiEvent::Channel { .. } => 1,
        }
    }
}

/// Export settings. Every field has a default, so this can be partially specified in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Ticks per quarter note. Must be a non-zero multiple of 16 so that steps and note lengths
    /// land on whole ticks, see `validate`.
    pub resolution: u16,
    /// Velocity for every note-on
    pub velocity: u8,
    /// Written as the track name meta event
    pub track_name: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            resolution: TICKS_PER_QUARTER,
            velocity: DEFAULT_VELOCITY,
            track_name: DEFAULT_TRACK_NAME.to_string(),
        }
    }
}

impl ExportOptions {
    /// Check that these options describe a file that can be written. Runs before any events are
    /// built, so bad options never get as far as the encoder.
    pub fn validate(&self) -> Result<(), EncodingError> {
        if self.resolution == 0 || self.resolution % 16 != 0 {
            return Err(EncodingError::InvalidResolution(self.resolution));
        }

        if self.resolution > MAX_DIVISION {
            return Err(EncodingError::InvalidDivision(self.resolution));
        }

        if self.velocity > MAX_DATA {
            return Err(EncodingError::InvalidData(self.velocity));
        }

        Ok(())
    }

    /// Ticks per 16th note
    pub fn ticks_per_step(&self) -> Tick {
        (self.resolution as Tick).div_floor(&4)
    }

    /// How long each drum hit is held for: a quarter of a step
    pub fn note_length(&self) -> Tick {
        self.ticks_per_step().div_floor(&4)
    }
}

/// Build the events for one loop of the pattern with the default export options. See
/// `build_events_with`.
pub fn build_events(pattern: &Pattern, bpm: Bpm) -> Vec<MidiEvent> {
    build_events_with(pattern, bpm, &ExportOptions::default())
}

/// Build the events for exactly one loop of the pattern, sorted by tick.
///
/// The output is a track name and a tempo at tick 0, a note-on and note-off pair for every active
/// cell, and an end-of-track at the end of the 16th step. Events on the same tick are ordered by
/// `MidiEvent::order`, and otherwise keep the order they were generated in (step, then track).
pub fn build_events_with(pattern: &Pattern, bpm: Bpm, options: &ExportOptions) -> Vec<MidiEvent> {
    let ticks_per_step = options.ticks_per_step();
    let note_length = options.note_length();

    let mut events = vec![
        MidiEvent::meta(0, META_TRACK_NAME, options.track_name.as_bytes()),
        MidiEvent::meta(0, META_SET_TEMPO, pack_u24(bpm.micros_per_quarter())),
    ];

    for step in 1..=NUM_STEPS as Step {
        let step_tick = (step as Tick - 1) * ticks_per_step;

        for track in pattern.active_tracks(step) {
            // `active_tracks` only returns tracks in range
            let note = match drum_note(track) {
                Some(note) => note,
                None => continue,
            };

            events.push(MidiEvent::note_on(step_tick, note, options.velocity));
            events.push(MidiEvent::note_off(step_tick + note_length, note));
        }
    }

    events.push(MidiEvent::meta(
        NUM_STEPS as Tick * ticks_per_step,
        META_END_OF_TRACK,
        Vec::new(),
    ));

    // `sort_by_key` is stable, so ties keep their insertion order
    events.sort_by_key(|event| (event.tick(), event.order()));

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_events(events: &[MidiEvent]) -> Vec<(Tick, u8, u8, u8)> {
        events
            .iter()
            .filter_map(|event| match *event {
                MidiEvent::Channel {
                    tick,
                    status,
                    data1,
                    data2,
                } => Some((tick, status, data1, data2)),
                MidiEvent::Meta { .. } => None,
            })
            .collect()
    }

    #[test]
    fn empty_pattern_is_only_meta() {
        let events = build_events(&Pattern::new(), Bpm::new(120));

        assert_eq!(
            events,
            vec![
                MidiEvent::meta(0, META_TRACK_NAME, DEFAULT_TRACK_NAME.as_bytes()),
                MidiEvent::meta(0, META_SET_TEMPO, vec![0x07, 0xA1, 0x20]),
                MidiEvent::meta(384, META_END_OF_TRACK, vec![]),
            ]
        );
    }

    #[test]
    fn single_kick() {
        let mut pattern = Pattern::new();
        pattern.set(1, 1, true);

        let events = build_events(&pattern, Bpm::new(120));

        assert_eq!(events.len(), 5);
        assert_eq!(
            events[1],
            MidiEvent::meta(0, META_SET_TEMPO, pack_u24(500_000))
        );
        assert_eq!(
            channel_events(&events),
            vec![(0, 0x99, 36, 100), (6, 0x89, 36, 0)]
        );
        assert_eq!(events[4], MidiEvent::meta(384, META_END_OF_TRACK, vec![]));
    }

    #[test]
    fn meta_before_notes_on_tick_zero() {
        let mut pattern = Pattern::new();
        pattern.set(2, 1, true);

        let events = build_events(&pattern, Bpm::new(90));

        assert!(events[0].is_meta());
        assert!(events[1].is_meta());
        assert!(!events[2].is_meta());
        assert_eq!(events[2].tick(), 0);
    }

    #[test]
    fn uses_drum_map_and_step_ticks() {
        let mut pattern = Pattern::new();

        for track in 1..=NUM_TRACKS as Track {
            pattern.set(track, track * 2, true);
        }

        let events = build_events(&pattern, Bpm::new(120));
        let notes = channel_events(&events)
            .into_iter()
            .filter(|&(_, status, _, _)| status == 0x99)
            .map(|(tick, _, note, _)| (tick, note))
            .collect::<Vec<_>>();

        assert_eq!(
            notes,
            vec![
                (24, 36),
                (72, 38),
                (120, 42),
                (168, 46),
                (216, 49),
                (264, 51),
                (312, 45),
                (360, 50),
            ]
        );
    }

    #[test]
    fn sorted_with_end_of_track_last() {
        let mut pattern = Pattern::new();

        for track in 1..=NUM_TRACKS as Track {
            for step in 1..=NUM_STEPS as Step {
                pattern.set(track, step, true);
            }
        }

        let events = build_events(&pattern, Bpm::new(300));

        assert_eq!(events.len(), 2 + 2 * NUM_TRACKS * NUM_STEPS + 1);
        assert!(events.windows(2).all(|w| w[0].tick() <= w[1].tick()));
        assert_eq!(
            events.last(),
            Some(&MidiEvent::meta(384, META_END_OF_TRACK, vec![]))
        );

        // Notes on the same step keep track order
        let first_step = channel_events(&events)
            .into_iter()
            .take(NUM_TRACKS)
            .map(|(_, _, note, _)| note)
            .collect::<Vec<_>>();
        assert_eq!(first_step, DRUM_MAP.to_vec());
    }

    #[test]
    fn options_change_resolution_and_velocity() {
        let mut pattern = Pattern::new();
        pattern.set(3, 2, true);

        let options = ExportOptions {
            resolution: 480,
            velocity: 127,
            track_name: "hats".to_string(),
        };
        let events = build_events_with(&pattern, Bpm::new(120), &options);

        assert_eq!(events[0], MidiEvent::meta(0, META_TRACK_NAME, &b"hats"[..]));
        assert_eq!(
            channel_events(&events),
            vec![(120, 0x99, 42, 127), (150, 0x89, 42, 0)]
        );
        assert_eq!(events.last().map(MidiEvent::tick), Some(16 * 120));
    }

    #[test]
    fn drum_note_bounds() {
        assert_eq!(drum_note(0), None);
        assert_eq!(drum_note(1), Some(36));
        assert_eq!(drum_note(8), Some(50));
        assert_eq!(drum_note(9), None);
    }

    #[test]
    fn options_are_validated() {
        let with = |resolution, velocity| ExportOptions {
            resolution,
            velocity,
            ..ExportOptions::default()
        };

        assert_eq!(ExportOptions::default().validate(), Ok(()));
        assert_eq!(with(16, 1).validate(), Ok(()));
        assert_eq!(with(480, 127).validate(), Ok(()));

        for &resolution in &[0, 2, 8, 24 + 1, 100] {
            assert_eq!(
                with(resolution, 100).validate(),
                Err(EncodingError::InvalidResolution(resolution))
            );
        }

        assert_eq!(
            with(0x8000, 100).validate(),
            Err(EncodingError::InvalidDivision(0x8000))
        );
        assert_eq!(
            with(96, 128).validate(),
            Err(EncodingError::InvalidData(128))
        );
        assert_eq!(
            with(96, 200).validate(),
            Err(EncodingError::InvalidData(200))
        );
    }
}
