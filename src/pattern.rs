//! The 8x16 drum grid.
//!
//! Tracks and steps are 1-based everywhere outside this module, since that's how they're shown to
//! the user and how they're numbered in step triggers. Anything that indexes the grid goes through
//! `Pattern::index`, which is the only place that converts to 0-based array indices.

use crate::error::{Error, ValidationError};
use arrayvec::ArrayVec;
use ron::value::Value;
use std::fmt;

/// A track index in `1..=NUM_TRACKS`
pub type Track = u8;
/// A step index in `1..=NUM_STEPS`
pub type Step = u8;

/// The number of tracks (drum voices) in a pattern
pub const NUM_TRACKS: usize = 8;
/// The number of steps in a pattern, each one a 16th note
pub const NUM_STEPS: usize = 16;

/// The tracks that are active on a single step. There can never be more than `NUM_TRACKS` of
/// these, so we don't need to allocate.
pub type ActiveTracks = ArrayVec<[Track; NUM_TRACKS]>;

/// A fixed-size grid of on/off cells. The dimensions are part of the type, so a `Pattern` is
/// valid by construction - the only validation needed is when converting from untyped input (see
/// `Pattern::from_rows` and `Pattern::from_ron`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Pattern {
    /// Indexed as `cells[track - 1][step - 1]`
    cells: [[bool; NUM_STEPS]; NUM_TRACKS],
}

impl Pattern {
    /// An empty pattern
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert 1-based `(track, step)` to array indices, or `None` if either is out of range.
    fn index(track: Track, step: Step) -> Option<(usize, usize)> {
        let (track, step) = (track as usize, step as usize);

        if (1..=NUM_TRACKS).contains(&track) && (1..=NUM_STEPS).contains(&step) {
            Some((track - 1, step - 1))
        } else {
            None
        }
    }

    /// Build a pattern from a list of tracks, checking that the dimensions are exactly right.
    pub fn from_rows(rows: &[Vec<bool>]) -> Result<Self, ValidationError> {
        if rows.len() != NUM_TRACKS {
            return Err(ValidationError::WrongTrackCount {
                expected: NUM_TRACKS,
                found: rows.len(),
            });
        }

        let mut pattern = Self::new();

        for (i, (row, cells)) in rows.iter().zip(pattern.cells.iter_mut()).enumerate() {
            if row.len() != NUM_STEPS {
                return Err(ValidationError::WrongStepCount {
                    track: i + 1,
                    expected: NUM_STEPS,
                    found: row.len(),
                });
            }

            cells.copy_from_slice(row);
        }

        Ok(pattern)
    }

    /// Parse a pattern from RON, as written by `Pattern::to_ron`. We deliberately go through an
    /// untyped `Value` first instead of deriving `Deserialize`, so that a bad file gets a precise
    /// error (which track, which step) instead of a generic type mismatch.
    pub fn from_ron(text: &str) -> Result<Self, ValidationError> {
        let value: Value =
            ron::from_str(text).map_err(|e| ValidationError::Syntax(e.to_string()))?;

        Self::from_value(&value)
    }

    /// Validate an untyped grid: a list of `NUM_TRACKS` lists of `NUM_STEPS` booleans.
    fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let tracks = match value {
            Value::Seq(tracks) => tracks,
            _ => return Err(ValidationError::NotAList),
        };

        if tracks.len() != NUM_TRACKS {
            return Err(ValidationError::WrongTrackCount {
                expected: NUM_TRACKS,
                found: tracks.len(),
            });
        }

        let mut pattern = Self::new();

        for (i, (track, cells)) in tracks.iter().zip(pattern.cells.iter_mut()).enumerate() {
            let steps = match track {
                Value::Seq(steps) => steps,
                _ => return Err(ValidationError::NotAList),
            };

            if steps.len() != NUM_STEPS {
                return Err(ValidationError::WrongStepCount {
                    track: i + 1,
                    expected: NUM_STEPS,
                    found: steps.len(),
                });
            }

            for (j, (step, cell)) in steps.iter().zip(cells.iter_mut()).enumerate() {
                *cell = match step {
                    Value::Bool(on) => *on,
                    _ => {
                        return Err(ValidationError::NonBooleanCell {
                            track: i + 1,
                            step: j + 1,
                        })
                    }
                };
            }
        }

        Ok(pattern)
    }

    /// Serialise to RON as a list of tracks, each a list of steps.
    pub fn to_ron(&self) -> Result<String, Error> {
        ron::ser::to_string_pretty(&self.rows(), ron::ser::PrettyConfig::default())
            .map_err(|e| Error::Serialize(e.to_string()))
    }

    /// The grid as owned rows, one `Vec` per track
    pub fn rows(&self) -> Vec<Vec<bool>> {
        self.cells.iter().map(|row| row.to_vec()).collect()
    }

    /// Whether the given cell is on. Out-of-range cells are always off.
    pub fn get(&self, track: Track, step: Step) -> bool {
        Self::index(track, step)
            .map(|(t, s)| self.cells[t][s])
            .unwrap_or(false)
    }

    /// Turn a cell on or off. Out-of-range indices are ignored.
    pub fn set(&mut self, track: Track, step: Step, on: bool) {
        if let Some((t, s)) = Self::index(track, step) {
            self.cells[t][s] = on;
        }
    }

    /// Flip a cell. Out-of-range indices are ignored.
    pub fn toggle(&mut self, track: Track, step: Step) {
        if let Some((t, s)) = Self::index(track, step) {
            self.cells[t][s] = !self.cells[t][s];
        }
    }

    /// Turn every cell off
    pub fn clear(&mut self) {
        self.cells = Default::default();
    }

    /// Whether no cell is on
    pub fn is_empty(&self) -> bool {
        self.cells.iter().flatten().all(|&on| !on)
    }

    /// The tracks that should sound on the given step, in ascending order.
    pub fn active_tracks(&self, step: Step) -> ActiveTracks {
        (1..=NUM_TRACKS as Track)
            .filter(|&track| self.get(track, step))
            .collect()
    }
}

impl fmt::Display for Pattern {
    /// One line per track, `x` for on and `.` for off, with a gap every beat.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.cells.iter().enumerate() {
            write!(f, "{}", i + 1)?;

            for (j, &on) in row.iter().enumerate() {
                if j % 4 == 0 {
                    write!(f, " ")?;
                }

                write!(f, "{}", if on { 'x' } else { '.' })?;
            }

            writeln!(f)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_is_ignored() {
        let mut pattern = Pattern::new();

        pattern.toggle(0, 1);
        pattern.toggle(9, 1);
        pattern.toggle(1, 0);
        pattern.toggle(1, 17);
        pattern.set(255, 255, true);

        assert!(pattern.is_empty());
        assert!(!pattern.get(0, 0));
        assert!(!pattern.get(9, 17));
    }

    #[test]
    fn toggle_and_set() {
        let mut pattern = Pattern::new();

        pattern.toggle(1, 1);
        pattern.toggle(8, 16);
        assert!(pattern.get(1, 1));
        assert!(pattern.get(8, 16));

        pattern.toggle(1, 1);
        assert!(!pattern.get(1, 1));

        pattern.set(3, 5, true);
        pattern.set(3, 5, true);
        assert!(pattern.get(3, 5));

        pattern.clear();
        assert!(pattern.is_empty());
    }

    #[test]
    fn active_tracks_are_ascending() {
        let mut pattern = Pattern::new();

        pattern.set(5, 3, true);
        pattern.set(1, 3, true);
        pattern.set(8, 3, true);
        pattern.set(2, 4, true);

        assert_eq!(pattern.active_tracks(3).as_slice(), &[1, 5, 8]);
        assert_eq!(pattern.active_tracks(4).as_slice(), &[2]);
        assert!(pattern.active_tracks(1).is_empty());
        assert!(pattern.active_tracks(17).is_empty());
    }

    #[test]
    fn from_rows_checks_dimensions() {
        let good = vec![vec![false; NUM_STEPS]; NUM_TRACKS];
        assert_eq!(Pattern::from_rows(&good), Ok(Pattern::new()));

        assert_eq!(
            Pattern::from_rows(&good[..7]),
            Err(ValidationError::WrongTrackCount {
                expected: 8,
                found: 7
            })
        );

        let mut short = good.clone();
        short[2].pop();
        assert_eq!(
            Pattern::from_rows(&short),
            Err(ValidationError::WrongStepCount {
                track: 3,
                expected: 16,
                found: 15
            })
        );
    }

    #[test]
    fn ron_round_trip() {
        let mut pattern = Pattern::new();
        pattern.set(1, 1, true);
        pattern.set(2, 5, true);
        pattern.set(3, 16, true);

        let text = pattern.to_ron().unwrap();

        assert_eq!(Pattern::from_ron(&text), Ok(pattern));
    }

    #[test]
    fn ron_rejects_malformed_grids() {
        let row = format!("[{}]", vec!["false"; NUM_STEPS].join(", "));
        let grid = |rows: Vec<String>| format!("[{}]", rows.join(", "));

        assert!(matches!(
            Pattern::from_ron("[[true"),
            Err(ValidationError::Syntax(_))
        ));
        assert_eq!(Pattern::from_ron("true"), Err(ValidationError::NotAList));
        assert_eq!(
            Pattern::from_ron(&grid(vec![row.clone(); 9])),
            Err(ValidationError::WrongTrackCount {
                expected: 8,
                found: 9
            })
        );

        let mut rows = vec![row.clone(); NUM_TRACKS];
        rows[7] = "[true, false]".to_string();
        assert_eq!(
            Pattern::from_ron(&grid(rows)),
            Err(ValidationError::WrongStepCount {
                track: 8,
                expected: 16,
                found: 2
            })
        );

        let mut rows = vec![row; NUM_TRACKS];
        rows[1] = format!("[false, 1, {}]", vec!["false"; NUM_STEPS - 2].join(", "));
        assert_eq!(
            Pattern::from_ron(&grid(rows)),
            Err(ValidationError::NonBooleanCell { track: 2, step: 2 })
        );
    }

    #[test]
    fn display() {
        let mut pattern = Pattern::new();
        pattern.set(1, 1, true);
        pattern.set(1, 5, true);

        let text = pattern.to_string();
        let first = text.lines().next().unwrap();

        assert_eq!(first, "1 x... x... .... ....");
        assert_eq!(text.lines().count(), NUM_TRACKS);
    }
}
