//! The playback clock, which turns wall-clock time into step triggers.
//!
//! There's no timer thread: the host calls `Clock::poll` once per update (a frame, an audio
//! callback, whatever it has) with the current time, and the clock works out which steps have been
//! reached since the last poll. Because the position is always derived from `now - start`, rather
//! than accumulated from frame deltas, the clock doesn't drift no matter how irregular the polling
//! is. The price is that changing the tempo has to move `start` so that the derived position stays
//! where it was (see `Clock::set_bpm`).

use crate::{
    pattern::{Step, NUM_STEPS},
    tempo::Bpm,
};
use arrayvec::ArrayVec;
use num_integer::Integer;

/// A point in time, in seconds, from whatever monotonic source the host uses. Only differences
/// between two `Seconds` are ever looked at, so the epoch doesn't matter.
pub type Seconds = f64;

/// The most steps a single `poll` will process. If the host stalls for longer than this (e.g. the
/// window was minimised, or the process was suspended) we jump straight to the current position
/// instead of firing a burst of stale triggers.
pub const MAX_CATCH_UP: usize = 32;

/// The steps fired by a single `poll`, in the order they were reached. Since `poll` never processes
/// more than `MAX_CATCH_UP` steps this never needs to allocate.
pub type FiredSteps = ArrayVec<[Step; MAX_CATCH_UP]>;

/// The largest step index the clock will count up to. Beyond 2^52 an `f64` can't tell adjacent
/// steps apart anyway, and capping here keeps the index arithmetic from overflowing when the host
/// passes an absurd (or infinite) time.
const MAX_STEP_INDEX: u64 = 1 << 52;

/// Transport state and playback position.
#[derive(Debug, Clone)]
pub struct Clock {
    /// Whether we're currently playing
    playing: bool,
    /// The step that's currently sounding (or that playback will resume from), always in
    /// `1..=NUM_STEPS`
    current_step: Step,
    /// The time that step index 0 started at. This is moved when the tempo changes.
    start_reference: Seconds,
    /// Number of step indices that have been processed since `play`. Never decreases while playing.
    processed_steps: u64,
    /// The 0-based step that index 0 maps to, so that playback can resume from where it was
    /// paused. After a `stop` this is always 0.
    origin: u64,
    /// The last step index a trigger was fired for. `play` fires index 0 itself, this stops the
    /// first `poll` from firing it a second time.
    last_fired: Option<u64>,
    /// The current tempo
    bpm: Bpm,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(Bpm::default())
    }
}

impl Clock {
    /// Create a stopped clock at step 1
    pub fn new(bpm: Bpm) -> Self {
        Clock {
            playing: false,
            current_step: 1,
            start_reference: 0.,
            processed_steps: 0,
            origin: 0,
            last_fired: None,
            bpm,
        }
    }

    /// Whether the transport is running
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// The step at the playhead, in `1..=NUM_STEPS`
    pub fn current_step(&self) -> Step {
        self.current_step
    }

    /// Number of step indices processed since the last `play`
    pub fn processed_steps(&self) -> u64 {
        self.processed_steps
    }

    /// The current tempo
    pub fn bpm(&self) -> Bpm {
        self.bpm
    }

    /// The length of a step at the current tempo
    pub fn step_duration(&self) -> Seconds {
        self.bpm.step_duration()
    }

    /// Map a step index (counted from `play`) to the 1-based step number in the pattern
    fn step_number(&self, index: u64) -> Step {
        let steps = NUM_STEPS as u64;

        ((self.origin + index.mod_floor(&steps)).mod_floor(&steps) + 1) as Step
    }

    /// How far through the loop we are at `now`, in steps (whole steps plus the fraction through
    /// the current one)
    fn elapsed_steps(&self, now: Seconds) -> f64 {
        (now - self.start_reference).max(0.) / self.step_duration()
    }

    /// The index of the step that `now` falls in, capped at `MAX_STEP_INDEX`
    fn step_index(&self, now: Seconds) -> u64 {
        (self.elapsed_steps(now).floor() as u64).min(MAX_STEP_INDEX)
    }

    /// Start playing from the current step. The current step is fired immediately and returned, so
    /// the first note has no latency. If we're already playing this does nothing and returns
    /// `None`.
    pub fn play(&mut self, now: Seconds) -> Option<Step> {
        if self.playing {
            return None;
        }

        self.playing = true;
        self.start_reference = now;
        self.processed_steps = 0;
        self.origin = (self.current_step - 1) as u64;
        self.last_fired = Some(0);

        tracing::debug!(step = self.current_step, bpm = self.bpm.get(), "play");

        Some(self.current_step)
    }

    /// Stop playing but keep the current step, so the next `play` picks up where we left off.
    pub fn pause(&mut self) {
        if !self.playing {
            return;
        }

        self.playing = false;
        self.processed_steps = 0;
        self.last_fired = None;

        tracing::debug!(step = self.current_step, "pause");
    }

    /// Stop playing and rewind to step 1. No trigger is fired.
    pub fn stop(&mut self) {
        self.playing = false;
        self.current_step = 1;
        self.processed_steps = 0;
        self.origin = 0;
        self.last_fired = None;

        tracing::debug!("stop");
    }

    /// Advance to `now`, returning every step that was reached since the last poll in increasing
    /// order. Does nothing if we're stopped.
    ///
    /// Each step index is fired at most once, and as long as the host polls at least once every
    /// `MAX_CATCH_UP` steps no step is ever skipped. If it doesn't, this poll fires nothing and
    /// skips ahead, and the next poll fires the step we landed on.
    pub fn poll(&mut self, now: Seconds) -> FiredSteps {
        let mut fired = FiredSteps::new();

        if !self.playing {
            return fired;
        }

        // Float rounding after a tempo change can put us a hair before a step boundary that we've
        // already crossed, so we never let the target move backwards.
        let target = self
            .step_index(now)
            .max(self.processed_steps.saturating_sub(1));
        let pending = (target + 1).saturating_sub(self.processed_steps);

        if pending > MAX_CATCH_UP as u64 {
            tracing::warn!(pending, "clock fell behind, skipping ahead");

            self.processed_steps = target;
        } else {
            while self.processed_steps <= target {
                let index = self.processed_steps;

                if self.last_fired != Some(index) {
                    fired.push(self.step_number(index));
                    self.last_fired = Some(index);
                }

                self.processed_steps += 1;
            }
        }

        self.current_step = self.step_number(target);

        fired
    }

    /// Change the tempo, clamping it into range (the clamping happens in `Bpm::new`).
    ///
    /// If we're playing, `start_reference` is moved so that the position at `now` (both the step
    /// and how far through that step we are) is the same under the new tempo as under the old one.
    /// Only the speed of what comes after changes, so there's no audible jump.
    pub fn set_bpm(&mut self, bpm: Bpm, now: Seconds) {
        if bpm == self.bpm {
            return;
        }

        if self.playing {
            let position = self.elapsed_steps(now);

            self.bpm = bpm;
            self.start_reference = now - position * self.step_duration();
        } else {
            self.bpm = bpm;
        }

        tracing::debug!(bpm = bpm.get(), playing = self.playing, "tempo change");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// At 120 BPM a step is exactly 1/8 of a second, so all the times in these tests are exactly
    /// representable and there are no rounding surprises at step boundaries.
    const DUR: Seconds = 0.125;

    fn playing_at_120() -> Clock {
        let mut clock = Clock::new(Bpm::new(120));

        assert_eq!(clock.play(0.), Some(1));

        clock
    }

    #[test]
    fn step_duration_follows_tempo() {
        let mut clock = Clock::default();

        assert_eq!(clock.step_duration(), DUR);

        clock.set_bpm(Bpm::new(1000), 0.);
        assert_eq!(clock.bpm().get(), 300);
        assert_eq!(clock.step_duration(), 60. / 300. / 4.);

        clock.set_bpm(Bpm::new(1), 0.);
        assert_eq!(clock.bpm().get(), 60);
        assert_eq!(clock.step_duration(), 0.25);
    }

    #[test]
    fn first_step_fires_once() {
        let mut clock = playing_at_120();

        assert!(clock.poll(0.).is_empty());
        assert_eq!(clock.current_step(), 1);
        assert!(clock.poll(0.5 * DUR).is_empty());
        assert_eq!(clock.current_step(), 1);
    }

    #[test]
    fn fires_next_step_only() {
        let mut clock = playing_at_120();

        assert_eq!(clock.poll(1.5 * DUR).as_slice(), &[2]);
        assert_eq!(clock.current_step(), 2);
        assert!(clock.poll(1.9 * DUR).is_empty());
    }

    #[test]
    fn dense_polling_never_skips() {
        let mut clock = Clock::new(Bpm::new(120));
        let mut fired = vec![];

        fired.extend(clock.play(0.));

        for i in 0..=160 {
            fired.extend(clock.poll(i as f64 * DUR / 4.));
        }

        let expected = (0..=40).map(|i| (i % 16 + 1) as Step).collect::<Vec<_>>();

        assert_eq!(fired, expected);
        assert_eq!(clock.current_step(), 40 % 16 + 1);
        assert_eq!(clock.processed_steps(), 41);
    }

    #[test]
    fn catch_up_fires_in_order() {
        let mut clock = playing_at_120();
        let fired = clock.poll(5.5 * DUR);

        assert_eq!(fired.as_slice(), &[2, 3, 4, 5, 6]);
        assert_eq!(clock.current_step(), 6);
    }

    #[test]
    fn catch_up_is_bounded() {
        let mut clock = playing_at_120();

        // 32 pending indices (0 is already fired by `play`) is still allowed
        assert_eq!(clock.poll(31.5 * DUR).len(), 31);

        let mut clock = playing_at_120();

        assert!(clock.poll(100.5 * DUR).is_empty());
        assert_eq!(clock.current_step(), 100 % 16 + 1);
        assert_eq!(clock.processed_steps(), 100);

        // The step we skipped to gets fired next time round
        assert_eq!(clock.poll(100.75 * DUR).as_slice(), &[5]);
        assert_eq!(clock.poll(101.25 * DUR).as_slice(), &[6]);
    }

    #[test]
    fn stop_rewinds_without_firing() {
        let mut clock = playing_at_120();

        clock.poll(3.5 * DUR);
        assert_eq!(clock.current_step(), 4);

        clock.stop();
        assert!(!clock.is_playing());
        assert_eq!(clock.current_step(), 1);
        assert_eq!(clock.processed_steps(), 0);
        assert!(clock.poll(10.).is_empty());
        assert_eq!(clock.current_step(), 1);
    }

    #[test]
    fn play_while_playing_is_ignored() {
        let mut clock = playing_at_120();

        clock.poll(2.5 * DUR);
        assert_eq!(clock.play(2.5 * DUR), None);
        assert_eq!(clock.poll(3.5 * DUR).as_slice(), &[4]);
    }

    #[test]
    fn pause_resumes_from_current_step() {
        let mut clock = playing_at_120();

        clock.poll(4.5 * DUR);
        clock.pause();
        assert_eq!(clock.current_step(), 5);
        assert!(clock.poll(10.).is_empty());

        assert_eq!(clock.play(10.), Some(5));
        assert!(clock.poll(10.).is_empty());
        assert_eq!(clock.poll(10. + 1.5 * DUR).as_slice(), &[6]);
        assert_eq!(clock.poll(10. + 12.5 * DUR).len(), 11);
        assert_eq!(clock.current_step(), 1);
    }

    #[test]
    fn tempo_change_keeps_phase() {
        let mut clock = playing_at_120();
        let now = 5.5 * DUR;

        clock.poll(now);
        let before = clock.current_step();

        clock.set_bpm(Bpm::new(60), now);
        assert_eq!(clock.current_step(), before);
        assert!(clock.poll(now).is_empty());
        assert_eq!(clock.current_step(), before);

        // We were half way through step 6. At 60 BPM a step is 0.25s, so the rest of it takes
        // another 0.125s rather than the 0.0625s it would have at 120.
        assert!(clock.poll(now + 0.0625 + 0.01).is_empty());
        assert!(clock.poll(now + 0.125 - 0.01).is_empty());
        assert_eq!(clock.poll(now + 0.125 + 0.01).as_slice(), &[7]);
        assert_eq!(clock.poll(now + 0.125 + 0.25 + 0.01).as_slice(), &[8]);
    }

    #[test]
    fn tempo_change_on_boundary_does_not_refire() {
        let mut clock = playing_at_120();
        let now = 3. * DUR;

        assert_eq!(clock.poll(now).as_slice(), &[2, 3, 4]);

        clock.set_bpm(Bpm::new(97), now);
        assert!(clock.poll(now).is_empty());
        assert_eq!(clock.current_step(), 4);
    }

    #[test]
    fn same_tempo_is_a_no_op() {
        let mut clock = playing_at_120();

        clock.set_bpm(Bpm::new(120), 100.);
        assert_eq!(clock.poll(1.5 * DUR).as_slice(), &[2]);
    }

    #[test]
    fn huge_times_do_not_overflow() {
        let mut clock = playing_at_120();

        assert!(clock.poll(1e20).is_empty());
        assert_eq!(clock.processed_steps(), MAX_STEP_INDEX);
        assert_eq!(clock.current_step(), 1);

        // Pinned at the cap, the step it landed on fires once and then nothing else
        assert_eq!(clock.poll(f64::INFINITY).as_slice(), &[1]);
        assert!(clock.poll(f64::INFINITY).is_empty());
        assert!(clock.poll(1e30).is_empty());

        let mut clock = playing_at_120();

        assert!(clock.poll(f64::NAN).is_empty());
        assert_eq!(clock.current_step(), 1);
        assert_eq!(clock.poll(1.5 * DUR).as_slice(), &[2]);
    }
}
