//! Tempo model, per-step hold times and the total-duration dry run.
//!
//! Live playback and [`DurationModel::total_duration`] share
//! [`DurationModel::step_hold`], so the precomputed total always matches the
//! time a natural run takes from `play` to end of score.

use serde::{Deserialize, Serialize};

use crate::cursor::{CursorNote, ScoreCursor};

/// Tempo used when none is configured.
pub const DEFAULT_BPM: f64 = 100.0;

/// Shortest step the scheduler will arm. Zero-length positions (rests
/// without duration, malformed lengths) still take this long.
pub const MIN_AUDIBLE_HOLD_SECS: f64 = 0.1;

/// Beats in one whole note.
pub const BEATS_PER_WHOLE: f64 = 4.0;

/// Note length as a fraction of a whole note (1.0 = four beats).
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteLength(f64);

impl NoteLength {
    pub const WHOLE: NoteLength = NoteLength(1.0);
    pub const HALF: NoteLength = NoteLength(0.5);
    pub const QUARTER: NoteLength = NoteLength(0.25);
    pub const EIGHTH: NoteLength = NoteLength(0.125);

    /// Negative and non-finite fractions clamp to zero.
    pub fn new(fraction: f64) -> Self {
        if fraction.is_finite() && fraction > 0.0 {
            Self(fraction)
        } else {
            Self(0.0)
        }
    }

    pub fn fraction(self) -> f64 {
        self.0
    }

    pub fn beats(self) -> f64 {
        self.0 * BEATS_PER_WHOLE
    }
}

/// Beats per minute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    /// Non-positive or non-finite tempos fall back to [`DEFAULT_BPM`].
    pub fn new(bpm: f64) -> Self {
        if bpm.is_finite() && bpm > 0.0 {
            Self { bpm }
        } else {
            log::warn!("tempo {bpm} bpm is not usable; using {DEFAULT_BPM}");
            Self { bpm: DEFAULT_BPM }
        }
    }

    pub fn bpm(self) -> f64 {
        self.bpm
    }

    /// Seconds per beat: `60 / bpm`.
    pub fn beat_secs(self) -> f64 {
        60.0 / self.bpm
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self { bpm: DEFAULT_BPM }
    }
}

/// Hold time in seconds for a note length at a tempo, with the default floor.
pub fn hold_secs(length: NoteLength, bpm: f64) -> f64 {
    DurationModel::new(Tempo::new(bpm), MIN_AUDIBLE_HOLD_SECS).hold_secs(length)
}

/// Converts note lengths into wall-clock hold times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationModel {
    pub tempo: Tempo,
    pub min_hold_secs: f64,
}

impl Default for DurationModel {
    fn default() -> Self {
        Self {
            tempo: Tempo::default(),
            min_hold_secs: MIN_AUDIBLE_HOLD_SECS,
        }
    }
}

impl DurationModel {
    pub fn new(tempo: Tempo, min_hold_secs: f64) -> Self {
        Self {
            tempo,
            min_hold_secs: min_hold_secs.max(0.0),
        }
    }

    /// `max(min_hold, length * 4 * 60 / bpm)`.
    pub fn hold_secs(&self, length: NoteLength) -> f64 {
        (length.beats() * self.tempo.beat_secs()).max(self.min_hold_secs)
    }

    /// Hold time for one cursor position: a chord lasts as long as its
    /// longest note. Rests count toward the length too.
    pub fn step_hold(&self, notes: &[CursorNote]) -> f64 {
        self.hold_secs(step_length(notes))
    }

    /// Sum of step holds from the first cursor position to the end.
    ///
    /// Drives the cursor without showing it, dispatching audio or moving any
    /// overlay, and leaves it rewound.
    pub fn total_duration(&self, cursor: &mut dyn ScoreCursor) -> f64 {
        cursor.reset();
        let mut total = 0.0;
        let mut steps = 0usize;
        while !cursor.end_reached() {
            total += self.step_hold(&cursor.notes_under_cursor());
            cursor.next();
            steps += 1;
        }
        cursor.reset();
        log::debug!("total duration: {total:.3}s over {steps} steps at {} bpm", self.tempo.bpm());
        total
    }
}

/// Longest length among simultaneous notes; zero for an empty position.
pub fn step_length(notes: &[CursorNote]) -> NoteLength {
    notes
        .iter()
        .map(|n| n.length)
        .fold(NoteLength::default(), |max, l| if l > max { l } else { max })
}
