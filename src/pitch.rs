//! Canonical pitch names and normalization of heterogeneous pitch descriptors.
//!
//! Score models describe pitches in several shapes: a fundamental-note index
//! or a step letter, an alteration in half tones or an accidental symbol, an
//! octave number or only a MIDI number. [`normalize`] folds any of them into
//! a [`PitchName`] such as `C4`, `F#3` or `Bbb5`, and never fails.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// Largest number of sharps or flats a pitch name can carry.
pub const MAX_ALTER: i8 = 2;

/// Octave used when a descriptor carries neither an octave nor a MIDI number.
pub const DEFAULT_OCTAVE: i32 = 4;

// ─── Letter ──────────────────────────────────────────────────────────

/// Note letter, ordered as fundamental-note indices (C = 0 … B = 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Letter {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Letter {
    pub const ALL: [Letter; 7] = [
        Letter::C,
        Letter::D,
        Letter::E,
        Letter::F,
        Letter::G,
        Letter::A,
        Letter::B,
    ];

    /// Letter for a fundamental-note index (0 = C … 6 = B).
    pub fn from_index(index: i64) -> Option<Letter> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Letter for a character, case-insensitive.
    pub fn from_char(c: char) -> Option<Letter> {
        match c.to_ascii_uppercase() {
            'C' => Some(Letter::C),
            'D' => Some(Letter::D),
            'E' => Some(Letter::E),
            'F' => Some(Letter::F),
            'G' => Some(Letter::G),
            'A' => Some(Letter::A),
            'B' => Some(Letter::B),
            _ => None,
        }
    }

    /// Semitones above C within one octave.
    pub fn semitone(self) -> i32 {
        match self {
            Letter::C => 0,
            Letter::D => 2,
            Letter::E => 4,
            Letter::F => 5,
            Letter::G => 7,
            Letter::A => 9,
            Letter::B => 11,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Letter::C => 'C',
            Letter::D => 'D',
            Letter::E => 'E',
            Letter::F => 'F',
            Letter::G => 'G',
            Letter::A => 'A',
            Letter::B => 'B',
        }
    }
}

// ─── PitchName ───────────────────────────────────────────────────────

/// Canonical pitch: `<A–G>(#|b){0,2}<octave>`.
///
/// Two names are equal exactly when their canonical strings are equal, so
/// `C#4` and `Db4` are different names even though they share a MIDI number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PitchName {
    letter: Letter,
    alter: i8,
    octave: i32,
}

/// Sharp spelling for each pitch class, used when re-encoding MIDI numbers.
const SHARP_SPELLING: [(Letter, i8); 12] = [
    (Letter::C, 0),
    (Letter::C, 1),
    (Letter::D, 0),
    (Letter::D, 1),
    (Letter::E, 0),
    (Letter::F, 0),
    (Letter::F, 1),
    (Letter::G, 0),
    (Letter::G, 1),
    (Letter::A, 0),
    (Letter::A, 1),
    (Letter::B, 0),
];

impl PitchName {
    /// Build a name; `None` if `alter` is outside `-2..=2`.
    pub fn new(letter: Letter, alter: i8, octave: i32) -> Option<Self> {
        (alter.abs() <= MAX_ALTER).then_some(Self {
            letter,
            alter,
            octave,
        })
    }

    pub fn letter(&self) -> Letter {
        self.letter
    }

    /// Alteration in half tones: positive for sharps, negative for flats.
    pub fn alter(&self) -> i8 {
        self.alter
    }

    pub fn octave(&self) -> i32 {
        self.octave
    }

    /// MIDI note number. Middle C (C4) = 60.
    /// Returns `None` when the octave is too large to number.
    pub fn midi(&self) -> Option<i32> {
        i32::try_from(self.semitones()).ok()
    }

    /// Half tones above C-1, widened so any octave fits.
    fn semitones(&self) -> i64 {
        (i64::from(self.octave) + 1) * 12
            + i64::from(self.letter.semitone())
            + i64::from(self.alter)
    }

    /// Playable name for a MIDI number, spelled with sharps.
    /// Returns `None` outside the MIDI range 0..=127.
    pub fn from_midi(midi: i32) -> Option<Self> {
        if !(0..=127).contains(&midi) {
            return None;
        }
        let (letter, alter) = SHARP_SPELLING[midi.rem_euclid(12) as usize];
        Some(Self {
            letter,
            alter,
            octave: midi.div_euclid(12) - 1,
        })
    }
}

impl Default for PitchName {
    /// Middle C, the fallback for unusable descriptors.
    fn default() -> Self {
        Self {
            letter: Letter::C,
            alter: 0,
            octave: DEFAULT_OCTAVE,
        }
    }
}

impl Ord for PitchName {
    // Letter and MIDI number together pin down alteration and octave.
    fn cmp(&self, other: &Self) -> Ordering {
        self.semitones()
            .cmp(&other.semitones())
            .then(self.letter.cmp(&other.letter))
    }
}

impl PartialOrd for PitchName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PitchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = if self.alter > 0 { '#' } else { 'b' };
        write!(f, "{}", self.letter.as_char())?;
        for _ in 0..self.alter.unsigned_abs() {
            write!(f, "{symbol}")?;
        }
        write!(f, "{}", self.octave)
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ParsePitchError {
    #[error("pitch name '{0}' does not start with a note letter A-G")]
    Letter(String),
    #[error("pitch name '{0}' has an invalid accidental")]
    Accidental(String),
    #[error("pitch name '{0}' has an invalid octave")]
    Octave(String),
}

impl FromStr for PitchName {
    type Err = ParsePitchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let letter = chars
            .next()
            .filter(char::is_ascii_uppercase)
            .and_then(Letter::from_char)
            .ok_or_else(|| ParsePitchError::Letter(s.to_string()))?;
        let rest = chars.as_str();
        let digits_at = rest
            .find(|c: char| c != '#' && c != 'b')
            .unwrap_or(rest.len());
        let (symbols, octave) = rest.split_at(digits_at);
        let alter = parse_accidental_symbol(symbols)
            .ok_or_else(|| ParsePitchError::Accidental(s.to_string()))?;
        let octave = octave
            .parse::<i32>()
            .map_err(|_| ParsePitchError::Octave(s.to_string()))?;
        Self::new(letter, alter, octave).ok_or_else(|| ParsePitchError::Accidental(s.to_string()))
    }
}

impl Serialize for PitchName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PitchName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse an encoded accidental (`#`, `bb`, `sharp`, `flat-flat`, …) into half tones.
fn parse_accidental_symbol(symbol: &str) -> Option<i8> {
    match symbol.trim() {
        "" | "natural" => Some(0),
        "#" | "sharp" | "♯" => Some(1),
        "##" | "x" | "double-sharp" | "sharp-sharp" => Some(2),
        "b" | "flat" | "♭" => Some(-1),
        "bb" | "flat-flat" | "double-flat" => Some(-2),
        _ => None,
    }
}

// ─── PitchDescriptor ─────────────────────────────────────────────────

/// Opaque pitch description from a score model: a bag of named fields
/// whose shape varies by producer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PitchDescriptor(Map<String, Value>);

impl PitchDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Wrap a JSON value; anything but an object yields an empty descriptor.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn number(&self, key: &str) -> Option<f64> {
        self.0
            .get(key)
            .and_then(Value::as_f64)
            .filter(|n| n.is_finite())
    }

    /// Numeric field holding a whole number.
    fn integer(&self, key: &str) -> Option<i64> {
        self.number(key)
            .filter(|n| n.fract() == 0.0)
            .map(|n| n as i64)
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

impl From<&PitchName> for PitchDescriptor {
    fn from(name: &PitchName) -> Self {
        PitchDescriptor::new()
            .with("step", name.letter.as_char().to_string())
            .with("Alter", name.alter)
            .with("octave", name.octave)
    }
}

impl fmt::Display for PitchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

// ─── Normalization ───────────────────────────────────────────────────

const LETTER_INDEX_FIELDS: [&str; 2] = ["FundamentalNote", "fundamentalNote"];
const LETTER_TEXT_FIELDS: [&str; 2] = ["Step", "step"];
const HALF_TONE_FIELDS: [&str; 4] = ["AccidentalHalfTones", "accidental", "Alter", "Alteration"];
const ACCIDENTAL_SYMBOL_FIELDS: [&str; 2] = ["accidental", "Accidental"];
const OCTAVE_FIELDS: [&str; 3] = ["Octave", "octave", "OctaveNumber"];
const MIDI_FIELDS: [&str; 2] = ["Midi", "midi"];

/// MIDI numbers an octave is derived from; anything else is unusable.
const MIDI_RANGE: std::ops::RangeInclusive<f64> = 0.0..=127.0;

/// Normalize a descriptor into a canonical pitch name.
///
/// Total: an empty descriptor, or one without a recognizable letter, yields
/// `C4`; a missing octave defaults to 4. Every fallback is logged.
pub fn normalize(descriptor: &PitchDescriptor) -> PitchName {
    if descriptor.is_empty() {
        log::warn!(
            "normalize: missing pitch descriptor; using {}",
            PitchName::default()
        );
        return PitchName::default();
    }

    let Some(letter) = resolve_letter(descriptor) else {
        log::warn!(
            "normalize: unknown step for pitch {descriptor}; using {}",
            PitchName::default()
        );
        return PitchName::default();
    };

    let alter = resolve_alter(descriptor);

    let octave = resolve_octave(descriptor).unwrap_or_else(|| {
        log::warn!(
            "normalize: missing or unusable octave on pitch {descriptor}; \
             defaulting to {DEFAULT_OCTAVE}"
        );
        DEFAULT_OCTAVE
    });

    PitchName {
        letter,
        alter,
        octave,
    }
}

fn resolve_letter(descriptor: &PitchDescriptor) -> Option<Letter> {
    LETTER_INDEX_FIELDS
        .iter()
        .find_map(|key| descriptor.integer(key).and_then(Letter::from_index))
        .or_else(|| {
            LETTER_TEXT_FIELDS.iter().find_map(|key| {
                descriptor
                    .text(key)
                    .and_then(|s| s.trim().chars().next())
                    .and_then(Letter::from_char)
            })
        })
}

fn resolve_alter(descriptor: &PitchDescriptor) -> i8 {
    if let Some(half_tones) = HALF_TONE_FIELDS.iter().find_map(|key| descriptor.number(key)) {
        // Fractional (microtonal) alterations truncate toward zero.
        let half_tones = half_tones.trunc();
        if half_tones.abs() > MAX_ALTER as f64 {
            log::warn!(
                "normalize: alteration {half_tones} on pitch {descriptor} is out of range; ignoring"
            );
            return 0;
        }
        return half_tones as i8;
    }

    for key in ACCIDENTAL_SYMBOL_FIELDS {
        if let Some(symbol) = descriptor.text(key) {
            return parse_accidental_symbol(symbol).unwrap_or_else(|| {
                log::warn!(
                    "normalize: unknown accidental '{symbol}' on pitch {descriptor}; ignoring"
                );
                0
            });
        }
    }

    0
}

fn resolve_octave(descriptor: &PitchDescriptor) -> Option<i32> {
    OCTAVE_FIELDS
        .iter()
        .find_map(|key| descriptor.integer(key))
        .and_then(|o| i32::try_from(o).ok())
        .or_else(|| {
            MIDI_FIELDS
                .iter()
                .find_map(|key| descriptor.number(key))
                .filter(|midi| MIDI_RANGE.contains(midi))
                .map(|midi| (midi / 12.0).floor() as i32 - 1)
        })
}
