//! Data model for a parsed MusicXML score.
//!
//! Only what playback needs is kept: per-note pitch, duration and onset,
//! the divisions that give durations meaning, tempo marks, and the layout
//! hints (measure width, note default-x) used to place the cursor graphic.

use serde::{Deserialize, Serialize};

use crate::pitch::PitchDescriptor;

/// A complete musical score parsed from MusicXML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Score {
    /// Title of the piece
    pub title: Option<String>,
    /// Composer name
    pub composer: Option<String>,
    /// MusicXML version (e.g., "3.1", "4.0")
    pub version: Option<String>,
    /// Musical parts (instruments)
    pub parts: Vec<Part>,
}

/// A musical part (one instrument or voice).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    /// Part identifier (e.g., "P1")
    pub id: String,
    /// Part name (e.g., "Piano")
    pub name: String,
    /// Ordered list of measures
    pub measures: Vec<Measure>,
}

/// A single measure (bar) of music.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Measure {
    /// Measure number
    pub number: i32,
    /// Whether this is an implicit measure (e.g., pickup/anacrusis)
    pub implicit: bool,
    /// Width in tenths (for layout)
    pub width: Option<f64>,
    /// Divisions per quarter note, when this measure changes them
    pub divisions: Option<i32>,
    /// Tempo in BPM from `<sound tempo>` or a metronome mark
    pub tempo: Option<f64>,
    /// Notes and rests in document order
    pub notes: Vec<Note>,
    /// Furthest position reached in this measure, in divisions
    pub length: i32,
}

/// A single note or rest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Note {
    /// Pitch (None if this is a rest)
    pub pitch: Option<Pitch>,
    /// Duration in divisions
    pub duration: i32,
    /// Onset within the measure in divisions, after `<backup>`/`<forward>`
    pub offset: i32,
    /// Voice number (for multi-voice writing)
    pub voice: Option<i32>,
    /// Staff number (1-based; for multi-staff parts like piano)
    pub staff: Option<i32>,
    /// Whether this is a rest
    pub rest: bool,
    /// Whether this note is part of a chord with the previous note
    pub chord: bool,
    /// Grace notes take no time
    pub grace: bool,
    /// Default X position in tenths (for layout)
    pub default_x: Option<f64>,
}

/// Pitch of a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pitch {
    /// Note name: A, B, C, D, E, F, G
    pub step: String,
    /// Octave number (middle C = C4)
    pub octave: i32,
    /// Chromatic alteration: -1.0 = flat, 1.0 = sharp, 0.0 = natural
    pub alter: Option<f64>,
}

impl Score {
    /// Get the number of measures in the first part.
    pub fn measure_count(&self) -> usize {
        self.parts.first().map_or(0, |p| p.measures.len())
    }

    /// First tempo mark in the score, if any.
    pub fn initial_tempo(&self) -> Option<f64> {
        self.parts
            .iter()
            .flat_map(|p| p.measures.iter())
            .find_map(|m| m.tempo)
    }
}

impl Pitch {
    /// Descriptor in the MusicXML shape: letter string, half-tone
    /// alteration and octave.
    pub fn to_descriptor(&self) -> PitchDescriptor {
        let mut descriptor = PitchDescriptor::new()
            .with("step", self.step.clone())
            .with("octave", self.octave);
        if let Some(alter) = self.alter {
            descriptor = descriptor.with("Alter", alter);
        }
        descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::normalize;

    #[test]
    fn pitch_descriptor_normalizes() {
        let pitch = Pitch {
            step: "F".to_string(),
            octave: 3,
            alter: Some(1.0),
        };
        let name = normalize(&pitch.to_descriptor());
        assert_eq!(name.to_string(), "F#3");
        assert_eq!(name.midi(), Some(54));
    }

    #[test]
    fn initial_tempo_is_first_mark() {
        let score = Score {
            parts: vec![Part {
                id: "P1".to_string(),
                name: String::new(),
                measures: vec![
                    Measure::default(),
                    Measure {
                        tempo: Some(72.0),
                        ..Default::default()
                    },
                    Measure {
                        tempo: Some(90.0),
                        ..Default::default()
                    },
                ],
            }],
            ..Default::default()
        };
        assert_eq!(score.initial_tempo(), Some(72.0));
        assert_eq!(score.measure_count(), 3);
    }
}
