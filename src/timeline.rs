//! Cursor positions over a parsed MusicXML score.
//!
//! Every distinct onset across all parts becomes one cursor position holding
//! the notes and rests that start there. Onsets are exact fractions of a
//! quarter note, so voices written with different divisions still line up.

use std::collections::BTreeMap;

use num_rational::Ratio;

use crate::cursor::{Bounds, CursorNote, ScoreCursor, ScoreRenderer};
use crate::duration::{NoteLength, BEATS_PER_WHOLE};
use crate::error::LoadError;
use crate::model::Score;
use crate::parser::parse_musicxml;

/// Divisions per quarter note assumed until a measure declares them.
const DEFAULT_DIVISIONS: i64 = 1;

/// Width reported for the cursor graphic, in tenths.
const CURSOR_WIDTH: f64 = 12.0;

/// One cursor stop.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelinePosition {
    /// Onset in quarter notes from the start of the score.
    pub onset: Ratio<i64>,
    pub notes: Vec<CursorNote>,
    /// Left edge in tenths, when the score carries layout hints.
    pub left: Option<f64>,
}

/// Group every non-grace note of every part by onset, in time order.
pub fn build_positions(score: &Score) -> Vec<TimelinePosition> {
    let measure_count = score
        .parts
        .iter()
        .map(|p| p.measures.len())
        .max()
        .unwrap_or(0);

    // Divisions in effect at each measure, per part
    let divisions: Vec<Vec<i64>> = score
        .parts
        .iter()
        .map(|part| {
            let mut current = DEFAULT_DIVISIONS;
            part.measures
                .iter()
                .map(|m| {
                    if let Some(d) = m.divisions.filter(|d| *d > 0) {
                        current = i64::from(d);
                    }
                    current
                })
                .collect()
        })
        .collect();

    // A measure lasts as long as its longest part
    let mut measure_starts = Vec::with_capacity(measure_count);
    let mut start = Ratio::from_integer(0);
    for i in 0..measure_count {
        measure_starts.push(start);
        let length = score
            .parts
            .iter()
            .zip(&divisions)
            .filter_map(|(part, divs)| {
                let m = part.measures.get(i)?;
                Some(Ratio::new(i64::from(m.length.max(0)), divs[i]))
            })
            .max()
            .unwrap_or_else(|| Ratio::from_integer(0));
        start += length;
    }

    // Horizontal layout from the first part's measure widths
    let measure_lefts: Vec<Option<f64>> = match score.parts.first() {
        Some(part) => {
            let mut x = Some(0.0);
            part.measures
                .iter()
                .map(|m| {
                    let left = x;
                    x = x.zip(m.width).map(|(x, w)| x + w);
                    left
                })
                .collect()
        }
        None => Vec::new(),
    };

    let mut slots: BTreeMap<Ratio<i64>, (Vec<CursorNote>, Option<f64>)> = BTreeMap::new();
    for (part, divs) in score.parts.iter().zip(&divisions) {
        for (i, measure) in part.measures.iter().enumerate() {
            let div = divs[i];
            for note in measure.notes.iter().filter(|n| !n.grace) {
                let onset = measure_starts[i] + Ratio::new(i64::from(note.offset), div);
                let length =
                    NoteLength::new(f64::from(note.duration) / (div as f64 * BEATS_PER_WHOLE));
                let pitch = match (&note.pitch, note.rest) {
                    (Some(pitch), false) => Some(pitch.to_descriptor()),
                    _ => None,
                };
                let x = measure_lefts
                    .get(i)
                    .copied()
                    .flatten()
                    .zip(note.default_x)
                    .map(|(m, n)| m + n);

                let slot = slots.entry(onset).or_default();
                slot.0.push(CursorNote { pitch, length });
                slot.1 = match (slot.1, x) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
            }
        }
    }

    slots
        .into_iter()
        .map(|(onset, (notes, left))| TimelinePosition { onset, notes, left })
        .collect()
}

// ─── Cursor ──────────────────────────────────────────────────────────

/// [`ScoreCursor`] over the positions of a parsed MusicXML score.
#[derive(Debug, Clone, Default)]
pub struct MusicXmlCursor {
    positions: Vec<TimelinePosition>,
    index: usize,
    visible: bool,
    tempo: Option<f64>,
}

impl MusicXmlCursor {
    pub fn new(score: &Score) -> Self {
        Self {
            positions: build_positions(score),
            tempo: score.initial_tempo(),
            ..Default::default()
        }
    }

    pub fn positions(&self) -> &[TimelinePosition] {
        &self.positions
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

impl ScoreCursor for MusicXmlCursor {
    fn reset(&mut self) {
        self.index = 0;
    }

    fn next(&mut self) {
        self.index = (self.index + 1).min(self.positions.len());
    }

    fn end_reached(&self) -> bool {
        self.index >= self.positions.len()
    }

    fn notes_under_cursor(&self) -> Vec<CursorNote> {
        self.positions
            .get(self.index)
            .map(|p| p.notes.clone())
            .unwrap_or_default()
    }

    fn show(&mut self) {
        self.visible = true;
    }

    fn hide(&mut self) {
        self.visible = false;
    }

    fn graphic_bounds(&self) -> Option<Bounds> {
        let left = self.positions.get(self.index)?.left?;
        Some(Bounds {
            left,
            width: CURSOR_WIDTH,
        })
    }

    fn tempo_hint(&self) -> Option<f64> {
        self.tempo
    }
}

// ─── Renderer ────────────────────────────────────────────────────────

/// [`ScoreRenderer`] for uncompressed `score-partwise` MusicXML.
#[derive(Debug, Clone, Copy, Default)]
pub struct MusicXmlRenderer;

impl ScoreRenderer for MusicXmlRenderer {
    fn load(&mut self, markup: &str) -> Result<Box<dyn ScoreCursor>, LoadError> {
        let score = parse_musicxml(markup)?;
        if score.parts.is_empty() {
            return Err(LoadError::Empty);
        }
        let cursor = MusicXmlCursor::new(&score);
        log::info!(
            "loaded {:?}: {} parts, {} cursor positions",
            score.title.as_deref().unwrap_or("untitled"),
            score.parts.len(),
            cursor.positions.len()
        );
        Ok(Box::new(cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::normalize;
    use pretty_assertions::assert_eq;

    const PIANO: &str = r#"<score-partwise version="4.0">
  <part-list>
    <score-part id="P1"><part-name>Right</part-name></score-part>
    <score-part id="P2"><part-name>Left</part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="1" width="100">
      <attributes><divisions>2</divisions></attributes>
      <note default-x="10"><pitch><step>C</step><octave>5</octave></pitch><duration>2</duration></note>
      <note default-x="40"><pitch><step>D</step><octave>5</octave></pitch><duration>1</duration></note>
      <note default-x="55"><grace/><pitch><step>F</step><octave>5</octave></pitch></note>
      <note default-x="60"><pitch><step>E</step><octave>5</octave></pitch><duration>1</duration></note>
    </measure>
    <measure number="2" width="80">
      <note default-x="12"><rest/><duration>4</duration></note>
    </measure>
  </part>
  <part id="P2">
    <measure number="1">
      <attributes><divisions>1</divisions></attributes>
      <note default-x="8"><pitch><step>C</step><octave>3</octave></pitch><duration>2</duration></note>
    </measure>
    <measure number="2">
      <note><pitch><step>G</step><alter>1</alter><octave>2</octave></pitch><duration>2</duration></note>
    </measure>
  </part>
</score-partwise>"#;

    fn names(position: &TimelinePosition) -> Vec<String> {
        position
            .notes
            .iter()
            .filter_map(|n| n.pitch.as_ref())
            .map(|p| normalize(p).to_string())
            .collect()
    }

    #[test]
    fn groups_parts_by_onset() {
        let score = parse_musicxml(PIANO).unwrap();
        let positions = build_positions(&score);
        let onsets: Vec<Ratio<i64>> = positions.iter().map(|p| p.onset).collect();
        assert_eq!(
            onsets,
            vec![
                Ratio::from_integer(0),
                Ratio::from_integer(1),
                Ratio::new(3, 2),
                Ratio::from_integer(2),
            ]
        );
        assert_eq!(names(&positions[0]), vec!["C5", "C3"]);
        assert_eq!(names(&positions[1]), vec!["D5"]);
        assert_eq!(names(&positions[2]), vec!["E5"]);
        assert_eq!(names(&positions[3]), vec!["G#2"]);
        // measure-2 rest rides along with the left hand
        assert_eq!(positions[3].notes.len(), 2);
        assert_eq!(positions[3].notes[0].pitch, None);
    }

    #[test]
    fn lengths_are_fractions_of_a_whole() {
        let positions = build_positions(&parse_musicxml(PIANO).unwrap());
        assert_eq!(positions[0].notes[0].length, NoteLength::QUARTER);
        assert_eq!(positions[0].notes[1].length, NoteLength::HALF);
        assert_eq!(positions[1].notes[0].length, NoteLength::EIGHTH);
    }

    #[test]
    fn layout_hints_place_positions() {
        let positions = build_positions(&parse_musicxml(PIANO).unwrap());
        let lefts: Vec<Option<f64>> = positions.iter().map(|p| p.left).collect();
        assert_eq!(lefts, vec![Some(8.0), Some(40.0), Some(60.0), Some(112.0)]);
    }

    #[test]
    fn cursor_walks_positions() {
        let mut renderer = MusicXmlRenderer;
        let mut cursor = renderer.load(PIANO).unwrap();
        let mut steps = 0;
        while !cursor.end_reached() {
            assert!(!cursor.notes_under_cursor().is_empty());
            assert!(cursor.graphic_bounds().is_some());
            cursor.next();
            steps += 1;
        }
        assert_eq!(steps, 4);
        assert!(cursor.notes_under_cursor().is_empty());
        assert_eq!(cursor.graphic_bounds(), None);
        cursor.reset();
        assert_eq!(cursor.graphic_bounds().map(|b| b.left), Some(8.0));
    }

    #[test]
    fn empty_part_list_fails_to_load() {
        let mut renderer = MusicXmlRenderer;
        assert!(matches!(
            renderer.load("<score-partwise/>"),
            Err(LoadError::Empty)
        ));
    }
}
