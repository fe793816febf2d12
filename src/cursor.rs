//! The score cursor seen by the playback engine.
//!
//! The cursor belongs to whatever renders the score. The engine never tracks
//! position on its own: it rewinds, advances and queries the cursor only
//! through [`ScoreCursor`].

use serde::{Deserialize, Serialize};

use crate::duration::NoteLength;
use crate::error::LoadError;
use crate::pitch::PitchDescriptor;

/// One note (or rest) starting at the cursor's current position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorNote {
    /// `None` for rests.
    pub pitch: Option<PitchDescriptor>,
    pub length: NoteLength,
}

impl CursorNote {
    pub fn pitched(pitch: PitchDescriptor, length: NoteLength) -> Self {
        Self {
            pitch: Some(pitch),
            length,
        }
    }

    pub fn rest(length: NoteLength) -> Self {
        Self {
            pitch: None,
            length,
        }
    }
}

/// Horizontal extent of the rendered cursor graphic, in screen units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f64,
    pub width: f64,
}

/// Movable pointer over the time positions of a rendered score.
pub trait ScoreCursor: Send {
    /// Rewind to the first position.
    fn reset(&mut self);
    /// Advance one position. Past the end this stays at the end.
    fn next(&mut self);
    fn end_reached(&self) -> bool;
    /// Notes and rests that start at the current position.
    fn notes_under_cursor(&self) -> Vec<CursorNote>;
    fn show(&mut self);
    fn hide(&mut self);

    /// Where the cursor graphic currently sits, if it has been drawn.
    fn graphic_bounds(&self) -> Option<Bounds> {
        None
    }

    /// Tempo declared by the score itself, if any.
    fn tempo_hint(&self) -> Option<f64> {
        None
    }
}

/// Loads score markup and hands back a cursor over the result.
pub trait ScoreRenderer: Send {
    fn load(&mut self, markup: &str) -> Result<Box<dyn ScoreCursor>, LoadError>;
}

// ─── Scripted cursor ─────────────────────────────────────────────────

/// Cursor that replays a fixed sequence of note sets, with no rendering
/// engine behind it.
#[derive(Debug, Clone, Default)]
pub struct ScriptedCursor {
    positions: Vec<Vec<CursorNote>>,
    lefts: Vec<f64>,
    index: usize,
    visible: bool,
}

impl ScriptedCursor {
    pub fn new(positions: Vec<Vec<CursorNote>>) -> Self {
        Self {
            positions,
            ..Default::default()
        }
    }

    /// Give position `i` a graphic at `lefts[i]`. Positions without an entry
    /// report no bounds.
    pub fn with_layout(mut self, lefts: Vec<f64>) -> Self {
        self.lefts = lefts;
        self
    }

    pub fn position(&self) -> usize {
        self.index
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

impl ScoreCursor for ScriptedCursor {
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
        self.positions.get(self.index).cloned().unwrap_or_default()
    }

    fn show(&mut self) {
        self.visible = true;
    }

    fn hide(&mut self) {
        self.visible = false;
    }

    fn graphic_bounds(&self) -> Option<Bounds> {
        self.lefts.get(self.index).map(|&left| Bounds { left, width: 4.0 })
    }
}

/// Renderer that ignores the markup and serves a prepared [`ScriptedCursor`].
/// Markup that is blank fails to load, like an empty document would.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRenderer {
    cursor: ScriptedCursor,
}

impl ScriptedRenderer {
    pub fn new(cursor: ScriptedCursor) -> Self {
        Self { cursor }
    }
}

impl ScoreRenderer for ScriptedRenderer {
    fn load(&mut self, markup: &str) -> Result<Box<dyn ScoreCursor>, LoadError> {
        if markup.trim().is_empty() {
            return Err(LoadError::Empty);
        }
        Ok(Box::new(self.cursor.clone()))
    }
}
