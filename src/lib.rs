//! scoreplay: cursor-driven playback engine for rendered sheet music.
//!
//! Walks a score cursor position by position, sounds the notes under it
//! through a pluggable synthesizer, keeps an overlay marker aligned with the
//! cursor graphic and reports elapsed time against a precomputed total.
//!
//! Supports both uncompressed MusicXML (.musicxml) and compressed MXL (.mxl)
//! files through the built-in [`MusicXmlRenderer`].
//!
//! # Example
//! ```no_run
//! use scoreplay::{MidiRecorder, MusicXmlRenderer, PlayerConfig, ScorePlayer, SharedOverlay};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let overlay = SharedOverlay::new();
//! let player = ScorePlayer::new(
//!     PlayerConfig::default(),
//!     MusicXmlRenderer,
//!     MidiRecorder::new(),
//!     overlay.clone(),
//! );
//! player.load_file("path/to/score.musicxml")?;
//! println!("Total: {}", scoreplay::format_clock(player.total_duration()));
//! player.play()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod cursor;
pub mod cursor_sync;
pub mod duration;
pub mod error;
pub mod midi;
pub mod model;
pub mod mxl;
pub mod parser;
pub mod pitch;
pub mod player;
pub mod synth;
pub mod timeline;
pub mod transpose;

use std::path::Path;

pub use config::PlayerConfig;
pub use cursor::{Bounds, CursorNote, ScoreCursor, ScoreRenderer, ScriptedCursor, ScriptedRenderer};
pub use cursor_sync::{CursorSync, NoOverlay, Overlay, OverlayState, SharedOverlay, Viewport};
pub use duration::{hold_secs, DurationModel, NoteLength, Tempo};
pub use error::{LoadError, PlayerError};
pub use midi::{MidiRecorder, Take};
pub use model::Score;
pub use parser::parse_musicxml;
pub use pitch::{normalize, PitchDescriptor, PitchName};
pub use player::{format_clock, PlayerSnapshot, ScorePlayer};
pub use synth::{SilentSynth, Synthesizer, SynthesizerFactory};
pub use timeline::{MusicXmlCursor, MusicXmlRenderer};
pub use transpose::Transpose;

/// Parse a MusicXML or MXL file from a file path.
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Score, LoadError> {
    let data = std::fs::read(path.as_ref())?;
    parse_bytes(&data)
}

/// Parse MusicXML from raw bytes, unpacking MXL archives.
pub fn parse_bytes(data: &[u8]) -> Result<Score, LoadError> {
    parse_musicxml(&mxl::read_markup(data)?)
}

/// Convert a parsed score to a JSON string.
pub fn score_to_json(score: &Score) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(score)
}
