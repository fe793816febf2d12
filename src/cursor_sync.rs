//! Keeps a host overlay aligned with the score cursor graphic.
//!
//! The cursor graphic lives in score coordinates inside a scrollable
//! container; the overlay is positioned relative to that container. The
//! translation is
//!
//!   `left = graphic.left - container_left + scroll_left`

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::cursor::ScoreCursor;

/// Container geometry needed to translate cursor coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Left edge of the scroll container, in the graphic's coordinate space.
    pub container_left: f64,
    /// Horizontal scroll offset of the container.
    pub scroll_left: f64,
}

impl Viewport {
    pub fn translate(&self, graphic_left: f64) -> f64 {
        graphic_left - self.container_left + self.scroll_left
    }
}

/// A visual marker the host draws over the score.
pub trait Overlay: Send {
    /// Move to `left` and make visible.
    fn place(&mut self, left: f64);
    fn hide(&mut self);
}

/// Observable overlay state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlayState {
    pub left: f64,
    pub visible: bool,
}

/// Overlay that only records where it should be; clones share state, so a
/// host keeps one clone and hands the other to the player.
#[derive(Debug, Clone, Default)]
pub struct SharedOverlay {
    state: Arc<Mutex<OverlayState>>,
}

impl SharedOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> OverlayState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Overlay for SharedOverlay {
    fn place(&mut self, left: f64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.left = left;
        state.visible = true;
    }

    fn hide(&mut self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).visible = false;
    }
}

/// Overlay that draws nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOverlay;

impl Overlay for NoOverlay {
    fn place(&mut self, _left: f64) {}
    fn hide(&mut self) {}
}

/// Translates cursor bounds into overlay placements.
#[derive(Debug, Clone, Copy, Default)]
pub struct CursorSync {
    viewport: Viewport,
    last_left: Option<f64>,
}

impl CursorSync {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            last_left: None,
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Last offset written to the overlay.
    pub fn last_left(&self) -> Option<f64> {
        self.last_left
    }

    /// Place the overlay over the cursor graphic. Without bounds the overlay
    /// keeps its last position.
    pub fn sync(&mut self, cursor: &dyn ScoreCursor, overlay: &mut dyn Overlay) -> Option<f64> {
        match cursor.graphic_bounds() {
            Some(bounds) => {
                let left = self.viewport.translate(bounds.left);
                overlay.place(left);
                self.last_left = Some(left);
                Some(left)
            }
            None => {
                log::debug!(
                    "cursor sync: no cursor graphic; overlay stays at {:?}",
                    self.last_left
                );
                self.last_left
            }
        }
    }

    pub fn forget(&mut self) {
        self.last_left = None;
    }
}
