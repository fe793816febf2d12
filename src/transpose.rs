//! Auto-transposition anchoring a playback run to middle C.
//!
//! The first sounding pitch of a session decides a constant semitone offset;
//! every pitch sent to the synthesizer afterwards is shifted by it.

use crate::pitch::PitchName;

/// MIDI number of middle C (C4).
pub const MIDDLE_C_MIDI: i32 = 60;

/// Per-session transpose state.
///
/// A resolved offset of zero is a real value (the run already starts on the
/// reference pitch) and is never recomputed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Transpose {
    #[default]
    Unresolved,
    Resolved(i32),
}

impl Transpose {
    pub fn offset(&self) -> Option<i32> {
        match self {
            Transpose::Unresolved => None,
            Transpose::Resolved(offset) => Some(*offset),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Transpose::Resolved(_))
    }

    /// Resolve from the first sounding pitch unless already resolved.
    /// Returns the offset in effect, or `None` while `first` has no MIDI
    /// number to anchor on; the state then stays unresolved.
    pub fn resolve(&mut self, first: &PitchName, reference_midi: i32) -> Option<i32> {
        if let Transpose::Resolved(offset) = *self {
            return Some(offset);
        }
        let Some(offset) = first.midi().and_then(|m| reference_midi.checked_sub(m)) else {
            log::warn!("transpose: {first} has no MIDI number; leaving transpose unresolved");
            return None;
        };
        log::debug!("transpose: first pitch {first} resolves offset {offset:+}");
        *self = Transpose::Resolved(offset);
        Some(offset)
    }

    /// Shift one pitch. Unresolved state leaves it alone; a shift that falls
    /// outside the MIDI range passes the pitch through untransposed.
    pub fn apply(&self, pitch: &PitchName) -> PitchName {
        let Some(offset) = self.offset() else {
            return *pitch;
        };
        let shifted = pitch.midi().and_then(|m| m.checked_add(offset));
        shifted.and_then(PitchName::from_midi).unwrap_or_else(|| {
            log::warn!(
                "transpose: {pitch} shifted by {offset:+} leaves the MIDI range; \
                 playing untransposed"
            );
            *pitch
        })
    }

    pub fn apply_all(&self, pitches: &[PitchName]) -> Vec<PitchName> {
        pitches.iter().map(|p| self.apply(p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::Letter;
    use pretty_assertions::assert_eq;

    fn p(s: &str) -> PitchName {
        s.parse().unwrap()
    }

    #[test]
    fn a3_anchors_to_middle_c() {
        let mut t = Transpose::default();
        assert_eq!(t.resolve(&p("A3"), MIDDLE_C_MIDI), Some(3));
        assert_eq!(t.apply(&p("A3")), p("C4"));
        assert_eq!(t.apply(&p("B3")), p("D4"));
        assert_eq!(t.apply(&p("C#4")), p("E4"));
    }

    #[test]
    fn resolves_once() {
        let mut t = Transpose::default();
        assert!(!t.is_resolved());
        assert_eq!(t.resolve(&p("C4"), MIDDLE_C_MIDI), Some(0));
        assert_eq!(t, Transpose::Resolved(0));
        // A later pitch must not re-resolve a legitimate zero offset.
        assert_eq!(t.resolve(&p("G4"), MIDDLE_C_MIDI), Some(0));
        assert_eq!(t.apply(&p("G4")), p("G4"));
    }

    #[test]
    fn respells_with_sharps() {
        let t = Transpose::Resolved(0);
        assert_eq!(t.apply(&p("Db4")), p("C#4"));
        assert_eq!(t.apply_all(&[p("Ebb4"), p("B#3")]), vec![p("D4"), p("C4")]);
    }

    #[test]
    fn out_of_range_passes_through() {
        let t = Transpose::Resolved(40);
        assert_eq!(t.apply(&p("C9")), p("C9"));
        let t = Transpose::Resolved(-70);
        assert_eq!(t.apply(&p("C4")), p("C4"));
        assert_eq!(Transpose::Unresolved.apply(&p("Fb2")), p("Fb2"));
    }

    #[test]
    fn unnumbered_pitch_neither_anchors_nor_shifts() {
        let huge = PitchName::new(Letter::C, 0, i32::MAX).unwrap();
        let mut t = Transpose::default();
        assert_eq!(t.resolve(&huge, MIDDLE_C_MIDI), None);
        assert!(!t.is_resolved());
        assert_eq!(t.resolve(&p("A3"), MIDDLE_C_MIDI), Some(3));
        assert_eq!(t.apply(&huge), huge);
        assert_eq!(Transpose::Resolved(i32::MAX).apply(&p("C4")), p("C4"));
    }
}
