//! Sound output seam.
//!
//! The player asks a [`SynthesizerFactory`] for a fresh [`Synthesizer`] at
//! every `play()` and disposes it when the session ends. A disposed
//! synthesizer is never handed new notes.

use crate::error::PlayerError;
use crate::pitch::PitchName;

/// Something that can sound a set of pitches for a while.
pub trait Synthesizer: Send {
    /// Sound `pitches` together, releasing after `hold_secs`.
    fn trigger_notes(&mut self, pitches: &[PitchName], hold_secs: f64);
    /// Release every voice and free resources.
    fn dispose(&mut self);
}

/// Builds one synthesizer per playback session.
pub trait SynthesizerFactory: Send {
    fn create(&mut self) -> Result<Box<dyn Synthesizer>, PlayerError>;
}

impl<F> SynthesizerFactory for F
where
    F: FnMut() -> Result<Box<dyn Synthesizer>, PlayerError> + Send,
{
    fn create(&mut self) -> Result<Box<dyn Synthesizer>, PlayerError> {
        self()
    }
}

/// Synthesizer that only logs what it would play.
#[derive(Debug, Default)]
pub struct SilentSynth;

impl Synthesizer for SilentSynth {
    fn trigger_notes(&mut self, pitches: &[PitchName], hold_secs: f64) {
        let names: Vec<String> = pitches.iter().map(ToString::to_string).collect();
        log::debug!("silent synth: [{}] for {hold_secs:.3}s", names.join(" "));
    }

    fn dispose(&mut self) {}
}

/// Factory for [`SilentSynth`].
pub fn silent() -> impl SynthesizerFactory {
    || Ok(Box::new(SilentSynth) as Box<dyn Synthesizer>)
}
