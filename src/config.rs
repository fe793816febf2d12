//! Player configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::{DurationModel, Tempo, DEFAULT_BPM, MIN_AUDIBLE_HOLD_SECS};
use crate::error::PlayerError;
use crate::transpose::MIDDLE_C_MIDI;

/// Options controlling playback timing, transposition and export.
/// Every field has a default, so `{}` is a valid JSON configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Tempo in beats per minute.
    pub bpm: f64,
    /// Use the score's first tempo mark instead of `bpm` when it has one.
    pub tempo_from_score: bool,
    /// Shortest hold for any cursor position, in seconds.
    pub min_hold_secs: f64,
    /// Fraction of a step's hold after which its pitches stop showing as active.
    pub release_ratio: f64,
    /// MIDI number the first pitch of a session is moved onto.
    pub reference_midi: i32,
    pub auto_transpose: bool,
    /// Elapsed-time refresh period.
    pub tick_interval_ms: u64,
    /// File name used by `download_score`.
    pub download_file_name: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            tempo_from_score: false,
            min_hold_secs: MIN_AUDIBLE_HOLD_SECS,
            release_ratio: 0.9,
            reference_midi: MIDDLE_C_MIDI,
            auto_transpose: true,
            tick_interval_ms: 16,
            download_file_name: "sheet-music.musicxml".to_string(),
        }
    }
}

impl PlayerConfig {
    pub fn from_json(json: &str) -> Result<Self, PlayerError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Duration model for a score, honoring `tempo_from_score`.
    pub fn duration_model(&self, score_tempo: Option<f64>) -> DurationModel {
        let bpm = match score_tempo {
            Some(tempo) if self.tempo_from_score => tempo,
            _ => self.bpm,
        };
        DurationModel::new(Tempo::new(bpm), self.min_hold_secs)
    }

    /// Release point as a fraction of the hold, kept within `0..=1`.
    pub fn release_ratio(&self) -> f64 {
        if self.release_ratio.is_finite() {
            self.release_ratio.clamp(0.0, 1.0)
        } else {
            0.9
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_json_is_default() {
        assert_eq!(PlayerConfig::from_json("{}").unwrap(), PlayerConfig::default());
    }

    #[test]
    fn partial_json_overrides() {
        let json = r#"{"bpm": 120, "auto_transpose": false, "tick_interval_ms": 0}"#;
        let config = PlayerConfig::from_json(json).unwrap();
        assert_eq!(config.bpm, 120.0);
        assert!(!config.auto_transpose);
        assert_eq!(config.reference_midi, 60);
        assert_eq!(config.tick_interval(), Duration::from_millis(1));
        assert!(matches!(
            PlayerConfig::from_json(r#"{"bpm": "fast"}"#),
            Err(PlayerError::Config(_))
        ));
    }

    #[test]
    fn score_tempo_only_when_enabled() {
        let mut config = PlayerConfig::default();
        assert_eq!(config.duration_model(Some(60.0)).tempo.bpm(), 100.0);
        config.tempo_from_score = true;
        assert_eq!(config.duration_model(Some(60.0)).tempo.bpm(), 60.0);
        assert_eq!(config.duration_model(None).tempo.bpm(), 100.0);
    }

    #[test]
    fn release_ratio_is_clamped() {
        let config = PlayerConfig {
            release_ratio: 1.5,
            ..Default::default()
        };
        assert_eq!(config.release_ratio(), 1.0);
    }
}
