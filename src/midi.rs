//! Capture of live playback as MIDI.
//!
//! [`MidiRecorder`] is a [`SynthesizerFactory`]: every synthesizer it hands
//! out records the pitch sets it is asked to sound, with timestamps relative
//! to its own creation. A recorded take renders to a Standard MIDI File
//! (SMF) Type 0.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::time::Instant;

use crate::error::PlayerError;
use crate::pitch::PitchName;
use crate::synth::{Synthesizer, SynthesizerFactory};

// ═══════════════════════════════════════════════════════════════════════
// Recording
// ═══════════════════════════════════════════════════════════════════════

/// One `trigger_notes` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedNotes {
    /// Seconds since the synthesizer was created.
    pub at_secs: f64,
    pub pitches: Vec<PitchName>,
    pub hold_secs: f64,
}

/// Everything one synthesizer was asked to play.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Take {
    pub notes: Vec<RecordedNotes>,
    pub disposed: bool,
}

/// Factory whose synthesizers record into shared takes. Clones share the
/// same takes.
#[derive(Debug, Clone, Default)]
pub struct MidiRecorder {
    takes: Arc<Mutex<Vec<Take>>>,
}

impl MidiRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// All takes, oldest first. Each `play()` adds one.
    pub fn takes(&self) -> Vec<Take> {
        lock(&self.takes).clone()
    }

    pub fn last_take(&self) -> Option<Take> {
        lock(&self.takes).last().cloned()
    }
}

impl SynthesizerFactory for MidiRecorder {
    fn create(&mut self) -> Result<Box<dyn Synthesizer>, PlayerError> {
        let mut takes = lock(&self.takes);
        takes.push(Take::default());
        Ok(Box::new(RecordingSynth {
            takes: Arc::clone(&self.takes),
            take: takes.len() - 1,
            started: Instant::now(),
            disposed: false,
        }))
    }
}

struct RecordingSynth {
    takes: Arc<Mutex<Vec<Take>>>,
    take: usize,
    started: Instant,
    disposed: bool,
}

impl Synthesizer for RecordingSynth {
    fn trigger_notes(&mut self, pitches: &[PitchName], hold_secs: f64) {
        if self.disposed {
            log::warn!("midi recorder: notes sent to a disposed synthesizer; ignoring");
            return;
        }
        let at_secs = self.started.elapsed().as_secs_f64();
        if let Some(take) = lock(&self.takes).get_mut(self.take) {
            take.notes.push(RecordedNotes {
                at_secs,
                pitches: pitches.to_vec(),
                hold_secs,
            });
        }
    }

    fn dispose(&mut self) {
        self.disposed = true;
        if let Some(take) = lock(&self.takes).get_mut(self.take) {
            take.disposed = true;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ═══════════════════════════════════════════════════════════════════════
// SMF export
// ═══════════════════════════════════════════════════════════════════════

/// Ticks per quarter note in exported files.
pub const TICKS_PER_QUARTER: u16 = 480;

/// Velocity of recorded notes.
const VELOCITY: u8 = 80;

const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;

impl Take {
    /// Render as a single-track SMF Type 0 at `bpm`, so ticks line up with
    /// the beats that produced the take. Pitches outside the MIDI range are
    /// left out.
    pub fn to_smf(&self, bpm: f64) -> Vec<u8> {
        let bpm = if bpm.is_finite() && bpm > 0.0 { bpm } else { 120.0 };
        let ticks_per_sec = f64::from(TICKS_PER_QUARTER) * bpm / 60.0;
        let to_tick = |secs: f64| (secs.max(0.0) * ticks_per_sec).round() as u32;

        // (tick, status, key); offs sort ahead of ons at the same tick so a
        // repeated pitch retriggers.
        let mut events: Vec<(u32, u8, u8)> = Vec::new();
        for recorded in &self.notes {
            let on = to_tick(recorded.at_secs);
            let off = to_tick(recorded.at_secs + recorded.hold_secs);
            for key in recorded.pitches.iter().filter_map(midi_key) {
                events.push((on, NOTE_ON, key));
                events.push((off, NOTE_OFF, key));
            }
        }
        events.sort_by_key(|&(tick, status, _)| (tick, status == NOTE_ON));

        let micros_per_quarter = (60_000_000.0 / bpm) as u32;
        let mut track = Vec::new();
        track.extend_from_slice(&[0x00, 0xFF, 0x51, 0x03]);
        track.extend_from_slice(&micros_per_quarter.to_be_bytes()[1..]);

        let mut last = 0;
        for (tick, status, key) in events {
            push_vlq(&mut track, tick - last);
            let velocity = if status == NOTE_ON { VELOCITY } else { 0 };
            track.extend_from_slice(&[status, key, velocity]);
            last = tick;
        }
        track.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);

        let mut smf = Vec::with_capacity(22 + track.len());
        smf.extend_from_slice(b"MThd");
        smf.extend_from_slice(&6u32.to_be_bytes());
        smf.extend_from_slice(&0u16.to_be_bytes());
        smf.extend_from_slice(&1u16.to_be_bytes());
        smf.extend_from_slice(&TICKS_PER_QUARTER.to_be_bytes());
        smf.extend_from_slice(b"MTrk");
        smf.extend_from_slice(&(track.len() as u32).to_be_bytes());
        smf.extend_from_slice(&track);
        smf
    }
}

fn midi_key(pitch: &PitchName) -> Option<u8> {
    pitch.midi().and_then(|m| u8::try_from(m).ok()).filter(|k| *k < 128)
}

/// Variable-length quantity: 7 bits per byte, most significant group first.
fn push_vlq(out: &mut Vec<u8>, value: u32) {
    let groups = (1..5).take_while(|i| value >> (7 * i) != 0).count();
    for i in (1..=groups).rev() {
        out.push(0x80 | ((value >> (7 * i)) & 0x7F) as u8);
    }
    out.push((value & 0x7F) as u8);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> PitchName {
        s.parse().unwrap()
    }

    #[test]
    fn delta_times_use_seven_bit_groups() {
        let encode = |value| {
            let mut buf = Vec::new();
            push_vlq(&mut buf, value);
            buf
        };
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(0x7F), vec![0x7F]);
        assert_eq!(encode(480), vec![0x83, 0x60]);
        assert_eq!(encode(0x0FFF_FFFF), vec![0xFF, 0xFF, 0xFF, 0x7F]);
    }

    #[test]
    fn recorder_keeps_one_take_per_synth() {
        let mut recorder = MidiRecorder::new();
        let mut first = recorder.create().unwrap();
        first.trigger_notes(&[p("C4"), p("E4")], 0.6);
        first.dispose();
        first.trigger_notes(&[p("G4")], 0.6);

        let mut second = recorder.create().unwrap();
        second.trigger_notes(&[p("D4")], 1.2);

        let takes = recorder.takes();
        assert_eq!(takes.len(), 2);
        assert!(takes[0].disposed);
        assert_eq!(takes[0].notes.len(), 1);
        assert_eq!(takes[0].notes[0].pitches, vec![p("C4"), p("E4")]);
        assert!(!takes[1].disposed);
        assert_eq!(recorder.last_take().unwrap().notes[0].hold_secs, 1.2);
    }

    #[test]
    fn take_renders_format_0() {
        let take = Take {
            notes: vec![
                RecordedNotes {
                    at_secs: 0.0,
                    pitches: vec![p("C4")],
                    hold_secs: 0.6,
                },
                RecordedNotes {
                    at_secs: 0.6,
                    pitches: vec![p("C4")],
                    hold_secs: 0.6,
                },
            ],
            disposed: true,
        };
        let smf = take.to_smf(100.0);
        assert_eq!(&smf[0..4], b"MThd");
        assert_eq!(&smf[8..10], &0u16.to_be_bytes()); // format 0
        assert_eq!(&smf[10..12], &1u16.to_be_bytes()); // one track
        assert_eq!(&smf[12..14], &TICKS_PER_QUARTER.to_be_bytes());
        assert_eq!(&smf[14..18], b"MTrk");
        // 100 bpm = 600000 microseconds per quarter
        assert_eq!(&smf[22..29], &[0x00, 0xFF, 0x51, 0x03, 0x09, 0x27, 0xC0]);
        // 0.6s at 100 bpm is one quarter: note-off then note-on 480 ticks in
        assert!(smf
            .windows(6)
            .any(|w| w == [0x83, 0x60, 0x80, 60, 0, 0x00]));
        assert!(smf.ends_with(&[0x00, 0xFF, 0x2F, 0x00]));
    }

    #[test]
    fn unnumbered_pitches_are_left_out() {
        let huge = PitchName::new(crate::pitch::Letter::C, 0, i32::MAX).unwrap();
        let take = Take {
            notes: vec![RecordedNotes {
                at_secs: 0.0,
                pitches: vec![huge, p("C10")],
                hold_secs: 1.0,
            }],
            disposed: false,
        };
        let smf = take.to_smf(120.0);
        let track_len = u32::from_be_bytes([smf[18], smf[19], smf[20], smf[21]]);
        // Only the tempo and end-of-track events remain.
        assert_eq!(track_len, 11);
    }
}
