//! MusicXML parser: converts MusicXML XML into the Score data model.

use roxmltree::{Document, Node};

use crate::error::LoadError;
use crate::model::*;

/// Parse a MusicXML XML string into a Score.
pub fn parse_musicxml(xml: &str) -> Result<Score, LoadError> {
    // MusicXML files include a DOCTYPE declaration, so we must allow DTDs
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let doc = Document::parse_with_options(xml, options)?;
    let root = doc.root_element();

    // Verify this is a score-partwise document
    if root.tag_name().name() != "score-partwise" {
        return Err(LoadError::UnsupportedRoot(root.tag_name().name().to_string()));
    }

    let mut score = Score {
        version: root.attribute("version").map(String::from),
        ..Default::default()
    };

    for child in root.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "work" => parse_work(&child, &mut score),
            "movement-title" => {
                if score.title.is_none() {
                    score.title = child.text().map(|t| t.trim().to_string());
                }
            }
            "identification" => parse_identification(&child, &mut score),
            "part-list" => parse_part_list(&child, &mut score),
            "part" => parse_part(&child, &mut score)?,
            _ => {}
        }
    }

    log::debug!(
        "parsed MusicXML {:?}: {} parts, {} measures",
        score.title,
        score.parts.len(),
        score.measure_count()
    );
    Ok(score)
}

// ─── Work ────────────────────────────────────────────────────────────

fn parse_work(node: &Node, score: &mut Score) {
    for child in node.children().filter(|n| n.is_element()) {
        if child.tag_name().name() == "work-title" {
            score.title = child.text().map(|t| t.trim().to_string());
        }
    }
}

// ─── Identification ──────────────────────────────────────────────────

fn parse_identification(node: &Node, score: &mut Score) {
    for child in node.children().filter(|n| n.is_element()) {
        if child.tag_name().name() == "creator" && child.attribute("type") == Some("composer") {
            score.composer = child.text().map(|t| t.trim().to_string());
        }
    }
}

// ─── Part List ───────────────────────────────────────────────────────

fn parse_part_list(node: &Node, score: &mut Score) {
    for child in node.children().filter(|n| n.is_element()) {
        if child.tag_name().name() == "score-part" {
            let id = child.attribute("id").unwrap_or("").to_string();
            let name = child
                .children()
                .find(|n| n.is_element() && n.tag_name().name() == "part-name")
                .and_then(|n| n.text())
                .unwrap_or("")
                .trim()
                .to_string();
            score.parts.push(Part {
                id,
                name,
                measures: Vec::new(),
            });
        }
    }
}

// ─── Part (measures) ─────────────────────────────────────────────────

fn parse_part(node: &Node, score: &mut Score) -> Result<(), LoadError> {
    let part_id = node.attribute("id").unwrap_or("");

    // Find the matching part from the part-list
    let part = match score.parts.iter_mut().find(|p| p.id == part_id) {
        Some(p) => p,
        None => {
            log::warn!("MusicXML part '{part_id}' is missing from the part-list; skipping");
            return Ok(());
        }
    };

    for child in node.children().filter(|n| n.is_element()) {
        if child.tag_name().name() == "measure" {
            part.measures.push(parse_measure(&child)?);
        }
    }
    Ok(())
}

// ─── Measure ─────────────────────────────────────────────────────────

fn parse_measure(node: &Node) -> Result<Measure, LoadError> {
    let mut measure = Measure {
        number: measure_number(node),
        implicit: node.attribute("implicit") == Some("yes"),
        width: node.attribute("width").and_then(|w| w.parse::<f64>().ok()),
        ..Default::default()
    };

    // Running position in divisions. <backup> and <forward> move it so that
    // later voices start where they belong.
    let mut position: i32 = 0;
    let mut last_onset: i32 = 0;
    let overflow = || LoadError::DurationOverflow(measure_number(node));

    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "attributes" => {
                if let Some(divisions) = child
                    .children()
                    .find(|n| n.is_element() && n.tag_name().name() == "divisions")
                    .and_then(|n| parse_i32(&n))
                {
                    measure.divisions = Some(divisions);
                }
            }
            "note" => {
                let mut note = parse_note(&child);
                if note.chord {
                    note.offset = last_onset;
                } else {
                    note.offset = position;
                    last_onset = position;
                    if !note.grace {
                        position = position.checked_add(note.duration).ok_or_else(overflow)?;
                    }
                }
                let end = note.offset.checked_add(note.duration).ok_or_else(overflow)?;
                measure.length = measure.length.max(end);
                measure.notes.push(note);
            }
            "backup" => {
                position = (position - child_duration(&child)).max(0);
            }
            "forward" => {
                position = position
                    .checked_add(child_duration(&child))
                    .ok_or_else(overflow)?;
                measure.length = measure.length.max(position);
            }
            "direction" => {
                if let Some(tempo) = parse_direction_tempo(&child) {
                    measure.tempo.get_or_insert(tempo);
                }
            }
            "sound" => {
                // <sound> can appear directly in <measure> (not inside <direction>)
                if let Some(tempo) = sound_tempo(&child) {
                    measure.tempo.get_or_insert(tempo);
                }
            }
            _ => {}
        }
    }

    Ok(measure)
}

fn measure_number(node: &Node) -> i32 {
    node.attribute("number")
        .and_then(|n| n.parse::<i32>().ok())
        .unwrap_or(0)
}

fn child_duration(node: &Node) -> i32 {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == "duration")
        .and_then(|n| parse_i32(&n))
        .unwrap_or(0)
        .max(0)
}

// ─── Note ────────────────────────────────────────────────────────────

fn parse_note(node: &Node) -> Note {
    let mut note = Note {
        default_x: node.attribute("default-x").and_then(|v| v.parse().ok()),
        ..Default::default()
    };

    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "pitch" => note.pitch = Some(parse_pitch(&child)),
            "duration" => note.duration = parse_i32(&child).unwrap_or(0).max(0),
            "voice" => note.voice = parse_i32(&child),
            "staff" => note.staff = parse_i32(&child),
            "rest" => note.rest = true,
            "grace" => note.grace = true,
            "chord" => note.chord = true,
            _ => {}
        }
    }

    if note.grace {
        note.duration = 0;
    }
    note
}

fn parse_pitch(node: &Node) -> Pitch {
    let mut pitch = Pitch {
        step: "C".to_string(),
        octave: 4,
        alter: None,
    };
    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "step" => {
                pitch.step = child.text().unwrap_or("C").trim().to_string();
            }
            "octave" => pitch.octave = parse_i32(&child).unwrap_or(4),
            "alter" => pitch.alter = parse_f64(&child),
            _ => {}
        }
    }
    pitch
}

// ─── Direction ───────────────────────────────────────────────────────

/// Tempo from a `<direction>`: `<sound tempo>` wins over a metronome mark.
fn parse_direction_tempo(node: &Node) -> Option<f64> {
    let mut metronome = None;
    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "sound" => {
                if let Some(tempo) = sound_tempo(&child) {
                    return Some(tempo);
                }
            }
            "direction-type" => {
                for dt_child in child.children().filter(|n| n.is_element()) {
                    if dt_child.tag_name().name() == "metronome" {
                        metronome = metronome.or_else(|| parse_metronome(&dt_child));
                    }
                }
            }
            _ => {}
        }
    }
    metronome
}

fn sound_tempo(node: &Node) -> Option<f64> {
    node.attribute("tempo")
        .and_then(|t| t.parse::<f64>().ok())
        .filter(|t| *t > 0.0)
}

/// Quarter-note BPM of a metronome mark, scaling other beat units.
fn parse_metronome(node: &Node) -> Option<f64> {
    let mut beat_unit = "quarter";
    let mut dotted = false;
    let mut per_minute = None;

    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "beat-unit" => beat_unit = child.text().unwrap_or("quarter").trim(),
            "beat-unit-dot" => dotted = true,
            "per-minute" => per_minute = parse_f64(&child),
            _ => {}
        }
    }

    let quarters_per_beat = match beat_unit {
        "whole" => 4.0,
        "half" => 2.0,
        "eighth" => 0.5,
        "16th" => 0.25,
        _ => 1.0,
    } * if dotted { 1.5 } else { 1.0 };

    per_minute
        .filter(|bpm| *bpm > 0.0)
        .map(|bpm| bpm * quarters_per_beat)
}

// ─── Helpers ─────────────────────────────────────────────────────────

fn parse_i32(node: &Node) -> Option<i32> {
    node.text()?.trim().parse().ok()
}

fn parse_f64(node: &Node) -> Option<f64> {
    node.text()?.trim().parse().ok()
}
