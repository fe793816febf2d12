//! End-to-end playback of the sample files through the MusicXML renderer.

use std::path::PathBuf;
use std::time::Duration;

use pretty_assertions::assert_eq;
use scoreplay::{
    LoadError, MidiRecorder, MusicXmlRenderer, PitchName, PlayerConfig, PlayerError, ScorePlayer,
    SharedOverlay, Viewport,
};

fn sheetmusic_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("sheetmusic")
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn names(pitches: &[PitchName]) -> Vec<String> {
    pitches.iter().map(ToString::to_string).collect()
}

fn player(config: PlayerConfig) -> (ScorePlayer, MidiRecorder, SharedOverlay) {
    init_logger();
    let recorder = MidiRecorder::new();
    let overlay = SharedOverlay::new();
    let player = ScorePlayer::new(config, MusicXmlRenderer, recorder.clone(), overlay.clone());
    (player, recorder, overlay)
}

async fn advance(secs: f64) {
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn two_notes_play_through() {
    let (player, recorder, overlay) = player(PlayerConfig::default());
    player
        .load_file(sheetmusic_dir().join("two-notes.musicxml"))
        .expect("Failed to load two-notes");
    assert!(player.is_ready());
    assert!((player.total_duration() - 1.2).abs() < 1e-9);
    // initial sync places the overlay on the first note
    assert_eq!(overlay.state().left, 40.0);

    assert!(player.play().unwrap());
    advance(2.0).await;

    let take = recorder.last_take().unwrap();
    let dispatched: Vec<Vec<String>> = take.notes.iter().map(|n| names(&n.pitches)).collect();
    assert_eq!(dispatched, vec![vec!["C4"], vec!["E4"]]);
    assert!(take.notes.iter().all(|n| (n.hold_secs - 0.6).abs() < 1e-9));
    assert!(take.disposed);

    let snapshot = player.snapshot();
    assert!(!snapshot.playing);
    assert!(snapshot.active_pitches.is_empty());
    assert!((snapshot.elapsed - snapshot.total_duration).abs() < 1e-9);
    assert_eq!(snapshot.progress, 1.0);
}

#[tokio::test(start_paused = true)]
async fn chorale_uses_score_tempo_and_transposes() {
    let config = PlayerConfig {
        tempo_from_score: true,
        ..Default::default()
    };
    let (player, recorder, overlay) = player(config);
    player
        .load_file(sheetmusic_dir().join("chorale.musicxml"))
        .expect("Failed to load chorale");
    assert!((player.total_duration() - 5.0).abs() < 1e-9);

    player.set_viewport(Viewport {
        container_left: 10.0,
        scroll_left: 0.0,
    });
    player.play().unwrap();
    assert_eq!(names(&player.active_pitches()), vec!["F2", "A3", "F4"]);
    // cursor has moved on to the Bb3
    assert_eq!(overlay.state().left, 120.0);

    advance(6.0).await;
    assert!(!player.is_playing());

    let take = recorder.last_take().unwrap();
    let dispatched: Vec<Vec<String>> = take.notes.iter().map(|n| names(&n.pitches)).collect();
    assert_eq!(
        dispatched,
        vec![
            vec!["C4", "G#4", "G#2"],
            vec!["C#4"],
            vec!["D#4"],
            vec!["G#3"],
            vec!["D#3"],
        ]
    );
    let holds: Vec<f64> = take.notes.iter().map(|n| n.hold_secs).collect();
    assert_eq!(holds, vec![1.5, 0.25, 0.25, 1.5, 1.0]);
    assert!((player.elapsed() - 5.0).abs() < 1e-9);

    let smf = take.to_smf(120.0);
    assert_eq!(&smf[0..4], b"MThd");
    assert!(smf.windows(4).any(|w| w == b"MTrk"));
}

#[tokio::test(start_paused = true)]
async fn auto_transpose_can_be_disabled() {
    let config = PlayerConfig {
        auto_transpose: false,
        ..Default::default()
    };
    let (player, recorder, _overlay) = player(config);
    player
        .load_file(sheetmusic_dir().join("chorale.musicxml"))
        .unwrap();
    player.play().unwrap();
    player.stop();

    let take = recorder.last_take().unwrap();
    assert_eq!(names(&take.notes[0].pitches), vec!["A3", "F4", "F2"]);
    assert!(take.disposed);
}

#[tokio::test(start_paused = true)]
async fn reload_ends_running_session() {
    let (player, recorder, _overlay) = player(PlayerConfig::default());
    player
        .load_file(sheetmusic_dir().join("chorale.musicxml"))
        .unwrap();
    player.play().unwrap();
    advance(0.5).await;

    player
        .load_file(sheetmusic_dir().join("two-notes.musicxml"))
        .unwrap();
    assert!(!player.is_playing());
    assert!(recorder.last_take().unwrap().disposed);

    advance(5.0).await;
    assert_eq!(recorder.last_take().unwrap().notes.len(), 1);
    assert!((player.total_duration() - 1.2).abs() < 1e-9);
}

#[test]
fn download_writes_loaded_markup() {
    let (player, _recorder, _overlay) = player(PlayerConfig::default());
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        player.download_score(dir.path()),
        Err(PlayerError::NoScore)
    ));

    let markup = std::fs::read_to_string(sheetmusic_dir().join("two-notes.musicxml")).unwrap();
    player.load(&markup).unwrap();
    let path = player.download_score(dir.path()).unwrap();
    assert_eq!(path.file_name().unwrap(), "sheet-music.musicxml");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), markup);
}

#[test]
fn bad_markup_leaves_player_unready() {
    let (player, _recorder, _overlay) = player(PlayerConfig::default());
    assert!(matches!(player.load("<html/>"), Err(LoadError::UnsupportedRoot(_))));
    assert!(!player.is_ready());
    assert!(matches!(player.load_bytes(b"PK\x03\x04garbage"), Err(LoadError::Archive(_))));
    assert!(!player.is_ready());

    let long_notes = r#"<score-partwise><part-list><score-part id="P1"/></part-list>
      <part id="P1"><measure number="1">
        <note><pitch><step>C</step><octave>4</octave></pitch><duration>2147483647</duration></note>
        <note><pitch><step>E</step><octave>4</octave></pitch><duration>2147483647</duration></note>
      </measure></part></score-partwise>"#;
    assert!(matches!(player.load(long_notes), Err(LoadError::DurationOverflow(1))));
    assert!(!player.is_ready());
}

#[test]
fn snapshot_serializes_to_json() {
    let (player, _recorder, _overlay) = player(PlayerConfig::default());
    player
        .load_file(sheetmusic_dir().join("two-notes.musicxml"))
        .unwrap();
    let json = serde_json::to_value(player.snapshot()).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "ready": true,
            "playing": false,
            "active_pitches": [],
            "elapsed": 0.0,
            "total_duration": 1.2,
            "progress": 0.0,
        })
    );
}
