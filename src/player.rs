//! Live playback: the play/stop/reset state machine and its timer chains.
//!
//! A session walks the cursor one position at a time. Each step reads the
//! notes under the cursor, sounds them, advances the cursor, moves the
//! overlay and arms the next step after the step's hold. Deadlines are
//! absolute (`session start + Σ holds`), so a late wake-up never pushes the
//! rest of the score back.
//!
//! Everything mutable sits behind one mutex. The step chain and the elapsed
//! ticker hold only a weak reference and check the session id and the
//! playing flag under the lock before touching anything, so a stopped or
//! replaced session can never sound a note.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant, MissedTickBehavior};

use crate::config::PlayerConfig;
use crate::cursor::{ScoreCursor, ScoreRenderer};
use crate::cursor_sync::{CursorSync, Overlay, Viewport};
use crate::duration::DurationModel;
use crate::error::{LoadError, PlayerError};
use crate::mxl;
use crate::pitch::{normalize, PitchName};
use crate::synth::{Synthesizer, SynthesizerFactory};
use crate::transpose::Transpose;

// ═══════════════════════════════════════════════════════════════════════
// Public API
// ═══════════════════════════════════════════════════════════════════════

/// Observable player state, as a host UI would render it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub ready: bool,
    pub playing: bool,
    /// Pitches of the current step as written in the score (untransposed).
    pub active_pitches: Vec<PitchName>,
    pub elapsed: f64,
    pub total_duration: f64,
    pub progress: f64,
}

/// Score playback engine.
///
/// Timers run on the Tokio runtime that is current when [`play`] is called.
/// Dropping the player stops any running session.
///
/// [`play`]: ScorePlayer::play
pub struct ScorePlayer {
    inner: Arc<Mutex<Inner>>,
}

impl ScorePlayer {
    pub fn new(
        config: PlayerConfig,
        renderer: impl ScoreRenderer + 'static,
        synths: impl SynthesizerFactory + 'static,
        overlay: impl Overlay + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                durations: config.duration_model(None),
                config,
                renderer: Box::new(renderer),
                synths: Box::new(synths),
                overlay: Box::new(overlay),
                sync: CursorSync::default(),
                markup: None,
                cursor: None,
                total_duration: 0.0,
                elapsed: 0.0,
                active: BTreeSet::new(),
                session: None,
                last_session_id: 0,
            })),
        }
    }

    /// Load score markup, replacing whatever was loaded before.
    ///
    /// Any running session is torn down first. On failure the player is left
    /// without a score and `play` does nothing.
    pub fn load(&self, markup: &str) -> Result<(), LoadError> {
        let mut inner = self.lock();
        inner.teardown();
        inner.clear_display();
        inner.cursor = None;
        inner.markup = None;
        inner.total_duration = 0.0;

        let mut cursor = match inner.renderer.load(markup) {
            Ok(cursor) => cursor,
            Err(e) => {
                log::warn!("score failed to load: {e}");
                return Err(e);
            }
        };

        let durations = inner.config.duration_model(cursor.tempo_hint());
        inner.total_duration = durations.total_duration(&mut *cursor);
        inner.durations = durations;

        let Inner { sync, overlay, .. } = &mut *inner;
        sync.forget();
        sync.sync(&*cursor, &mut **overlay);

        inner.cursor = Some(cursor);
        inner.markup = Some(markup.to_string());
        log::info!(
            "score ready: {:.2}s at {} bpm",
            inner.total_duration,
            inner.durations.tempo.bpm()
        );
        Ok(())
    }

    /// Load a MusicXML document or a compressed `.mxl` archive.
    pub fn load_bytes(&self, data: &[u8]) -> Result<(), LoadError> {
        match mxl::read_markup(data) {
            Ok(markup) => self.load(&markup),
            Err(e) => {
                self.unload();
                Err(e)
            }
        }
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<(), LoadError> {
        match std::fs::read(path.as_ref()) {
            Ok(data) => self.load_bytes(&data),
            Err(e) => {
                self.unload();
                Err(e.into())
            }
        }
    }

    /// Start a session from the first cursor position.
    ///
    /// Returns `Ok(false)` without doing anything when no score is loaded or
    /// a session is already running.
    pub fn play(&self) -> Result<bool, PlayerError> {
        let mut inner = self.lock();
        if inner.cursor.is_none() || inner.session.is_some() {
            return Ok(false);
        }
        let runtime = Handle::try_current().map_err(|_| PlayerError::NoRuntime)?;
        let synth = inner.synths.create()?;

        inner.last_session_id += 1;
        let id = inner.last_session_id;
        let playing = Arc::new(AtomicBool::new(true));
        let started = Instant::now();
        inner.session = Some(Session {
            id,
            playing: Arc::clone(&playing),
            scheduled: 0.0,
            synth,
            transpose: Transpose::default(),
            chain: None,
            ticker: None,
        });
        inner.clear_display();

        let Inner {
            cursor,
            sync,
            overlay,
            ..
        } = &mut *inner;
        if let Some(cursor) = cursor.as_mut() {
            cursor.reset();
            cursor.show();
            sync.sync(&**cursor, &mut **overlay);
        }
        log::info!("playback session {id} started");

        let Step::Advanced { hold, next_at } = inner.step(id) else {
            return Ok(true);
        };

        let weak = Arc::downgrade(&self.inner);
        let timing = ChainTiming {
            started,
            release_ratio: inner.config.release_ratio(),
        };
        let chain = runtime.spawn(run_chain(
            weak.clone(),
            id,
            Arc::clone(&playing),
            timing,
            hold,
            next_at,
        ));
        let ticker = runtime.spawn(run_ticker(
            weak,
            id,
            playing,
            started,
            inner.config.tick_interval(),
        ));
        if let Some(session) = inner.session.as_mut() {
            session.chain = Some(chain);
            session.ticker = Some(ticker);
        }
        Ok(true)
    }

    /// End the session, if any, and rewind. Does nothing when idle.
    pub fn stop(&self) {
        let mut inner = self.lock();
        if inner.teardown() {
            inner.rewind();
        }
    }

    /// Like [`stop`](Self::stop), but also rewinds and hides the cursor when
    /// nothing is playing.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.teardown();
        inner.rewind();
    }

    /// Write the loaded markup to `dir`, returning the written path.
    pub fn download_score(&self, dir: impl AsRef<Path>) -> Result<PathBuf, PlayerError> {
        let (markup, file_name) = {
            let inner = self.lock();
            let markup = inner.markup.clone().ok_or(PlayerError::NoScore)?;
            (markup, inner.config.download_file_name.clone())
        };
        let path = dir.as_ref().join(file_name);
        std::fs::write(&path, markup)?;
        log::info!("score written to {}", path.display());
        Ok(path)
    }

    /// Update container geometry. A running session re-places the overlay.
    pub fn set_viewport(&self, viewport: Viewport) {
        let mut inner = self.lock();
        let playing = inner.session.is_some();
        let Inner {
            cursor,
            sync,
            overlay,
            ..
        } = &mut *inner;
        sync.set_viewport(viewport);
        if let (true, Some(cursor)) = (playing, cursor.as_ref()) {
            sync.sync(&**cursor, &mut **overlay);
        }
    }

    pub fn is_ready(&self) -> bool {
        self.lock().cursor.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.lock().session.is_some()
    }

    pub fn active_pitches(&self) -> Vec<PitchName> {
        self.lock().active.iter().copied().collect()
    }

    pub fn elapsed(&self) -> f64 {
        self.lock().elapsed
    }

    pub fn total_duration(&self) -> f64 {
        self.lock().total_duration
    }

    /// `elapsed / total`, within `0..=1`.
    pub fn progress(&self) -> f64 {
        let inner = self.lock();
        progress(inner.elapsed, inner.total_duration)
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        let inner = self.lock();
        PlayerSnapshot {
            ready: inner.cursor.is_some(),
            playing: inner.session.is_some(),
            active_pitches: inner.active.iter().copied().collect(),
            elapsed: inner.elapsed,
            total_duration: inner.total_duration,
            progress: progress(inner.elapsed, inner.total_duration),
        }
    }

    pub fn config(&self) -> PlayerConfig {
        self.lock().config.clone()
    }

    fn unload(&self) {
        let mut inner = self.lock();
        inner.teardown();
        inner.clear_display();
        inner.cursor = None;
        inner.markup = None;
        inner.total_duration = 0.0;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }
}

impl Drop for ScorePlayer {
    fn drop(&mut self) {
        self.lock().teardown();
    }
}

/// `m:ss`, seconds floored.
pub fn format_clock(secs: f64) -> String {
    let total = if secs.is_finite() && secs > 0.0 {
        secs.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

fn progress(elapsed: f64, total: f64) -> f64 {
    if total > 0.0 {
        (elapsed / total).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Shared state
// ═══════════════════════════════════════════════════════════════════════

struct Inner {
    config: PlayerConfig,
    renderer: Box<dyn ScoreRenderer>,
    synths: Box<dyn SynthesizerFactory>,
    overlay: Box<dyn Overlay>,
    sync: CursorSync,
    markup: Option<String>,
    cursor: Option<Box<dyn ScoreCursor>>,
    durations: DurationModel,
    total_duration: f64,
    elapsed: f64,
    active: BTreeSet<PitchName>,
    session: Option<Session>,
    last_session_id: u64,
}

/// One run from `play()` to stop, reset, reload or end of score.
struct Session {
    id: u64,
    playing: Arc<AtomicBool>,
    /// Seconds from session start to the start of the next step.
    scheduled: f64,
    synth: Box<dyn Synthesizer>,
    transpose: Transpose,
    chain: Option<JoinHandle<()>>,
    ticker: Option<JoinHandle<()>>,
}

enum Step {
    /// Notes dispatched; the next step is due `next_at` seconds into the session.
    Advanced { hold: f64, next_at: f64 },
    /// End of score reached; the session is over.
    Finished,
    /// The session was stopped or replaced.
    Stale,
}

impl Inner {
    fn is_current(&self, id: u64) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.id == id && s.playing.load(Ordering::SeqCst))
    }

    fn step(&mut self, id: u64) -> Step {
        if !self.is_current(id) {
            return Step::Stale;
        }
        if self.cursor.as_ref().map_or(true, |c| c.end_reached()) {
            self.finish();
            return Step::Finished;
        }

        let Inner {
            config,
            overlay,
            sync,
            cursor: Some(cursor),
            durations,
            active,
            session: Some(session),
            ..
        } = self
        else {
            return Step::Stale;
        };

        let notes = cursor.notes_under_cursor();
        let pitches: Vec<PitchName> = notes
            .iter()
            .filter_map(|n| n.pitch.as_ref())
            .map(normalize)
            .collect();
        let hold = durations.step_hold(&notes);
        *active = pitches.iter().copied().collect();

        if let Some(first) = pitches.first() {
            if config.auto_transpose {
                session.transpose.resolve(first, config.reference_midi);
            }
            let sounding = session.transpose.apply_all(&pitches);
            log::debug!(
                "session {id} at {:.3}s: {:?} for {hold:.3}s",
                session.scheduled,
                sounding.iter().map(ToString::to_string).collect::<Vec<_>>()
            );
            session.synth.trigger_notes(&sounding, hold);
        }

        cursor.next();
        sync.sync(&**cursor, &mut **overlay);

        session.scheduled += hold;
        Step::Advanced {
            hold,
            next_at: session.scheduled,
        }
    }

    /// Natural end of score.
    fn finish(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
            self.elapsed = session.scheduled;
            log::info!(
                "playback session {} finished after {:.2}s",
                session.id,
                session.scheduled
            );
        }
        self.active.clear();
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.hide();
        }
        self.overlay.hide();
    }

    /// Cancel the running session. Returns whether there was one.
    fn teardown(&mut self) -> bool {
        match self.session.take() {
            Some(mut session) => {
                session.close();
                log::info!("playback session {} stopped", session.id);
                true
            }
            None => false,
        }
    }

    fn rewind(&mut self) {
        self.clear_display();
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.reset();
            cursor.hide();
        }
        self.overlay.hide();
    }

    fn clear_display(&mut self) {
        self.active.clear();
        self.elapsed = 0.0;
    }
}

impl Session {
    fn close(&mut self) {
        self.playing.store(false, Ordering::SeqCst);
        for task in [self.chain.take(), self.ticker.take()].into_iter().flatten() {
            task.abort();
        }
        self.synth.dispose();
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

// ═══════════════════════════════════════════════════════════════════════
// Timer tasks
// ═══════════════════════════════════════════════════════════════════════

/// Roughly thirty years; far enough that the deadline never fires.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone, Copy)]
struct ChainTiming {
    started: Instant,
    release_ratio: f64,
}

impl ChainTiming {
    /// Deadline `secs` into the session, capped at [`FAR_FUTURE`].
    fn at(&self, secs: f64) -> Instant {
        let offset = Duration::try_from_secs_f64(secs.max(0.0))
            .map_or(FAR_FUTURE, |d| d.min(FAR_FUTURE));
        self.started + offset
    }
}

/// Release the active pitches near the end of each hold, then run the next
/// step when the hold is over.
async fn run_chain(
    inner: Weak<Mutex<Inner>>,
    id: u64,
    playing: Arc<AtomicBool>,
    timing: ChainTiming,
    mut hold: f64,
    mut next_at: f64,
) {
    loop {
        sleep_until(timing.at(next_at - hold + hold * timing.release_ratio)).await;
        if !playing.load(Ordering::SeqCst) {
            return;
        }
        {
            let Some(inner) = inner.upgrade() else { return };
            let mut inner = lock(&inner);
            if !inner.is_current(id) {
                return;
            }
            inner.active.clear();
        }

        sleep_until(timing.at(next_at)).await;
        if !playing.load(Ordering::SeqCst) {
            return;
        }
        let step = match inner.upgrade() {
            Some(inner) => {
                let mut inner = lock(&inner);
                inner.step(id)
            }
            None => return,
        };
        match step {
            Step::Advanced {
                hold: h,
                next_at: n,
            } => {
                hold = h;
                next_at = n;
            }
            Step::Finished | Step::Stale => return,
        }
    }
}

/// Refresh elapsed time once per frame.
async fn run_ticker(
    inner: Weak<Mutex<Inner>>,
    id: u64,
    playing: Arc<AtomicBool>,
    started: Instant,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        if !playing.load(Ordering::SeqCst) {
            return;
        }
        let Some(inner) = inner.upgrade() else { return };
        let mut inner = lock(&inner);
        if !inner.is_current(id) {
            return;
        }
        inner.elapsed = started.elapsed().as_secs_f64();
    }
}
