//! Control surface over the playback worker thread

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use thiserror::Error;
use tracing::{debug, warn};

use pose_playback_common::{base_interval_ms, FrameSource};
use pose_playback_models::PoseModel;

use crate::engine::EngineWorker;
use crate::events::EngineEvent;
use crate::state::{PlaybackState, SharedState};

/// Errors from controller operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No source open")]
    NoSourceOpen,

    #[error("Failed to spawn playback thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Owns the playback thread and exposes the command API.
///
/// All commands return quickly: they flip shared flags or post a seek
/// request, which the worker observes within one idle delay. Commands
/// issued in an invalid state (seek with nothing open, starting twice) are
/// logged no-ops rather than errors, except `start` without a source.
pub struct EngineController {
    shared: Arc<SharedState>,
    source: Option<Box<dyn FrameSource>>,
    handle: Option<JoinHandle<()>>,
    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
}

impl Default for EngineController {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineController {
    #[must_use]
    pub fn new() -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            shared: Arc::new(SharedState::new()),
            source: None,
            handle: None,
            events_tx,
            events_rx,
        }
    }

    /// Adopt a new frame source, stopping any current playback first.
    ///
    /// Pacing is derived from the source frame rate; stale events from the
    /// previous source are discarded.
    pub fn open(&mut self, source: Box<dyn FrameSource>) {
        self.stop();

        let interval = base_interval_ms(source.fps());
        self.shared.update(|s| {
            s.paused = false;
            s.finished = false;
            s.base_interval_ms = interval;
        });
        self.shared.seek.take();

        while self.events_rx.try_recv().is_ok() {}

        debug!(
            "Opened source: {} frames, {:.2} fps, {}ms base interval",
            source.frame_count(),
            source.fps(),
            interval
        );
        self.source = Some(source);
    }

    /// Handle for receiving playback events; clones share the same stream
    #[must_use]
    pub fn events(&self) -> Receiver<EngineEvent> {
        self.events_rx.clone()
    }

    /// Start or restart playback.
    ///
    /// With the worker already running this resumes a pause, or rewinds to
    /// frame 0 after the stream finished. Fails only when no source has been
    /// opened.
    pub fn start(&mut self) -> Result<(), EngineError> {
        let worker_alive = self.handle.as_ref().is_some_and(|h| !h.is_finished());
        if worker_alive {
            if self.shared.snapshot().finished {
                self.shared.seek.request(0);
            } else {
                self.shared.update(|s| s.paused = false);
            }
            return Ok(());
        }
        // Joins a worker that exited on its own (receiver dropped)
        self.stop();

        let source = self.source.take().ok_or(EngineError::NoSourceOpen)?;

        self.shared.update(|s| {
            s.running = true;
            s.paused = false;
            s.finished = false;
        });

        let worker = EngineWorker::new(source, Arc::clone(&self.shared), self.events_tx.clone());
        let handle = thread::Builder::new()
            .name("playback-engine".to_string())
            .spawn(move || worker.run())?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Stop playback and release the source. Idempotent; blocks until the
    /// worker thread has exited.
    pub fn stop(&mut self) {
        self.shared.update(|s| s.running = false);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Playback thread panicked");
            }
        }
    }

    /// Hold the current position without emitting frames
    pub fn pause(&self) {
        self.shared.update(|s| s.paused = true);
    }

    /// Resume from a pause
    pub fn resume(&self) {
        self.shared.update(|s| s.paused = false);
    }

    pub fn toggle_pause(&self) {
        self.shared.update(|s| s.paused = !s.paused);
    }

    /// Request a jump to `frame` (clamped to the source length).
    ///
    /// Playback pauses until the worker applies the seek, then resumes at
    /// the new position. Rapid successive requests collapse to the last one.
    /// A no-op when nothing is open.
    pub fn seek(&self, frame: u64) {
        if self.source.is_none() && self.handle.is_none() {
            warn!("Seek to frame {} ignored: no source open", frame);
            return;
        }
        self.shared.update(|s| s.paused = true);
        self.shared.seek.request(frame);
    }

    /// Set the playback rate multiplier; non-positive values are rejected
    pub fn set_speed(&self, speed: f32) {
        if speed <= 0.0 || !speed.is_finite() {
            warn!("Ignoring invalid playback speed {}", speed);
            return;
        }
        self.shared.update(|s| s.speed = speed);
    }

    /// Enable or disable wrapping to frame 0 at end of stream
    pub fn set_loop(&self, looping: bool) {
        self.shared.update(|s| s.looping = looping);
    }

    /// Atomically replace the set of models applied to each frame
    pub fn set_active_models(&self, models: Vec<Arc<dyn PoseModel>>) {
        self.shared.set_models(models);
    }

    /// Snapshot of the playback flags
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.shared.snapshot()
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        let state = self.shared.snapshot();
        state.running && !state.paused && !state.finished
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.shared.snapshot().paused
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.shared.snapshot().finished
    }
}

impl Drop for EngineController {
    fn drop(&mut self) {
        self.stop();
    }
}
