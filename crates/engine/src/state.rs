//! State shared between the engine thread and control threads

use std::sync::{Arc, Mutex};

use pose_playback_common::DEFAULT_BASE_INTERVAL_MS;
use pose_playback_models::PoseModel;

use crate::seek::SeekController;

/// Immutable snapshot of the active model set.
///
/// The whole vector is swapped atomically under the mutex, so a frame is
/// always processed by one coherent set even if the active models change
/// mid-playback.
pub type ModelSet = Arc<Vec<Arc<dyn PoseModel>>>;

/// Playback flags and pacing parameters
#[derive(Debug, Clone, Copy)]
pub struct PlaybackState {
    /// Engine thread keeps looping while true
    pub running: bool,
    /// Paused: hold position, emit nothing
    pub paused: bool,
    /// Wrap to frame 0 at end of stream instead of finishing
    pub looping: bool,
    /// Reached end of stream with looping off
    pub finished: bool,
    /// Playback rate multiplier, > 0
    pub speed: f32,
    /// Target milliseconds between frames at speed 1.0
    pub base_interval_ms: u64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            running: false,
            paused: false,
            looping: false,
            finished: false,
            speed: 1.0,
            base_interval_ms: DEFAULT_BASE_INTERVAL_MS,
        }
    }
}

/// Everything the engine thread and controller share
pub struct SharedState {
    playback: Mutex<PlaybackState>,
    pub seek: SeekController,
    models: Mutex<ModelSet>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            playback: Mutex::new(PlaybackState::default()),
            seek: SeekController::new(),
            models: Mutex::new(Arc::new(Vec::new())),
        }
    }

    /// Copy of the current playback state
    #[must_use]
    pub fn snapshot(&self) -> PlaybackState {
        *self.playback.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mutate the playback state under the lock
    pub fn update<F: FnOnce(&mut PlaybackState)>(&self, f: F) {
        let mut state = self.playback.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state);
    }

    /// Handle to the current model set
    #[must_use]
    pub fn models_snapshot(&self) -> ModelSet {
        Arc::clone(&self.models.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Replace the active model set in one step
    pub fn set_models(&self, models: Vec<Arc<dyn PoseModel>>) {
        let mut guard = self.models.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(models);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = PlaybackState::default();
        assert!(!state.running);
        assert!(!state.paused);
        assert!(!state.looping);
        assert!(!state.finished);
        assert_eq!(state.speed, 1.0);
        assert_eq!(state.base_interval_ms, DEFAULT_BASE_INTERVAL_MS);
    }

    #[test]
    fn test_update_and_snapshot() {
        let shared = SharedState::new();
        shared.update(|s| {
            s.paused = true;
            s.speed = 2.0;
        });
        let snap = shared.snapshot();
        assert!(snap.paused);
        assert_eq!(snap.speed, 2.0);
    }

    #[test]
    fn test_model_set_swap_keeps_old_handle() {
        let shared = SharedState::new();
        let before = shared.models_snapshot();
        shared.set_models(Vec::new());
        let after = shared.models_snapshot();

        // Old snapshot stays valid; the new one is a distinct allocation
        assert_eq!(before.len(), 0);
        assert!(!Arc::ptr_eq(&before, &after));
    }
}
