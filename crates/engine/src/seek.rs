//! Seek request hand-off between control threads and the engine thread
//!
//! Seeks are last-writer-wins: a new request made before the engine consumes
//! the previous one simply replaces it, so a user scrubbing quickly lands on
//! their final position without intermediate jumps.

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeekState {
    Idle,
    Pending(u64),
}

/// Mutex-guarded pending-seek slot
#[derive(Debug)]
pub struct SeekController {
    state: Mutex<SeekState>,
}

impl Default for SeekController {
    fn default() -> Self {
        Self::new()
    }
}

impl SeekController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SeekState::Idle),
        }
    }

    /// Request a seek to `frame`, replacing any pending request
    pub fn request(&self, frame: u64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = SeekState::Pending(frame);
    }

    /// Consume the pending request, if any, returning to idle
    pub fn take(&self) -> Option<u64> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match *state {
            SeekState::Pending(frame) => {
                *state = SeekState::Idle;
                Some(frame)
            }
            SeekState::Idle => None,
        }
    }

    /// Whether an unconsumed request is waiting
    #[must_use]
    pub fn is_pending(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        matches!(*state, SeekState::Pending(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_on_idle_returns_none() {
        let seek = SeekController::new();
        assert!(!seek.is_pending());
        assert_eq!(seek.take(), None);
    }

    #[test]
    fn test_request_then_take() {
        let seek = SeekController::new();
        seek.request(42);
        assert!(seek.is_pending());
        assert_eq!(seek.take(), Some(42));
        // Consumed, back to idle
        assert_eq!(seek.take(), None);
        assert!(!seek.is_pending());
    }

    #[test]
    fn test_last_writer_wins() {
        let seek = SeekController::new();
        seek.request(10);
        seek.request(250);
        assert_eq!(seek.take(), Some(250));
        assert_eq!(seek.take(), None);
    }
}
