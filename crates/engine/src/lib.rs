//! Real-time playback engine applying pose models per frame
//!
//! # Architecture
//!
//! ```text
//!  control thread                      playback-engine thread
//!  --------------                      ----------------------
//!  EngineController  --flags/seek-->   EngineWorker (owns FrameSource)
//!        |                                   |
//!        |           <--crossbeam channel--  | FrameReady / PositionChanged
//!        v                                   | / Finished
//!  event consumers                           v
//!                                      PlaybackClock pacing
//! ```
//!
//! The controller never touches the source; the worker never blocks on
//! consumers beyond channel sends. Shared state is a small mutex-guarded
//! struct plus an atomically swapped model-set snapshot.

pub mod clock;
pub mod controller;
mod engine;
pub mod events;
pub mod seek;
pub mod state;

pub use clock::{PlaybackClock, IDLE_DELAY, MIN_DELAY};
pub use controller::{EngineController, EngineError};
pub use events::EngineEvent;
pub use seek::SeekController;
pub use state::{ModelSet, PlaybackState, SharedState};
