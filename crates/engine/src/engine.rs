//! The playback worker loop
//!
//! One dedicated thread owns the frame source and runs the tick loop:
//!
//! ```text
//!   loop:
//!     running?          -> no: exit
//!     pending seek?     -> apply, resume, restart tick
//!     paused/finished?  -> idle sleep, restart tick
//!     read frame        -> end of stream: wrap or finish
//!     run models        -> annotate frame (failures degrade to no overlay)
//!     emit FrameReady + PositionChanged
//!     sleep remaining interval
//! ```
//!
//! Control threads never touch the source directly; they flip shared flags
//! and post seek requests, which this loop observes within one idle delay.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

use pose_playback_common::{FrameSource, PositionInfo};

use crate::clock::{PlaybackClock, IDLE_DELAY, MIN_DELAY};
use crate::events::EngineEvent;
use crate::state::SharedState;

pub(crate) struct EngineWorker {
    source: Box<dyn FrameSource>,
    shared: Arc<SharedState>,
    events: Sender<EngineEvent>,
    clock: PlaybackClock,
    /// Set on a loop wrap, cleared by the next decoded frame. A second wrap
    /// while still set means the source yields no frames at all and the
    /// stream finishes instead of spinning.
    wrapped_without_frame: bool,
}

impl EngineWorker {
    pub(crate) fn new(
        source: Box<dyn FrameSource>,
        shared: Arc<SharedState>,
        events: Sender<EngineEvent>,
    ) -> Self {
        Self {
            source,
            shared,
            events,
            clock: PlaybackClock::new(),
            wrapped_without_frame: false,
        }
    }

    /// Run until stopped or the event receiver goes away. Consumes the
    /// worker; the source is released when this returns.
    pub(crate) fn run(mut self) {
        info!(
            "Playback worker started: {} frames at {:.2} fps",
            self.source.frame_count(),
            self.source.fps()
        );

        loop {
            if !self.shared.snapshot().running {
                break;
            }

            if let Some(target) = self.shared.seek.take() {
                self.apply_seek(target);
                continue;
            }

            let state = self.shared.snapshot();
            if state.paused || state.finished {
                thread::sleep(IDLE_DELAY);
                continue;
            }

            let tick_start = Instant::now();
            self.clock.mark(tick_start);

            let mut frame = match self.source.read_next() {
                Ok(Some(frame)) => {
                    self.wrapped_without_frame = false;
                    frame
                }
                Ok(None) => {
                    self.handle_end_of_stream(state.looping);
                    continue;
                }
                Err(e) => {
                    // A failed read this late in the stream is treated as end
                    // of stream, same as the EOF path
                    warn!("Frame read failed, treating as end of stream: {}", e);
                    self.handle_end_of_stream(state.looping);
                    continue;
                }
            };

            let models = self.shared.models_snapshot();
            for model in models.iter() {
                match model.process_frame(&frame) {
                    Ok(keypoints) if !keypoints.is_empty() => {
                        model.draw_annotations(&mut frame, &keypoints);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Model {} failed on frame {}: {}", model.name(), frame.index, e);
                    }
                }
            }

            let position = PositionInfo {
                current: frame.index,
                total: self.source.frame_count(),
            };

            if self.events.send(EngineEvent::FrameReady(frame)).is_err()
                || self
                    .events
                    .send(EngineEvent::PositionChanged(position))
                    .is_err()
            {
                debug!("Event receiver dropped, stopping playback");
                self.shared.update(|s| s.running = false);
                break;
            }

            // Re-read state: speed may have changed while processing
            let state = self.shared.snapshot();
            let base = std::time::Duration::from_millis(state.base_interval_ms);
            thread::sleep(self.clock.next_delay(base, state.speed, Instant::now()));
        }

        info!("Playback worker stopped");
    }

    fn apply_seek(&mut self, target: u64) {
        let total = self.source.frame_count();
        let target = if total > 0 { target.min(total - 1) } else { target };

        debug!("Seeking to frame {}", target);
        if let Err(e) = self.source.seek(target) {
            warn!("Seek to frame {} failed: {}", target, e);
        }

        // Seeking resumes playback and revives a finished stream
        self.shared.update(|s| {
            s.paused = false;
            s.finished = false;
        });
        self.wrapped_without_frame = false;
        self.clock.reset();
    }

    fn handle_end_of_stream(&mut self, looping: bool) {
        if looping && !self.wrapped_without_frame {
            debug!("End of stream, looping to frame 0");
            if let Err(e) = self.source.seek(0) {
                warn!("Loop seek failed: {}", e);
            }
            self.wrapped_without_frame = true;
            self.clock.reset();
            // The wrap path must yield too, or a source that keeps failing
            // would pin the thread
            thread::sleep(MIN_DELAY);
        } else {
            if looping {
                warn!("Source produced no frames after a loop wrap, finishing");
            }
            info!("End of stream");
            self.shared.update(|s| s.finished = true);
            if self.events.send(EngineEvent::Finished).is_err() {
                self.shared.update(|s| s.running = false);
            }
        }
    }
}
