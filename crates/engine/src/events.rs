//! Events emitted by the engine thread

use pose_playback_common::{Frame, PositionInfo};

/// What the engine tells its consumers, in emission order per tick:
/// `FrameReady` then `PositionChanged`, with `Finished` once at end of
/// stream when looping is off.
#[derive(Debug)]
pub enum EngineEvent {
    /// A decoded, annotated frame ready for display. The frame is moved into
    /// the event; the engine allocates a fresh buffer per read.
    FrameReady(Frame),
    /// Playback position after the frame above
    PositionChanged(PositionInfo),
    /// End of stream reached with looping disabled
    Finished,
}
