/// Common types for the playback engine: frames, the source contract, errors
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Base frame interval used when the source cannot report its frame rate
pub const DEFAULT_BASE_INTERVAL_MS: u64 = 30;

/// Errors surfaced synchronously when opening a media source
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("No video stream found")]
    NoVideoStream,

    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("FFmpeg error: {0}")]
    FFmpeg(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors while pulling frames from an already-open source.
///
/// The engine treats read failures like end-of-stream (graceful finish),
/// never as fatal to playback.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Pixel conversion failed: {0}")]
    Convert(String),

    #[error("Seek failed: {0}")]
    Seek(String),
}

/// Pixel format of decoded frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// RGB 24-bit format (required by the model pipeline)
    Rgb24,
    /// YUV 4:2:0 planar format (display-only sources)
    Yuv420p,
}

impl PixelFormat {
    /// Buffer size in bytes for a frame of the given dimensions
    #[must_use]
    pub fn buffer_len(&self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            PixelFormat::Rgb24 => w * h * 3,
            PixelFormat::Yuv420p => w * h + (w / 2) * (h / 2) * 2,
        }
    }
}

/// Decoded video frame, tagged with its source index.
///
/// Every read produces a freshly allocated buffer and the engine moves the
/// frame into the event channel after annotation, so a consumer may hold it
/// for as long as it likes without racing the decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// 0-based index within the source
    pub index: u64,
    /// Presentation timestamp in seconds
    pub timestamp: f64,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format of `data`
    pub format: PixelFormat,
    /// Raw frame data (row-major, no stride padding)
    pub data: Vec<u8>,
}

impl Frame {
    /// View the frame as an owned `RgbImage` (copies the buffer).
    ///
    /// Returns `None` for non-RGB frames or a buffer/dimension mismatch.
    #[must_use]
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        if self.format != PixelFormat::Rgb24 {
            return None;
        }
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// Run `f` over the frame pixels as an `RgbImage`, in place.
    ///
    /// The pixel buffer is moved into the image for the duration of the call
    /// and moved back afterwards; no copy is made. Returns `false` (frame
    /// untouched) for non-RGB frames or a buffer/dimension mismatch.
    pub fn edit_rgb<F>(&mut self, f: F) -> bool
    where
        F: FnOnce(&mut RgbImage),
    {
        if self.format != PixelFormat::Rgb24
            || self.data.len() != self.format.buffer_len(self.width, self.height)
        {
            return false;
        }
        let buffer = std::mem::take(&mut self.data);
        // Length checked above, so from_raw cannot fail
        let Some(mut img) = RgbImage::from_raw(self.width, self.height, buffer) else {
            return false;
        };
        f(&mut img);
        self.data = img.into_raw();
        true
    }
}

/// Derived playback position, emitted alongside every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionInfo {
    /// Index of the frame just emitted
    pub current: u64,
    /// Total frames in the source (0 if unknown)
    pub total: u64,
}

impl PositionInfo {
    /// Format the current position as `MM:SS` at the given frame rate
    #[must_use]
    pub fn timecode(&self, fps: f64) -> String {
        format_timecode(self.current, fps)
    }
}

/// Convert a frame index to `MM:SS` at the given frame rate
#[must_use]
pub fn format_timecode(frame: u64, fps: f64) -> String {
    let seconds = if fps > 0.0 {
        (frame as f64 / fps) as u64
    } else {
        0
    };
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Base frame interval in milliseconds for a reported frame rate, falling
/// back to [`DEFAULT_BASE_INTERVAL_MS`] when the rate is unknown (0)
#[must_use]
pub fn base_interval_ms(fps: f64) -> u64 {
    if fps > 0.0 {
        ((1000.0 / fps).round() as u64).max(1)
    } else {
        DEFAULT_BASE_INTERVAL_MS
    }
}

/// Contract for a decodable media stream.
///
/// `read_next` and `seek` mutate an internal read cursor; implementations are
/// not safe for concurrent use from two threads. The engine guarantees only
/// its own thread touches the source after open.
pub trait FrameSource: Send {
    /// Read the frame at the cursor and advance it.
    ///
    /// `Ok(None)` signals end-of-stream, not an error.
    fn read_next(&mut self) -> Result<Option<Frame>, ReadError>;

    /// Reposition the cursor so the next `read_next` returns the frame at or
    /// immediately after `index`.
    fn seek(&mut self, index: u64) -> Result<(), ReadError>;

    /// Total number of frames, 0 if unknown
    fn frame_count(&self) -> u64;

    /// Source frame rate, 0.0 if unknown
    fn fps(&self) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb_frame(width: u32, height: u32) -> Frame {
        Frame {
            index: 0,
            timestamp: 0.0,
            width,
            height,
            format: PixelFormat::Rgb24,
            data: vec![0u8; (width * height * 3) as usize],
        }
    }

    #[test]
    fn test_base_interval() {
        assert_eq!(base_interval_ms(30.0), 33);
        assert_eq!(base_interval_ms(25.0), 40);
        assert_eq!(base_interval_ms(0.0), DEFAULT_BASE_INTERVAL_MS);
        // Absurdly high rates still yield a positive interval
        assert_eq!(base_interval_ms(10_000.0), 1);
    }

    #[test]
    fn test_format_timecode() {
        assert_eq!(format_timecode(0, 30.0), "00:00");
        assert_eq!(format_timecode(300, 30.0), "00:10");
        assert_eq!(format_timecode(30 * 61, 30.0), "01:01");
        assert_eq!(format_timecode(100, 0.0), "00:00");
    }

    #[test]
    fn test_edit_rgb_round_trip() {
        let mut frame = rgb_frame(4, 2);
        let edited = frame.edit_rgb(|img| {
            img.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        });
        assert!(edited);
        assert_eq!(&frame.data[..3], &[255, 0, 0]);
        assert_eq!(frame.data.len(), 4 * 2 * 3);
    }

    #[test]
    fn test_edit_rgb_rejects_mismatched_buffer() {
        let mut frame = rgb_frame(4, 2);
        frame.data.truncate(5);
        let edited = frame.edit_rgb(|_| panic!("closure must not run"));
        assert!(!edited);
        assert_eq!(frame.data.len(), 5);
    }

    #[test]
    fn test_buffer_len() {
        assert_eq!(PixelFormat::Rgb24.buffer_len(640, 480), 640 * 480 * 3);
        assert_eq!(
            PixelFormat::Yuv420p.buffer_len(640, 480),
            640 * 480 + 320 * 240 * 2
        );
    }
}
