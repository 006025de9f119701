//! FFmpeg-backed frame source
//!
//! Wraps a demuxer + decoder + software scaler behind the [`FrameSource`]
//! contract: a stateful read cursor with index-based seeking and RGB24 (or
//! YUV420P) output. Unlike a batch extractor this decoder is pulled one
//! frame at a time so the playback engine can pace output in real time.

use ffmpeg_next as ffmpeg;
use pose_playback_common::{
    Frame, FrameSource, OpenError, PixelFormat, ReadError, DEFAULT_BASE_INTERVAL_MS,
};
use std::path::Path;
use tracing::{debug, warn};

/// Microseconds per second, the unit `avformat` uses for container-level
/// durations and seek targets
const AV_TIME_BASE: f64 = 1_000_000.0;

/// Frame source configuration
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Output pixel format
    pub output_format: PixelFormat,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            output_format: PixelFormat::Rgb24,
        }
    }
}

fn to_ffmpeg_format(format: PixelFormat) -> ffmpeg::format::Pixel {
    match format {
        PixelFormat::Rgb24 => ffmpeg::format::Pixel::RGB24,
        PixelFormat::Yuv420p => ffmpeg::format::Pixel::YUV420P,
    }
}

/// Initialize the FFmpeg library once per process
fn init_ffmpeg() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        ffmpeg::init().expect("Failed to initialize FFmpeg");
    });
}

/// Sequential video decoder with an index-based read cursor
pub struct VideoSource {
    ictx: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    time_base: f64,
    fps: f64,
    frame_count: u64,
    width: u32,
    height: u32,
    output_format: PixelFormat,
    /// Index the next `read_next` will assign when the source cannot derive
    /// one from timestamps
    cursor: u64,
    /// Set after a seek: decoded frames before this index are pre-roll from
    /// the preceding keyframe and are discarded
    pending_seek: Option<u64>,
    eof_sent: bool,
}

// SAFETY: `FrameSource` requires `Send`. Every field is `Send` except the
// scaler: ffmpeg-next's `software::scaling::Context` holds a raw
// `*mut SwsContext`, which strips the auto impl. The scaler is owned
// exclusively by this struct and only touched through `&mut self`, and an
// `SwsContext` carries no thread-local state, so moving it between threads
// is sound.
unsafe impl Send for VideoSource {}

impl VideoSource {
    /// Open a video file for sequential decoding
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not exist, the container cannot be
    /// demuxed, no video stream is present, or no decoder is available for
    /// the stream's codec.
    pub fn open(path: impl AsRef<Path>, config: &SourceConfig) -> Result<Self, OpenError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(OpenError::FileNotFound(path.to_path_buf()));
        }

        init_ffmpeg();

        let ictx = ffmpeg::format::input(&path)
            .map_err(|e| OpenError::FFmpeg(format!("Failed to open input file: {e}")))?;

        let stream = ictx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or(OpenError::NoVideoStream)?;

        let stream_index = stream.index();
        let tb = stream.time_base();
        let time_base = if tb.1 != 0 {
            f64::from(tb.0) / f64::from(tb.1)
        } else {
            0.0
        };
        let rate = stream.avg_frame_rate();
        let fps = match (rate.0, rate.1) {
            (num, den) if num > 0 && den > 0 => f64::from(num) / f64::from(den),
            _ => 0.0,
        };
        let stream_frames = stream.frames();
        let codec_params = stream.parameters();

        let decoder = ffmpeg::codec::context::Context::from_parameters(codec_params)
            .map_err(|e| OpenError::FFmpeg(format!("Failed to create codec context: {e}")))?
            .decoder()
            .video()
            .map_err(|e| OpenError::UnsupportedCodec(e.to_string()))?;

        let width = decoder.width();
        let height = decoder.height();

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            to_ffmpeg_format(config.output_format),
            width,
            height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| OpenError::FFmpeg(format!("Failed to create scaler: {e}")))?;

        let frame_count = if stream_frames > 0 {
            stream_frames as u64
        } else {
            estimate_frame_count(ictx.duration(), fps)
        };

        debug!(
            "Opened {}: {}x{} @ {:.2} fps, {} frames",
            path.display(),
            width,
            height,
            fps,
            frame_count
        );

        Ok(Self {
            ictx,
            decoder,
            scaler,
            stream_index,
            time_base,
            fps,
            frame_count,
            width,
            height,
            output_format: config.output_format,
            cursor: 0,
            pending_seek: None,
            eof_sent: false,
        })
    }

    /// Frame width in pixels
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pull the next packet belonging to the video stream
    fn next_video_packet(&mut self) -> Option<ffmpeg::Packet> {
        let stream_index = self.stream_index;
        for (stream, packet) in self.ictx.packets() {
            if stream.index() == stream_index {
                return Some(packet);
            }
        }
        None
    }

    /// Decode one frame, returning its timestamp in seconds and its pixel
    /// data converted to the configured output format
    fn decode_next(&mut self) -> Result<Option<(f64, Vec<u8>)>, ReadError> {
        let mut decoded = ffmpeg::util::frame::video::Video::empty();
        let mut converted = ffmpeg::util::frame::video::Video::empty();

        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                let timestamp = decoded.timestamp().unwrap_or(0) as f64 * self.time_base;
                self.scaler
                    .run(&decoded, &mut converted)
                    .map_err(|e| ReadError::Convert(format!("Failed to convert frame: {e}")))?;
                let data = copy_frame_data(&converted, self.output_format);
                return Ok(Some((timestamp, data)));
            }

            if self.eof_sent {
                return Ok(None);
            }

            match self.next_video_packet() {
                Some(packet) => {
                    // A corrupted packet is skipped, not fatal
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        debug!("Dropping undecodable packet: {e}");
                    }
                }
                None => {
                    self.decoder.send_eof().ok();
                    self.eof_sent = true;
                }
            }
        }
    }
}

impl FrameSource for VideoSource {
    fn read_next(&mut self) -> Result<Option<Frame>, ReadError> {
        loop {
            let Some((timestamp, data)) = self.decode_next()? else {
                self.pending_seek = None;
                return Ok(None);
            };

            let index = index_for_timestamp(timestamp, self.fps, self.cursor);

            // Discard keyframe pre-roll after a seek
            if let Some(target) = self.pending_seek {
                if index < target {
                    continue;
                }
                self.pending_seek = None;
            }

            self.cursor = index + 1;
            return Ok(Some(Frame {
                index,
                timestamp,
                width: self.width,
                height: self.height,
                format: self.output_format,
                data,
            }));
        }
    }

    fn seek(&mut self, index: u64) -> Result<(), ReadError> {
        // Unknown frame rate makes index->time mapping approximate; assume
        // the default interval rather than refusing to seek
        let effective_fps = if self.fps > 0.0 {
            self.fps
        } else {
            1000.0 / DEFAULT_BASE_INTERVAL_MS as f64
        };
        let seconds = index as f64 / effective_fps;
        let target_ts = (seconds * AV_TIME_BASE) as i64;

        // Land on the keyframe at or before the target, then decode forward
        self.ictx
            .seek(target_ts, ..target_ts)
            .map_err(|e| ReadError::Seek(format!("Seek to frame {index} failed: {e}")))?;
        self.decoder.flush();
        self.eof_sent = false;
        self.cursor = index;
        self.pending_seek = if self.fps > 0.0 { Some(index) } else { None };

        debug!("Seeked to frame {index} ({seconds:.3}s)");
        Ok(())
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn fps(&self) -> f64 {
        self.fps
    }
}

/// Derive a frame index from a presentation timestamp, falling back to the
/// sequential cursor when the frame rate is unknown
fn index_for_timestamp(seconds: f64, fps: f64, fallback: u64) -> u64 {
    if fps > 0.0 && seconds >= 0.0 {
        (seconds * fps).round() as u64
    } else {
        fallback
    }
}

/// Estimate frame count from container duration (microseconds) when the
/// stream does not carry an explicit frame total
fn estimate_frame_count(duration_us: i64, fps: f64) -> u64 {
    if duration_us > 0 && fps > 0.0 {
        ((duration_us as f64 / AV_TIME_BASE) * fps).round() as u64
    } else {
        0
    }
}

/// Copy frame data out of an FFmpeg frame into a contiguous, stride-free
/// buffer. A fresh allocation per frame is deliberate: the engine hands the
/// buffer to the consumer by move, so it must never be reused by the decoder.
fn copy_frame_data(frame: &ffmpeg::util::frame::video::Video, format: PixelFormat) -> Vec<u8> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;

    match format {
        PixelFormat::Rgb24 => {
            // Single plane, 3 bytes per pixel
            let stride = frame.stride(0);
            let plane = frame.data(0);

            let mut data = Vec::with_capacity(width * height * 3);
            for y in 0..height {
                let row_start = y * stride;
                data.extend_from_slice(&plane[row_start..row_start + width * 3]);
            }
            data
        }
        PixelFormat::Yuv420p => {
            // Three planes: full-resolution Y, half-resolution U and V
            let uv_width = width / 2;
            let uv_height = height / 2;
            let mut data =
                Vec::with_capacity(width * height + uv_width * uv_height * 2);

            let y_stride = frame.stride(0);
            let y_plane = frame.data(0);
            for y in 0..height {
                let row_start = y * y_stride;
                data.extend_from_slice(&y_plane[row_start..row_start + width]);
            }

            for plane_index in 1..=2 {
                let stride = frame.stride(plane_index);
                let plane = frame.data(plane_index);
                for y in 0..uv_height {
                    let row_start = y * stride;
                    data.extend_from_slice(&plane[row_start..row_start + uv_width]);
                }
            }

            data
        }
    }
}

/// Open a file and warn when its metadata is incomplete
///
/// Convenience wrapper used by callers that only care about RGB output.
pub fn open_rgb(path: impl AsRef<Path>) -> Result<VideoSource, OpenError> {
    let source = VideoSource::open(path, &SourceConfig::default())?;
    if source.fps() <= 0.0 {
        warn!("Source does not report a frame rate; pacing will use the default interval");
    }
    if source.frame_count() == 0 {
        warn!("Source does not report a frame count; positions will show total=0");
    }
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_conversion() {
        assert_eq!(
            to_ffmpeg_format(PixelFormat::Rgb24),
            ffmpeg::format::Pixel::RGB24
        );
        assert_eq!(
            to_ffmpeg_format(PixelFormat::Yuv420p),
            ffmpeg::format::Pixel::YUV420P
        );
    }

    #[test]
    fn test_source_config_default() {
        let config = SourceConfig::default();
        assert_eq!(config.output_format, PixelFormat::Rgb24);
    }

    #[test]
    fn test_index_for_timestamp() {
        assert_eq!(index_for_timestamp(0.0, 30.0, 99), 0);
        assert_eq!(index_for_timestamp(1.0, 30.0, 99), 30);
        // 29.97 fps drop-frame style rates round to the nearest index
        assert_eq!(index_for_timestamp(10.01, 29.97, 99), 300);
        // Unknown fps falls back to the sequential cursor
        assert_eq!(index_for_timestamp(5.0, 0.0, 42), 42);
    }

    #[test]
    fn test_estimate_frame_count() {
        assert_eq!(estimate_frame_count(10_000_000, 30.0), 300);
        assert_eq!(estimate_frame_count(0, 30.0), 0);
        assert_eq!(estimate_frame_count(-1, 30.0), 0);
        assert_eq!(estimate_frame_count(10_000_000, 0.0), 0);
    }

    #[test]
    fn test_open_missing_file() {
        let err = VideoSource::open("/nonexistent/video.mp4", &SourceConfig::default())
            .err()
            .expect("open must fail");
        assert!(matches!(err, OpenError::FileNotFound(_)));
    }
}
