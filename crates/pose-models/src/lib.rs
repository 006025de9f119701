//! Pose estimation models applied per frame by the playback engine
//!
//! Models implement the [`PoseModel`] capability: given a frame, produce
//! keypoints; given keypoints, draw annotations onto the frame in place. The
//! built-in implementation runs YOLOv8-Pose models exported to ONNX (17 COCO
//! keypoints per detected person) via ONNX Runtime.
//!
//! A model that detects nothing returns an empty keypoint list, never an
//! error, so downstream drawing code needs no special-case handling. Each
//! detected person contributes exactly [`KEYPOINTS_PER_PERSON`] keypoints;
//! low-visibility keypoints are kept with their confidence score and filtered
//! at draw time.

pub mod drawing;
pub mod registry;
pub mod yolo;

use pose_playback_common::Frame;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use registry::{ConfigProfile, ModelRegistry, RegistryError};
pub use yolo::{BoundingBox, PoseDetection, YoloPoseModel, YoloPoseSize};

/// Keypoints per detected person (COCO-17 layout)
pub const KEYPOINTS_PER_PERSON: usize = 17;

/// Error types for model loading and inference
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),
}

/// COCO keypoint names (17 keypoints)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeypointName {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl KeypointName {
    /// Get keypoint name from index (0-16)
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(KeypointName::Nose),
            1 => Some(KeypointName::LeftEye),
            2 => Some(KeypointName::RightEye),
            3 => Some(KeypointName::LeftEar),
            4 => Some(KeypointName::RightEar),
            5 => Some(KeypointName::LeftShoulder),
            6 => Some(KeypointName::RightShoulder),
            7 => Some(KeypointName::LeftElbow),
            8 => Some(KeypointName::RightElbow),
            9 => Some(KeypointName::LeftWrist),
            10 => Some(KeypointName::RightWrist),
            11 => Some(KeypointName::LeftHip),
            12 => Some(KeypointName::RightHip),
            13 => Some(KeypointName::LeftKnee),
            14 => Some(KeypointName::RightKnee),
            15 => Some(KeypointName::LeftAnkle),
            16 => Some(KeypointName::RightAnkle),
            _ => None,
        }
    }
}

/// Single keypoint with normalized coordinates and a visibility confidence
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Keypoint {
    /// Keypoint name
    pub name: KeypointName,
    /// X coordinate (normalized 0-1)
    pub x: f32,
    /// Y coordinate (normalized 0-1)
    pub y: f32,
    /// Visibility confidence (0-1)
    pub confidence: f32,
}

impl Keypoint {
    /// Create a new keypoint
    #[must_use]
    pub fn new(name: KeypointName, x: f32, y: f32, confidence: f32) -> Self {
        Self {
            name,
            x,
            y,
            confidence,
        }
    }
}

/// Configuration for a pose model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseModelConfig {
    /// Minimum confidence threshold for person detection (0.0-1.0)
    pub confidence_threshold: f32,
    /// Minimum confidence threshold for keypoint visibility (0.0-1.0),
    /// applied when drawing
    pub keypoint_threshold: f32,
    /// IoU threshold for non-maximum suppression (0.0-1.0)
    pub iou_threshold: f32,
    /// Maximum number of detections to keep per frame
    pub max_detections: usize,
    /// Square model input size (YOLOv8-Pose default is 640)
    pub input_size: u32,
}

impl Default for PoseModelConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            keypoint_threshold: 0.5,
            iou_threshold: 0.45,
            max_detections: 100,
            input_size: 640,
        }
    }
}

impl PoseModelConfig {
    /// Fast profile: higher thresholds, fewer detections
    #[must_use]
    pub fn fast() -> Self {
        Self {
            confidence_threshold: 0.5,
            keypoint_threshold: 0.6,
            iou_threshold: 0.5,
            max_detections: 50,
            input_size: 640,
        }
    }

    /// Accurate profile: lower thresholds, more detections
    #[must_use]
    pub fn accurate() -> Self {
        Self {
            confidence_threshold: 0.15,
            keypoint_threshold: 0.3,
            iou_threshold: 0.4,
            max_detections: 200,
            input_size: 640,
        }
    }
}

/// Per-frame processing capability the playback engine applies each tick.
///
/// Implementations must be shareable across threads: the registry hands out
/// `Arc` handles and the engine thread calls `process_frame` while the
/// commanding thread holds its own references.
pub trait PoseModel: Send + Sync {
    /// Unique model identifier (registry key)
    fn name(&self) -> &str;

    /// Get model configuration
    fn config(&self) -> &PoseModelConfig;

    /// Run inference on one frame.
    ///
    /// Returns an empty list when nothing is detected; `Err` is reserved for
    /// genuine inference failures, which the engine degrades to
    /// "no annotation this tick".
    fn process_frame(&self, frame: &Frame) -> Result<Vec<Keypoint>, ModelError>;

    /// Draw keypoints and skeleton onto the frame in place
    fn draw_annotations(&self, frame: &mut Frame, keypoints: &[Keypoint]) {
        drawing::draw_skeleton(frame, keypoints, self.config().keypoint_threshold);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypoint_name_from_index() {
        assert_eq!(KeypointName::from_index(0), Some(KeypointName::Nose));
        assert_eq!(
            KeypointName::from_index(5),
            Some(KeypointName::LeftShoulder)
        );
        assert_eq!(KeypointName::from_index(16), Some(KeypointName::RightAnkle));
        assert_eq!(KeypointName::from_index(17), None);
    }

    #[test]
    fn test_config_defaults() {
        let config = PoseModelConfig::default();
        assert_eq!(config.confidence_threshold, 0.25);
        assert_eq!(config.keypoint_threshold, 0.5);
        assert_eq!(config.input_size, 640);
    }

    #[test]
    fn test_config_partial_yaml() {
        let config: PoseModelConfig =
            serde_yaml::from_str("confidence_threshold: 0.6").expect("valid yaml");
        assert_eq!(config.confidence_threshold, 0.6);
        // Unspecified fields fall back to defaults
        assert_eq!(config.input_size, 640);
        assert_eq!(config.max_detections, 100);
    }
}
