//! YOLOv8-Pose inference backed by ONNX Runtime
//!
//! The model takes a (1, 3, S, S) normalized RGB tensor and emits a
//! (1, 56, N) tensor: 4 box coordinates (center xywh) + 1 objectness score +
//! 51 keypoint values (17 keypoints, each x/y/visibility) per anchor. Anchors
//! above the confidence threshold are deduplicated with non-maximum
//! suppression before the surviving keypoints are returned.

use std::path::Path;
use std::sync::Mutex;

use image::RgbImage;
use ndarray::Array;
use ort::{
    session::{Session, SessionOutputs},
    value::TensorRef,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use pose_playback_common::Frame;

use crate::{Keypoint, KeypointName, ModelError, PoseModel, PoseModelConfig, KEYPOINTS_PER_PERSON};

/// Features per anchor: 4 box coords + objectness + 17 * (x, y, visibility)
const OUTPUT_FEATURES: usize = 4 + 1 + KEYPOINTS_PER_PERSON * 3;

/// YOLOv8-Pose model size variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum YoloPoseSize {
    /// Nano - 13MB model, fastest inference (FP32)
    Nano,
    /// Nano INT8 - 3.6MB quantized model
    NanoInt8,
    /// Small - 22MB model, balanced speed/accuracy
    Small,
    /// Medium - 52MB model, good accuracy
    Medium,
    /// Large - 87MB model, high accuracy
    Large,
    /// XLarge - 136MB model, highest accuracy
    XLarge,
}

impl YoloPoseSize {
    pub const ALL: [YoloPoseSize; 6] = [
        YoloPoseSize::Nano,
        YoloPoseSize::NanoInt8,
        YoloPoseSize::Small,
        YoloPoseSize::Medium,
        YoloPoseSize::Large,
        YoloPoseSize::XLarge,
    ];

    /// Get the conventional model filename for this size
    #[must_use]
    pub fn filename(&self) -> &'static str {
        match self {
            YoloPoseSize::Nano => "yolov8n-pose.onnx",
            YoloPoseSize::NanoInt8 => "yolov8n-pose-int8.onnx",
            YoloPoseSize::Small => "yolov8s-pose.onnx",
            YoloPoseSize::Medium => "yolov8m-pose.onnx",
            YoloPoseSize::Large => "yolov8l-pose.onnx",
            YoloPoseSize::XLarge => "yolov8x-pose.onnx",
        }
    }

    /// Registry key for this size ("yolov8n-pose", ...)
    #[must_use]
    pub fn registry_name(&self) -> &'static str {
        match self {
            YoloPoseSize::Nano => "yolov8n-pose",
            YoloPoseSize::NanoInt8 => "yolov8n-pose-int8",
            YoloPoseSize::Small => "yolov8s-pose",
            YoloPoseSize::Medium => "yolov8m-pose",
            YoloPoseSize::Large => "yolov8l-pose",
            YoloPoseSize::XLarge => "yolov8x-pose",
        }
    }
}

/// Bounding box with normalized coordinates (0-1)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    /// X coordinate of top-left corner (normalized 0-1)
    pub x: f32,
    /// Y coordinate of top-left corner (normalized 0-1)
    pub y: f32,
    /// Width of box (normalized 0-1)
    pub width: f32,
    /// Height of box (normalized 0-1)
    pub height: f32,
}

impl BoundingBox {
    #[must_use]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Get center coordinates
    #[must_use]
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Get area of bounding box
    #[must_use]
    #[inline]
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Calculate Intersection over Union (IoU) with another box
    #[must_use]
    #[inline]
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let intersection_width = (x2 - x1).max(0.0);
        let intersection_height = (y2 - y1).max(0.0);
        let intersection_area = intersection_width * intersection_height;

        let union_area = self.area() + other.area() - intersection_area;

        if union_area > 0.0 {
            intersection_area / union_area
        } else {
            0.0
        }
    }
}

/// One detected person with bounding box and full keypoint set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseDetection {
    /// Person bounding box
    pub bbox: BoundingBox,
    /// Detection confidence score (0-1)
    pub confidence: f32,
    /// Exactly 17 COCO keypoints, low-visibility ones included with their
    /// confidence so per-person blocks stay fixed length
    pub keypoints: Vec<Keypoint>,
}

/// Pose model running a YOLOv8-Pose ONNX export.
///
/// `Session::run` needs `&mut Session`, so the session sits behind a mutex;
/// only the engine thread runs inference in practice, the lock just makes the
/// sharing sound.
pub struct YoloPoseModel {
    name: String,
    session: Mutex<Session>,
    config: PoseModelConfig,
}

impl YoloPoseModel {
    /// Load an ONNX model from disk
    pub fn load<P: AsRef<Path>>(
        name: impl Into<String>,
        model_path: P,
        config: PoseModelConfig,
    ) -> Result<Self, ModelError> {
        let name = name.into();
        info!("Loading YOLOv8-Pose model {name:?} from {:?}", model_path.as_ref());

        let session = Session::builder()
            .map_err(|e| ModelError::ModelLoad(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| ModelError::ModelLoad(e.to_string()))?;

        info!("YOLOv8-Pose model {name:?} loaded");

        Ok(Self {
            name,
            session: Mutex::new(session),
            config,
        })
    }

    /// Load a model by size variant from a directory of ONNX files
    pub fn load_size<P: AsRef<Path>>(
        size: YoloPoseSize,
        model_dir: P,
        config: PoseModelConfig,
    ) -> Result<Self, ModelError> {
        let path = model_dir.as_ref().join(size.filename());
        Self::load(size.registry_name(), path, config)
    }

    /// Detect people in an RGB image
    pub fn detect(&self, image: &RgbImage) -> Result<Vec<PoseDetection>, ModelError> {
        debug!(
            "Running pose estimation on {}x{} image",
            image.width(),
            image.height()
        );

        let input = preprocess_image(image, self.config.input_size);

        let mut session = self
            .session
            .lock()
            .map_err(|e| ModelError::Inference(format!("Session lock poisoned: {e}")))?;

        let input_tensor = TensorRef::from_array_view(input.view())
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        let detections = postprocess_outputs(outputs, &self.config)?;

        debug!("Detected {} people", detections.len());

        Ok(detections)
    }
}

impl PoseModel for YoloPoseModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> &PoseModelConfig {
        &self.config
    }

    fn process_frame(&self, frame: &Frame) -> Result<Vec<Keypoint>, ModelError> {
        let image = frame.to_rgb_image().ok_or_else(|| {
            ModelError::ImageProcessing(format!(
                "frame {} is not an RGB frame",
                frame.index
            ))
        })?;

        let detections = self.detect(&image)?;

        let mut keypoints = Vec::with_capacity(detections.len() * KEYPOINTS_PER_PERSON);
        for detection in detections {
            keypoints.extend(detection.keypoints);
        }
        Ok(keypoints)
    }
}

/// Resize to the model input size and convert to a normalized CHW tensor
fn preprocess_image(image: &RgbImage, input_size: u32) -> Array<f32, ndarray::Dim<[usize; 4]>> {
    let resized = image::imageops::resize(
        image,
        input_size,
        input_size,
        image::imageops::FilterType::Triangle,
    );

    let mut input = Array::zeros((1, 3, input_size as usize, input_size as usize));
    for y in 0..input_size as usize {
        for x in 0..input_size as usize {
            let pixel = resized.get_pixel(x as u32, y as u32);
            input[[0, 0, y, x]] = f32::from(pixel[0]) / 255.0;
            input[[0, 1, y, x]] = f32::from(pixel[1]) / 255.0;
            input[[0, 2, y, x]] = f32::from(pixel[2]) / 255.0;
        }
    }
    input
}

fn postprocess_outputs(
    outputs: SessionOutputs,
    config: &PoseModelConfig,
) -> Result<Vec<PoseDetection>, ModelError> {
    let output = &outputs[0];

    let (shape, data) = output
        .try_extract_tensor::<f32>()
        .map_err(|e| ModelError::Inference(format!("Failed to extract tensor: {e}")))?;

    debug!("ONNX output shape: {:?}", shape);

    let dims = shape.as_ref();
    if dims.len() != 3 {
        return Err(ModelError::Inference(format!(
            "Expected 3D output tensor, got {}D",
            dims.len()
        )));
    }

    let num_features = dims[1] as usize;
    let num_anchors = dims[2] as usize;

    if num_features != OUTPUT_FEATURES {
        return Err(ModelError::Inference(format!(
            "Expected {OUTPUT_FEATURES} features, got {num_features}"
        )));
    }

    Ok(parse_detections(data, num_anchors, config))
}

/// Decode raw anchor data laid out as [1, 56, anchors] into detections.
///
/// Keypoints are kept regardless of visibility; the drawing layer applies
/// `keypoint_threshold` so each person always spans 17 entries.
fn parse_detections(data: &[f32], num_anchors: usize, config: &PoseModelConfig) -> Vec<PoseDetection> {
    let input_size = config.input_size as f32;

    let mut raw = Vec::with_capacity(num_anchors / 10);

    for anchor_idx in 0..num_anchors {
        let get_feature = |feature_idx: usize| data[feature_idx * num_anchors + anchor_idx];

        let confidence = get_feature(4);
        if confidence < config.confidence_threshold {
            continue;
        }

        // Box comes in center format; convert to corner format and normalize.
        // Clamp handles values slightly outside range from the model.
        let x_center = get_feature(0);
        let y_center = get_feature(1);
        let width = get_feature(2);
        let height = get_feature(3);

        let bbox = BoundingBox::new(
            ((x_center - width / 2.0) / input_size).clamp(0.0, 1.0),
            ((y_center - height / 2.0) / input_size).clamp(0.0, 1.0),
            (width / input_size).clamp(0.0, 1.0),
            (height / input_size).clamp(0.0, 1.0),
        );

        let mut keypoints = Vec::with_capacity(KEYPOINTS_PER_PERSON);
        for kp_idx in 0..KEYPOINTS_PER_PERSON {
            let base_feature = 5 + kp_idx * 3;
            let kp_x = get_feature(base_feature);
            let kp_y = get_feature(base_feature + 1);
            let kp_conf = get_feature(base_feature + 2);

            // from_index never fails for 0..17
            if let Some(name) = KeypointName::from_index(kp_idx) {
                keypoints.push(Keypoint::new(
                    name,
                    (kp_x / input_size).clamp(0.0, 1.0),
                    (kp_y / input_size).clamp(0.0, 1.0),
                    kp_conf,
                ));
            }
        }

        raw.push(PoseDetection {
            bbox,
            confidence,
            keypoints,
        });
    }

    debug!("Raw pose detections before NMS: {}", raw.len());

    let detections = non_max_suppression(raw, config.iou_threshold);

    detections
        .into_iter()
        .take(config.max_detections)
        .collect()
}

/// Non-maximum suppression: keep the highest-confidence detection in each
/// cluster of overlapping boxes
fn non_max_suppression(mut detections: Vec<PoseDetection>, iou_threshold: f32) -> Vec<PoseDetection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<PoseDetection> = Vec::with_capacity(detections.len());
    for detection in detections {
        if keep
            .iter()
            .all(|kept| kept.bbox.iou(&detection.bbox) < iou_threshold)
        {
            keep.push(detection);
        }
    }

    debug!("Pose detections after NMS: {}", keep.len());
    keep
}
