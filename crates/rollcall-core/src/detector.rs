//! UltraFace face detector via ONNX Runtime.
//!
//! Decodes the slim RFB-320 UltraFace output layout (per-anchor class scores
//! plus normalized corner boxes) with NMS post-processing. The detector trait
//! is the seam for tests: the service never depends on the concrete model.

use crate::types::BoundingBox;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ULTRAFACE_INPUT_WIDTH: usize = 320;
const ULTRAFACE_INPUT_HEIGHT: usize = 240;
const ULTRAFACE_MEAN: f32 = 127.0;
const ULTRAFACE_STD: f32 = 128.0;
const ULTRAFACE_CONFIDENCE_THRESHOLD: f32 = 0.7;
const ULTRAFACE_NMS_THRESHOLD: f32 = 0.3;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — download version-RFB-320.onnx and place in models/")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Enrollment and face-update require exactly one detected face.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FaceCountError {
    #[error("no face detected")]
    NoFace,
    #[error("{0} faces detected, expected exactly one")]
    Multiple(usize),
}

/// Adapter over the external face-detection model: image in, boxes out.
pub trait FaceDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError>;
}

/// Require exactly one detected face, as enrollment does.
pub fn single_face(faces: &[BoundingBox]) -> Result<&BoundingBox, FaceCountError> {
    match faces {
        [] => Err(FaceCountError::NoFace),
        [face] => Ok(face),
        many => Err(FaceCountError::Multiple(many.len())),
    }
}

/// Pin per-face processing order: left-to-right by the box's left edge.
/// Detector output order is an accident of the model and must not leak into
/// recognition results.
pub fn sort_left_to_right(faces: &mut [BoundingBox]) {
    faces.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));
}

/// UltraFace-based face detector.
pub struct UltraFaceDetector {
    session: Session,
    /// Output tensor indices (scores, boxes), discovered by name at load time.
    output_indices: (usize, usize),
}

impl UltraFaceDetector {
    /// Load the UltraFace ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = model_path,
            outputs = ?output_names,
            "loaded UltraFace model"
        );

        if output_names.len() < 2 {
            return Err(DetectorError::InferenceFailed(format!(
                "UltraFace model requires 2 outputs (scores, boxes), got {}",
                output_names.len()
            )));
        }

        // UltraFace exports name the tensors "scores" and "boxes"; fall back
        // to positional ordering when the names are not recognized.
        let scores_idx = output_names.iter().position(|n| n == "scores");
        let boxes_idx = output_names.iter().position(|n| n == "boxes");
        let output_indices = match (scores_idx, boxes_idx) {
            (Some(s), Some(b)) => (s, b),
            _ => {
                tracing::info!(?output_names, "UltraFace: using positional output mapping");
                (0, 1)
            }
        };

        Ok(Self {
            session,
            output_indices,
        })
    }

    /// RGB frame → NCHW float tensor, resized to the model's fixed input size.
    fn preprocess(image: &RgbImage) -> Array4<f32> {
        let resized = image::imageops::resize(
            image,
            ULTRAFACE_INPUT_WIDTH as u32,
            ULTRAFACE_INPUT_HEIGHT as u32,
            image::imageops::FilterType::Triangle,
        );

        let mut tensor =
            Array4::<f32>::zeros((1, 3, ULTRAFACE_INPUT_HEIGHT, ULTRAFACE_INPUT_WIDTH));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] =
                    (pixel[c] as f32 - ULTRAFACE_MEAN) / ULTRAFACE_STD;
            }
        }
        tensor
    }
}

impl FaceDetector for UltraFaceDetector {
    /// Detect faces in an RGB image, returning boxes sorted by confidence.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        let input = Self::preprocess(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (scores_idx, boxes_idx) = self.output_indices;
        let (_, scores) = outputs[scores_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("scores: {e}")))?;
        let (_, boxes) = outputs[boxes_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("boxes: {e}")))?;

        let detections = decode_detections(
            scores,
            boxes,
            image.width(),
            image.height(),
            ULTRAFACE_CONFIDENCE_THRESHOLD,
        );

        let mut result = nms(detections, ULTRAFACE_NMS_THRESHOLD);
        result.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(result)
    }
}

/// Decode UltraFace outputs into pixel-space boxes.
///
/// `scores` holds [background, face] pairs per anchor; `boxes` holds
/// normalized [x1, y1, x2, y2] corners in 0..1 of the original frame.
fn decode_detections(
    scores: &[f32],
    boxes: &[f32],
    image_width: u32,
    image_height: u32,
    threshold: f32,
) -> Vec<BoundingBox> {
    let num_anchors = scores.len() / 2;
    let w = image_width as f32;
    let h = image_height as f32;

    let mut detections = Vec::new();
    for i in 0..num_anchors {
        let confidence = scores[i * 2 + 1];
        if confidence <= threshold {
            continue;
        }
        let off = i * 4;
        if off + 3 >= boxes.len() {
            break;
        }

        let x1 = (boxes[off] * w).clamp(0.0, w);
        let y1 = (boxes[off + 1] * h).clamp(0.0, h);
        let x2 = (boxes[off + 2] * w).clamp(0.0, w);
        let y2 = (boxes[off + 3] * h).clamp(0.0, h);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        detections.push(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence,
        });
    }
    detections
}

/// Non-Maximum Suppression: drop boxes that overlap a higher-confidence one.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i].clone());
        for j in (i + 1)..detections.len() {
            if !suppressed[j] && iou(&detections[i], &detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }
    keep
}

/// Intersection-over-Union between two boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: conf }
    }

    #[test]
    fn single_face_accepts_exactly_one() {
        let faces = vec![make_bbox(0.0, 0.0, 10.0, 10.0, 0.9)];
        assert!(single_face(&faces).is_ok());
    }

    #[test]
    fn single_face_rejects_empty() {
        assert_eq!(single_face(&[]).unwrap_err(), FaceCountError::NoFace);
    }

    #[test]
    fn single_face_rejects_multiple() {
        let faces = vec![
            make_bbox(0.0, 0.0, 10.0, 10.0, 0.9),
            make_bbox(50.0, 0.0, 10.0, 10.0, 0.8),
        ];
        assert_eq!(single_face(&faces).unwrap_err(), FaceCountError::Multiple(2));
    }

    #[test]
    fn sort_left_to_right_pins_order() {
        let mut faces = vec![
            make_bbox(200.0, 0.0, 10.0, 10.0, 0.9),
            make_bbox(10.0, 0.0, 10.0, 10.0, 0.5),
            make_bbox(100.0, 0.0, 10.0, 10.0, 0.7),
        ];
        sort_left_to_right(&mut faces);
        let xs: Vec<f32> = faces.iter().map(|f| f.x).collect();
        assert_eq!(xs, vec![10.0, 100.0, 200.0]);
    }

    #[test]
    fn decode_skips_low_confidence() {
        // Two anchors: one background-dominant, one face at 0.95
        let scores = vec![0.9, 0.1, 0.05, 0.95];
        let boxes = vec![0.0, 0.0, 0.5, 0.5, 0.25, 0.25, 0.75, 0.75];
        let dets = decode_detections(&scores, &boxes, 320, 240, 0.7);
        assert_eq!(dets.len(), 1);
        assert!((dets[0].confidence - 0.95).abs() < 1e-6);
        assert!((dets[0].x - 0.25 * 320.0).abs() < 1e-3);
        assert!((dets[0].width - 0.5 * 320.0).abs() < 1e-3);
    }

    #[test]
    fn decode_drops_degenerate_boxes() {
        let scores = vec![0.0, 0.99];
        // x2 <= x1
        let boxes = vec![0.5, 0.2, 0.5, 0.8];
        let dets = decode_detections(&scores, &boxes, 320, 240, 0.7);
        assert!(dets.is_empty());
    }

    #[test]
    fn decode_clamps_to_frame() {
        let scores = vec![0.0, 0.99];
        let boxes = vec![-0.1, -0.1, 1.2, 1.2];
        let dets = decode_detections(&scores, &boxes, 100, 50, 0.7);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].x, 0.0);
        assert_eq!(dets[0].y, 0.0);
        assert_eq!(dets[0].width, 100.0);
        assert_eq!(dets[0].height, 50.0);
    }

    #[test]
    fn iou_identical_is_one() {
        let a = make_bbox(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_disjoint_is_zero() {
        let a = make_bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_bbox(30.0, 30.0, 10.0, 10.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn nms_suppresses_overlap_keeps_distant() {
        let dets = vec![
            make_bbox(0.0, 0.0, 100.0, 100.0, 0.9),
            make_bbox(5.0, 5.0, 100.0, 100.0, 0.8),
            make_bbox(200.0, 200.0, 50.0, 50.0, 0.75),
        ];
        let kept = nms(dets, 0.3);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert!((kept[1].confidence - 0.75).abs() < 1e-6);
    }

    #[test]
    fn nms_empty_input() {
        assert!(nms(vec![], 0.3).is_empty());
    }

    #[test]
    fn preprocess_shape_and_normalization() {
        let image = RgbImage::from_pixel(640, 480, image::Rgb([127, 127, 127]));
        let tensor = UltraFaceDetector::preprocess(&image);
        assert_eq!(
            tensor.shape(),
            &[1, 3, ULTRAFACE_INPUT_HEIGHT, ULTRAFACE_INPUT_WIDTH]
        );
        let expected = (127.0 - ULTRAFACE_MEAN) / ULTRAFACE_STD;
        let val = tensor[[0, 0, 0, 0]];
        assert!((val - expected).abs() < 1e-6, "got {val}, expected {expected}");
    }
}
