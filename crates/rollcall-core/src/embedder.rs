//! FaceNet-style face embedder via ONNX Runtime.
//!
//! Produces 512-dimensional embeddings from face crops. The output is used
//! raw — no L2 normalization — because gallery matching runs on raw
//! Euclidean distance against a fixed threshold.

use crate::types::{BoundingBox, Embedding, EMBEDDING_DIM};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const FACENET_INPUT_SIZE: usize = 160;
const FACENET_MEAN: f32 = 127.5;
const FACENET_STD: f32 = 128.0;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0} — download facenet512.onnx and place in models/")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Adapter over the external embedding model: face crop in, vector out.
pub trait FaceEmbedder {
    fn embed(&mut self, face: &RgbImage) -> Result<Embedding, EmbedderError>;
}

/// Crop a detected face out of the source image, clamped to the frame.
pub fn crop_face(image: &RgbImage, face: &BoundingBox) -> RgbImage {
    let x = face.x.max(0.0) as u32;
    let y = face.y.max(0.0) as u32;
    let w = (face.width.max(1.0) as u32).min(image.width().saturating_sub(x).max(1));
    let h = (face.height.max(1.0) as u32).min(image.height().saturating_sub(y).max(1));
    image::imageops::crop_imm(image, x, y, w, h).to_image()
}

/// FaceNet-based embedder.
pub struct FaceNetEmbedder {
    session: Session,
}

impl FaceNetEmbedder {
    /// Load the FaceNet ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, EmbedderError> {
        if !Path::new(model_path).exists() {
            return Err(EmbedderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded FaceNet model"
        );

        Ok(Self { session })
    }

    /// Face crop → NCHW float tensor at the model's fixed input size.
    fn preprocess(face: &RgbImage) -> Array4<f32> {
        let size = FACENET_INPUT_SIZE;
        let resized = image::imageops::resize(
            face,
            size as u32,
            size as u32,
            image::imageops::FilterType::Triangle,
        );

        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] =
                    (pixel[c] as f32 - FACENET_MEAN) / FACENET_STD;
            }
        }
        tensor
    }
}

impl FaceEmbedder for FaceNetEmbedder {
    fn embed(&mut self, face: &RgbImage) -> Result<Embedding, EmbedderError> {
        let input = Self::preprocess(face);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != EMBEDDING_DIM {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding { values: raw.to_vec() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preprocess_output_shape() {
        let face = RgbImage::from_pixel(90, 120, image::Rgb([128, 128, 128]));
        let tensor = FaceNetEmbedder::preprocess(&face);
        assert_eq!(tensor.shape(), &[1, 3, FACENET_INPUT_SIZE, FACENET_INPUT_SIZE]);
    }

    #[test]
    fn preprocess_normalization() {
        let face = RgbImage::from_pixel(160, 160, image::Rgb([128, 128, 128]));
        let tensor = FaceNetEmbedder::preprocess(&face);
        let expected = (128.0 - FACENET_MEAN) / FACENET_STD;
        let val = tensor[[0, 1, 10, 10]];
        assert!((val - expected).abs() < 1e-6, "got {val}, expected {expected}");
    }

    #[test]
    fn crop_face_within_bounds() {
        let image = RgbImage::new(200, 100);
        let face = BoundingBox { x: 20.0, y: 10.0, width: 50.0, height: 60.0, confidence: 0.9 };
        let crop = crop_face(&image, &face);
        assert_eq!((crop.width(), crop.height()), (50, 60));
    }

    #[test]
    fn crop_face_clamps_to_frame() {
        let image = RgbImage::new(100, 100);
        let face = BoundingBox { x: 80.0, y: 90.0, width: 50.0, height: 50.0, confidence: 0.9 };
        let crop = crop_face(&image, &face);
        assert_eq!((crop.width(), crop.height()), (20, 10));
    }

    #[test]
    fn crop_face_negative_origin() {
        let image = RgbImage::new(100, 100);
        let face = BoundingBox { x: -10.0, y: -5.0, width: 30.0, height: 30.0, confidence: 0.9 };
        let crop = crop_face(&image, &face);
        assert_eq!((crop.width(), crop.height()), (30, 30));
    }
}
