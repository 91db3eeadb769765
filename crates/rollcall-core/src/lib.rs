//! rollcall-core — Face recognition primitives for the attendance service.
//!
//! Defines the detector/embedder adapter traits, ONNX Runtime implementations
//! of both (UltraFace detection, FaceNet-style 512-d embeddings), and the
//! exact linear-scan gallery matcher.

pub mod detector;
pub mod embedder;
pub mod types;

pub use detector::{single_face, sort_left_to_right, FaceCountError, FaceDetector};
pub use embedder::{crop_face, FaceEmbedder};
pub use types::{
    BoundingBox, Embedding, Identity, L2Matcher, MatchResult, Matcher, DEFAULT_DISTANCE_THRESHOLD,
    EMBEDDING_DIM,
};
