use rollcall_core::detector::DetectorError;
use rollcall_core::embedder::EmbedderError;
use rollcall_core::FaceCountError;
use rollcall_store::{CredentialError, StoreError};
use thiserror::Error;

/// Failure taxonomy for attendance operations.
///
/// Validation failures (face count, unknown identity, wrong credential) are
/// detected before any mutation and carry no side effects; persistence
/// failures abort the in-flight write. Nothing is retried.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("{0} faces detected; provide an image with a single face")]
    MultipleFacesDetected(usize),
    #[error("identity '{0}' not found")]
    IdentityNotFound(String),
    #[error("identity '{0}' already enrolled; use update-face to replace its facial data")]
    IdentityConflict(String),
    #[error("invalid admin credential")]
    InvalidCredential,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("could not read image {path}: {source}")]
    ImageLoad {
        path: String,
        source: image::ImageError,
    },
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("embedder: {0}")]
    Embedder(#[from] EmbedderError),
    #[error("persistence: {0}")]
    Persistence(#[from] StoreError),
    #[error("credential store: {0}")]
    Credential(#[from] CredentialError),
    #[error("service worker exited")]
    WorkerGone,
}

impl From<FaceCountError> for ServiceError {
    fn from(err: FaceCountError) -> Self {
        match err {
            FaceCountError::NoFace => ServiceError::NoFaceDetected,
            FaceCountError::Multiple(n) => ServiceError::MultipleFacesDetected(n),
        }
    }
}
