use thiserror::Error;

use crate::detection::domain::face_landmarks::LandmarkSet;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("landmark models are still loading")]
    ModelsLoading,
    #[error("landmark models failed to load: {0}")]
    ModelsUnavailable(String),
    #[error("inference failed: {0}")]
    Inference(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Domain interface for single-face landmark detection.
///
/// `Ok(None)` means no face was found; that is a valid outcome, not an error.
/// Implementations are shared between concurrent detection cycles, hence
/// `&self` and `Sync`.
pub trait LandmarkDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Option<LandmarkSet>, DetectError>;
}
