use std::path::Path;

use crate::detection::domain::face_landmarks::LandmarkSet;
use crate::detection::domain::landmark_detector::{DetectError, LandmarkDetector};
use crate::detection::infrastructure::onnx_blazeface_detector::OnnxBlazefaceDetector;
use crate::detection::infrastructure::onnx_landmark_regressor::OnnxLandmarkRegressor;
use crate::shared::frame::Frame;

/// Two-stage landmark detection: BlazeFace box, then 68-point regression on
/// the best face only.
pub struct OnnxLandmarkDetector {
    face_detector: OnnxBlazefaceDetector,
    regressor: OnnxLandmarkRegressor,
}

impl OnnxLandmarkDetector {
    pub fn new(
        face_model: &Path,
        landmark_model: &Path,
        confidence: f64,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self {
            face_detector: OnnxBlazefaceDetector::new(face_model, confidence)?,
            regressor: OnnxLandmarkRegressor::new(landmark_model)?,
        })
    }
}

impl LandmarkDetector for OnnxLandmarkDetector {
    fn detect(&self, frame: &Frame) -> Result<Option<LandmarkSet>, DetectError> {
        let Some(face) = self
            .face_detector
            .detect_best(frame)
            .map_err(DetectError::Inference)?
        else {
            return Ok(None);
        };

        log::debug!(
            "Face at ({:.0}, {:.0})-({:.0}, {:.0}) score {:.2}",
            face.x1,
            face.y1,
            face.x2,
            face.y2,
            face.score
        );

        self.regressor
            .regress(frame, &face)
            .map(Some)
            .map_err(DetectError::Inference)
    }
}
