use thiserror::Error;

use crate::capture::domain::camera_source::CameraError;
use crate::detection::domain::landmark_detector::DetectError;
use crate::pipeline::session_state::PipelineState;
use crate::transport::domain::wireless_transport::{ConnectionError, SendError};

/// Failure of a dispatched action. None are fatal; the session state is
/// left as it was before the failing step.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("connect failed: {0}")]
    Connection(#[from] ConnectionError),
    #[error("camera failed: {0}")]
    Camera(#[from] CameraError),
    #[error("detection failed: {0}")]
    Detect(#[from] DetectError),
    #[error("overlay draw failed: {0}")]
    Draw(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("send failed: {0}")]
    Send(#[from] SendError),
    #[error("detection is disabled while {0}")]
    DetectionDisabled(PipelineState),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_failing_step() {
        let err = PipelineError::from(SendError::NotConnected);
        assert_eq!(err.to_string(), "send failed: not connected to a device");

        let err = PipelineError::DetectionDisabled(PipelineState::Idle);
        assert_eq!(err.to_string(), "detection is disabled while idle");
    }
}
