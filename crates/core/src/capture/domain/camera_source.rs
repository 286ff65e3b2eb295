use thiserror::Error;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("cannot open camera {device}: {source}")]
    Open {
        device: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("no video stream on {0}")]
    NoVideoStream(String),
    #[error("capture input format {0} is not available")]
    UnknownFormat(String),
    #[error("camera is not running")]
    NotRunning,
    #[error("no frame captured yet")]
    NoFrame,
    #[error("capture thread ended before metadata was available")]
    Disconnected,
}

/// A live video-only capture stream.
///
/// Shared between the controller and concurrent detection cycles, hence
/// `&self`. There is no stop operation; capture ends when the source is
/// dropped.
pub trait CameraSource: Send + Sync {
    /// Opens the stream and begins capturing. Returns once the stream's
    /// metadata is known.
    fn start(&self) -> Result<VideoMetadata, CameraError>;

    /// The most recently captured frame.
    fn current_frame(&self) -> Result<Frame, CameraError>;

    fn is_running(&self) -> bool;
}
