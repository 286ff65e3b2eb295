use crate::detection::domain::face_landmarks::LandmarkSet;
use crate::shared::frame::Frame;

/// Transparent drawing surface laid over the video.
pub trait OverlayRenderer: Send {
    /// Match the surface to the video's displayed dimensions. Clears it.
    fn resize(&mut self, width: u32, height: u32);

    /// Clear, then plot every landmark. Each call fully replaces what the
    /// previous call drew. `frame` is the frame the landmarks came from.
    fn draw(
        &mut self,
        landmarks: &LandmarkSet,
        frame: &Frame,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
