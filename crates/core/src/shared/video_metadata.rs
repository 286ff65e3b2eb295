/// Properties of an opened capture stream, known once its metadata loads.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
    pub device: String,
}

impl VideoMetadata {
    /// Native resolution as `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions() {
        let meta = VideoMetadata {
            width: 640,
            height: 480,
            fps: 30.0,
            codec: "rawvideo".to_string(),
            device: "/dev/video0".to_string(),
        };
        assert_eq!(meta.dimensions(), (640, 480));
        assert_eq!(meta.clone(), meta);
    }
}
