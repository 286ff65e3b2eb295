use std::path::PathBuf;

use image::{Rgba, RgbaImage};

use crate::shared::frame::Frame;

/// Writes the overlay alpha-composited over its source frame to an image
/// file using the `image` crate. The file is overwritten on every draw.
pub struct OverlayFileWriter {
    path: PathBuf,
}

impl OverlayFileWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn write(
        &self,
        overlay: &RgbaImage,
        frame: &Frame,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        composite(overlay, frame)?.save(&self.path)?;
        log::debug!("Overlay snapshot written to {}", self.path.display());
        Ok(())
    }
}

/// Frame as opaque RGBA with the overlay blended on top. The overlay is
/// resized to the frame if their dimensions differ.
fn composite(
    overlay: &RgbaImage,
    frame: &Frame,
) -> Result<RgbaImage, Box<dyn std::error::Error + Send + Sync>> {
    let base = image::RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
        .ok_or("Failed to create image from frame data")?;
    let mut out = image::DynamicImage::ImageRgb8(base).into_rgba8();

    let resized;
    let overlay = if overlay.dimensions() == out.dimensions() {
        overlay
    } else {
        resized = image::imageops::resize(
            overlay,
            out.width(),
            out.height(),
            image::imageops::FilterType::Nearest,
        );
        &resized
    };

    for (dst, src) in out.pixels_mut().zip(overlay.pixels()) {
        *dst = blend(*dst, *src);
    }
    Ok(out)
}

fn blend(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let a = src.0[3] as u32;
    let mix = |d: u8, s: u8| ((s as u32 * a + d as u32 * (255 - a)) / 255) as u8;
    Rgba([
        mix(dst.0[0], src.0[0]),
        mix(dst.0[1], src.0[1]),
        mix(dst.0[2], src.0[2]),
        255,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(width: u32, height: u32, v: u8) -> Frame {
        Frame::new(vec![v; (width * height * 3) as usize], width, height, 3, 0)
    }

    #[test]
    fn test_write_creates_file_with_frame_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap").join("overlay.png");
        let writer = OverlayFileWriter::new(&path);
        writer
            .write(&RgbaImage::new(50, 40), &gray_frame(50, 40, 10))
            .unwrap();

        let img = image::open(&path).unwrap();
        assert_eq!(img.width(), 50);
        assert_eq!(img.height(), 40);
    }

    #[test]
    fn test_composite_blends_opaque_overlay_pixels() {
        let mut overlay = RgbaImage::new(4, 4);
        overlay.put_pixel(1, 2, Rgba([255, 0, 0, 255]));
        let out = composite(&overlay, &gray_frame(4, 4, 100)).unwrap();

        assert_eq!(out.get_pixel(1, 2).0, [255, 0, 0, 255]);
        assert_eq!(out.get_pixel(0, 0).0, [100, 100, 100, 255]);
    }

    #[test]
    fn test_composite_resizes_mismatched_overlay() {
        let overlay = RgbaImage::new(2, 2);
        let out = composite(&overlay, &gray_frame(8, 6, 0)).unwrap();
        assert_eq!(out.dimensions(), (8, 6));
    }

    #[test]
    fn test_write_to_directory_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OverlayFileWriter::new(dir.path());
        assert!(writer
            .write(&RgbaImage::new(2, 2), &gray_frame(2, 2, 0))
            .is_err());
    }
}
