use image::{Rgba, RgbaImage};

use crate::detection::domain::face_landmarks::LandmarkSet;
use crate::overlay::domain::overlay_renderer::OverlayRenderer;
use crate::overlay::infrastructure::overlay_file_writer::OverlayFileWriter;
use crate::shared::constants::{LANDMARK_DOT_COLOR, LANDMARK_DOT_RADIUS};
use crate::shared::frame::Frame;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// In-memory RGBA overlay. Optionally writes a composited snapshot after
/// every draw.
pub struct RasterOverlayRenderer {
    surface: RgbaImage,
    radius: u32,
    color: Rgba<u8>,
    writer: Option<OverlayFileWriter>,
}

impl RasterOverlayRenderer {
    pub fn new() -> Self {
        Self {
            surface: RgbaImage::new(0, 0),
            radius: LANDMARK_DOT_RADIUS,
            color: Rgba(LANDMARK_DOT_COLOR),
            writer: None,
        }
    }

    pub fn with_writer(mut self, writer: OverlayFileWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    fn clear(&mut self) {
        for pixel in self.surface.pixels_mut() {
            *pixel = TRANSPARENT;
        }
    }

    /// Filled disc centred on `(cx, cy)`; pixels off the surface are skipped.
    fn fill_disc(&mut self, cx: f64, cy: f64) {
        let r = self.radius as f64;
        let (w, h) = self.surface.dimensions();
        let x0 = (cx - r).floor().max(0.0) as i64;
        let y0 = (cy - r).floor().max(0.0) as i64;
        let x1 = ((cx + r).ceil() as i64).min(w as i64 - 1);
        let y1 = ((cy + r).ceil() as i64).min(h as i64 - 1);

        for y in y0..=y1 {
            for x in x0..=x1 {
                let dx = x as f64 + 0.5 - cx;
                let dy = y as f64 + 0.5 - cy;
                if dx * dx + dy * dy <= r * r {
                    self.surface.put_pixel(x as u32, y as u32, self.color);
                }
            }
        }
    }
}

impl Default for RasterOverlayRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayRenderer for RasterOverlayRenderer {
    fn resize(&mut self, width: u32, height: u32) {
        self.surface = RgbaImage::from_pixel(width, height, TRANSPARENT);
    }

    fn draw(
        &mut self,
        landmarks: &LandmarkSet,
        frame: &Frame,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.clear();
        for p in landmarks.iter() {
            self.fill_disc(p.x, p.y);
        }
        if let Some(writer) = &self.writer {
            writer.write(&self.surface, frame)?;
        }
        Ok(())
    }
}
