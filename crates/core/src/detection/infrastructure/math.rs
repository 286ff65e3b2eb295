//! Box geometry shared by the face detector and the landmark crop.

/// Axis-aligned box in pixel coordinates with a confidence score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub score: f64,
}

impl FaceBox {
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Square box sharing this box's centre, with side `max(w, h) * scale`.
    ///
    /// Returned as `(left, top, side)`; not clamped to the frame.
    pub fn square_crop(&self, scale: f64) -> (f64, f64, f64) {
        let cx = (self.x1 + self.x2) / 2.0;
        let cy = (self.y1 + self.y2) / 2.0;
        let side = self.width().max(self.height()) * scale;
        (cx - side / 2.0, cy - side / 2.0, side)
    }
}

/// IoU between two boxes.
pub fn bbox_iou(a: &FaceBox, b: &FaceBox) -> f64 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    inter / (a.area() + b.area() - inter)
}

/// Greedy NMS. Returns kept boxes in descending score order.
pub fn nms(dets: &mut [FaceBox], iou_thresh: f64) -> Vec<FaceBox> {
    dets.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<FaceBox> = Vec::new();
    for det in dets.iter() {
        if keep.iter().all(|k| bbox_iou(k, det) <= iou_thresh) {
            keep.push(*det);
        }
    }
    keep
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
