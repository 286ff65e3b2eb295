/// 68-point landmark regressor (PFLD-style) using ONNX Runtime.
///
/// Takes a square face crop and outputs 136 values: `(x, y)` pairs
/// normalized to the crop, in iBUG 300-W order.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::domain::face_landmarks::{LandmarkPoint, LandmarkSet};
use crate::detection::infrastructure::execution_provider::{load_session, square_input_size};
use crate::detection::infrastructure::math::FaceBox;
use crate::shared::constants::LANDMARK_COUNT;
use crate::shared::frame::Frame;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const DEFAULT_INPUT_SIZE: u32 = 112;

/// Crop side relative to the detector box's longer side. Detector boxes are
/// tight around the face; the regressor expects some forehead and chin.
const CROP_SCALE: f64 = 1.25;

pub struct OnnxLandmarkRegressor {
    session: Mutex<ort::session::Session>,
    input_size: u32,
}

impl OnnxLandmarkRegressor {
    /// Load the regressor. The input size is read from the model when static.
    pub fn new(model_path: &Path) -> Result<Self, BoxError> {
        let session = load_session(model_path)?;
        let input_size = square_input_size(&session).unwrap_or(DEFAULT_INPUT_SIZE);
        Ok(Self {
            session: Mutex::new(session),
            input_size,
        })
    }

    /// Regress landmarks for the face in `face`, in frame pixel coordinates.
    pub fn regress(&self, frame: &Frame, face: &FaceBox) -> Result<LandmarkSet, BoxError> {
        let crop = face.square_crop(CROP_SCALE);
        let input_value = ort::value::Tensor::from_array(crop_tensor(frame, crop, self.input_size))?;

        let values = {
            let mut session = self
                .session
                .lock()
                .map_err(|e| format!("Lock poisoned: {e}"))?;
            let outputs = session.run(ort::inputs![input_value])?;
            let landmarks = outputs[0].try_extract_array::<f32>()?;
            landmarks
                .as_slice()
                .ok_or("Cannot get landmark slice")?
                .to_vec()
        };

        to_frame_space(&values, crop)
    }
}

/// Sample a square crop `(left, top, side)` into a `size × size` NCHW tensor
/// in [0,1]. Pixels outside the frame replicate the nearest edge.
fn crop_tensor(frame: &Frame, crop: (f64, f64, f64), size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let max_x = frame.width() as i64 - 1;
    let max_y = frame.height() as i64 - 1;
    let (left, top, side) = crop;
    let s = size as usize;
    let step = side / s as f64;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));
    for y in 0..s {
        let sy = ((top + (y as f64 + 0.5) * step) as i64).clamp(0, max_y) as usize;
        for x in 0..s {
            let sx = ((left + (x as f64 + 0.5) * step) as i64).clamp(0, max_x) as usize;
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[sy, sx, c]] as f32 / 255.0;
            }
        }
    }
    tensor
}

/// Map crop-normalized `[x0, y0, x1, y1, ...]` back into frame pixels.
fn to_frame_space(values: &[f32], crop: (f64, f64, f64)) -> Result<LandmarkSet, BoxError> {
    if values.len() < LANDMARK_COUNT * 2 {
        return Err(format!(
            "landmark model returned {} values, expected {}",
            values.len(),
            LANDMARK_COUNT * 2
        )
        .into());
    }

    let (left, top, side) = crop;
    let points: Vec<LandmarkPoint> = values
        .chunks_exact(2)
        .take(LANDMARK_COUNT)
        .map(|xy| LandmarkPoint::new(left + xy[0] as f64 * side, top + xy[1] as f64 * side))
        .collect();

    LandmarkSet::from_slice(&points).ok_or_else(|| "landmark count mismatch".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_to_frame_space_maps_corners() {
        let mut values = vec![0.5f32; LANDMARK_COUNT * 2];
        values[0] = 0.0;
        values[1] = 0.0;
        values[2] = 1.0;
        values[3] = 1.0;
        let set = to_frame_space(&values, (100.0, 40.0, 80.0)).unwrap();
        let pts = set.points();
        assert_relative_eq!(pts[0].x, 100.0);
        assert_relative_eq!(pts[0].y, 40.0);
        assert_relative_eq!(pts[1].x, 180.0);
        assert_relative_eq!(pts[1].y, 120.0);
        assert_relative_eq!(pts[2].x, 140.0);
    }

    #[test]
    fn test_to_frame_space_rejects_short_output() {
        let values = vec![0.0f32; 10];
        assert!(to_frame_space(&values, (0.0, 0.0, 1.0)).is_err());
    }

    #[test]
    fn test_crop_tensor_replicates_edges() {
        // 4x4 frame, left column white, crop hanging off the left edge
        let mut data = vec![0u8; 4 * 4 * 3];
        for row in 0..4 {
            for c in 0..3 {
                data[row * 12 + c] = 255;
            }
        }
        let frame = Frame::new(data, 4, 4, 3, 0);
        let tensor = crop_tensor(&frame, (-4.0, 0.0, 4.0), 4);
        assert_eq!(tensor.shape(), &[1, 3, 4, 4]);
        // Every sample left of the frame clamps to column 0
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 3, 3]] - 1.0).abs() < 1e-6);
    }
}
