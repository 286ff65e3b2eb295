/// BlazeFace face detector using ONNX Runtime via `ort`.
///
/// First stage of landmark detection: finds the best-scoring face box,
/// which the landmark regressor then crops.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::infrastructure::execution_provider::load_session;
use crate::detection::infrastructure::math::{nms, sigmoid, FaceBox};
use crate::shared::frame::Frame;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// BlazeFace model input resolution.
const INPUT_SIZE: u32 = 128;

/// Default confidence threshold.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

const NMS_IOU_THRESH: f64 = 0.3;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

pub struct OnnxBlazefaceDetector {
    session: Mutex<ort::session::Session>,
    confidence: f64,
    anchors: Vec<[f32; 2]>,
}

impl OnnxBlazefaceDetector {
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, BoxError> {
        let session = load_session(model_path)?;
        Ok(Self {
            session: Mutex::new(session),
            confidence,
            anchors: generate_anchors(),
        })
    }

    /// Returns the highest-scoring face after NMS, or `None`.
    pub fn detect_best(&self, frame: &Frame) -> Result<Option<FaceBox>, BoxError> {
        let input_value = ort::value::Tensor::from_array(preprocess(frame, INPUT_SIZE))?;

        let (reg_data, score_data) = {
            let mut session = self
                .session
                .lock()
                .map_err(|e| format!("Lock poisoned: {e}"))?;
            let outputs = session.run(ort::inputs![input_value])?;

            // regressors: [1, 896, 16], classificators: [1, 896, 1]
            if outputs.len() < 2 {
                return Err(
                    format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into(),
                );
            }
            let regressors = outputs[0].try_extract_array::<f32>()?;
            let scores = outputs[1].try_extract_array::<f32>()?;
            let reg = regressors
                .as_slice()
                .ok_or("Cannot get regressor slice")?
                .to_vec();
            let sc = scores.as_slice().ok_or("Cannot get score slice")?.to_vec();
            (reg, sc)
        };

        let mut dets = decode(
            &reg_data,
            &score_data,
            &self.anchors,
            self.confidence as f32,
            frame.width(),
            frame.height(),
        );
        Ok(nms(&mut dets, NMS_IOU_THRESH).into_iter().next())
    }
}

/// Decode anchor-relative boxes above `confidence` into frame coordinates.
fn decode(
    reg_data: &[f32],
    score_data: &[f32],
    anchors: &[[f32; 2]],
    confidence: f32,
    fw: u32,
    fh: u32,
) -> Vec<FaceBox> {
    let mut dets = Vec::new();
    let num_anchors = anchors.len().min(NUM_ANCHORS);

    for (i, &raw_score) in score_data.iter().enumerate().take(num_anchors) {
        let score = sigmoid(raw_score);
        if score < confidence {
            continue;
        }

        let offset = i * 16;
        if offset + 4 > reg_data.len() {
            break;
        }

        let anchor = anchors[i];
        let s = INPUT_SIZE as f32;
        let cx = anchor[0] + reg_data[offset] / s;
        let cy = anchor[1] + reg_data[offset + 1] / s;
        let w = reg_data[offset + 2] / s;
        let h = reg_data[offset + 3] / s;

        dets.push(FaceBox {
            x1: ((cx - w / 2.0) * fw as f32).max(0.0) as f64,
            y1: ((cy - h / 2.0) * fh as f32).max(0.0) as f64,
            x2: ((cx + w / 2.0) * fw as f32).min(fw as f32) as f64,
            y2: ((cy + h / 2.0) * fh as f32).min(fh as f32) as f64,
            score: score as f64,
        });
    }

    dets
}

/// Resize frame to `size × size` and normalize to [0,1] NCHW float32.
fn preprocess(frame: &Frame, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let s = size as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));

    for y in 0..s {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        for x in 0..s {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    tensor
}

/// Short-range anchors: a 16×16 grid with 2 anchors per cell and an 8×8
/// grid with 6 per cell.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)];
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }

    anchors
}
