use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use crate::detection::domain::face_landmarks::LandmarkSet;
use crate::detection::domain::landmark_detector::{DetectError, LandmarkDetector};
use crate::detection::infrastructure::onnx_landmark_detector::OnnxLandmarkDetector;
use crate::shared::constants::{FACE_DETECTOR_MODEL_NAME, LANDMARK_MODEL_NAME};
use crate::shared::frame::Frame;
use crate::shared::model_resolver;

enum LoadState {
    Loading,
    Ready(Arc<dyn LandmarkDetector>),
    Failed(String),
}

/// Loads the landmark models on a background thread at startup and gates
/// detection until they are available.
///
/// Detection before loading completes fails fast with
/// [`DetectError::ModelsLoading`] rather than blocking the caller.
pub struct BackgroundLandmarkDetector {
    slot: Arc<Mutex<LoadState>>,
}

/// Where to find the two model files.
#[derive(Clone, Debug)]
pub struct ModelSource {
    pub models_dir: Option<PathBuf>,
    pub base_url: Option<String>,
    pub confidence: f64,
}

impl BackgroundLandmarkDetector {
    /// Start loading with an arbitrary loader.
    pub fn spawn<F>(loader: F) -> Self
    where
        F: FnOnce() -> Result<Arc<dyn LandmarkDetector>, String> + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(LoadState::Loading));

        let worker_slot = slot.clone();
        thread::spawn(move || {
            let started = Instant::now();
            let next = match loader() {
                Ok(detector) => {
                    log::info!(
                        "Landmark models loaded in {:.1}s",
                        started.elapsed().as_secs_f64()
                    );
                    LoadState::Ready(detector)
                }
                Err(e) => {
                    log::error!("Failed to load landmark models: {e}");
                    LoadState::Failed(e)
                }
            };
            if let Ok(mut state) = worker_slot.lock() {
                *state = next;
            }
        });

        Self { slot }
    }

    /// Resolve and load the BlazeFace and 68-point ONNX models.
    pub fn spawn_onnx(source: ModelSource) -> Self {
        Self::spawn(move || {
            let dir = source.models_dir.as_deref();
            let url = source.base_url.as_deref();
            let face_model = model_resolver::resolve(FACE_DETECTOR_MODEL_NAME, dir, url)
                .map_err(|e| e.to_string())?;
            let landmark_model = model_resolver::resolve(LANDMARK_MODEL_NAME, dir, url)
                .map_err(|e| e.to_string())?;
            let detector =
                OnnxLandmarkDetector::new(&face_model, &landmark_model, source.confidence)
                    .map_err(|e| e.to_string())?;
            Ok(Arc::new(detector) as Arc<dyn LandmarkDetector>)
        })
    }

    pub fn is_ready(&self) -> bool {
        self.slot
            .lock()
            .map(|state| matches!(*state, LoadState::Ready(_)))
            .unwrap_or(false)
    }

    fn current(&self) -> Result<Arc<dyn LandmarkDetector>, DetectError> {
        let state = self
            .slot
            .lock()
            .map_err(|e| DetectError::ModelsUnavailable(format!("Lock poisoned: {e}")))?;
        match &*state {
            LoadState::Loading => Err(DetectError::ModelsLoading),
            LoadState::Ready(detector) => Ok(detector.clone()),
            LoadState::Failed(msg) => Err(DetectError::ModelsUnavailable(msg.clone())),
        }
    }
}

impl LandmarkDetector for BackgroundLandmarkDetector {
    fn detect(&self, frame: &Frame) -> Result<Option<LandmarkSet>, DetectError> {
        // Release the slot lock before inference so cycles don't serialize here
        let detector = self.current()?;
        detector.detect(frame)
    }
}
