use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::capture::domain::camera_source::CameraSource;
use crate::detection::domain::landmark_detector::LandmarkDetector;
use crate::overlay::domain::overlay_renderer::OverlayRenderer;
use crate::pipeline::pipeline_error::PipelineError;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::session_state::{PipelineState, SessionState};
use crate::transport::domain::landmark_codec;
use crate::transport::domain::wireless_transport::Transport;

/// The two things a user can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    Connect,
    Detect,
}

/// Result of one detect → draw → send cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No face in the frame; nothing was drawn or sent.
    NoFace,
    Sent { bytes: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Connected(PipelineState),
    Cycle(CycleOutcome),
}

/// Owns the session state and the four components, and runs user actions.
///
/// Cheap to clone; clones share everything. Each dispatched action runs on
/// its own thread with no queue, so overlapping detection cycles race and
/// their sends are unordered. Locks guard single steps, never a whole cycle.
#[derive(Clone)]
pub struct PipelineController {
    transport: Arc<dyn Transport>,
    camera: Arc<dyn CameraSource>,
    detector: Arc<dyn LandmarkDetector>,
    overlay: Arc<Mutex<Box<dyn OverlayRenderer>>>,
    state: Arc<Mutex<SessionState>>,
    logger: Arc<Mutex<Box<dyn PipelineLogger>>>,
    // Serializes the is-running check with the start it guards
    camera_start: Arc<Mutex<()>>,
}

impl PipelineController {
    pub fn new(
        transport: Arc<dyn Transport>,
        camera: Arc<dyn CameraSource>,
        detector: Arc<dyn LandmarkDetector>,
        overlay: Box<dyn OverlayRenderer>,
        logger: Box<dyn PipelineLogger>,
    ) -> Self {
        Self {
            transport,
            camera,
            detector,
            overlay: Arc::new(Mutex::new(overlay)),
            state: Arc::new(Mutex::new(SessionState::default())),
            logger: Arc::new(Mutex::new(logger)),
            camera_start: Arc::new(Mutex::new(())),
        }
    }

    /// Run `action` on a new worker thread. Failures are logged there; the
    /// handle may be dropped.
    pub fn dispatch(&self, action: UiAction) -> JoinHandle<Result<ActionOutcome, PipelineError>> {
        let controller = self.clone();
        thread::spawn(move || {
            let result = controller.handle(action);
            if let Err(e) = &result {
                log::error!("{action:?} failed: {e}");
            }
            result
        })
    }

    /// Run `action` on the calling thread.
    pub fn handle(&self, action: UiAction) -> Result<ActionOutcome, PipelineError> {
        match action {
            UiAction::Connect => self.connect().map(ActionOutcome::Connected),
            UiAction::Detect => self.run_detection_cycle().map(ActionOutcome::Cycle),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.session().pipeline_state()
    }

    /// Current flags. A camera whose stream has ended is reported as not
    /// running.
    pub fn session(&self) -> SessionState {
        let mut state = lock(&self.state);
        if state.camera_running && !self.camera.is_running() {
            log::warn!("Camera stream ended; detection disabled until reconnect");
            state.camera_running = false;
        }
        *state
    }

    /// Establish (or re-establish) the link, then start the camera if it is
    /// not running. A camera failure leaves the link up and the state at
    /// [`PipelineState::TransportConnected`].
    pub fn connect(&self) -> Result<PipelineState, PipelineError> {
        self.transport.connect()?;
        lock(&self.state).transport_connected = true;
        self.info("Transport connected");
        self.ensure_camera()?;

        let state = self.state();
        log::info!("Session {state}");
        Ok(state)
    }

    fn ensure_camera(&self) -> Result<(), PipelineError> {
        let _starting = lock(&self.camera_start);
        if self.camera.is_running() {
            lock(&self.state).camera_running = true;
            return Ok(());
        }
        lock(&self.state).camera_running = false;

        let metadata = self.camera.start()?;
        let (width, height) = metadata.dimensions();
        lock(&self.overlay).resize(width, height);
        lock(&self.state).camera_running = true;
        self.info(&format!("Camera running at {width}x{height}"));
        Ok(())
    }

    /// One detect → draw → send cycle on the current frame.
    pub fn run_detection_cycle(&self) -> Result<CycleOutcome, PipelineError> {
        let state = self.session();
        if !state.detection_enabled() {
            return Err(PipelineError::DetectionDisabled(state.pipeline_state()));
        }

        let result = self.cycle_steps();
        let outcome = match &result {
            Ok(CycleOutcome::NoFace) => "no_face",
            Ok(CycleOutcome::Sent { .. }) => "sent",
            Err(_) => "failed",
        };
        lock(&self.logger).cycle(outcome);
        result
    }

    fn cycle_steps(&self) -> Result<CycleOutcome, PipelineError> {
        let frame = self.camera.current_frame()?;

        let started = Instant::now();
        let detected = self.detector.detect(&frame)?;
        self.timing("detect", started);

        let Some(landmarks) = detected else {
            log::debug!("No face in frame {}", frame.index());
            return Ok(CycleOutcome::NoFace);
        };

        let started = Instant::now();
        lock(&self.overlay)
            .draw(&landmarks, &frame)
            .map_err(PipelineError::Draw)?;
        self.timing("draw", started);

        let payload = landmark_codec::encode(&landmarks);
        let started = Instant::now();
        self.transport.send(payload.as_bytes())?;
        self.timing("send", started);

        let bytes = payload.len();
        lock(&self.logger).metric("payload_bytes", bytes as f64);
        log::debug!("Sent landmarks for frame {} ({bytes} bytes)", frame.index());
        Ok(CycleOutcome::Sent { bytes })
    }

    /// Emit the logger's end-of-session summary.
    pub fn summary(&self) {
        lock(&self.logger).summary();
    }

    fn timing(&self, stage: &str, started: Instant) {
        let ms = started.elapsed().as_secs_f64() * 1000.0;
        lock(&self.logger).timing(stage, ms);
    }

    fn info(&self, message: &str) {
        lock(&self.logger).info(message);
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::domain::camera_source::CameraError;
    use crate::detection::domain::landmark_detector::DetectError;
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use crate::pipeline::test_support::*;
    use crate::transport::domain::wireless_transport::SendError;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    struct Harness {
        controller: PipelineController,
        transport: Arc<FakeTransport>,
        camera: Arc<FakeCamera>,
        detector: Arc<FakeDetector>,
        overlay: Arc<Mutex<OverlayLog>>,
    }

    fn harness_with(
        transport: FakeTransport,
        camera: FakeCamera,
        mode: DetectorMode,
    ) -> Harness {
        let transport = Arc::new(transport);
        let camera = Arc::new(camera);
        let detector = Arc::new(FakeDetector::new(mode));
        let (overlay, overlay_log) = FakeOverlay::new();
        let controller = PipelineController::new(
            transport.clone(),
            camera.clone(),
            detector.clone(),
            Box::new(overlay),
            Box::new(NullPipelineLogger),
        );
        Harness {
            controller,
            transport,
            camera,
            detector,
            overlay: overlay_log,
        }
    }

    fn harness(mode: DetectorMode) -> Harness {
        harness_with(FakeTransport::default(), FakeCamera::default(), mode)
    }

    #[test]
    fn test_starts_idle() {
        let h = harness(DetectorMode::Face);
        assert_eq!(h.controller.state(), PipelineState::Idle);
    }

    #[test]
    fn test_connect_starts_camera_and_sizes_overlay() {
        let h = harness(DetectorMode::Face);
        let state = h.controller.connect().unwrap();

        assert_eq!(state, PipelineState::Ready);
        assert_eq!(h.camera.starts.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.overlay.lock().unwrap().resizes,
            vec![(FRAME_WIDTH, FRAME_HEIGHT)]
        );
    }

    #[test]
    fn test_connect_failure_stays_idle_and_skips_camera() {
        let h = harness(DetectorMode::Face);
        h.transport.fail_connect.store(true, Ordering::SeqCst);

        let err = h.controller.connect().unwrap_err();
        assert!(matches!(err, PipelineError::Connection(_)));
        assert_eq!(h.controller.state(), PipelineState::Idle);
        assert_eq!(h.camera.starts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_camera_failure_leaves_transport_connected() {
        let h = harness_with(
            FakeTransport::default(),
            FakeCamera::failing(),
            DetectorMode::Face,
        );

        let err = h.controller.connect().unwrap_err();
        assert!(matches!(err, PipelineError::Camera(CameraError::NoVideoStream(_))));
        assert_eq!(h.controller.state(), PipelineState::TransportConnected);
        assert!(h.overlay.lock().unwrap().resizes.is_empty());
    }

    #[test]
    fn test_connect_retry_after_camera_failure_reaches_ready() {
        let h = harness_with(
            FakeTransport::default(),
            FakeCamera::failing(),
            DetectorMode::Face,
        );
        assert!(h.controller.connect().is_err());

        h.camera.fail_start.store(false, Ordering::SeqCst);
        assert_eq!(h.controller.connect().unwrap(), PipelineState::Ready);
        assert_eq!(h.transport.connects.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reconnect_relinks_without_restarting_camera() {
        let h = harness(DetectorMode::Face);
        h.controller.connect().unwrap();
        h.controller.connect().unwrap();

        assert_eq!(h.transport.connects.load(Ordering::SeqCst), 2);
        assert_eq!(h.camera.starts.load(Ordering::SeqCst), 1);
        assert_eq!(h.overlay.lock().unwrap().resizes.len(), 1);
    }

    #[test]
    fn test_ended_stream_disables_detection_until_reconnect() {
        let h = harness(DetectorMode::Face);
        h.controller.connect().unwrap();
        h.camera.end_stream();

        assert_eq!(h.controller.state(), PipelineState::TransportConnected);
        assert!(matches!(
            h.controller.run_detection_cycle(),
            Err(PipelineError::DetectionDisabled(
                PipelineState::TransportConnected
            ))
        ));
        assert_eq!(h.detector.calls.load(Ordering::SeqCst), 0);
        assert!(h.transport.payloads().is_empty());

        assert_eq!(h.controller.connect().unwrap(), PipelineState::Ready);
        assert_eq!(h.camera.starts.load(Ordering::SeqCst), 2);
        assert_eq!(h.overlay.lock().unwrap().resizes.len(), 2);
        assert!(h.controller.run_detection_cycle().is_ok());
    }

    #[test]
    fn test_concurrent_connects_start_camera_once() {
        let h = harness(DetectorMode::Face);
        let first = h.controller.dispatch(UiAction::Connect);
        let second = h.controller.dispatch(UiAction::Connect);
        assert!(first.join().unwrap().is_ok());
        assert!(second.join().unwrap().is_ok());

        assert_eq!(h.transport.connects.load(Ordering::SeqCst), 2);
        assert_eq!(h.camera.starts.load(Ordering::SeqCst), 1);
        assert_eq!(h.overlay.lock().unwrap().resizes.len(), 1);
    }

    #[test]
    fn test_detect_before_ready_is_rejected() {
        let h = harness(DetectorMode::Face);
        let err = h.controller.run_detection_cycle().unwrap_err();

        assert!(matches!(
            err,
            PipelineError::DetectionDisabled(PipelineState::Idle)
        ));
        assert_eq!(h.detector.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_detect_with_camera_down_is_rejected() {
        let h = harness_with(
            FakeTransport::default(),
            FakeCamera::failing(),
            DetectorMode::Face,
        );
        let _ = h.controller.connect();

        assert!(matches!(
            h.controller.run_detection_cycle(),
            Err(PipelineError::DetectionDisabled(
                PipelineState::TransportConnected
            ))
        ));
    }

    #[test]
    fn test_cycle_draws_then_sends_encoded_landmarks() {
        let h = harness(DetectorMode::Face);
        h.controller.connect().unwrap();

        let outcome = h.controller.run_detection_cycle().unwrap();

        let payloads = h.transport.payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(outcome, CycleOutcome::Sent { bytes: payloads[0].len() });
        assert_eq!(payloads[0], landmark_codec::encode(&landmarks_for(0)));
        assert!(payloads[0].starts_with("0.00,0.50|"));
        assert_eq!(h.overlay.lock().unwrap().draws, vec![0]);
    }

    #[test]
    fn test_no_face_means_no_draw_and_no_send() {
        let h = harness(DetectorMode::NoFace);
        h.controller.connect().unwrap();

        assert_eq!(
            h.controller.run_detection_cycle().unwrap(),
            CycleOutcome::NoFace
        );
        assert!(h.overlay.lock().unwrap().draws.is_empty());
        assert!(h.transport.payloads().is_empty());
    }

    #[test]
    fn test_models_loading_produces_no_output() {
        let h = harness(DetectorMode::Loading);
        h.controller.connect().unwrap();

        assert!(matches!(
            h.controller.run_detection_cycle(),
            Err(PipelineError::Detect(DetectError::ModelsLoading))
        ));
        assert!(h.overlay.lock().unwrap().draws.is_empty());
        assert!(h.transport.payloads().is_empty());
        assert_eq!(h.controller.state(), PipelineState::Ready);
    }

    #[test]
    fn test_rejected_write_surfaces_after_draw() {
        let h = harness(DetectorMode::Face);
        h.controller.connect().unwrap();
        h.transport.reject_writes.store(true, Ordering::SeqCst);

        assert!(matches!(
            h.controller.run_detection_cycle(),
            Err(PipelineError::Send(SendError::Write(_)))
        ));
        assert_eq!(h.overlay.lock().unwrap().draws.len(), 1);
        assert_eq!(h.controller.state(), PipelineState::Ready);
    }

    #[test]
    fn test_dispatch_runs_action_on_worker_thread() {
        let h = harness(DetectorMode::Face);
        let connected = h.controller.dispatch(UiAction::Connect).join().unwrap();
        assert_eq!(
            connected.unwrap(),
            ActionOutcome::Connected(PipelineState::Ready)
        );

        let cycle = h.controller.dispatch(UiAction::Detect).join().unwrap();
        assert!(matches!(
            cycle.unwrap(),
            ActionOutcome::Cycle(CycleOutcome::Sent { .. })
        ));
    }

    #[test]
    fn test_dispatched_failure_is_returned_not_panicked() {
        let h = harness(DetectorMode::Face);
        let result = h.controller.dispatch(UiAction::Detect).join().unwrap();
        assert!(matches!(result, Err(PipelineError::DetectionDisabled(_))));
    }

    #[test]
    fn test_overlapping_cycles_send_independently() {
        let rendezvous = Rendezvous::new(2, Duration::from_secs(5));
        let h = harness_with(
            FakeTransport::with_rendezvous(rendezvous),
            FakeCamera::default(),
            DetectorMode::Face,
        );
        h.controller.connect().unwrap();

        let first = h.controller.dispatch(UiAction::Detect);
        let second = h.controller.dispatch(UiAction::Detect);
        assert!(first.join().unwrap().is_ok());
        assert!(second.join().unwrap().is_ok());

        // Both sends were in flight at the same time
        assert_eq!(*h.transport.met.lock().unwrap(), vec![true, true]);

        let mut payloads = h.transport.payloads();
        payloads.sort();
        let mut expected = vec![
            landmark_codec::encode(&landmarks_for(0)),
            landmark_codec::encode(&landmarks_for(1)),
        ];
        expected.sort();
        assert_eq!(payloads, expected);
    }

    #[test]
    fn test_cycles_are_recorded_by_logger() {
        use crate::pipeline::pipeline_logger::StdoutPipelineLogger;

        struct Shared(Arc<Mutex<StdoutPipelineLogger>>);
        impl PipelineLogger for Shared {
            fn cycle(&mut self, outcome: &str) {
                self.0.lock().unwrap().cycle(outcome);
            }
            fn timing(&mut self, stage: &str, duration_ms: f64) {
                self.0.lock().unwrap().timing(stage, duration_ms);
            }
            fn metric(&mut self, name: &str, value: f64) {
                self.0.lock().unwrap().metric(name, value);
            }
            fn info(&mut self, _message: &str) {}
        }

        let recorder = Arc::new(Mutex::new(StdoutPipelineLogger::new()));
        let controller = PipelineController::new(
            Arc::new(FakeTransport::default()),
            Arc::new(FakeCamera::default()),
            Arc::new(FakeDetector::new(DetectorMode::Face)),
            Box::new(FakeOverlay::new().0),
            Box::new(Shared(recorder.clone())),
        );
        controller.connect().unwrap();
        controller.run_detection_cycle().unwrap();

        let recorder = recorder.lock().unwrap();
        assert_eq!(recorder.outcome_count("sent"), 1);
        for stage in ["detect", "draw", "send"] {
            assert_eq!(recorder.timings_for(stage).unwrap().len(), 1, "{stage}");
        }
        assert!(recorder.metrics_for("payload_bytes").is_some());
    }
}
