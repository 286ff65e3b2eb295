//! Recording fakes for the controller's four collaborators.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::capture::domain::camera_source::{CameraError, CameraSource};
use crate::detection::domain::face_landmarks::{LandmarkPoint, LandmarkSet};
use crate::detection::domain::landmark_detector::{DetectError, LandmarkDetector};
use crate::overlay::domain::overlay_renderer::OverlayRenderer;
use crate::shared::constants::LANDMARK_COUNT;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::transport::domain::wireless_transport::{ConnectionError, SendError, Transport};

pub const FRAME_WIDTH: u32 = 64;
pub const FRAME_HEIGHT: u32 = 48;

/// Lets `parties` threads wait for each other, giving up after `timeout`.
/// `wait` reports whether everyone arrived.
pub struct Rendezvous {
    parties: usize,
    timeout: Duration,
    arrived: Mutex<usize>,
    all_here: Condvar,
}

impl Rendezvous {
    pub fn new(parties: usize, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            parties,
            timeout,
            arrived: Mutex::new(0),
            all_here: Condvar::new(),
        })
    }

    pub fn wait(&self) -> bool {
        let mut arrived = self.arrived.lock().unwrap();
        *arrived += 1;
        self.all_here.notify_all();
        let (arrived, _) = self
            .all_here
            .wait_timeout_while(arrived, self.timeout, |n| *n < self.parties)
            .unwrap();
        *arrived >= self.parties
    }
}

// --- Camera ---

#[derive(Default)]
pub struct FakeCamera {
    pub fail_start: AtomicBool,
    pub starts: AtomicUsize,
    running: AtomicBool,
    next_index: AtomicU64,
}

impl FakeCamera {
    pub fn failing() -> Self {
        let camera = Self::default();
        camera.fail_start.store(true, Ordering::SeqCst);
        camera
    }

    /// The stream ends, as when a device is unplugged.
    pub fn end_stream(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl CameraSource for FakeCamera {
    fn start(&self) -> Result<VideoMetadata, CameraError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        // Widen the window for concurrent connects
        std::thread::sleep(Duration::from_millis(20));
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(CameraError::NoVideoStream("fake0".into()));
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(VideoMetadata {
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            fps: 30.0,
            codec: "rawvideo".into(),
            device: "fake0".into(),
        })
    }

    /// Every call yields a new frame with the next capture index.
    fn current_frame(&self) -> Result<Frame, CameraError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(CameraError::NotRunning);
        }
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let data = vec![0u8; (FRAME_WIDTH * FRAME_HEIGHT * 3) as usize];
        Ok(Frame::new(data, FRAME_WIDTH, FRAME_HEIGHT, 3, index as usize))
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

// --- Detector ---

pub enum DetectorMode {
    Face,
    NoFace,
    Loading,
}

/// Places every landmark at `(frame.index, frame.index + 0.5)` so payloads
/// from distinct frames differ.
pub struct FakeDetector {
    mode: DetectorMode,
    pub calls: AtomicUsize,
}

impl FakeDetector {
    pub fn new(mode: DetectorMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
        }
    }
}

pub fn landmarks_for(frame_index: usize) -> LandmarkSet {
    let v = frame_index as f64;
    LandmarkSet::new([LandmarkPoint::new(v, v + 0.5); LANDMARK_COUNT])
}

impl LandmarkDetector for FakeDetector {
    fn detect(&self, frame: &Frame) -> Result<Option<LandmarkSet>, DetectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            DetectorMode::Face => Ok(Some(landmarks_for(frame.index()))),
            DetectorMode::NoFace => Ok(None),
            DetectorMode::Loading => Err(DetectError::ModelsLoading),
        }
    }
}

// --- Overlay ---

#[derive(Default)]
pub struct OverlayLog {
    pub resizes: Vec<(u32, u32)>,
    pub draws: Vec<usize>,
}

/// Records resizes and the frame index of each draw into a shared log.
pub struct FakeOverlay {
    log: Arc<Mutex<OverlayLog>>,
}

impl FakeOverlay {
    pub fn new() -> (Self, Arc<Mutex<OverlayLog>>) {
        let log = Arc::new(Mutex::new(OverlayLog::default()));
        (Self { log: log.clone() }, log)
    }
}

impl OverlayRenderer for FakeOverlay {
    fn resize(&mut self, width: u32, height: u32) {
        self.log.lock().unwrap().resizes.push((width, height));
    }

    fn draw(
        &mut self,
        _landmarks: &LandmarkSet,
        frame: &Frame,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.log.lock().unwrap().draws.push(frame.index());
        Ok(())
    }
}

// --- Transport ---

#[derive(Default)]
pub struct FakeTransport {
    pub fail_connect: AtomicBool,
    pub reject_writes: AtomicBool,
    pub connects: AtomicUsize,
    connected: AtomicBool,
    pub sent: Mutex<Vec<String>>,
    rendezvous: Option<Arc<Rendezvous>>,
    pub met: Mutex<Vec<bool>>,
}

impl FakeTransport {
    /// Each send blocks until `rendezvous` fills or times out, recording
    /// whether the other senders showed up.
    pub fn with_rendezvous(rendezvous: Arc<Rendezvous>) -> Self {
        Self {
            rendezvous: Some(rendezvous),
            ..Self::default()
        }
    }

    pub fn payloads(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for FakeTransport {
    fn connect(&self) -> Result<(), ConnectionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ConnectionError::NoDeviceChosen);
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn send(&self, payload: &[u8]) -> Result<(), SendError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SendError::NotConnected);
        }
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(SendError::Write("write rejected".into()));
        }
        if let Some(rendezvous) = &self.rendezvous {
            let met = rendezvous.wait();
            self.met.lock().unwrap().push(met);
        }
        self.sent
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(payload).into_owned());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
