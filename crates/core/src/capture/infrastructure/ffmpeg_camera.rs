use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use crossbeam_channel::Sender;

use crate::capture::domain::camera_source::{CameraError, CameraSource};
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// Which capture device to open and how.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraConfig {
    /// A bare index (`"0"`), a platform device path, or any URL ffmpeg can open.
    pub device: String,
    /// ffmpeg input format (`video4linux2`, `avfoundation`, `dshow`).
    /// Defaults to the platform's capture format when `device` is an index.
    pub input_format: Option<String>,
    pub video_size: Option<(u32, u32)>,
    pub framerate: Option<u32>,
}

impl CameraConfig {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            input_format: None,
            video_size: None,
            framerate: None,
        }
    }

    /// The `(input format, url)` pair handed to ffmpeg.
    fn resolve(&self) -> (Option<String>, String) {
        match parse_device_index(&self.device) {
            Some(index) => (
                self.input_format
                    .clone()
                    .or_else(|| platform_input_format().map(str::to_string)),
                platform_device_url(index),
            ),
            None => (self.input_format.clone(), self.device.clone()),
        }
    }
}

/// Captures a live stream via ffmpeg-next (libavdevice + libavcodec).
///
/// Decoding runs on a dedicated thread that keeps only the most recent
/// RGB24 frame; detection cycles copy it out on demand.
pub struct FfmpegCamera {
    config: CameraConfig,
    latest: Arc<Mutex<Option<Frame>>>,
    running: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    metadata: Mutex<Option<VideoMetadata>>,
}

impl FfmpegCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            latest: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            metadata: Mutex::new(None),
        }
    }
}

impl Drop for FfmpegCamera {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl CameraSource for FfmpegCamera {
    fn start(&self) -> Result<VideoMetadata, CameraError> {
        let mut metadata = lock(&self.metadata);
        if self.running.load(Ordering::SeqCst) {
            if let Some(meta) = metadata.as_ref() {
                return Ok(meta.clone());
            }
        }

        let (meta_tx, meta_rx) = crossbeam_channel::bounded(1);
        let config = self.config.clone();
        let latest = self.latest.clone();
        let running = self.running.clone();
        let stop = self.stop.clone();
        stop.store(false, Ordering::SeqCst);

        thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || capture_thread(&config, &meta_tx, &latest, &running, &stop))
            .map_err(|e| CameraError::Open {
                device: self.config.device.clone(),
                source: Box::new(e),
            })?;

        let meta = meta_rx.recv().map_err(|_| CameraError::Disconnected)??;
        log::info!(
            "Camera {} started: {}x{} @ {:.1} fps ({})",
            meta.device,
            meta.width,
            meta.height,
            meta.fps,
            meta.codec
        );
        *metadata = Some(meta.clone());
        Ok(meta)
    }

    fn current_frame(&self) -> Result<Frame, CameraError> {
        if let Some(frame) = lock(&self.latest).as_ref() {
            return Ok(frame.clone());
        }
        if self.running.load(Ordering::SeqCst) {
            Err(CameraError::NoFrame)
        } else {
            Err(CameraError::NotRunning)
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn capture_thread(
    config: &CameraConfig,
    meta_tx: &Sender<Result<VideoMetadata, CameraError>>,
    latest: &Mutex<Option<Frame>>,
    running: &AtomicBool,
    stop: &AtomicBool,
) {
    let mut session = match CaptureSession::open(config) {
        Ok(session) => session,
        Err(e) => {
            let _ = meta_tx.send(Err(e));
            return;
        }
    };

    running.store(true, Ordering::SeqCst);
    let _ = meta_tx.send(Ok(session.metadata.clone()));

    match session.run(latest, stop) {
        Ok(frames) => log::info!("Camera stream ended after {frames} frames"),
        Err(e) => log::error!("Camera capture failed: {e}"),
    }
    // A dead stream must not keep serving its last frame
    *lock(latest) = None;
    running.store(false, Ordering::SeqCst);
}

/// An opened input with its decoder and RGB24 scaler. Lives entirely on the
/// capture thread.
struct CaptureSession {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    metadata: VideoMetadata,
}

impl CaptureSession {
    fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        let (format_name, url) = config.resolve();
        let open_err = |e: ffmpeg_next::Error| CameraError::Open {
            device: url.clone(),
            source: Box::new(e),
        };

        ffmpeg_next::init().map_err(open_err)?;
        ffmpeg_next::device::register_all();

        let mut options = ffmpeg_next::Dictionary::new();
        if let Some((w, h)) = config.video_size {
            options.set("video_size", &format!("{w}x{h}"));
        }
        if let Some(fps) = config.framerate {
            options.set("framerate", &fps.to_string());
        }

        let ictx = match format_name {
            Some(name) => {
                let format =
                    find_input_format(&name).ok_or_else(|| CameraError::UnknownFormat(name))?;
                ffmpeg_next::format::open_with(
                    &url,
                    &ffmpeg_next::format::format::Format::Input(format),
                    options,
                )
                .map_err(open_err)?
                .input()
            }
            None => ffmpeg_next::format::input_with_dictionary(&url, options).map_err(open_err)?,
        };

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| CameraError::NoVideoStream(url.clone()))?;
        let stream_index = stream.index();
        let rate = stream.rate();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(open_err)?;
        let decoder = codec_ctx.decoder().video().map_err(open_err)?;

        let width = decoder.width();
        let height = decoder.height();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(open_err)?;

        let metadata = VideoMetadata {
            width,
            height,
            fps,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            device: url.clone(),
        };

        Ok(Self {
            ictx,
            decoder,
            scaler,
            stream_index,
            metadata,
        })
    }

    /// Decode until the input ends or `stop` is set, publishing each frame
    /// to `latest`. Returns the number of frames decoded.
    fn run(
        &mut self,
        latest: &Mutex<Option<Frame>>,
        stop: &AtomicBool,
    ) -> Result<usize, ffmpeg_next::Error> {
        let width = self.metadata.width;
        let height = self.metadata.height;
        let mut index = 0;
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();

        for (stream, packet) in self.ictx.packets() {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            if stream.index() != self.stream_index {
                continue;
            }
            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
                self.scaler.run(&decoded, &mut rgb_frame)?;
                let pixels = extract_rgb_pixels(&rgb_frame, width, height);
                *lock(latest) = Some(Frame::new(pixels, width, height, 3, index));
                index += 1;
            }
        }

        Ok(index)
    }
}

fn find_input_format(name: &str) -> Option<ffmpeg_next::format::Input> {
    // libavdevice names are comma-joined aliases, e.g. "video4linux2,v4l2"
    ffmpeg_next::device::input::video()
        .find(|format| format.name().split(',').any(|alias| alias == name))
}

/// Parses a bare camera index such as `"0"`.
pub fn parse_device_index(device: &str) -> Option<u32> {
    device.trim().parse().ok()
}

fn platform_input_format() -> Option<&'static str> {
    if cfg!(target_os = "linux") {
        Some("video4linux2")
    } else if cfg!(target_os = "macos") {
        Some("avfoundation")
    } else if cfg!(target_os = "windows") {
        Some("dshow")
    } else {
        None
    }
}

fn platform_device_url(index: u32) -> String {
    if cfg!(target_os = "linux") {
        format!("/dev/video{index}")
    } else if cfg!(target_os = "macos") {
        // avfoundation "video:audio" selector, video only
        format!("{index}:none")
    } else {
        index.to_string()
    }
}

/// Copies pixel data from an ffmpeg frame into a tightly packed RGB buffer,
/// stripping per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
