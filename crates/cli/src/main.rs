mod settings;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::Sender;

use facelink_core::capture::infrastructure::ffmpeg_camera::{CameraConfig, FfmpegCamera};
use facelink_core::detection::infrastructure::background_landmark_detector::{
    BackgroundLandmarkDetector, ModelSource,
};
use facelink_core::overlay::infrastructure::overlay_file_writer::OverlayFileWriter;
use facelink_core::overlay::infrastructure::raster_overlay_renderer::RasterOverlayRenderer;
use facelink_core::pipeline::pipeline_controller::{PipelineController, UiAction};
use facelink_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use facelink_core::transport::domain::wireless_transport::DeviceSelector;
use facelink_core::transport::infrastructure::ble_uart_transport::BleUartTransport;

use settings::Settings;

/// Stream 68-point face landmarks from a webcam to a BLE UART peripheral.
///
/// Reads `connect`, `detect`, `status` and `quit` from stdin. Unset flags
/// fall back to the saved settings file.
#[derive(Parser)]
#[command(name = "facelink")]
struct Cli {
    /// Camera device: an index (0), a device path, or an ffmpeg URL.
    #[arg(long)]
    camera: Option<String>,

    /// ffmpeg capture input format (video4linux2, avfoundation, dshow).
    #[arg(long)]
    input_format: Option<String>,

    /// Requested capture size, e.g. 640x480.
    #[arg(long)]
    video_size: Option<String>,

    /// Requested capture frame rate.
    #[arg(long)]
    framerate: Option<u32>,

    /// Directory searched first for the ONNX models.
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Base URL models are downloaded from when not found locally.
    #[arg(long)]
    models_url: Option<String>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Connect to the first peripheral whose name starts with this prefix.
    #[arg(long, conflicts_with = "device_address")]
    device_name: Option<String>,

    /// Connect to the peripheral with this Bluetooth address.
    #[arg(long)]
    device_address: Option<String>,

    /// Seconds to scan before choosing a peripheral.
    #[arg(long)]
    scan_secs: Option<u64>,

    /// Write the overlay composited over the frame to this PNG after each draw.
    #[arg(long)]
    overlay_out: Option<PathBuf>,

    /// Persist the effective settings for the next run.
    #[arg(long)]
    save_settings: bool,
}

impl Cli {
    fn apply(self, mut settings: Settings) -> Settings {
        if let Some(v) = self.camera {
            settings.camera_device = v;
        }
        if self.input_format.is_some() {
            settings.input_format = self.input_format;
        }
        if self.video_size.is_some() {
            settings.video_size = self.video_size;
        }
        if self.framerate.is_some() {
            settings.framerate = self.framerate;
        }
        if let Some(v) = self.models_dir {
            settings.models_dir = v;
        }
        if self.models_url.is_some() {
            settings.models_url = self.models_url;
        }
        if let Some(v) = self.confidence {
            settings.confidence = v;
        }
        if self.device_name.is_some() {
            settings.device_name = self.device_name;
            settings.device_address = None;
        }
        if self.device_address.is_some() {
            settings.device_address = self.device_address;
            settings.device_name = None;
        }
        if let Some(v) = self.scan_secs {
            settings.scan_secs = v;
        }
        if self.overlay_out.is_some() {
            settings.overlay_out = self.overlay_out;
        }
        settings
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Action(UiAction),
    Status,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_ascii_lowercase().as_str() {
        "connect" | "c" => Some(Command::Action(UiAction::Connect)),
        "detect" | "d" => Some(Command::Action(UiAction::Detect)),
        "status" | "s" => Some(Command::Status),
        "help" | "?" => Some(Command::Help),
        "quit" | "q" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let save = cli.save_settings;
    let settings = cli.apply(Settings::load());
    validate(&settings)?;

    if save {
        let path = settings.save()?;
        log::info!("Settings saved to {}", path.display());
    }

    let detector = Arc::new(BackgroundLandmarkDetector::spawn_onnx(ModelSource {
        models_dir: Some(settings.models_dir.clone()),
        base_url: settings.models_url.clone(),
        confidence: settings.confidence,
    }));
    let camera = Arc::new(FfmpegCamera::new(camera_config(&settings)?));
    let transport = Arc::new(
        BleUartTransport::new(device_selector(&settings))?
            .with_scan_duration(Duration::from_secs(settings.scan_secs)),
    );
    let mut overlay = RasterOverlayRenderer::new();
    if let Some(path) = &settings.overlay_out {
        overlay = overlay.with_writer(OverlayFileWriter::new(path));
    }

    let controller = PipelineController::new(
        transport.clone(),
        camera,
        detector.clone(),
        Box::new(overlay),
        Box::new(StdoutPipelineLogger::new()),
    );

    let (tx, rx) = crossbeam_channel::unbounded();
    spawn_stdin_reader(tx);
    print_help();

    let mut pending = Vec::new();
    for command in rx {
        match command {
            Command::Action(action) => {
                // Failures are logged by the worker
                pending.retain(|h: &JoinHandle<_>| !h.is_finished());
                pending.push(controller.dispatch(action));
            }
            Command::Status => {
                println!(
                    "state: {}  link: {}  models: {}",
                    controller.state(),
                    transport.device_label().as_deref().unwrap_or("none"),
                    if detector.is_ready() { "ready" } else { "not ready" },
                );
            }
            Command::Help => print_help(),
            Command::Quit => break,
        }
    }

    let panicked = join_all(pending);
    if panicked > 0 {
        log::warn!("{panicked} action(s) panicked before quit");
    }
    controller.summary();
    Ok(())
}

/// Wait for every in-flight action. Returns how many panicked.
fn join_all<T>(handles: Vec<JoinHandle<T>>) -> usize {
    handles
        .into_iter()
        .map(JoinHandle::join)
        .filter(Result::is_err)
        .count()
}

fn spawn_stdin_reader(tx: Sender<Command>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        return;
                    }
                }
                None => eprintln!("Unknown command: {}", line.trim()),
            }
        }
        let _ = tx.send(Command::Quit);
    });
}

fn print_help() {
    println!("Commands: connect, detect, status, help, quit");
    let _ = io::stdout().flush();
}

fn device_selector(settings: &Settings) -> DeviceSelector {
    if let Some(address) = &settings.device_address {
        DeviceSelector::Address(address.clone())
    } else if let Some(prefix) = &settings.device_name {
        DeviceSelector::NamePrefix(prefix.clone())
    } else {
        DeviceSelector::Advertising
    }
}

fn camera_config(settings: &Settings) -> Result<CameraConfig, Box<dyn std::error::Error>> {
    let mut config = CameraConfig::new(settings.camera_device.clone());
    config.input_format = settings.input_format.clone();
    config.framerate = settings.framerate;
    config.video_size = settings
        .video_size
        .as_deref()
        .map(|s| parse_video_size(s).ok_or(format!("Invalid video size: {s} (expected WxH)")))
        .transpose()?;
    Ok(config)
}

fn parse_video_size(s: &str) -> Option<(u32, u32)> {
    let (w, h) = s.trim().split_once(['x', 'X'])?;
    let w = w.parse().ok().filter(|&w: &u32| w > 0)?;
    let h = h.parse().ok().filter(|&h: &u32| h > 0)?;
    Some((w, h))
}

fn validate(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&settings.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            settings.confidence
        )
        .into());
    }
    if settings.scan_secs == 0 {
        return Err("Scan duration must be at least 1 second".into());
    }
    Ok(())
}
