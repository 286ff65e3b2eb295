use uuid::Uuid;

pub const FACE_DETECTOR_MODEL_NAME: &str = "blazeface.onnx";
pub const LANDMARK_MODEL_NAME: &str = "face_landmark_68.onnx";

/// Default directory searched for model files, relative to the working directory.
pub const DEFAULT_MODELS_DIR: &str = "models";

/// Nordic UART service advertised by the peripheral.
pub const UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);

/// UART RX characteristic on the peripheral (we write to it).
pub const UART_RX_CHAR_UUID: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

/// How long a connect attempt scans before choosing a device.
pub const DEFAULT_SCAN_SECS: u64 = 3;

/// Number of points in a landmark set (iBUG 300-W convention).
pub const LANDMARK_COUNT: usize = 68;

/// Radius of the disc drawn at each landmark, in display pixels.
pub const LANDMARK_DOT_RADIUS: u32 = 2;

/// Overlay dot colour (RGBA).
pub const LANDMARK_DOT_COLOR: [u8; 4] = [255, 0, 0, 255];
