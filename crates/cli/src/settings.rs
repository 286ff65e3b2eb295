use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use facelink_core::detection::infrastructure::onnx_blazeface_detector::DEFAULT_CONFIDENCE;
use facelink_core::shared::constants::{DEFAULT_MODELS_DIR, DEFAULT_SCAN_SECS};

/// Persisted defaults for the interactive session. Command-line flags take
/// precedence over every field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub camera_device: String,
    pub input_format: Option<String>,
    pub video_size: Option<String>,
    pub framerate: Option<u32>,
    pub models_dir: PathBuf,
    pub models_url: Option<String>,
    pub confidence: f64,
    pub device_name: Option<String>,
    pub device_address: Option<String>,
    pub scan_secs: u64,
    pub overlay_out: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            camera_device: "0".to_string(),
            input_format: None,
            video_size: None,
            framerate: None,
            models_dir: PathBuf::from(DEFAULT_MODELS_DIR),
            models_url: None,
            confidence: DEFAULT_CONFIDENCE,
            device_name: None,
            device_address: None,
            scan_secs: DEFAULT_SCAN_SECS,
            overlay_out: None,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("Facelink").join("settings.json"))
    }

    /// Defaults when the file is missing or unreadable.
    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed settings {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let path = Self::config_path().ok_or("Could not determine config directory")?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
